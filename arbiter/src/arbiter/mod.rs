//! Resource ownership arbiter.
//!
//! Brokers exclusive ownership of `(type, id)` resources between requesters.
//! Every request is decided by the installed [`Policy`] against the current
//! owner, applied to a fixed-capacity table and appended to a bounded audit
//! ring, all under the table's guard:
//! - the in-process [`KernelLock`] around the region, always
//! - a whole-file `flock`, when the region is a shared file
//!
//! Requests are therefore linearized, and the audit ring records exactly that
//! order. Entries are never released; ownership only moves when a policy
//! grants a request against an existing owner.
//!
//! An arbiter whose region cannot be obtained fails closed: every request
//! errors with [`ArbiterError::Unavailable`] and the log reads empty.

mod error;
mod layout;
mod policy;
mod region;

use std::sync::Arc;

pub use error::{ArbiterError, Decision, RegionError};
pub use layout::{ArbitrationEntry, ArbitrationLogEntry, Layout};
pub use policy::{default_policy, AlwaysAllow, PermissivePolicy, Policy, RestrictivePolicy};

use layout::{SharedState, Slot};
use region::Region;

use crate::config::ArbiterConfig;
use crate::sync::rw::RwSpinLock;
use crate::sync::spin::{KernelLock, RawKernelLock};

struct ArbiterInner {
    layout: Option<Layout>,
    region: Option<KernelLock<Region>>,
    policy: RwSpinLock<Arc<dyn Policy>>,
}

/// Handle to one arbiter instance. Clones share the instance.
#[derive(Clone)]
pub struct Arbiter {
    inner: Arc<ArbiterInner>,
}

impl Arbiter {
    /// Opens (or creates) the configured region and installs `policy`, or
    /// [`PermissivePolicy`] when `None`.
    ///
    /// Never fails: without a region the returned arbiter denies everything.
    /// Use [`try_initialize`](Self::try_initialize) to see why.
    pub fn initialize(config: &ArbiterConfig, policy: Option<Arc<dyn Policy>>) -> Self {
        let policy = policy.unwrap_or_else(default_policy);
        match Self::open_region(config) {
            Ok(region) => Self::with_region(Some(region), policy),
            Err(err) => {
                log::error!("arbiter unavailable, failing closed: {}", err);
                Self::with_region(None, policy)
            }
        }
    }

    pub fn try_initialize(
        config: &ArbiterConfig,
        policy: Option<Arc<dyn Policy>>,
    ) -> Result<Self, RegionError> {
        let region = Self::open_region(config)?;
        Ok(Self::with_region(Some(region), policy.unwrap_or_else(default_policy)))
    }

    fn open_region(config: &ArbiterConfig) -> Result<Region, RegionError> {
        let layout = Layout::new(config.table_capacity, config.log_capacity)?;
        log::debug!("opening {} region ({} bytes)", config.backing, layout.size());
        Region::open(&config.backing, layout)
    }

    fn with_region(region: Option<Region>, policy: Arc<dyn Policy>) -> Self {
        log::debug!("arbiter up with {} policy", policy.name());
        let layout = region.as_ref().map(|r| *r.layout());
        let region = region.map(|r| KernelLock::from_raw(RawKernelLock::named("arbiter"), r));
        Self {
            inner: Arc::new(ArbiterInner {
                layout,
                region,
                policy: RwSpinLock::new(policy),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.region.is_some()
    }

    /// Table and log geometry, `None` for a failed arbiter.
    pub fn layout(&self) -> Option<Layout> {
        self.inner.layout
    }

    /// Swaps the policy. Requests already past their policy snapshot finish
    /// with the old one.
    pub fn set_policy(&self, policy: Arc<dyn Policy>) {
        log::debug!("arbiter policy -> {}", policy.name());
        *self.inner.policy.write() = policy;
    }

    pub fn policy(&self) -> Arc<dyn Policy> {
        self.inner.policy.read().clone()
    }

    /// Asks for ownership of `(resource_type, resource_id)` on behalf of
    /// `requester`.
    ///
    /// Granted requests make `requester` the owner; denied ones leave the
    /// table untouched. Both are logged. A full table yields
    /// [`ArbiterError::NoCapacity`] without touching table or log.
    pub fn request(
        &self,
        resource_type: i32,
        resource_id: i32,
        requester: i32,
    ) -> Result<Decision, ArbiterError> {
        if requester == ArbitrationEntry::FREE_OWNER {
            return Err(ArbiterError::InvalidRequester);
        }
        let policy = self.policy();

        let (decision, previous) = self.with_state(|state| {
            let slot = state
                .slot_for(resource_type, resource_id)
                .ok_or(ArbiterError::NoCapacity)?;
            let current_owner = match slot {
                Slot::Owned(index) => state.entry(index).owner,
                Slot::Free(_) => ArbitrationEntry::FREE_OWNER,
            };

            let granted = policy.decide(resource_type, resource_id, current_owner, requester);
            if granted {
                state.assign(
                    slot.index(),
                    ArbitrationEntry { resource_type, resource_id, owner: requester },
                );
            }
            state.append_log(ArbitrationLogEntry {
                resource_type,
                resource_id,
                owner: requester,
                granted,
            });
            Ok::<_, ArbiterError>((Decision::from(granted), current_owner))
        })??;

        log::info!(
            "({}, {}) requested by {}: {} (owner was {}, {} policy)",
            resource_type,
            resource_id,
            requester,
            decision,
            previous,
            policy.name()
        );
        Ok(decision)
    }

    /// Up to `max_entries` most recent decisions, oldest first. Empty when
    /// the arbiter is unavailable.
    pub fn get_log(&self, max_entries: usize) -> Vec<ArbitrationLogEntry> {
        match self.with_state(|state| state.recent(max_entries)) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("audit log unreadable: {}", err);
                Vec::new()
            }
        }
    }

    /// Current owner of a resource, `None` if it has no entry.
    pub fn owner_of(&self, resource_type: i32, resource_id: i32) -> Result<Option<i32>, ArbiterError> {
        self.with_state(|state| state.owner_of(resource_type, resource_id))
    }

    /// Snapshot of every occupied table slot in slot order.
    pub fn entries(&self) -> Result<Vec<ArbitrationEntry>, ArbiterError> {
        self.with_state(|state| state.occupied())
    }

    /// Runs `f` with both guards held: the in-process lock first, then the
    /// region's cross-process lock.
    fn with_state<R>(&self, f: impl FnOnce(&mut SharedState<'_>) -> R) -> Result<R, ArbiterError> {
        let region = self.inner.region.as_ref().ok_or(ArbiterError::Unavailable)?;
        let mut region = region.lock();
        let region_lock = region.lock_region()?;
        let mut state = region.state(&region_lock);
        Ok(f(&mut state))
    }
}

impl core::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arbiter")
            .field("available", &self.is_available())
            .field("policy", &self.policy().name())
            .finish()
    }
}
