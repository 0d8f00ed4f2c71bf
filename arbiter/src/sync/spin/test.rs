use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use arbiter_macros::sync_test;

use super::{
    Backoff, BackoffLock, KernelLock, RawBackoffLock, RawIrqSpinLock, RawKernelLock, RawSpinLock,
    SpinLock, SpinStrategy, Ticket,
};
use crate::interrupt::{InterruptController, InterruptState};

#[sync_test]
fn basic_lock_unlock() {
    let mutex = SpinLock::new(0);
    {
        let mut guard = mutex.lock();
        *guard = 42;
    } // guard dropped, lock released
    let guard = mutex.lock();
    assert_eq!(*guard, 42);
}

#[sync_test]
fn backoff_basic_lock_unlock() {
    let mutex = BackoffLock::new(String::from("a"));
    mutex.lock().push('b');
    assert_eq!(mutex.lock().as_str(), "ab");
    assert!(!mutex.is_locked());
}

#[sync_test]
fn kernel_lock_is_a_drop_in() {
    let mutex = KernelLock::new(vec![1, 2]);
    mutex.lock().push(3);
    assert_eq!(*mutex.lock(), vec![1, 2, 3]);
}

#[sync_test]
fn kernel_lock_follows_backoff_feature() {
    use std::any::TypeId;

    #[cfg(feature = "backoff")]
    let expected = TypeId::of::<RawBackoffLock>();
    #[cfg(not(feature = "backoff"))]
    let expected = TypeId::of::<RawSpinLock>();
    assert_eq!(TypeId::of::<RawKernelLock>(), expected);
}

fn masks_interrupts_while_held<S: SpinStrategy>() {
    let lock = RawIrqSpinLock::<S>::named("mask");
    assert_eq!(InterruptController::get_state(), InterruptState::Enabled);

    lock.acquire();
    assert_eq!(InterruptController::get_state(), InterruptState::Disabled);
    assert!(lock.is_held_by_current_processor());
    assert!(lock.is_locked());

    lock.release();
    assert_eq!(InterruptController::get_state(), InterruptState::Enabled);
    assert!(!lock.is_held_by_current_processor());
    assert_eq!(InterruptController::nest_depth(), 0);
}

#[sync_test]
fn ticket_masks_interrupts_while_held() {
    masks_interrupts_while_held::<Ticket>();
}

#[sync_test]
fn backoff_masks_interrupts_while_held() {
    masks_interrupts_while_held::<Backoff>();
}

#[sync_test]
fn release_keeps_interrupts_off_when_acquired_masked() {
    let lock = RawSpinLock::named("masked");
    InterruptController::global_disable();
    lock.acquire();
    lock.release();
    assert_eq!(InterruptController::get_state(), InterruptState::Disabled);
    InterruptController::global_enable();
}

#[sync_test]
fn nested_distinct_locks_unmask_on_last_release() {
    let outer = RawSpinLock::named("outer");
    let inner = RawBackoffLock::named("inner");
    outer.acquire();
    inner.acquire();
    assert_eq!(InterruptController::nest_depth(), 2);
    inner.release();
    assert_eq!(InterruptController::get_state(), InterruptState::Disabled);
    outer.release();
    assert_eq!(InterruptController::get_state(), InterruptState::Enabled);
}

fn try_acquire_rolls_back<S: SpinStrategy + Send + Sync + 'static>() {
    let lock = Arc::new(RawIrqSpinLock::<S>::named("try"));
    lock.acquire();

    let other = lock.clone();
    let (granted, state, depth) = thread::spawn(move || {
        let granted = other.try_acquire();
        (granted, InterruptController::get_state(), InterruptController::nest_depth())
    })
    .join()
    .unwrap();
    assert!(!granted);
    assert_eq!(state, InterruptState::Enabled);
    assert_eq!(depth, 0);

    // re-entrant try is a plain failure, not a panic
    assert!(!lock.try_acquire());
    assert_eq!(InterruptController::nest_depth(), 1);
    lock.release();

    assert!(lock.try_acquire());
    assert!(lock.is_held_by_current_processor());
    lock.release();
}

#[sync_test]
fn ticket_try_acquire_rolls_back() {
    try_acquire_rolls_back::<Ticket>();
}

#[sync_test]
fn backoff_try_acquire_rolls_back() {
    try_acquire_rolls_back::<Backoff>();
}

#[sync_test]
#[should_panic(expected = "dead lock")]
fn ticket_reentrant_acquire_is_fatal() {
    let lock = RawSpinLock::named("reentrant");
    lock.acquire();
    lock.acquire();
}

#[sync_test]
#[should_panic(expected = "dead lock")]
fn backoff_reentrant_acquire_is_fatal() {
    let lock = RawBackoffLock::named("reentrant");
    lock.acquire();
    lock.acquire();
}

#[sync_test]
#[should_panic(expected = "released by processor")]
fn release_of_free_lock_is_fatal() {
    let lock = RawSpinLock::named("free");
    lock.release();
}

#[sync_test]
fn release_from_foreign_processor_is_fatal() {
    let lock = Arc::new(RawBackoffLock::named("foreign"));
    lock.acquire();
    let other = lock.clone();
    let outcome = thread::spawn(move || other.release()).join();
    assert!(outcome.is_err());
    assert!(lock.is_held_by_current_processor());
    lock.release();
}

#[sync_test]
fn misuse_panic_names_the_acquisition_site() {
    let lock = Arc::new(RawSpinLock::named("sited"));
    let other = lock.clone();
    let message = thread::spawn(move || {
        other.acquire();
        let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| other.acquire()))
            .unwrap_err();
        err.downcast_ref::<String>().cloned().unwrap_or_default()
    })
    .join()
    .unwrap();
    assert!(message.contains("sited"), "{message}");
    assert!(message.contains("test.rs"), "{message}");
}

#[cfg(debug_assertions)]
#[sync_test]
fn identity_keeps_recent_sites() {
    let lock = RawSpinLock::named("traced");
    lock.acquire();
    lock.release();
    lock.acquire();
    let site = lock.identity().held_since().expect("tracked entry point");
    assert!(site.file().ends_with("test.rs"));
    let trace = lock.identity().trace();
    assert!(trace[0].is_some() && trace[1].is_some());
    assert!(trace[2].is_none());
    lock.release();
}

fn excludes_concurrent_holders<S: SpinStrategy + Send + Sync + 'static>() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 200;

    let counter = Arc::new(lock_api::Mutex::<RawIrqSpinLock<S>, u64>::new(0));
    let inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let counter = counter.clone();
            let inside = inside.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let mut guard = counter.lock();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    assert_eq!(InterruptController::get_state(), InterruptState::Disabled);
                    *guard += 1;
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*counter.lock(), (THREADS * ROUNDS) as u64);
}

#[sync_test]
fn ticket_mutual_exclusion() {
    excludes_concurrent_holders::<Ticket>();
}

#[sync_test]
fn backoff_mutual_exclusion() {
    excludes_concurrent_holders::<Backoff>();
}

#[sync_test]
fn ticket_admits_in_issue_order() {
    const WAITERS: usize = 5;

    let lock = Arc::new(RawSpinLock::named("fifo"));
    let order = Arc::new(Mutex::new(Vec::new()));
    lock.acquire();

    let mut handles = Vec::new();
    for i in 0..WAITERS {
        let lock_i = lock.clone();
        let order_i = order.clone();
        handles.push(thread::spawn(move || {
            lock_i.acquire();
            order_i.lock().unwrap().push(i);
            lock_i.release();
        }));
        // wait until waiter i holds its ticket before issuing the next one
        while lock.strategy().queued() as usize != i + 2 {
            thread::yield_now();
        }
    }
    assert_eq!(lock.strategy().waiters() as usize, WAITERS);

    lock.release();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), (0..WAITERS).collect::<Vec<_>>());
    assert!(!lock.is_locked());
}

#[sync_test]
fn interrupt_handler_never_runs_inside_critical_section() {
    let lock = Rc::new(RawSpinLock::named("irq"));
    let handled = Rc::new(Cell::new(false));

    lock.acquire();
    {
        let lock = lock.clone();
        let handled = handled.clone();
        InterruptController::raise(move || {
            // the interrupted code is gone, so the handler can take the lock
            assert!(lock.try_acquire());
            lock.release();
            handled.set(true);
        });
    }
    assert!(!handled.get());
    lock.release();
    assert!(handled.get());
    assert_eq!(InterruptController::get_state(), InterruptState::Enabled);
}
