//! Drives an arbiter region from the command line.
//!
//! Each invocation maps the region, does one thing and exits, so separate
//! processes can contend for the same file:
//!
//! ```text
//! arbiter-cli -r /tmp/arb request 1 5 42     # granted
//! arbiter-cli -r /tmp/arb request 1 5 99     # denied
//! arbiter-cli -r /tmp/arb log --max 4
//! arbiter-cli -r /tmp/arb stress --threads 4 --rounds 1000
//! ```
//!
//! Exit status: 0 granted / success, 1 denied, 2 error.

use std::process;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use clap::{value_t, App, AppSettings, Arg, ArgMatches, ErrorKind, SubCommand};
use rand::Rng;
use xux_arbiter::config::ENV_CONFIG;
use xux_arbiter::{
    AlwaysAllow, Arbiter, ArbiterConfig, ArbiterError, Backing, Decision, PermissivePolicy,
    Policy, RestrictivePolicy,
};

const EXIT_DENIED: i32 = 1;
const EXIT_ERROR: i32 = 2;

fn main() {
    xux_arbiter::io::logging::init();
    let matches = match cli().get_matches_safe() {
        Ok(matches) => matches,
        // help and version go to stdout with status 0
        Err(err) if matches!(err.kind, ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed) => {
            err.exit()
        }
        Err(err) => {
            eprintln!("{}", err.message);
            process::exit(EXIT_ERROR);
        }
    };
    let code = match run(&matches) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("arbiter-cli: {}", message);
            EXIT_ERROR
        }
    };
    process::exit(code);
}

fn cli() -> App<'static, 'static> {
    App::new("arbiter-cli")
        .about("Request resources from, and inspect, a shared arbiter region")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("region")
                .short("r")
                .long("region")
                .takes_value(true)
                .help("Region file shared between processes (default: $ARBITER_REGION)"),
        )
        .arg(
            Arg::with_name("table-capacity")
                .short("t")
                .long("table-capacity")
                .takes_value(true)
                .help("Arbitration table entries; must match every other user of the region"),
        )
        .arg(
            Arg::with_name("log-capacity")
                .short("l")
                .long("log-capacity")
                .takes_value(true)
                .help("Audit ring entries; must match every other user of the region"),
        )
        .arg(
            Arg::with_name("policy")
                .short("p")
                .long("policy")
                .takes_value(true)
                .default_value("permissive")
                .help("permissive, always_allow or restrictive:<id>[,<id>...]"),
        )
        .subcommand(
            SubCommand::with_name("request")
                .about("Request ownership of a resource")
                .arg(Arg::with_name("type").required(true).help("Resource type"))
                .arg(Arg::with_name("id").required(true).help("Resource id"))
                .arg(Arg::with_name("owner").required(true).help("Requester, non-zero")),
        )
        .subcommand(
            SubCommand::with_name("log")
                .about("Print the most recent decisions, oldest first")
                .arg(
                    Arg::with_name("max")
                        .short("n")
                        .long("max")
                        .takes_value(true)
                        .help("At most this many entries (default: whole ring)"),
                ),
        )
        .subcommand(SubCommand::with_name("table").about("Print the occupied table entries"))
        .subcommand(
            SubCommand::with_name("stress")
                .about("Hammer the region with random requests from several threads")
                .arg(
                    Arg::with_name("threads")
                        .long("threads")
                        .takes_value(true)
                        .default_value("4"),
                )
                .arg(
                    Arg::with_name("rounds")
                        .long("rounds")
                        .takes_value(true)
                        .default_value("1000"),
                )
                .arg(
                    Arg::with_name("resources")
                        .long("resources")
                        .takes_value(true)
                        .default_value("8")
                        .help("Distinct resource ids to contend for"),
                ),
        )
}

fn run(matches: &ArgMatches) -> Result<i32, String> {
    let config = config_from(matches)?;
    log::debug!(
        "region {} with {} table / {} log entries",
        config.backing,
        config.table_capacity,
        config.log_capacity
    );
    let policy = policy_from(matches.value_of("policy").unwrap_or("permissive"))?;
    let arbiter = Arbiter::try_initialize(&config, Some(policy)).map_err(|err| err.to_string())?;

    match matches.subcommand() {
        ("request", Some(sub)) => {
            let resource_type = parsed::<i32>(sub, "type")?;
            let resource_id = parsed::<i32>(sub, "id")?;
            let owner = parsed::<i32>(sub, "owner")?;
            let decision = arbiter
                .request(resource_type, resource_id, owner)
                .map_err(|err| err.to_string())?;
            println!("{}", decision);
            Ok(match decision {
                Decision::Granted => 0,
                Decision::Denied => EXIT_DENIED,
            })
        }
        ("log", Some(sub)) => {
            let max = match sub.value_of("max") {
                Some(_) => parsed::<usize>(sub, "max")?,
                None => config.log_capacity,
            };
            for entry in arbiter.get_log(max) {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.resource_type,
                    entry.resource_id,
                    entry.owner,
                    Decision::from(entry.granted)
                );
            }
            Ok(0)
        }
        ("table", Some(_)) => {
            for entry in arbiter.entries().map_err(|err| err.to_string())? {
                println!("{}\t{}\t{}", entry.resource_type, entry.resource_id, entry.owner);
            }
            Ok(0)
        }
        ("stress", Some(sub)) => {
            let threads = parsed::<usize>(sub, "threads")?;
            let rounds = parsed::<usize>(sub, "rounds")?;
            let resources = parsed::<i32>(sub, "resources")?;
            stress(&arbiter, threads, rounds, resources.max(1))
        }
        _ => Err("no subcommand given".into()),
    }
}

/// Usage errors take the generic error status, not clap's 1, which means
/// denied here.
fn parsed<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T, String> {
    value_t!(matches, name, T).map_err(|err| err.message)
}

fn config_from(matches: &ArgMatches) -> Result<ArbiterConfig, String> {
    let mut config = ENV_CONFIG.clone();
    if let Some(region) = matches.value_of("region") {
        config.backing = Backing::parse(region);
    }
    if config.backing == Backing::Heap {
        return Err("a region file is required (--region or $ARBITER_REGION)".into());
    }
    if matches.is_present("table-capacity") {
        config.table_capacity = parsed::<usize>(matches, "table-capacity")?;
    }
    if matches.is_present("log-capacity") {
        config.log_capacity = parsed::<usize>(matches, "log-capacity")?;
    }
    Ok(config)
}

fn policy_from(arg: &str) -> Result<Arc<dyn Policy>, String> {
    match arg {
        "permissive" => Ok(Arc::new(PermissivePolicy)),
        "always_allow" => Ok(Arc::new(AlwaysAllow)),
        _ => {
            let list = arg
                .strip_prefix("restrictive:")
                .ok_or_else(|| format!("unknown policy {:?}", arg))?;
            let allowed = list
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| s.trim().parse::<i32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| format!("bad requester in {:?}: {}", arg, err))?;
            Ok(Arc::new(RestrictivePolicy::new(allowed)))
        }
    }
}

#[derive(Default)]
struct Tally {
    granted: AtomicUsize,
    denied: AtomicUsize,
    full: AtomicUsize,
}

fn stress(arbiter: &Arbiter, threads: usize, rounds: usize, resources: i32) -> Result<i32, String> {
    // Requesters are unique per process and thread, and never 0.
    let base = (process::id() % 10_000) as i32 * 100;
    let tally = Arc::new(Tally::default());

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let arbiter = arbiter.clone();
            let tally = Arc::clone(&tally);
            let requester = base + t as i32 + 1;
            thread::spawn(move || -> Result<(), ArbiterError> {
                let mut rng = rand::thread_rng();
                for _ in 0..rounds {
                    let id = rng.gen_range(0..resources);
                    match arbiter.request(0, id, requester) {
                        Ok(Decision::Granted) => tally.granted.fetch_add(1, Ordering::Relaxed),
                        Ok(Decision::Denied) => tally.denied.fetch_add(1, Ordering::Relaxed),
                        Err(ArbiterError::NoCapacity) => tally.full.fetch_add(1, Ordering::Relaxed),
                        Err(err) => return Err(err),
                    };
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log::warn!("stress worker gave up: {}", err);
                return Err(err.to_string());
            }
            Err(_) => {
                log::warn!("stress worker panicked");
                return Err("stress worker panicked".into());
            }
        }
    }

    let entries = arbiter.entries().map_err(|err| err.to_string())?;
    println!(
        "granted {} denied {} full {} owned {}",
        tally.granted.load(Ordering::Relaxed),
        tally.denied.load(Ordering::Relaxed),
        tally.full.load(Ordering::Relaxed),
        entries.len()
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_parse() {
        assert_eq!(policy_from("permissive").unwrap().name(), "permissive");
        assert_eq!(policy_from("always_allow").unwrap().name(), "always_allow");
        let restrictive = policy_from("restrictive:3, 4").unwrap();
        assert!(restrictive.decide(0, 0, 0, 4));
        assert!(!restrictive.decide(0, 0, 0, 5));
        assert!(policy_from("restrictive:x").is_err());
        assert!(policy_from("lenient").is_err());
    }

    #[test]
    fn heap_backing_is_refused() {
        let matches = cli().get_matches_from(vec!["arbiter-cli", "-r", "heap", "table"]);
        assert!(config_from(&matches).is_err());
    }

    #[test]
    fn region_argument_selects_file() {
        let matches = cli().get_matches_from(vec![
            "arbiter-cli",
            "--region",
            "/tmp/arbiter-cli-unit",
            "-t",
            "8",
            "table",
        ]);
        let config = config_from(&matches).unwrap();
        assert_eq!(config.backing, Backing::File("/tmp/arbiter-cli-unit".into()));
        assert_eq!(config.table_capacity, 8);
    }

    #[test]
    fn malformed_capacity_is_an_error_not_an_exit() {
        let matches =
            cli().get_matches_from(vec!["arbiter-cli", "-r", "/tmp/arbiter-cli-unit", "-t", "x", "table"]);
        let err = config_from(&matches).unwrap_err();
        assert!(err.contains("isn't a valid value"), "{}", err);
    }
}
