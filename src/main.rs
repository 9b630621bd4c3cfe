// raphf - resource and persistent handle factory
// Quick demonstration of the registry; run the demos for more:
//   cargo run --example basic

use raphf::{FnOps, Registry, RegistryConfiguration};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

fn main() {
    init_tracing();

    let config = match RegistryConfiguration::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    println!("=== raphf persistent handles ===");
    println!("Quota: {:?}", config.limit());
    println!();

    let registry = Registry::new(config);
    let ops = FnOps::<String, str>::new().with_create(|host| Some(format!("connection to {host}")));
    if let Err(err) = registry.provide("demo\\Connection", ops) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    for host in ["php.net:80", "php.net:80", "example.org:443"] {
        let lease = match registry.concede::<FnOps<String, str>>("demo\\Connection", host) {
            Ok(lease) => lease,
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        };

        match lease.checkout(host) {
            Ok(conn) => println!("  Using {}", *conn),
            Err(err) => eprintln!("  {err}"),
        }
    }

    println!();
    if let Some(stats) = registry.stat_all() {
        print!("{stats}");
    }
}
