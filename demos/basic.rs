//! Basic usage examples for the persistent handle registry

use raphf::{FnOps, Registry, RegistryConfiguration};

type Connections = FnOps<String, str>;

fn connections() -> Connections {
    FnOps::new()
        .with_create(|host: &str| Some(format!("connection to {host}")))
        .with_destroy(|conn| println!("   Closing {conn}"))
}

fn main() {
    println!("=== raphf - Basic Examples ===\n");

    // Example 1: Acquire and release
    acquire_release();

    // Example 2: Quota
    quota();

    // Example 3: Automatic release
    checkout();

    // Example 4: Statistics and cleanup
    stats_and_cleanup();
}

fn acquire_release() {
    println!("1. Acquire and Release:");
    let registry = Registry::default();
    registry.provide("demo", connections()).unwrap();

    let lease = registry.concede::<Connections>("demo", "php.net:80").unwrap();
    let conn = lease.acquire("php.net:80").unwrap();
    println!("   Got: {conn}");
    lease.release(conn);

    let again = lease.acquire("php.net:80").unwrap();
    println!("   Reused: {again}");
    lease.release(again);
    println!();
}

fn quota() {
    println!("2. Quota:");
    let registry = Registry::new(RegistryConfiguration::new().with_limit(2));
    registry.provide("demo", connections()).unwrap();

    let lease = registry.concede::<Connections>("demo", "php.net:80").unwrap();
    let first = lease.acquire("first").unwrap();
    let second = lease.acquire("second").unwrap();

    // Two handles are leased and the limit is two, so this one is closed
    lease.release(first);
    // Only one is leased now, so this one is pooled
    lease.release(second);

    let stats = registry.stat_all().unwrap();
    println!("   Idle after release: {}\n", stats.get("demo", "php.net:80").unwrap().free);
}

fn checkout() {
    println!("3. Automatic Release:");
    let registry = Registry::default();
    registry.provide("demo", connections()).unwrap();
    let lease = registry.concede::<Connections>("demo", "example.org:443").unwrap();

    {
        let conn = lease.checkout("example.org:443").unwrap();
        println!("   Using: {}", *conn);
        // Returned to the pool when dropped
    }

    let stats = registry.stat_all().unwrap();
    println!("   Idle after scope: {}\n", stats.total_free());
}

fn stats_and_cleanup() {
    println!("4. Statistics and Cleanup:");
    let registry = Registry::default();
    registry.provide("demo", connections()).unwrap();

    let a = registry.concede::<Connections>("demo", "a:80").unwrap();
    let b = registry.concede::<Connections>("demo", "b:80").unwrap();
    let held = a.acquire("a:80").unwrap();
    let idle = b.acquire("b:80").unwrap();
    b.release(idle);

    print!("{}", registry.stat_all().unwrap());

    let destroyed = registry.cleanup(Some("demo"), None);
    println!("   Cleanup destroyed {destroyed} idle handle(s)");

    let metrics = registry.export_metrics();
    println!("\n   Metrics:");
    let mut keys: Vec<_> = metrics.keys().collect();
    keys.sort();
    for key in keys {
        println!("     {}: {}", key, metrics[key]);
    }

    a.release(held);
}
