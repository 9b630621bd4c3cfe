//! Advanced features: hooks, custom ops, replacement, lease factories

use raphf::{HandleOps, LeaseHooks, MetricsExporter, Registry, ResourceFactory};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Connection {
    host: String,
    requests: usize,
    in_transaction: bool,
}

struct ConnectionOps {
    driver: &'static str,
}

impl HandleOps for ConnectionOps {
    type Handle = Connection;
    type Init = str;

    fn create(&self, host: &str) -> Option<Connection> {
        println!("   [{}] connecting to {}", self.driver, host);
        Some(Connection {
            host: host.to_string(),
            requests: 0,
            in_transaction: false,
        })
    }

    fn copy(&self, conn: &Connection) -> Option<Connection> {
        self.create(&conn.host)
    }

    fn destroy(&self, conn: Connection) {
        println!("   [{}] closing {} after {} request(s)", self.driver, conn.host, conn.requests);
    }
}

struct Parsers;

impl HandleOps for Parsers {
    type Handle = Vec<u8>;
    type Init = usize;

    fn create(&self, capacity: &usize) -> Option<Vec<u8>> {
        Some(Vec::with_capacity(*capacity))
    }
}

fn main() {
    println!("=== raphf - Advanced Features ===\n");

    // Example 1: Wakeup and retire hooks
    hooks();

    // Example 2: Several handle types in one registry
    mixed_providers();

    // Example 3: Replacing a provider
    replacement();

    // Example 4: A lease used as a plain factory
    lease_factory();

    // Example 5: Prometheus metrics
    prometheus_export();
}

fn hooks() {
    println!("1. Wakeup and Retire Hooks:");
    let registry = Registry::default();
    registry.provide("db", ConnectionOps { driver: "pg" }).unwrap();

    let hooks = LeaseHooks::new()
        .on_wakeup(|ident: &str, conn: &mut Connection| {
            println!("   waking connection for {ident}");
            conn.requests += 1;
        })
        .on_retire(|_: &str, conn: &mut Connection| {
            // never pool a connection mid-transaction
            conn.in_transaction = false;
        });
    let lease = registry
        .concede_with::<ConnectionOps>("db", "db.local:5432", hooks)
        .unwrap();

    let mut conn = lease.acquire("db.local:5432").unwrap();
    conn.in_transaction = true;
    lease.release(conn);

    let conn = lease.acquire("db.local:5432").unwrap();
    println!("   reused: {:?}", conn);
    lease.release(conn);
    println!();
}

fn mixed_providers() {
    println!("2. Mixed Providers:");
    let registry = Registry::default();
    registry.provide("db", ConnectionOps { driver: "mysql" }).unwrap();
    registry.provide("parser", Parsers).unwrap();

    let db = registry.concede::<ConnectionOps>("db", "db.local:3306").unwrap();
    let parser = registry.concede::<Parsers>("parser", "json").unwrap();

    let conn = db.acquire("db.local:3306").unwrap();
    let buf = parser.acquire(&4096).unwrap();
    println!("   parser buffer capacity: {}", buf.capacity());

    match registry.concede::<Parsers>("db", "oops") {
        Ok(_) => println!("   unexpected lease"),
        Err(err) => println!("   {err}"),
    }

    db.release(conn);
    parser.release(buf);
    print!("{}", registry.stat_all().unwrap());
    println!();
}

fn replacement() {
    println!("3. Provider Replacement:");
    let registry = Registry::default();
    registry
        .provide_with_dtor("db", ConnectionOps { driver: "v1" }, |ops| {
            println!("   driver {} unloaded", ops.driver)
        })
        .unwrap();

    let lease = registry.concede::<ConnectionOps>("db", "db.local:5432").unwrap();
    let conn = lease.acquire("db.local:5432").unwrap();
    lease.release(conn);

    // The idle v1 connection is closed before v2 becomes visible
    registry.provide("db", ConnectionOps { driver: "v2" }).unwrap();
    drop(lease);

    let lease = registry.concede::<ConnectionOps>("db", "db.local:5432").unwrap();
    let conn = lease.acquire("db.local:5432").unwrap();
    lease.release(conn);
    println!();
}

fn lease_factory() {
    println!("4. Lease as Factory:");
    let registry = Registry::default();
    registry.provide("db", ConnectionOps { driver: "pg" }).unwrap();

    let pooled: ResourceFactory<_> = registry
        .concede::<ConnectionOps>("db", "db.local:5432")
        .unwrap()
        .into_factory();
    let unpooled = ResourceFactory::new(ConnectionOps { driver: "direct" });

    // Both factories share one calling convention
    use_factory("pooled", &pooled);
    use_factory("pooled", &pooled);
    use_factory("direct", &unpooled);
    println!();
}

fn use_factory<O>(label: &str, factory: &ResourceFactory<O>)
where
    O: HandleOps<Handle = Connection, Init = str>,
{
    if let Some(conn) = factory.construct("db.local:5432") {
        println!("   {label}: {}", conn.host);
        factory.destroy(conn);
    }
}

fn prometheus_export() {
    println!("5. Prometheus Metrics Export:");
    let registry = Registry::default();
    registry.provide("db", ConnectionOps { driver: "pg" }).unwrap();
    let lease = registry.concede::<ConnectionOps>("db", "db.local:5432").unwrap();
    let held = lease.acquire("db.local:5432").unwrap();

    let mut tags = HashMap::new();
    tags.insert("service".to_string(), "example".to_string());

    let stats = registry.stat_all().unwrap();
    match MetricsExporter::export_prometheus(&stats, Some(&tags)) {
        Ok(text) => println!("{text}"),
        Err(err) => println!("   {err}"),
    }

    lease.release(held);
}
