//! Scripted database driver shared by the integration tests
//!
//! Every connection records the statements it runs, tagged with the database
//! it was opened for. `SELECT` statements answer with a single `name` column
//! holding that database name, so a test can tell where a read was routed.
#![allow(dead_code)]

use async_trait::async_trait;
use shardfabric::{
    ConnectionConfig, DataFabric, DatabaseConfigurations, DatabaseDriver, DriverConnection,
    FabricError, QueryResult, Result, Value,
};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Lag value that makes the replica status row report NULL
pub const LAG_UNKNOWN: i64 = i64::MIN;

pub struct ScriptedDriver {
    adapter: String,
    lag: Arc<AtomicI64>,
    statements: Arc<Mutex<Vec<(String, String)>>>,
    status_fails: Arc<AtomicBool>,
    ping_fails: Arc<AtomicBool>,
    connects: AtomicUsize,
}

impl ScriptedDriver {
    pub fn mysql() -> Arc<Self> {
        Self::new("mysql2")
    }

    pub fn new(adapter: &str) -> Arc<Self> {
        Arc::new(Self {
            adapter: adapter.to_string(),
            lag: Arc::new(AtomicI64::new(0)),
            statements: Arc::new(Mutex::new(Vec::new())),
            status_fails: Arc::new(AtomicBool::new(false)),
            ping_fails: Arc::new(AtomicBool::new(false)),
            connects: AtomicUsize::new(0),
        })
    }

    /// Seconds behind master reported by `SHOW SLAVE STATUS`
    pub fn set_lag(&self, seconds: i64) {
        self.lag.store(seconds, Ordering::SeqCst);
    }

    pub fn fail_replica_status(&self, fail: bool) {
        self.status_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_ping(&self, fail: bool) {
        self.ping_fails.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<(String, String)> {
        self.statements.lock().unwrap().clone()
    }

    /// Statements run against `database`, in order
    pub fn statements_on(&self, database: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|(db, _)| db == database)
            .map(|(_, sql)| sql)
            .collect()
    }

    /// Databases that ran `sql`, in order
    pub fn databases_for(&self, sql: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|(_, s)| s == sql)
            .map(|(db, _)| db)
            .collect()
    }

    pub fn clear(&self) {
        self.statements.lock().unwrap().clear();
    }
}

#[async_trait]
impl DatabaseDriver for ScriptedDriver {
    fn adapter_name(&self) -> &str {
        &self.adapter
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DriverConnection>> {
        if config.database == "unreachable" {
            return Err(FabricError::Driver(format!(
                "Can't connect to server on '{}'",
                config.host
            )));
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            adapter: self.adapter.clone(),
            database: config.database.clone(),
            lag: Arc::clone(&self.lag),
            statements: Arc::clone(&self.statements),
            status_fails: Arc::clone(&self.status_fails),
            ping_fails: Arc::clone(&self.ping_fails),
        }))
    }
}

struct ScriptedConnection {
    adapter: String,
    database: String,
    lag: Arc<AtomicI64>,
    statements: Arc<Mutex<Vec<(String, String)>>>,
    status_fails: Arc<AtomicBool>,
    ping_fails: Arc<AtomicBool>,
}

impl ScriptedConnection {
    fn record(&self, sql: &str) {
        self.statements
            .lock()
            .unwrap()
            .push((self.database.clone(), sql.to_string()));
    }

    fn replica_status(&self) -> Result<QueryResult> {
        if self.status_fails.load(Ordering::SeqCst) {
            return Err(FabricError::Driver(
                "Access denied; you need the REPLICATION CLIENT privilege".into(),
            ));
        }

        let lag = match self.lag.load(Ordering::SeqCst) {
            LAG_UNKNOWN => Value::Null,
            seconds => Value::Integer(seconds),
        };
        Ok(QueryResult::new(
            vec!["Slave_IO_State".into(), "Seconds_Behind_Master".into()],
            vec![vec![Value::Text("Waiting for master to send event".into()), lag]],
        ))
    }
}

#[async_trait]
impl DriverConnection for ScriptedConnection {
    fn adapter_name(&self) -> &str {
        &self.adapter
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.record(sql);

        let upper = sql.trim().to_ascii_uppercase();
        if upper == "SHOW SLAVE STATUS" {
            self.replica_status()
        } else if upper.starts_with("SELECT") {
            Ok(QueryResult::new(
                vec!["name".into()],
                vec![vec![Value::Text(self.database.clone())]],
            ))
        } else if upper.starts_with("FAIL") {
            Err(FabricError::Driver(format!("You have an error in your SQL syntax near '{}'", sql)))
        } else {
            Ok(QueryResult::affected(1))
        }
    }

    async fn begin(&mut self) -> Result<()> {
        self.record("BEGIN");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.record("COMMIT");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.record("ROLLBACK");
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(FabricError::Driver("MySQL server has gone away".into()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn call(&mut self, method: &str, args: &[Value]) -> Result<QueryResult> {
        self.record(method);
        match method {
            "quote" => {
                let quoted = args
                    .iter()
                    .map(|arg| format!("'{}'", arg))
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(QueryResult::new(vec!["quoted".into()], vec![vec![Value::Text(quoted)]]))
            }
            _ => Err(FabricError::Unsupported(format!(
                "{} connection does not support '{}'",
                self.adapter, method
            ))),
        }
    }
}

/// Configuration entry whose database name equals its connection name
pub fn entry(adapter: &str, name: &str) -> ConnectionConfig {
    ConnectionConfig::new(adapter, name)
}

/// Connection names used across the scenarios, environment "test"
pub fn configurations() -> DatabaseConfigurations {
    let names = [
        "test",
        "test_master",
        "test_slave",
        "city_austin_test",
        "city_dallas_test",
        "city_austin_test_master",
        "city_austin_test_slave",
        "city_dallas_test_master",
        "city_dallas_test_slave",
        "prefix_test_master",
        "prefix_test_slave",
        "prefix_city_austin_test_master",
        "prefix_city_austin_test_slave",
        "city_austin_production_master",
    ];

    let mut configs = DatabaseConfigurations::new();
    for name in names {
        configs.insert(name, entry("mysql2", name));
    }
    configs
}

pub fn fabric(driver: &Arc<ScriptedDriver>) -> DataFabric {
    DataFabric::builder("test")
        .configurations(configurations())
        .driver(driver.clone())
        .build()
        .unwrap()
}

/// Database a `SELECT` was answered by
pub fn answered_by(result: &QueryResult) -> String {
    result
        .value(0, "name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
