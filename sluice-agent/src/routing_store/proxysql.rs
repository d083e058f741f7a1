//! ProxySQL admin-interface routing store.
//!
//! Weights live in the `mysql_servers` table of the admin interface. Updates
//! are written to the in-memory config layer first and only take effect once
//! `LOAD MYSQL SERVERS TO RUNTIME` runs, which is exactly the staged/published
//! split the controller expects. Statements are executed with the stock
//! `mysql` command-line client.
//!
//! An `UPDATE` that matches no row still succeeds, so every weight batch ends
//! with a count of the rows it addressed and fails if any backend is missing.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sluice_core::domain::routing::WeightMap;
use sluice_core::{Backend, HostgroupId, RoutingStore, StoreError};
use tokio::process::Command;
use tokio::time;
use tracing::debug;

/// Promotes the staged server table to the live router and persists it
const PUBLISH_SQL: &str = "LOAD MYSQL SERVERS TO RUNTIME; SAVE MYSQL SERVERS TO DISK;";

/// Client error codes meaning the admin interface could not be reached
/// (2002 socket, 2003 TCP, 2005 unknown host, 2013 lost connection).
const CONNECTION_ERROR_CODES: [&str; 4] =
    ["ERROR 2002", "ERROR 2003", "ERROR 2005", "ERROR 2013"];

/// Where and how to log in to the ProxySQL admin interface.
#[derive(Debug, Clone)]
pub struct AdminEndpoint {
    /// The admin interface host
    pub host: String,
    /// The admin interface port
    pub port: u16,
    /// The admin user
    pub user: String,
    /// The admin password
    pub password: String,
}

/// A routing store backed by a ProxySQL admin interface.
#[derive(Debug, Clone)]
pub struct ProxySqlAdmin {
    endpoint: AdminEndpoint,
    mysql_bin: String,
    command_timeout: Duration,
}

impl ProxySqlAdmin {
    /// Create a new store that runs `mysql_bin` against `endpoint`.
    pub fn new(
        endpoint: AdminEndpoint,
        mysql_bin: impl Into<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            mysql_bin: mysql_bin.into(),
            command_timeout,
        }
    }

    /// The configured backends that have no `mysql_servers` row in `hostgroup`.
    ///
    /// Weights for such backends can never be applied, so the agent checks
    /// this once before the first cycle.
    pub async fn missing_backends(
        &self,
        hostgroup: HostgroupId,
        backends: &[Backend],
    ) -> Result<Vec<Backend>, StoreError> {
        let sql =
            format!("SELECT hostname, port FROM mysql_servers WHERE hostgroup_id={hostgroup};");
        let stdout = self.execute(&sql).await?;
        let known = parse_server_rows(&stdout);
        Ok(backends.iter().filter(|b| !known.contains(*b)).cloned().collect())
    }

    /// Run a batch of statements in a single client invocation, returning
    /// whatever the client printed.
    async fn execute(&self, sql: &str) -> Result<String, StoreError> {
        let mut cmd = Command::new(&self.mysql_bin);
        cmd.arg("--host")
            .arg(&self.endpoint.host)
            .arg("--port")
            .arg(self.endpoint.port.to_string())
            .arg("--user")
            .arg(&self.endpoint.user)
            .arg("--batch")
            .arg("--silent")
            .arg("--execute")
            .arg(sql)
            // Keep the password off the process list
            .env("MYSQL_PWD", &self.endpoint.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            admin = %self.endpoint.host,
            port = self.endpoint.port,
            sql,
            "executing admin statements"
        );

        let output = time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| {
                StoreError::unreachable(format!(
                    "admin command timed out after {}ms",
                    self.command_timeout.as_millis()
                ))
            })?
            .map_err(|e| {
                StoreError::unreachable(format!("failed to run {}: {e}", self.mysql_bin))
            })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(stderr))
    }
}

#[async_trait]
impl RoutingStore for ProxySqlAdmin {
    async fn set_weights(
        &self,
        hostgroup: HostgroupId,
        weights: &WeightMap,
    ) -> Result<(), StoreError> {
        if weights.is_empty() {
            return Ok(());
        }
        let stdout = self.execute(&update_weights_sql(hostgroup, weights)).await?;
        check_matched_rows(hostgroup, weights.len(), &stdout)
    }

    async fn publish(&self) -> Result<(), StoreError> {
        self.execute(PUBLISH_SQL).await.map(|_| ())
    }
}

/// Render one `UPDATE` per backend followed by a count of the rows they
/// address, all sent as one batch.
fn update_weights_sql(hostgroup: HostgroupId, weights: &WeightMap) -> String {
    let mut sql = String::new();
    let mut matches = Vec::with_capacity(weights.len());
    for (backend, weight) in weights {
        let row = row_predicate(backend);
        // Writing into a String cannot fail
        let _ = write!(
            sql,
            "UPDATE mysql_servers SET weight={weight} WHERE hostgroup_id={hostgroup} AND {row};"
        );
        matches.push(format!("({row})"));
    }
    let _ = write!(
        sql,
        "SELECT COUNT(*) FROM mysql_servers WHERE hostgroup_id={hostgroup} AND ({});",
        matches.join(" OR ")
    );
    sql
}

fn row_predicate(backend: &Backend) -> String {
    format!("hostname='{}' AND port={}", escape_literal(&backend.host), backend.port)
}

/// Escape a value for use inside a single-quoted SQL literal.
///
/// The admin interface speaks SQLite's dialect, where a quote is escaped by
/// doubling it and a backslash is an ordinary character.
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Fail unless the row count printed after a weight batch covers every backend.
fn check_matched_rows(
    hostgroup: HostgroupId,
    expected: usize,
    stdout: &str,
) -> Result<(), StoreError> {
    let matched = stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .and_then(|line| line.parse::<usize>().ok())
        .ok_or_else(|| {
            StoreError::Rejected(format!("unexpected row count output: {:?}", stdout.trim()))
        })?;

    if matched < expected {
        return Err(StoreError::Rejected(format!(
            "only {matched} of {expected} backends found in mysql_servers hostgroup {hostgroup}"
        )));
    }
    Ok(())
}

/// Parse the tab-separated `hostname, port` rows printed in batch mode.
///
/// Lines that do not hold a host and a valid port are skipped.
fn parse_server_rows(stdout: &str) -> BTreeSet<Backend> {
    stdout
        .lines()
        .filter_map(|line| {
            let (host, port) = line.trim_end_matches('\r').split_once('\t')?;
            let port = port.trim().parse().ok()?;
            (!host.is_empty()).then(|| Backend::new(host, port))
        })
        .collect()
}

fn classify_failure(stderr: String) -> StoreError {
    if CONNECTION_ERROR_CODES.iter().any(|code| stderr.starts_with(code)) {
        StoreError::Unreachable(stderr)
    } else if stderr.is_empty() {
        StoreError::rejected("admin command exited unsuccessfully")
    } else {
        StoreError::Rejected(stderr)
    }
}
