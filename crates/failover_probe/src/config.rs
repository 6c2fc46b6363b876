//! TOML configuration for both tools.
//!
//! The file is read once at startup and validated before any round runs; every
//! problem found here is fatal.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ProbeError;
use crate::work::UpsertTarget;

/// Keys under `[queries]` must start with this prefix (ASCII case-insensitive).
pub const QUERY_KEY_PREFIX: &str = "sql";

/// Environment variable that overrides `connection.password`.
pub const PASSWORD_ENV: &str = "FAILOVER_PROBE_PASSWORD";

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_REPLAY_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_REPLAY_ID: i64 = 1001;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFile {
    connection: Option<RawConnection>,
    bench: Option<RawBench>,
    #[serde(default)]
    queries: toml::Table,
    replay: Option<RawReplay>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConnection {
    url: String,
    user: Option<String>,
    password: Option<String>,
    pool_size: Option<usize>,
    connect_timeout: Option<String>,
    acquire_timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBench {
    execs: Option<u32>,
    sleep: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReplay {
    table: Option<String>,
    id_column: Option<String>,
    note_column: Option<String>,
    id: Option<i64>,
    note_prefix: Option<String>,
    interval: Option<String>,
    #[serde(default)]
    create_table: bool,
}

/// Connection target, credentials, and pool sizing.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// libpq-style key/value string or `postgres://` URL. Multiple hosts and
    /// `target_session_attrs` are passed through to the driver untouched.
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub pool_size: usize,
    pub connect_timeout: Duration,
    /// Upper bound on waiting for a pooled connection (`None` waits forever).
    pub acquire_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: None,
            password: None,
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            acquire_timeout: None,
        }
    }

    /// Applies [`PASSWORD_ENV`] when it is set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                self.password = Some(password);
            }
        }
    }

    fn from_raw(raw: RawConnection) -> Result<Self, ProbeError> {
        if raw.url.trim().is_empty() {
            return Err(ProbeError::config("connection.url must not be empty"));
        }
        let pool_size = raw.pool_size.unwrap_or(DEFAULT_POOL_SIZE);
        if pool_size == 0 {
            return Err(ProbeError::config("connection.pool_size must be > 0"));
        }
        let connect_timeout =
            parse_duration_opt("connection.connect_timeout", raw.connect_timeout)?
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let acquire_timeout =
            parse_duration_opt("connection.acquire_timeout", raw.acquire_timeout)?;
        Ok(Self {
            url: raw.url,
            user: raw.user,
            password: raw.password,
            pool_size,
            connect_timeout,
            acquire_timeout,
        })
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pool_size", &self.pool_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// Ordered, non-empty mapping of query name to SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySet {
    entries: Vec<(String, String)>,
}

impl QuerySet {
    /// Builds a set from `(name, sql)` pairs, keeping their order.
    pub fn new(entries: Vec<(String, String)>) -> Result<Self, ProbeError> {
        if entries.is_empty() {
            return Err(ProbeError::config("no SQL queries defined"));
        }
        for (idx, (name, sql)) in entries.iter().enumerate() {
            if sql.trim().is_empty() {
                return Err(ProbeError::config(format!("query {name:?} has empty SQL text")));
            }
            if entries[..idx].iter().any(|(earlier, _)| earlier == name) {
                return Err(ProbeError::config(format!("query {name:?} defined twice")));
            }
        }
        Ok(Self { entries })
    }

    /// Collects the recognized entries of a `[queries]` table in document order.
    fn from_table(table: toml::Table) -> Result<Self, ProbeError> {
        let mut entries = Vec::with_capacity(table.len());
        for (name, value) in table {
            if !is_query_key(&name) {
                warn!(key = %name, "ignoring [queries] key without `{QUERY_KEY_PREFIX}` prefix");
                continue;
            }
            let toml::Value::String(sql) = value else {
                return Err(ProbeError::config(format!(
                    "query {name:?} must be a string"
                )));
            };
            entries.push((name, sql));
        }
        Self::new(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, sql)| (name.as_str(), sql.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn is_query_key(name: &str) -> bool {
    name.get(..QUERY_KEY_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(QUERY_KEY_PREFIX))
}

/// Settings for the query benchmark.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub connection: ConnectionConfig,
    /// Number of rounds, at least 1.
    pub execs: u32,
    /// Pause between rounds; not applied after the last one.
    pub sleep: Duration,
    pub queries: QuerySet,
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self, ProbeError> {
        Self::from_raw(read_raw(path)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ProbeError> {
        Self::from_raw(parse_raw(text, Path::new("<inline>"))?)
    }

    fn from_raw(raw: RawFile) -> Result<Self, ProbeError> {
        let connection = require_connection(raw.connection)?;
        let bench = raw.bench.unwrap_or_default();
        let execs = bench.execs.unwrap_or(1);
        if execs == 0 {
            return Err(ProbeError::config("bench.execs must be >= 1"));
        }
        let sleep = parse_duration_opt("bench.sleep", bench.sleep)?.unwrap_or(Duration::ZERO);
        let queries = QuerySet::from_table(raw.queries)?;
        Ok(Self {
            connection,
            execs,
            sleep,
            queries,
        })
    }
}

/// Settings for the replay-safe upsert loop.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub connection: ConnectionConfig,
    pub target: UpsertTarget,
    /// Fixed key of the row the loop keeps overwriting.
    pub id: i64,
    pub note_prefix: String,
    pub interval: Duration,
    /// Runs `CREATE TABLE IF NOT EXISTS` once before the loop starts.
    pub create_table: bool,
}

impl ReplayConfig {
    pub fn load(path: &Path) -> Result<Self, ProbeError> {
        Self::from_raw(read_raw(path)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ProbeError> {
        Self::from_raw(parse_raw(text, Path::new("<inline>"))?)
    }

    fn from_raw(raw: RawFile) -> Result<Self, ProbeError> {
        let connection = require_connection(raw.connection)?;
        let replay = raw.replay.unwrap_or_default();
        let target = UpsertTarget::new(
            replay.table.unwrap_or_else(|| "demo_tac_ac".to_string()),
            replay.id_column.unwrap_or_else(|| "id".to_string()),
            replay.note_column.unwrap_or_else(|| "note".to_string()),
        )?;
        Ok(Self {
            connection,
            target,
            id: replay.id.unwrap_or(DEFAULT_REPLAY_ID),
            note_prefix: replay.note_prefix.unwrap_or_else(|| "RS-TAC".to_string()),
            interval: parse_duration_opt("replay.interval", replay.interval)?
                .unwrap_or(DEFAULT_REPLAY_INTERVAL),
            create_table: replay.create_table,
        })
    }
}

fn read_raw(path: &Path) -> Result<RawFile, ProbeError> {
    let text = std::fs::read_to_string(path).map_err(|source| ProbeError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    parse_raw(&text, path)
}

fn parse_raw(text: &str, path: &Path) -> Result<RawFile, ProbeError> {
    toml::from_str(text).map_err(|source| ProbeError::ConfigSyntax {
        path: path.to_path_buf(),
        source,
    })
}

fn require_connection(raw: Option<RawConnection>) -> Result<ConnectionConfig, ProbeError> {
    let raw = raw.ok_or_else(|| ProbeError::config("missing [connection] section"))?;
    ConnectionConfig::from_raw(raw)
}

fn parse_duration_opt(field: &str, value: Option<String>) -> Result<Option<Duration>, ProbeError> {
    value
        .map(|text| {
            humantime::parse_duration(text.trim())
                .map_err(|err| ProbeError::config(format!("{field}: invalid duration {text:?}: {err}")))
        })
        .transpose()
}
