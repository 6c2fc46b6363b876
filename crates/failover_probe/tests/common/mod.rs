//! Scripted in-memory provider shared by the integration tests.
//!
//! Acquisitions are numbered from 1. Faults are injected per acquisition
//! number, so "acquire 5" is iteration 5 of the replay loop or round 5 of the
//! benchmark. Upserts keep one row per integer key, like the real statement.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use failover_probe::{Connection, ConnectionProvider, ProbeError, SqlValue};
use tokio::sync::watch;

pub const INJECTED: &str = "injected failure";

#[derive(Default)]
struct State {
    acquires: u64,
    open: i64,
    fail_acquire: BTreeSet<u64>,
    fail_query: BTreeSet<(u64, String)>,
    lost_commit_ack: BTreeSet<u64>,
    fail_commit: BTreeSet<u64>,
    nudge_at: BTreeSet<u64>,
    rows: BTreeMap<i64, String>,
    executed: Vec<(u64, String)>,
    stop_at: Option<u64>,
    shutdown: Option<watch::Sender<bool>>,
}

#[derive(Clone, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<State>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Acquisition `n` fails with a connectivity error.
    pub fn fail_acquire(self, n: u64) -> Self {
        self.state().fail_acquire.insert(n);
        self
    }

    /// Statement `sql` fails on the connection from acquisition `n`.
    pub fn fail_query(self, n: u64, sql: &str) -> Self {
        self.state().fail_query.insert((n, sql.to_string()));
        self
    }

    /// The commit on acquisition `n` is applied, but the client sees it fail.
    pub fn lose_commit_ack(self, n: u64) -> Self {
        self.state().lost_commit_ack.insert(n);
        self
    }

    /// The server rejects the commit on acquisition `n`; nothing is applied.
    pub fn fail_commit(self, n: u64) -> Self {
        self.state().fail_commit.insert(n);
        self
    }

    /// Acquisition `n` sends `false` on the shutdown channel: a change that is
    /// not a cancellation. Needs a receiver from [`Self::stop_after`].
    pub fn nudge_on(self, n: u64) -> Self {
        self.state().nudge_at.insert(n);
        self
    }

    /// Returns a shutdown receiver that flips to `true` during acquisition `n`.
    pub fn stop_after(&self, n: u64) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        let mut state = self.state();
        state.stop_at = Some(n);
        state.shutdown = Some(tx);
        rx
    }

    pub fn rows(&self) -> BTreeMap<i64, String> {
        self.state().rows.clone()
    }

    /// `(acquisition, sql)` for every statement sent, in order.
    pub fn executed(&self) -> Vec<(u64, String)> {
        self.state().executed.clone()
    }

    pub fn acquires(&self) -> u64 {
        self.state().acquires
    }

    /// Connections handed out and not yet dropped.
    pub fn open_connections(&self) -> i64 {
        self.state().open
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedProvider {
    type Connection = ScriptedConnection;

    async fn acquire(&self) -> Result<ScriptedConnection, ProbeError> {
        let mut state = self.state();
        state.acquires += 1;
        let n = state.acquires;
        if let Some(tx) = &state.shutdown {
            if state.stop_at == Some(n) {
                let _ = tx.send(true);
            } else if state.nudge_at.contains(&n) {
                let _ = tx.send(false);
            }
        }
        if state.fail_acquire.contains(&n) {
            return Err(ProbeError::Connect(format!("acquire {n}: connection refused")));
        }
        state.open += 1;
        Ok(ScriptedConnection {
            state: Arc::clone(&self.state),
            acquire: n,
            in_transaction: false,
            staged: Vec::new(),
        })
    }
}

pub struct ScriptedConnection {
    state: Arc<Mutex<State>>,
    acquire: u64,
    in_transaction: bool,
    staged: Vec<(i64, String)>,
}

impl ScriptedConnection {
    fn run(&self, sql: &str) -> Result<(), ProbeError> {
        let mut state = self.state.lock().unwrap();
        state.executed.push((self.acquire, sql.to_string()));
        if state.fail_query.contains(&(self.acquire, sql.to_string())) {
            return Err(ProbeError::Execute(INJECTED.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn begin(&mut self) -> Result<(), ProbeError> {
        self.in_transaction = true;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, ProbeError> {
        self.run(sql)?;
        match params {
            [SqlValue::Int(key), SqlValue::Text(note)] => {
                self.staged.push((*key, note.clone()));
                if !self.in_transaction {
                    let staged = std::mem::take(&mut self.staged);
                    self.state.lock().unwrap().rows.extend(staged);
                }
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn drain_query(&mut self, sql: &str) -> Result<u64, ProbeError> {
        self.run(sql)?;
        Ok(1)
    }

    async fn commit(&mut self) -> Result<(), ProbeError> {
        self.in_transaction = false;
        let mut state = self.state.lock().unwrap();
        if state.fail_commit.contains(&self.acquire) {
            return Err(ProbeError::Execute(format!(
                "{INJECTED}: could not serialize access (40001)"
            )));
        }
        let staged = std::mem::take(&mut self.staged);
        state.rows.extend(staged);
        if state.lost_commit_ack.contains(&self.acquire) {
            return Err(ProbeError::CommitAmbiguous(
                "connection closed before commit acknowledgement".to_string(),
            ));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ProbeError> {
        self.in_transaction = false;
        self.staged.clear();
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.open -= 1;
        }
    }
}
