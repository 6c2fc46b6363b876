//! Units of work: SQL text, parameter recipe, and replay classification.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::classify::OperationClass;
use crate::error::ProbeError;

/// Parameter value bound to a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Int(value) => write!(f, "{value}"),
            SqlValue::Text(value) => write!(f, "{value}"),
        }
    }
}

/// How a parameter is produced for each round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSpec {
    /// Same value every round.
    Fixed(SqlValue),
    /// `"{prefix} {UTC timestamp}"`, recomputed every round.
    TimestampNote { prefix: String },
}

impl ParamSpec {
    pub fn resolve(&self, now: DateTime<Utc>) -> SqlValue {
        match self {
            ParamSpec::Fixed(value) => value.clone(),
            ParamSpec::TimestampNote { prefix } => SqlValue::Text(format!(
                "{prefix} {}",
                now.to_rfc3339_opts(SecondsFormat::Millis, true)
            )),
        }
    }
}

/// Table and columns written by the replay-safe upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertTarget {
    table: String,
    id_column: String,
    note_column: String,
}

impl UpsertTarget {
    /// Validates the names so they can be spliced into SQL text.
    pub fn new(
        table: impl Into<String>,
        id_column: impl Into<String>,
        note_column: impl Into<String>,
    ) -> Result<Self, ProbeError> {
        let target = Self {
            table: table.into(),
            id_column: id_column.into(),
            note_column: note_column.into(),
        };
        // Tables may be schema-qualified; columns may not.
        if target.table.is_empty() || !target.table.split('.').all(is_identifier) {
            return Err(ProbeError::config(format!(
                "invalid table name {:?}",
                target.table
            )));
        }
        for column in [&target.id_column, &target.note_column] {
            if !is_identifier(column) {
                return Err(ProbeError::config(format!("invalid column name {column:?}")));
            }
        }
        if target.id_column == target.note_column {
            return Err(ProbeError::config(
                "id_column and note_column must differ",
            ));
        }
        Ok(target)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Unconditional upsert keyed by the id column.
    ///
    /// The placeholders carry explicit types; the server then casts them to
    /// whatever integer and text types the existing columns use.
    pub fn upsert_sql(&self) -> String {
        let Self {
            table,
            id_column: id,
            note_column: note,
        } = self;
        format!(
            "INSERT INTO {table} ({id}, {note}) VALUES ($1::bigint, $2::text) \
             ON CONFLICT ({id}) DO UPDATE SET {note} = EXCLUDED.{note}"
        )
    }

    pub fn create_table_sql(&self) -> String {
        let Self {
            table,
            id_column: id,
            note_column: note,
        } = self;
        format!("CREATE TABLE IF NOT EXISTS {table} ({id} BIGINT PRIMARY KEY, {note} TEXT)")
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One classified unit of work, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    key: i64,
    sql: String,
    params: Vec<ParamSpec>,
    class: OperationClass,
}

impl WorkUnit {
    pub fn new(
        key: i64,
        sql: impl Into<String>,
        params: Vec<ParamSpec>,
        class: OperationClass,
    ) -> Self {
        Self {
            key,
            sql: sql.into(),
            params,
            class,
        }
    }

    /// The replay-safe upsert of `(key, "{note_prefix} {timestamp}")`.
    ///
    /// The note changes every round, but re-running the statement still leaves
    /// exactly one row for `key`, so the unit is `Deterministic`.
    pub fn upsert(target: &UpsertTarget, key: i64, note_prefix: impl Into<String>) -> Self {
        Self::new(
            key,
            target.upsert_sql(),
            vec![
                ParamSpec::Fixed(SqlValue::Int(key)),
                ParamSpec::TimestampNote {
                    prefix: note_prefix.into(),
                },
            ],
            OperationClass::Deterministic,
        )
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn class(&self) -> OperationClass {
        self.class
    }

    /// Resolves the parameter list for one round.
    pub fn bind(&self, now: DateTime<Utc>) -> Vec<SqlValue> {
        self.params.iter().map(|param| param.resolve(now)).collect()
    }
}
