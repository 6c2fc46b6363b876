//! Per-query outcome accumulation for the benchmark harness.

use std::time::Duration;

use crate::config::QuerySet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    Failure,
}

/// Result of running one named query once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub outcome: ExecutionOutcome,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn success(elapsed: Duration) -> Self {
        Self {
            outcome: ExecutionOutcome::Success,
            elapsed,
            error: None,
        }
    }

    pub fn failure(elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            outcome: ExecutionOutcome::Failure,
            elapsed,
            error: Some(error.into()),
        }
    }
}

/// Counters for a single query name.
///
/// `success_count + failure_count` is the number of attempts made so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub success_count: u64,
    pub failure_count: u64,
    /// Sum of elapsed time over successful attempts only.
    pub success_duration_total: Duration,
}

impl QueryStats {
    pub fn record(&mut self, record: &ExecutionRecord) {
        match record.outcome {
            ExecutionOutcome::Success => {
                self.success_count += 1;
                self.success_duration_total += record.elapsed;
            }
            // Failed attempts do not contribute timing.
            ExecutionOutcome::Failure => self.failure_count += 1,
        }
    }

    pub fn attempts(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Mean latency of successful attempts in whole milliseconds.
    ///
    /// Reported as 0 when there were no successes.
    pub fn average_millis(&self) -> u64 {
        if self.success_count == 0 {
            return 0;
        }
        (self.success_duration_total.as_millis() / u128::from(self.success_count)) as u64
    }
}

/// A configured query together with its counters.
#[derive(Debug, Clone)]
pub struct QueryEntry {
    pub name: String,
    pub sql: String,
    pub stats: QueryStats,
}

/// Ordered accumulator holding one entry per configured query.
///
/// Entries are created up front so a query that never ran still reports.
#[derive(Debug, Clone)]
pub struct StatsBook {
    entries: Vec<QueryEntry>,
}

impl StatsBook {
    pub fn new(queries: &QuerySet) -> Self {
        let entries = queries
            .iter()
            .map(|(name, sql)| QueryEntry {
                name: name.to_string(),
                sql: sql.to_string(),
                stats: QueryStats::default(),
            })
            .collect();
        Self { entries }
    }

    /// Records an attempt for the query at `index` (configuration order).
    pub fn record(&mut self, index: usize, record: &ExecutionRecord) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.stats.record(record);
        }
    }

    pub fn get(&self, name: &str) -> Option<&QueryStats> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.stats)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_success_only_mean() {
        let mut stats = QueryStats::default();
        for ms in [10, 20, 30] {
            stats.record(&ExecutionRecord::success(Duration::from_millis(ms)));
        }
        stats.record(&ExecutionRecord::failure(
            Duration::from_millis(5_000),
            "timeout",
        ));
        assert_eq!(stats.success_count, 3);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.attempts(), 4);
        assert_eq!(stats.average_millis(), 20);
    }

    #[test]
    fn average_without_successes_is_zero() {
        let mut stats = QueryStats::default();
        assert_eq!(stats.average_millis(), 0);
        stats.record(&ExecutionRecord::failure(Duration::from_millis(7), "boom"));
        assert_eq!(stats.average_millis(), 0);
    }

    #[test]
    fn average_truncates_to_whole_millis() {
        let mut stats = QueryStats::default();
        stats.record(&ExecutionRecord::success(Duration::from_micros(1_900)));
        stats.record(&ExecutionRecord::success(Duration::from_micros(1_200)));
        assert_eq!(stats.average_millis(), 1);
    }

    #[test]
    fn book_keeps_configuration_order() {
        let queries = QuerySet::new(vec![
            ("sql_b".to_string(), "SELECT 2".to_string()),
            ("sql_a".to_string(), "SELECT 1".to_string()),
        ])
        .unwrap();
        let mut book = StatsBook::new(&queries);
        book.record(1, &ExecutionRecord::success(Duration::from_millis(4)));
        let names: Vec<_> = book.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["sql_b", "sql_a"]);
        assert_eq!(book.get("sql_a").unwrap().success_count, 1);
        assert_eq!(book.get("sql_b").unwrap().attempts(), 0);
    }
}
