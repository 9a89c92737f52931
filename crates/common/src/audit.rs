//! Audit-log verification
//!
//! After a write through the UI, the suite confirms that REDCap logged it by
//! scanning the newest rows of `redcap_log_event` for one that matches a
//! [`LogQuery`]. Only the newest `scan_limit` rows are read: the check runs
//! right after the write it verifies, and the table is unbounded.

use tracing::{debug, warn};

use crate::store::RedcapStore;
use crate::types::{LogEntry, LogQuery};

/// Default number of newest rows scanned
pub const DEFAULT_SCAN_LIMIT: u32 = 10;

/// Outcome of scanning a batch of log rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMatch {
    /// First row matching every filter inside the time window
    Found(i64),
    /// Rows matched every filter but fell outside the window
    Untimely(Vec<i64>),
    NotFound,
}

/// Scans recent audit-log rows for a matching entry
#[derive(Debug, Clone, Copy)]
pub struct LogVerifier {
    scan_limit: u32,
}

impl Default for LogVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_LIMIT)
    }
}

impl LogVerifier {
    pub fn new(scan_limit: u32) -> Self {
        Self { scan_limit }
    }

    pub fn scan_limit(&self) -> u32 {
        self.scan_limit
    }

    /// `log_event_id` of the newest matching entry, or `None`.
    ///
    /// Query failures are logged and reported as `None`.
    pub async fn find_recent(&self, store: &dyn RedcapStore, query: &LogQuery) -> Option<i64> {
        let entries = match store
            .recent_log_events(query.project_id, query.event_id, self.scan_limit)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                e.log_diagnostics("scan log events");
                return None;
            }
        };

        match match_entries(&entries, query) {
            LogMatch::Found(id) => {
                debug!(
                    "Matching log entry {} recorded within {} seconds",
                    id, query.tolerance_secs
                );
                Some(id)
            }
            LogMatch::Untimely(ids) => {
                warn!(
                    "Log entries {:?} match pk={} but were not recorded within {} seconds of {}",
                    ids, query.pk, query.tolerance_secs, query.reference
                );
                None
            }
            LogMatch::NotFound => {
                debug!(
                    "No log entry for pk={} among the newest {} rows",
                    query.pk, self.scan_limit
                );
                None
            }
        }
    }
}

/// Match already-fetched rows, newest first.
pub fn match_entries(entries: &[LogEntry], query: &LogQuery) -> LogMatch {
    let mut untimely = Vec::new();
    for entry in entries {
        if entry.pk.is_none() {
            continue;
        }
        if entry.timestamp().is_none() {
            if entry.ts.is_some() && query.matches_filters(entry) {
                debug!(
                    "Skipping log entry {} with unreadable ts {:?}",
                    entry.log_event_id, entry.ts
                );
            }
            continue;
        }
        if !query.matches_filters(entry) {
            continue;
        }
        if query.within_window(entry) {
            return LogMatch::Found(entry.log_event_id);
        }
        untimely.push(entry.log_event_id);
    }

    if untimely.is_empty() {
        LogMatch::NotFound
    } else {
        LogMatch::Untimely(untimely)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::types::LogTimestamp;

    fn reference() -> LogTimestamp {
        "20180315093000".parse().unwrap()
    }

    fn entry(id: i64, offset: i64, pk: &str, description: &str) -> LogEntry {
        LogEntry {
            log_event_id: id,
            ts: Some(reference().offset_secs(offset).as_i64()),
            pk: Some(pk.to_string()),
            sql_log: "INSERT INTO redcap_data VALUES (...)".to_string(),
            data_values: "record_id = '11'".to_string(),
            description: description.to_string(),
            change_reason: String::new(),
        }
    }

    #[test]
    fn test_found_within_window() {
        let query = LogQuery::new(14, 11, 41, reference()).with_description("Create record");
        let entries = vec![
            entry(902, 5, "12", "Create record"),
            entry(901, -30, "11", "Create record"),
        ];
        assert_eq!(match_entries(&entries, &query), LogMatch::Found(901));
    }

    #[test]
    fn test_untimely_is_distinct_from_not_found() {
        let query = LogQuery::new(14, 11, 41, reference()).with_description("Create record");

        let entries = vec![entry(901, -120, "11", "Create record")];
        assert_eq!(match_entries(&entries, &query), LogMatch::Untimely(vec![901]));

        let entries = vec![entry(901, 0, "11", "Update record")];
        assert_eq!(match_entries(&entries, &query), LogMatch::NotFound);
    }

    #[test]
    fn test_tolerance_is_strict() {
        let query = LogQuery::new(14, 11, 41, reference()).within_secs(60);
        let at_edge = vec![entry(1, 60, "11", "Create record")];
        assert_eq!(match_entries(&at_edge, &query), LogMatch::Untimely(vec![1]));

        let inside = vec![entry(1, -59, "11", "Create record")];
        assert_eq!(match_entries(&inside, &query), LogMatch::Found(1));
    }

    #[test]
    fn test_unreadable_timestamp_is_not_untimely() {
        let query = LogQuery::new(14, 11, 41, reference()).with_description("Create record");
        let mut bad = entry(5, 0, "11", "Create record");
        bad.ts = Some(20180315093099);
        assert_eq!(match_entries(&[bad.clone()], &query), LogMatch::NotFound);

        // A readable row further back is still found
        let good = entry(4, -10, "11", "Create record");
        assert_eq!(match_entries(&[bad, good], &query), LogMatch::Found(4));
    }

    #[test]
    fn test_empty_filters_match_anything() {
        let query = LogQuery::new(14, 11, 41, reference());
        let mut e = entry(7, 0, "11", "");
        e.sql_log.clear();
        e.data_values.clear();
        assert_eq!(match_entries(&[e], &query), LogMatch::Found(7));
    }

    #[test]
    fn test_rows_without_ts_or_pk_are_skipped() {
        let query = LogQuery::new(14, 11, 41, reference());
        let mut no_ts = entry(2, 0, "11", "Create record");
        no_ts.ts = None;
        let mut no_pk = entry(1, 0, "11", "Create record");
        no_pk.pk = None;
        assert_eq!(match_entries(&[no_ts, no_pk], &query), LogMatch::NotFound);
    }

    #[tokio::test]
    async fn test_scan_limit_bounds_search() {
        let store = SqliteStore::open_memory().unwrap();
        let verifier = LogVerifier::new(3);

        // Target row, then exactly scan_limit newer unrelated rows
        store
            .insert_log_event(14, 41, &entry(0, 0, "11", "Create record"))
            .unwrap();
        for _ in 0..3 {
            store
                .insert_log_event(14, 41, &entry(0, 0, "12", "Create record"))
                .unwrap();
        }

        let query = LogQuery::new(14, 11, 41, reference()).with_description("Create record");
        assert_eq!(verifier.find_recent(&store, &query).await, None);
        assert_eq!(LogVerifier::new(4).find_recent(&store, &query).await, Some(1));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_found() {
        let store = SqliteStore::open_memory().unwrap();
        store.close().await.unwrap();
        let query = LogQuery::new(14, 11, 41, reference());
        assert_eq!(LogVerifier::default().find_recent(&store, &query).await, None);
    }
}
