//! Core types for rcsel

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Identifies one record instance: project, record and event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordScope {
    pub project_id: u32,
    pub record: u32,
    pub event_id: u32,
}

impl RecordScope {
    pub fn new(project_id: u32, record: u32, event_id: u32) -> Result<Self> {
        if project_id == 0 || record == 0 || event_id == 0 {
            return Err(Error::InvalidScope(format!(
                "project={} record={} event={} (all must be positive)",
                project_id, record, event_id
            )));
        }
        Ok(Self {
            project_id,
            record,
            event_id,
        })
    }
}

impl fmt::Display for RecordScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid={} record={} event={}",
            self.project_id, self.record, self.event_id
        )
    }
}

/// One `(field_name, value)` row of the data table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRow {
    pub field_name: String,
    pub value: Option<String>,
}

impl FieldRow {
    pub fn new(field_name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        Self {
            field_name: field_name.into(),
            value: value.map(Into::into),
        }
    }
}

/// Field name to the ordered list of stored values.
///
/// Lists hold more than one value only for checkbox fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    fields: HashMap<String, Vec<String>>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group rows by field name, keeping retrieval order within each list.
    /// `NULL` values are dropped.
    pub fn from_rows(rows: impl IntoIterator<Item = FieldRow>) -> Self {
        let mut map = Self::new();
        for row in rows {
            if let Some(value) = row.value {
                map.push(row.field_name, value);
            }
        }
        map
    }

    pub fn push(&mut self, field_name: impl Into<String>, value: impl Into<String>) {
        self.fields
            .entry(field_name.into())
            .or_default()
            .push(value.into());
    }

    pub fn get(&self, field_name: &str) -> Option<&[String]> {
        self.fields.get(field_name).map(Vec::as_slice)
    }

    pub fn first(&self, field_name: &str) -> Option<&str> {
        self.get(field_name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains(&self, field_name: &str) -> bool {
        self.fields.contains_key(field_name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// REDCap log timestamp, stored as the integer `YYYYMMDDhhmmss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct LogTimestamp(NaiveDateTime);

const TS_FORMAT: &str = "%Y%m%d%H%M%S";

impl LogTimestamp {
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        // REDCap stores whole seconds
        Self(dt.with_nanosecond(0).unwrap_or(dt))
    }

    /// Absolute distance in seconds.
    pub fn abs_diff_secs(&self, other: &LogTimestamp) -> u64 {
        (self.0 - other.0).num_seconds().unsigned_abs()
    }

    pub fn offset_secs(&self, secs: i64) -> Self {
        Self(self.0 + chrono::Duration::seconds(secs))
    }

    pub fn as_i64(&self) -> i64 {
        // always 14 ASCII digits
        self.to_string().parse().unwrap_or_default()
    }
}

impl fmt::Display for LogTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TS_FORMAT))
    }
}

impl FromStr for LogTimestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(s.trim(), TS_FORMAT)
            .map(Self)
            .map_err(|e| Error::InvalidTimestamp(format!("{:?}: {}", s, e)))
    }
}

impl TryFrom<i64> for LogTimestamp {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        value.to_string().parse()
    }
}

impl From<LogTimestamp> for i64 {
    fn from(ts: LogTimestamp) -> i64 {
        ts.as_i64()
    }
}

/// One row of the audit-log table. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub log_event_id: i64,
    pub ts: Option<i64>,
    pub pk: Option<String>,
    pub sql_log: String,
    pub data_values: String,
    pub description: String,
    pub change_reason: String,
}

impl LogEntry {
    /// Primary key as a record number; `None` when absent or not numeric.
    pub fn record_number(&self) -> Option<u32> {
        self.pk.as_deref().and_then(|pk| pk.trim().parse().ok())
    }

    pub fn timestamp(&self) -> Option<LogTimestamp> {
        self.ts.and_then(|ts| LogTimestamp::try_from(ts).ok())
    }
}

/// Filters for finding a recent audit-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    pub project_id: u32,
    pub pk: u32,
    pub event_id: u32,
    #[serde(default)]
    pub sql_log: String,
    #[serde(default)]
    pub data_values: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub change_reason: String,
    pub reference: LogTimestamp,
    pub tolerance_secs: u64,
}

impl LogQuery {
    pub fn new(project_id: u32, pk: u32, event_id: u32, reference: LogTimestamp) -> Self {
        Self {
            project_id,
            pk,
            event_id,
            sql_log: String::new(),
            data_values: String::new(),
            description: String::new(),
            change_reason: String::new(),
            reference,
            tolerance_secs: 60,
        }
    }

    pub fn with_sql_log(mut self, filter: impl Into<String>) -> Self {
        self.sql_log = filter.into();
        self
    }

    pub fn with_data_values(mut self, filter: impl Into<String>) -> Self {
        self.data_values = filter.into();
        self
    }

    pub fn with_description(mut self, filter: impl Into<String>) -> Self {
        self.description = filter.into();
        self
    }

    pub fn with_change_reason(mut self, filter: impl Into<String>) -> Self {
        self.change_reason = filter.into();
        self
    }

    pub fn within_secs(mut self, tolerance_secs: u64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Key and every text filter match; timing is not considered.
    pub fn matches_filters(&self, entry: &LogEntry) -> bool {
        entry.record_number() == Some(self.pk)
            && entry.sql_log.contains(&self.sql_log)
            && entry.data_values.contains(&self.data_values)
            && entry.description.contains(&self.description)
            && entry.change_reason.contains(&self.change_reason)
    }

    /// Timestamp strictly inside the tolerance window.
    pub fn within_window(&self, entry: &LogEntry) -> bool {
        entry
            .timestamp()
            .map(|ts| ts.abs_diff_secs(&self.reference) < self.tolerance_secs)
            .unwrap_or(false)
    }
}
