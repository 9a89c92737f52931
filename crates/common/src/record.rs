//! Record loading: stored field values for one record instance

use tracing::debug;

use crate::store::RedcapStore;
use crate::types::{FieldMap, RecordScope};
use crate::Result;

/// Load every stored value for `scope`, grouped by field name.
pub async fn try_load(store: &dyn RedcapStore, scope: &RecordScope) -> Result<FieldMap> {
    let rows = store.field_rows(scope).await?;
    let row_count = rows.len();
    let fields = FieldMap::from_rows(rows);
    debug!(
        "Loaded {} rows into {} fields for {}",
        row_count,
        fields.len(),
        scope
    );
    Ok(fields)
}

/// Like [`try_load`], but a lookup failure is logged and yields an empty map.
///
/// Callers treat an empty map as "nothing to replay".
pub async fn load(store: &dyn RedcapStore, scope: &RecordScope) -> FieldMap {
    match try_load(store, scope).await {
        Ok(fields) => fields,
        Err(e) => {
            e.log_diagnostics("load record");
            FieldMap::new()
        }
    }
}

/// Value of a single-row, single-column SELECT.
///
/// `None` when the query returns no rows, more than one row, a NULL, or
/// fails (the failure is logged).
pub async fn lookup_value(store: &dyn RedcapStore, sql: &str) -> Option<String> {
    match store.first_column(sql).await {
        Ok(mut values) if values.len() == 1 => values.pop().flatten(),
        Ok(values) => {
            debug!("Lookup returned {} rows, expected exactly one", values.len());
            None
        }
        Err(e) => {
            e.log_diagnostics("lookup value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;

    fn fixture() -> (SqliteStore, RecordScope) {
        let store = SqliteStore::open_memory().unwrap();
        let scope = RecordScope::new(14, 10, 41).unwrap();
        store.insert_field(&scope, "record_id", Some("11")).unwrap();
        store.insert_field(&scope, "sex", Some("1")).unwrap();
        store.insert_field(&scope, "symptoms", Some("2")).unwrap();
        store.insert_field(&scope, "symptoms", Some("4")).unwrap();
        (store, scope)
    }

    #[tokio::test]
    async fn test_load_groups_checkbox_values() {
        let (store, scope) = fixture();
        let fields = load(&store, &scope).await;

        assert_eq!(fields.first("record_id"), Some("11"));
        assert_eq!(fields.first("sex"), Some("1"));
        assert_eq!(fields.get("symptoms").unwrap(), ["2", "4"]);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let (store, scope) = fixture();
        let first = load(&store, &scope).await;
        let second = load(&store, &scope).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_load_missing_record_is_empty() {
        let (store, _) = fixture();
        let scope = RecordScope::new(14, 99, 41).unwrap();
        assert!(load(&store, &scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_yields_empty_map() {
        let (store, scope) = fixture();
        store.close().await.unwrap();

        assert!(try_load(&store, &scope).await.is_err());
        assert!(load(&store, &scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_value_single_row_only() {
        let (store, _) = fixture();

        let value = lookup_value(
            &store,
            "SELECT value FROM redcap_data WHERE field_name = 'sex'",
        )
        .await;
        assert_eq!(value.as_deref(), Some("1"));

        let many = lookup_value(
            &store,
            "SELECT value FROM redcap_data WHERE field_name = 'symptoms'",
        )
        .await;
        assert!(many.is_none());

        assert!(lookup_value(&store, "SELECT nope FROM nowhere").await.is_none());
    }
}
