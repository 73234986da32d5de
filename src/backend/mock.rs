use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::models::Record;

use super::{
    wildcard_match, Account, BackendClient, EventTypeFilter, QueryMetadata, QueryOptions,
    QueryResult,
};

/// In-memory `BackendClient` test double. Event types are registered with
/// their full record set up front; `query`/`get_event_types` filter and
/// slice over that fixture data the way a real backend would over a live
/// store, without any network I/O.
#[derive(Default)]
pub struct MockBackend {
    event_types: Mutex<HashMap<String, Vec<Record>>>,
    pub query_calls: Mutex<Vec<String>>,
    fail_event_types: Mutex<Option<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend::default()
    }

    pub fn with_event_type(self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.event_types
            .lock()
            .unwrap()
            .insert(name.into(), records);
        self
    }

    /// Causes every call referencing `event_type` to fail with
    /// `BackendQueryError`, for exercising per-schema failure isolation.
    pub fn fail_for(&self, event_type: impl Into<String>) {
        *self.fail_event_types.lock().unwrap() = Some(event_type.into());
    }

    pub fn call_count(&self) -> usize {
        self.query_calls.lock().unwrap().len()
    }

    fn should_fail(&self, event_type: &str) -> bool {
        self.fail_event_types
            .lock()
            .unwrap()
            .as_deref()
            .map(|e| e == event_type)
            .unwrap_or(false)
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn query(&self, ctx: &Context, text: &str) -> Result<QueryResult> {
        self.query_with_options(ctx, text, QueryOptions::default()).await
    }

    async fn query_with_options(
        &self,
        ctx: &Context,
        text: &str,
        options: QueryOptions,
    ) -> Result<QueryResult> {
        ctx.check()?;
        self.query_calls.lock().unwrap().push(text.to_string());

        let event_type = extract_from(text);
        if let Some(ref et) = event_type {
            if self.should_fail(et) {
                return Err(crate::error::DiscoveryError::BackendQueryError {
                    status: 500,
                    message: format!("mock failure for {et}"),
                });
            }
        }

        let rows = event_type
            .as_ref()
            .and_then(|et| self.event_types.lock().unwrap().get(et).cloned())
            .unwrap_or_default();
        let mut rows = rows;
        if let Some(max) = options.max_results {
            rows.truncate(max);
        }

        Ok(QueryResult {
            rows,
            metadata: QueryMetadata {
                event_types_touched: event_type.into_iter().collect(),
            },
        })
    }

    async fn get_event_types(&self, ctx: &Context, filter: EventTypeFilter) -> Result<Vec<String>> {
        ctx.check()?;
        let types = self.event_types.lock().unwrap();
        let mut names: Vec<String> = types
            .iter()
            .filter(|(name, records)| {
                let matches_pattern = filter
                    .pattern
                    .as_ref()
                    .map(|p| wildcard_match(p, name))
                    .unwrap_or(true);
                let matches_count = filter
                    .min_record_count
                    .map(|min| records.len() as u64 >= min)
                    .unwrap_or(true);
                matches_pattern && matches_count
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn get_accounts(&self, ctx: &Context) -> Result<Vec<Account>> {
        ctx.check()?;
        Ok(vec![Account {
            id: "mock-account".to_string(),
            name: "Mock Account".to_string(),
        }])
    }
}

fn extract_from(sql: &str) -> Option<String> {
    let upper = sql.to_ascii_uppercase();
    let idx = upper.find("FROM ")?;
    let rest = &sql[idx + 5..];
    let token: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_registered_rows_for_event_type() {
        let mut record = Record::new();
        record.insert("id".into(), serde_json::json!(1));
        let backend = MockBackend::new().with_event_type("Transaction", vec![record]);
        let ctx = Context::background();
        let result = backend.query(&ctx, "SELECT * FROM Transaction").await.unwrap();
        assert_eq!(result.rows.len(), 1);
    }

    #[tokio::test]
    async fn fail_for_causes_backend_query_error() {
        let backend = MockBackend::new().with_event_type("Bad", vec![]);
        backend.fail_for("Bad");
        let ctx = Context::background();
        let err = backend.query(&ctx, "SELECT * FROM Bad").await.unwrap_err();
        assert!(matches!(err, crate::error::DiscoveryError::BackendQueryError { .. }));
    }
}
