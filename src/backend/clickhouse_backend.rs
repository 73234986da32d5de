use std::time::Duration;

use async_trait::async_trait;
use clickhouse::Client;

use crate::context::Context;
use crate::error::{redact, DiscoveryError, Result};
use crate::models::Record;

use super::{
    Account, BackendClient, CircuitBreaker, EventTypeFilter, QueryMetadata, QueryOptions,
    QueryResult, RateLimiter,
};
use super::retry::{backoff_delay, is_retryable_status};

/// Talks to the columnar store directly over the `clickhouse` crate's
/// client. Applies rate limiting, retry with jittered backoff, and a
/// circuit breaker.
pub struct ClickHouseBackend {
    client: Client,
    account_id: String,
    max_retries: u32,
    default_timeout: Duration,
    rate_limiter: RateLimiter,
    breaker: CircuitBreaker,
}

impl ClickHouseBackend {
    pub fn new(
        base_url: &str,
        database: &str,
        user: &str,
        password: &str,
        account_id: &str,
        max_retries: u32,
        default_timeout: Duration,
        rate_limit_per_minute: u32,
        circuit_breaker_limit: u32,
    ) -> Self {
        let client = Client::default()
            .with_url(base_url)
            .with_database(database)
            .with_user(user)
            .with_password(password);
        ClickHouseBackend {
            client,
            account_id: account_id.to_string(),
            max_retries,
            default_timeout,
            rate_limiter: RateLimiter::new(rate_limit_per_minute),
            breaker: CircuitBreaker::new(circuit_breaker_limit, Duration::from_secs(30)),
        }
    }

    async fn execute(&self, ctx: &Context, sql: &str, timeout: Duration) -> Result<Vec<Record>> {
        if !self.breaker.allow() {
            return Err(DiscoveryError::BackendUnavailable(
                "circuit breaker open".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            ctx.check()?;
            self.rate_limiter.acquire().await;

            let outcome: Result<Vec<Record>> =
                match tokio::time::timeout(timeout, self.fetch_json_rows(sql)).await {
                    Ok(inner) => inner,
                    Err(_elapsed) => Err(DiscoveryError::Timeout),
                };

            match outcome {
                Ok(rows) => {
                    self.breaker.record_success();
                    return Ok(rows);
                }
                Err(DiscoveryError::Timeout) if attempt < self.max_retries => {
                    attempt += 1;
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    continue;
                }
                Err(err) => {
                    let status = status_of(&err);
                    if let Some(status) = status {
                        if is_retryable_status(status) && attempt < self.max_retries {
                            attempt += 1;
                            tokio::time::sleep(backoff_delay(attempt)).await;
                            continue;
                        }
                    }
                    self.breaker.record_failure();
                    return Err(redact_error(err, &self.account_id));
                }
            }
        }
    }

    /// Runs `sql` and parses each output line as a JSON object, the way
    /// `clickhouse`'s `JSONEachRow` output format is consumed when the row
    /// shape isn't known ahead of time (schema discovery, by definition,
    /// doesn't know the shape up front).
    async fn fetch_json_rows(&self, sql: &str) -> Result<Vec<Record>> {
        let mut cursor = self
            .client
            .query(sql)
            .fetch_bytes("JSONEachRow")
            .map_err(|e| DiscoveryError::BackendQueryError {
                status: 500,
                message: e.to_string(),
            })?;

        let mut rows = Vec::new();
        loop {
            match cursor.next().await {
                Ok(Some(chunk)) => {
                    for line in chunk.split(|b| *b == b'\n') {
                        if line.is_empty() {
                            continue;
                        }
                        let record: Record = serde_json::from_slice(line).map_err(|e| {
                            DiscoveryError::BackendQueryError {
                                status: 500,
                                message: format!("decoding row: {e}"),
                            }
                        })?;
                        rows.push(record);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(DiscoveryError::BackendQueryError {
                        status: 500,
                        message: e.to_string(),
                    })
                }
            }
        }
        Ok(rows)
    }
}

fn status_of(err: &DiscoveryError) -> Option<u16> {
    match err {
        DiscoveryError::BackendQueryError { status, .. } => Some(*status),
        _ => None,
    }
}

fn redact_error(err: DiscoveryError, account_id: &str) -> DiscoveryError {
    match err {
        DiscoveryError::BackendQueryError { status, message } => {
            DiscoveryError::BackendQueryError {
                status,
                message: message.replace(account_id, &redact(account_id)),
            }
        }
        other => other,
    }
}

#[async_trait]
impl BackendClient for ClickHouseBackend {
    async fn query(&self, ctx: &Context, text: &str) -> Result<QueryResult> {
        self.query_with_options(ctx, text, QueryOptions::default()).await
    }

    async fn query_with_options(
        &self,
        ctx: &Context,
        text: &str,
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let mut rows = self.execute(ctx, text, timeout).await?;
        if let Some(max) = options.max_results {
            rows.truncate(max);
        }
        Ok(QueryResult {
            rows,
            metadata: QueryMetadata {
                event_types_touched: extract_event_types(text),
            },
        })
    }

    async fn get_event_types(&self, ctx: &Context, filter: EventTypeFilter) -> Result<Vec<String>> {
        let min_count = filter.min_record_count.unwrap_or(0);
        let mut sql = format!(
            "SELECT EventType, count() AS cnt FROM wide_events GROUP BY EventType HAVING cnt >= {min_count}"
        );
        if let Some(pattern) = &filter.pattern {
            let escaped = pattern.replace('\'', "\\'").replace('*', "%");
            sql = format!(
                "SELECT EventType, count() AS cnt FROM wide_events \
                 WHERE EventType LIKE '{escaped}' GROUP BY EventType HAVING cnt >= {min_count}"
            );
        }
        sql.push_str(" ORDER BY cnt DESC");

        let rows = self.execute(ctx, &sql, self.default_timeout).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.get("EventType").and_then(|v| v.as_str()).map(String::from))
            .collect())
    }

    async fn get_accounts(&self, ctx: &Context) -> Result<Vec<Account>> {
        let sql = "SELECT DISTINCT AccountId FROM wide_events";
        let rows = self.execute(ctx, sql, self.default_timeout).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.get("AccountId").and_then(|v| v.as_str()).map(String::from))
            .map(|id| Account { name: id.clone(), id })
            .collect())
    }
}

/// Best-effort extraction of the `FROM <eventType>` clause for metadata
/// purposes; the core never forwards user-supplied query text verbatim, so
/// this only ever sees queries it composed itself.
fn extract_event_types(sql: &str) -> Vec<String> {
    let upper = sql.to_ascii_uppercase();
    if let Some(idx) = upper.find("FROM ") {
        let rest = &sql[idx + 5..];
        let token: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if token.is_empty() {
            Vec::new()
        } else {
            vec![token]
        }
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_event_type_from_simple_select() {
        assert_eq!(
            extract_event_types("SELECT * FROM Transaction WHERE x = 1"),
            vec!["Transaction".to_string()]
        );
    }

    #[test]
    fn no_event_type_when_no_from_clause() {
        assert_eq!(extract_event_types("SHOW EVENT TYPES"), Vec::<String>::new());
    }
}
