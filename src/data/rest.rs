//! Remote table store over HTTPS
//!
//! Speaks the PostgREST dialect: one endpoint per table, filters as
//! `column=op.value` query parameters, `Prefer` headers for returned
//! representations and exact counts.

use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_RANGE, HeaderMap, HeaderValue};
use serde_json::Value;

use super::models::{Row, Table};
use super::store::{Filter, Op, Persistence, Select, instrumented};
use crate::auth::AccessToken;
use crate::error::AppError;

/// Remote table store
pub struct RestStore {
    client: reqwest::Client,
    /// e.g., "https://abc.example.co/rest/v1"
    rest_url: String,
    api_key: String,
    token: AccessToken,
}

impl RestStore {
    /// Create new remote store
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `rest_url` - Table endpoint root
    /// * `api_key` - Public API key
    /// * `token` - Access token of the signed-in viewer (shared with the
    ///   identity provider so sign-out takes effect immediately)
    pub fn new(
        client: reqwest::Client,
        rest_url: String,
        api_key: String,
        token: AccessToken,
    ) -> Self {
        Self {
            client,
            rest_url: rest_url.trim_end_matches('/').to_string(),
            api_key,
            token,
        }
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/{}", self.rest_url, table.as_str())
    }

    fn headers(&self) -> Result<HeaderMap, AppError> {
        let bearer = self.token.get().unwrap_or_else(|| self.api_key.clone());
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| AppError::Config(format!("invalid api key: {e}")))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}"))
                .map_err(|e| AppError::Config(format!("invalid access token: {e}")))?,
        );
        Ok(headers)
    }

    fn require_filter(operation: &str, filter: &Filter) -> Result<(), AppError> {
        if filter.is_empty() {
            return Err(AppError::Validation(format!(
                "refusing to {operation} without a filter"
            )));
        }
        Ok(())
    }
}

/// Map a non-success response to an error
async fn error_for_response(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(body);

    match status.as_u16() {
        401 => AppError::Unauthenticated,
        403 => AppError::Forbidden,
        _ => AppError::Remote(format!("{status}: {message}")),
    }
}

/// Render a scalar for a query parameter
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Render one member of an `in.(...)` list, quoting when needed
fn render_list_member(value: &Value) -> String {
    let raw = render_value(value);
    if raw
        .chars()
        .any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\') || c.is_whitespace())
    {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        raw
    }
}

/// Query parameters for a filter
pub(crate) fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    filter
        .conditions()
        .iter()
        .map(|condition| {
            let rendered = match &condition.op {
                Op::Eq(Value::Null) => "is.null".to_string(),
                Op::Eq(value) => format!("eq.{}", render_value(value)),
                Op::Gt(value) => format!("gt.{}", render_value(value)),
                Op::Lt(value) => format!("lt.{}", render_value(value)),
                Op::In(values) => format!(
                    "in.({})",
                    values
                        .iter()
                        .map(render_list_member)
                        .collect::<Vec<_>>()
                        .join(",")
                ),
            };
            (condition.column.clone(), rendered)
        })
        .collect()
}

/// Query parameters for a select
pub(crate) fn select_params(query: &Select) -> Vec<(String, String)> {
    let columns = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query.columns.join(",")
    };

    let mut params = vec![("select".to_string(), columns)];
    params.extend(filter_params(&query.filter));
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

/// Total from a `Content-Range` header (`0-24/3573`, `*/0`)
pub(crate) fn parse_content_range_total(raw: &str) -> Option<u64> {
    raw.rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse::<u64>().ok())
}

#[async_trait]
impl Persistence for RestStore {
    async fn insert(&self, table: Table, row: Row) -> Result<Row, AppError> {
        instrumented("insert", table, async {
            let response = self
                .client
                .post(self.table_url(table))
                .headers(self.headers()?)
                .header("Prefer", "return=representation")
                .json(&row)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_for_response(response).await);
            }

            let mut rows: Vec<Row> = response.json().await?;
            if rows.is_empty() {
                return Err(AppError::Remote(format!(
                    "insert into {table} returned no representation"
                )));
            }
            Ok(rows.swap_remove(0))
        })
        .await
    }

    async fn update(&self, table: Table, patch: Row, filter: &Filter) -> Result<(), AppError> {
        Self::require_filter("update", filter)?;
        instrumented("update", table, async {
            let response = self
                .client
                .patch(self.table_url(table))
                .headers(self.headers()?)
                .header("Prefer", "return=minimal")
                .query(&filter_params(filter))
                .json(&patch)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_for_response(response).await);
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), AppError> {
        Self::require_filter("delete", filter)?;
        instrumented("delete", table, async {
            let response = self
                .client
                .delete(self.table_url(table))
                .headers(self.headers()?)
                .query(&filter_params(filter))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_for_response(response).await);
            }
            Ok(())
        })
        .await
    }

    async fn select(&self, query: &Select) -> Result<Vec<Row>, AppError> {
        instrumented("select", query.table, async {
            let response = self
                .client
                .get(self.table_url(query.table))
                .headers(self.headers()?)
                .query(&select_params(query))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_for_response(response).await);
            }
            Ok(response.json().await?)
        })
        .await
    }

    async fn count(&self, table: Table, filter: &Filter) -> Result<u64, AppError> {
        instrumented("count", table, async {
            let mut params = vec![("select".to_string(), "*".to_string())];
            params.extend(filter_params(filter));

            let response = self
                .client
                .head(self.table_url(table))
                .headers(self.headers()?)
                .header("Prefer", "count=exact")
                .query(&params)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_for_response(response).await);
            }

            response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_content_range_total)
                .ok_or_else(|| {
                    AppError::Remote(format!("count on {table} returned no Content-Range total"))
                })
        })
        .await
    }
}
