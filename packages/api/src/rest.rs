//! # REST collection client
//!
//! [`RestBackend`] implements [`DataBackend`] against the hosted backend's
//! `/rest/v1/{collection}` endpoints. Filters render to the backend's
//! query operators (`eq.`, `ilike.*term*`, `or=(...)`, nested `and(...)`),
//! ordering and limits to `order=` / `limit=` parameters. Writes ask for
//! the stored representation back (`Prefer: return=representation`);
//! upserts additionally merge on conflict.
//!
//! Transport and non-2xx failures map onto the [`StoreError`] taxonomy:
//! reads fail as `Unavailable` (the gateway above degrades them to empty),
//! writes fail as `Rejected` and stay loud.

use serde_json::Value;

use store::backend::{DataBackend, Direction, Filter, Query};
use store::error::StoreError;

use crate::auth::{bearer_token, SharedSession};
use crate::config::ApiConfig;

/// Render a filter into `column=op.value` query parameters. A top-level
/// `And` spreads across parameters (the backend ANDs them implicitly);
/// anything nested folds into the expression syntax.
pub(crate) fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    match filter {
        Filter::And(filters) => filters.iter().map(param).collect(),
        other => vec![param(other)],
    }
}

fn param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, value) => (column.clone(), format!("eq.{}", literal(value))),
        Filter::ILike(column, needle) => (column.clone(), format!("ilike.*{needle}*")),
        Filter::Or(filters) => ("or".to_string(), group(filters)),
        Filter::And(filters) => ("and".to_string(), group(filters)),
    }
}

fn group(filters: &[Filter]) -> String {
    let inner: Vec<String> = filters.iter().map(expr).collect();
    format!("({})", inner.join(","))
}

fn expr(filter: &Filter) -> String {
    match filter {
        Filter::Eq(column, value) => format!("{column}.eq.{}", literal(value)),
        Filter::ILike(column, needle) => format!("{column}.ilike.*{needle}*"),
        Filter::And(filters) => format!("and{}", group(filters)),
        Filter::Or(filters) => format!("or{}", group(filters)),
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// [`DataBackend`] over the hosted REST endpoints.
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session: SharedSession,
}

impl RestBackend {
    pub(crate) fn new(http: reqwest::Client, config: &ApiConfig, session: SharedSession) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            session,
        }
    }

    fn url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{collection}", self.base_url)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(bearer_token(&self.session, &self.api_key))
    }

    async fn check_read(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(StoreError::Unavailable(format!("{status}: {body}")))
        }
    }

    async fn check_write(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(StoreError::Rejected(format!("{status}: {body}")))
        }
    }

    /// Writes return the representation as a one-element array; unwrap it.
    fn first_row(value: Value) -> Result<Value, StoreError> {
        match value {
            Value::Array(mut rows) if !rows.is_empty() => Ok(rows.remove(0)),
            Value::Array(_) => Err(StoreError::Rejected(
                "backend returned no representation".into(),
            )),
            other => Ok(other),
        }
    }
}

impl DataBackend for RestBackend {
    async fn select(&self, collection: &str, query: Query) -> Result<Vec<Value>, StoreError> {
        let mut params: Vec<(String, String)> = Vec::new();
        if let Some(filter) = &query.filter {
            params.extend(filter_params(filter));
        }
        if let Some(order) = &query.order {
            let direction = match order.direction {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            params.push(("order".into(), format!("{}.{direction}", order.column)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".into(), limit.to_string()));
        }

        let resp = self
            .authed(self.http.get(self.url(collection)).query(&params))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let resp = Self::check_read(resp).await?;
        resp.json()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn insert(&self, collection: &str, row: Value) -> Result<Value, StoreError> {
        let resp = self
            .authed(self.http.post(self.url(collection)))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let resp = Self::check_write(resp).await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::first_row(body)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        let resp = self
            .authed(
                self.http
                    .patch(self.url(collection))
                    .query(&[("id", format!("eq.{id}"))]),
            )
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let resp = Self::check_write(resp).await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::first_row(body)
    }

    async fn upsert(&self, collection: &str, row: Value) -> Result<Value, StoreError> {
        let resp = self
            .authed(self.http.post(self.url(collection)))
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&row)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let resp = Self::check_write(resp).await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::first_row(body)
    }

    async fn delete(&self, collection: &str, filter: Filter) -> Result<(), StoreError> {
        let params = filter_params(&filter);
        let resp = self
            .authed(self.http.delete(self.url(collection)).query(&params))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::check_write(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simple_eq_renders_as_column_param() {
        let params = filter_params(&Filter::eq("status", "open"));
        assert_eq!(params, vec![("status".into(), "eq.open".into())]);
    }

    #[test]
    fn top_level_and_spreads_across_params() {
        let params = filter_params(&Filter::and(vec![
            Filter::eq("client_id", "c1"),
            Filter::eq("status", "open"),
        ]));
        assert_eq!(
            params,
            vec![
                ("client_id".into(), "eq.c1".into()),
                ("status".into(), "eq.open".into()),
            ]
        );
    }

    #[test]
    fn or_with_nested_and_uses_expression_syntax() {
        let between = Filter::or(vec![
            Filter::and(vec![Filter::eq("sender_id", "a"), Filter::eq("receiver_id", "b")]),
            Filter::and(vec![Filter::eq("sender_id", "b"), Filter::eq("receiver_id", "a")]),
        ]);
        let params = filter_params(&between);
        assert_eq!(
            params,
            vec![(
                "or".into(),
                "(and(sender_id.eq.a,receiver_id.eq.b),and(sender_id.eq.b,receiver_id.eq.a))"
                    .into()
            )]
        );
    }

    #[test]
    fn ilike_wraps_the_needle_in_wildcards() {
        let search = Filter::or(vec![
            Filter::ilike("title", "landing"),
            Filter::ilike("description", "landing"),
        ]);
        let params = filter_params(&search);
        assert_eq!(
            params,
            vec![(
                "or".into(),
                "(title.ilike.*landing*,description.ilike.*landing*)".into()
            )]
        );
    }

    #[test]
    fn non_string_literals_render_as_json() {
        let params = filter_params(&Filter::eq("is_read", false));
        assert_eq!(params, vec![("is_read".into(), "eq.false".into())]);
    }

    #[test]
    fn first_row_unwraps_representation_arrays() {
        let row = RestBackend::first_row(json!([{"id": "1"}])).unwrap();
        assert_eq!(row["id"], "1");

        let bare = RestBackend::first_row(json!({"id": "2"})).unwrap();
        assert_eq!(bare["id"], "2");

        assert!(RestBackend::first_row(json!([])).is_err());
    }
}
