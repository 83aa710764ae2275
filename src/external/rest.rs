//! PostgREST-style HTTP client for the Supabase row API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};

use super::{ExternalStore, StoreError};
use crate::mapper::ExternalRecord;

/// Row client for a Supabase project's REST endpoint.
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", key);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(reqwest::header::AUTHORIZATION, bearer);
        }
        headers
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(StoreError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl ExternalStore for RestStore {
    async fn fetch_by_id(&self, table: &str, id: i64) -> Result<Option<ExternalRecord>, StoreError> {
        let response = self
            .client
            .get(self.table_url(table))
            .headers(self.headers())
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .send()
            .await?;
        let rows: Vec<ExternalRecord> = Self::check(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, table: &str, record: ExternalRecord) -> Result<ExternalRecord, StoreError> {
        let response = self
            .client
            .post(self.table_url(table))
            .headers(self.headers())
            .header("Prefer", "return=representation")
            .json(&record)
            .send()
            .await?;
        let mut rows: Vec<ExternalRecord> = Self::check(response).await?.json().await?;
        Ok(rows.pop().unwrap_or(record))
    }

    async fn update_by_id(
        &self,
        table: &str,
        id: i64,
        record: ExternalRecord,
    ) -> Result<ExternalRecord, StoreError> {
        let response = self
            .client
            .patch(self.table_url(table))
            .headers(self.headers())
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{id}"))])
            .json(&record)
            .send()
            .await?;
        let mut rows: Vec<ExternalRecord> = Self::check(response).await?.json().await?;
        Ok(rows.pop().unwrap_or(record))
    }

    async fn delete_by_id(&self, table: &str, id: i64) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.table_url(table))
            .headers(self.headers())
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn select_all(
        &self,
        table: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ExternalRecord>, StoreError> {
        let mut query = vec![("select".to_string(), "*".to_string())];
        if let Some(limit) = limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        let response = self
            .client
            .get(self.table_url(table))
            .headers(self.headers())
            .query(&query)
            .send()
            .await?;
        let rows: Vec<ExternalRecord> = Self::check(response).await?.json().await?;
        Ok(rows)
    }
}
