//! HTTP client for the VetCare veterinary-management API.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::clock::Clock;
use crate::config::VetCareConfig;
use crate::error::SyncError;
use crate::vetcare::types::{
    Envelope, VetCareAppointment, VetCareCustomer, VetCareGroomingRecord, VetCarePet,
    VetCareVaccination,
};

/// One decoded page of a list endpoint.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Items that failed to decode.
    pub rejected: usize,
    /// No further page should be requested.
    pub last: bool,
}

impl<T> Page<T> {
    fn end() -> Self {
        Self {
            items: Vec::new(),
            rejected: 0,
            last: true,
        }
    }
}

pub struct VetCareClient {
    base_url: String,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    max_retries: u32,
    retry_delay: std::time::Duration,
}

impl VetCareClient {
    pub fn new(config: &VetCareConfig, clock: Arc<dyn Clock>) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Request {
                endpoint: config.api_url.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(url = %config.api_url, "VetCare API configured");
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http,
            clock,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        })
    }

    /// GET `path` as JSON. `Ok(None)` on 404.
    ///
    /// Connection failures and timeouts are retried `max_retries` times with
    /// `retry_delay` in between; HTTP error statuses are not retried.
    async fn get_json(&self, path: &str) -> Result<Option<Value>, SyncError> {
        let url = format!("{}{path}", self.base_url);
        let mut attempt = 0;
        let resp = loop {
            tracing::debug!(%url, attempt, "GET");
            match self.http.get(&url).send().await {
                Ok(resp) => break resp,
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(endpoint = path, attempt, error = %e, "Transient VetCare error, retrying");
                    self.clock.sleep(self.retry_delay).await;
                }
                Err(e) => {
                    return Err(SyncError::Request {
                        endpoint: path.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        };

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(
                endpoint = path,
                status = status.as_u16(),
                body = %body.chars().take(200).collect::<String>(),
                "VetCare request failed"
            );
            return Err(SyncError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json::<Value>()
            .await
            .map(Some)
            .map_err(|e| SyncError::Decode {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })
    }

    fn decode_items<T: DeserializeOwned>(path: &str, items: Vec<Value>) -> (Vec<T>, usize) {
        let mut decoded = Vec::with_capacity(items.len());
        let mut rejected = 0;
        for item in items {
            let id = item.get("id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<T>(item) {
                Ok(v) => decoded.push(v),
                Err(e) => {
                    tracing::warn!(endpoint = path, %id, error = %e, "Skipping undecodable record");
                    rejected += 1;
                }
            }
        }
        (decoded, rejected)
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Page<T>, SyncError> {
        let Some(body) = self.get_json(path).await? else {
            return Ok(Page::end());
        };
        let envelope = Envelope::from_value(body).ok_or_else(|| SyncError::Decode {
            endpoint: path.to_string(),
            reason: "expected an array or a {data, meta} object".into(),
        })?;
        let (items, rejected) = Self::decode_items(path, envelope.items);
        Ok(Page {
            items,
            rejected,
            last: true,
        })
    }

    /// One page of a paged resource. Ends on an empty page, a 404, or the
    /// last page per metadata.
    async fn page<T: DeserializeOwned>(&self, resource: &str, page: u32) -> Result<Page<T>, SyncError> {
        let path = format!("/{resource}?page={page}");
        let Some(body) = self.get_json(&path).await? else {
            tracing::info!(resource, page, "Page not found, end of pagination");
            return Ok(Page::end());
        };
        let envelope = Envelope::from_value(body).ok_or_else(|| SyncError::Decode {
            endpoint: path.clone(),
            reason: "expected an array or a {data, meta} object".into(),
        })?;
        if envelope.items.is_empty() {
            return Ok(Page::end());
        }

        let last = match &envelope.meta {
            Some(meta) => {
                tracing::debug!(
                    resource,
                    page,
                    last_page = meta.last_page.or(meta.total_pages),
                    total = meta.total,
                    "Page metadata"
                );
                meta.is_last(page)
            }
            None => false,
        };
        let (items, rejected) = Self::decode_items(&path, envelope.items);
        Ok(Page {
            items,
            rejected,
            last,
        })
    }

    pub async fn customers(&self) -> Result<Page<VetCareCustomer>, SyncError> {
        self.list("/clientes").await
    }

    pub async fn pets_page(&self, page: u32) -> Result<Page<VetCarePet>, SyncError> {
        self.page("pets", page).await
    }

    pub async fn appointments_page(&self, page: u32) -> Result<Page<VetCareAppointment>, SyncError> {
        self.page("agendamentos", page).await
    }

    /// Vaccinations of one pet. A pet without any yields an empty page.
    pub async fn pet_vaccinations(&self, pet_id: i64) -> Result<Page<VetCareVaccination>, SyncError> {
        self.per_pet(&format!("/pets/{pet_id}/vacinacoes")).await
    }

    pub async fn pet_grooming_records(
        &self,
        pet_id: i64,
    ) -> Result<Page<VetCareGroomingRecord>, SyncError> {
        self.per_pet(&format!("/pets/{pet_id}/fichas-banho")).await
    }

    /// Per-pet lists treat any non-list body as "nothing recorded".
    async fn per_pet<T: DeserializeOwned>(&self, path: &str) -> Result<Page<T>, SyncError> {
        match self.list(path).await {
            Err(SyncError::Decode { .. }) => Ok(Page::end()),
            other => other,
        }
    }
}
