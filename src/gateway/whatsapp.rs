//! WhatsApp gateway: Evolution API over HTTP.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::config::WhatsAppConfig;
use crate::error::GatewayError;
use crate::gateway::{MediaKind, MessagingGateway};
use crate::reactivation::guard::PhoneNumber;

const NAME: &str = "whatsapp";

pub struct WhatsAppGateway {
    api_url: String,
    api_token: SecretString,
    instance_id: String,
    client: reqwest::Client,
}

impl WhatsAppGateway {
    pub fn new(config: &WhatsAppConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Http {
                name: NAME.into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            instance_id: config.instance_id.clone(),
            client,
        })
    }

    fn endpoint(&self, action: &str) -> Result<String, GatewayError> {
        if self.instance_id.trim().is_empty() {
            return Err(GatewayError::NotConfigured {
                name: NAME.into(),
                reason: "WHATSAPP_INSTANCE_ID is empty".into(),
            });
        }
        Ok(format!("{}/message/{action}/{}", self.api_url, self.instance_id))
    }

    async fn post(&self, action: &str, to: &PhoneNumber, body: Value) -> Result<bool, GatewayError> {
        let url = self.endpoint(action)?;
        let resp = self
            .client
            .post(&url)
            .header("apikey", self.api_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Http {
                name: NAME.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let flagged_success = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("success").and_then(Value::as_bool))
            .unwrap_or(false);

        if status.is_success() || flagged_success {
            tracing::info!(phone = %to, action, "WhatsApp message accepted");
            Ok(true)
        } else {
            tracing::warn!(phone = %to, action, status = status.as_u16(), "WhatsApp message rejected");
            Err(GatewayError::Rejected {
                name: NAME.into(),
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

#[async_trait]
impl MessagingGateway for WhatsAppGateway {
    fn name(&self) -> &str {
        NAME
    }

    async fn send_text(&self, to: &PhoneNumber, text: &str) -> Result<bool, GatewayError> {
        let body = serde_json::json!({
            "number": to.as_str(),
            "text": text,
        });
        self.post("sendText", to, body).await
    }

    async fn send_media(
        &self,
        to: &PhoneNumber,
        caption: &str,
        media_url: &str,
        kind: MediaKind,
    ) -> Result<bool, GatewayError> {
        let body = serde_json::json!({
            "number": to.as_str(),
            "mediatype": kind.as_str(),
            "mimetype": kind.mime_type(),
            "caption": caption,
            "media": media_url,
        });
        self.post("sendMedia", to, body).await
    }
}
