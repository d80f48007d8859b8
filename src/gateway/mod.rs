//! Outbound messaging gateway abstraction.

pub mod whatsapp;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::reactivation::guard::PhoneNumber;

pub use whatsapp::WhatsAppGateway;

/// Kind of attachment for [`MessagingGateway::send_media`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Image => "image/jpeg",
            Self::Video => "video/mp4",
            Self::Document => "application/pdf",
        }
    }
}

/// Something that can deliver a message to a phone number.
///
/// `Ok(true)` means the provider accepted the message. `Ok(false)` and
/// `Err(_)` are both treated as a failed send by the engines.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    async fn send_text(&self, to: &PhoneNumber, text: &str) -> Result<bool, GatewayError>;

    async fn send_media(
        &self,
        to: &PhoneNumber,
        caption: &str,
        media_url: &str,
        kind: MediaKind,
    ) -> Result<bool, GatewayError>;
}
