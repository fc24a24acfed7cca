//! The uniform contract every platform (Telegram, WhatsApp, Signal, ...)
//! implements. Concrete wire protocols are out of scope for this crate;
//! only the contract and a no-op fallback adapter live here.

use async_trait::async_trait;

use crate::model::{MessageKind, PlatformMessage};

/// Uniform send/receive/shutdown surface. A `None`/`false` return is the
/// uniform failure signal — adapters MUST NOT raise across this boundary;
/// any internal error is caught and turned into a `None`/`false`.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform name this adapter serves (e.g. "telegram").
    fn name(&self) -> &str;

    /// Idempotent initialization; may probe the external service.
    async fn initialize(&self) -> bool;

    /// Send a text message, optionally replying to an existing message.
    async fn send_text(&self, chat_id: &str, text: &str, reply_to: Option<&str>) -> Option<PlatformMessage>;

    /// Send a media attachment from a local path.
    async fn send_media(
        &self,
        chat_id: &str,
        path: &str,
        caption: Option<&str>,
        kind: MessageKind,
    ) -> Option<PlatformMessage>;

    /// Send an arbitrary document from a local path.
    async fn send_document(&self, chat_id: &str, path: &str, caption: Option<&str>) -> Option<PlatformMessage>;

    /// Download a message's media to `save_path`, returning the path on
    /// success.
    async fn download_media(&self, message_id: &str, save_path: &str) -> Option<String>;

    /// Initiate a call, optionally with video.
    async fn make_call(&self, chat_id: &str, video: bool) -> bool;

    /// Normalize a raw inbound webhook payload into a [`PlatformMessage`],
    /// for adapters driven by webhook delivery rather than a socket.
    async fn handle_webhook(&self, raw: &[u8]) -> Option<PlatformMessage>;

    /// Close any external network session this adapter owns. Called when
    /// the adapter is superseded or the gateway stops.
    async fn shutdown(&self);
}

/// A generic no-op adapter returned for unknown platform names, so every
/// declared platform has a reachable adapter.
pub struct NoopAdapter {
    platform: String,
}

impl NoopAdapter {
    /// Build a no-op adapter for `platform`.
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for NoopAdapter {
    fn name(&self) -> &str {
        &self.platform
    }

    async fn initialize(&self) -> bool {
        true
    }

    async fn send_text(&self, _chat_id: &str, _text: &str, _reply_to: Option<&str>) -> Option<PlatformMessage> {
        None
    }

    async fn send_media(
        &self,
        _chat_id: &str,
        _path: &str,
        _caption: Option<&str>,
        _kind: MessageKind,
    ) -> Option<PlatformMessage> {
        None
    }

    async fn send_document(&self, _chat_id: &str, _path: &str, _caption: Option<&str>) -> Option<PlatformMessage> {
        None
    }

    async fn download_media(&self, _message_id: &str, _save_path: &str) -> Option<String> {
        None
    }

    async fn make_call(&self, _chat_id: &str, _video: bool) -> bool {
        false
    }

    async fn handle_webhook(&self, _raw: &[u8]) -> Option<PlatformMessage> {
        None
    }

    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_adapter_is_uniformly_null() {
        let adapter = NoopAdapter::new("unknown-platform");
        assert!(adapter.initialize().await);
        assert!(adapter.send_text("c1", "hi", None).await.is_none());
        assert!(!adapter.make_call("c1", false).await);
    }
}
