//! Shared data model: connection classes, frames, and platform messages.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The trust/transport tag assigned to a connection at accept time.
///
/// Immutable for the lifetime of the connection; the wire representation
/// uses the original project's naming (`cloudflare` for a tunneled
/// connection) so existing clients don't need to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionClass {
    /// Loopback traffic on the local accept listener.
    Local,
    /// Traffic fronted by a tunnel (e.g. Cloudflare), identified via header.
    #[serde(rename = "cloudflare")]
    Tunneled,
    /// Traffic arriving over the VPN overlay network.
    Vpn,
    /// Traffic terminated directly via the TLS endpoint.
    Direct,
}

impl ConnectionClass {
    /// All classes, in the order the Health Monitor and Tunnel Supervisor
    /// iterate them.
    pub const ALL: [ConnectionClass; 4] = [
        ConnectionClass::Local,
        ConnectionClass::Tunneled,
        ConnectionClass::Vpn,
        ConnectionClass::Direct,
    ];

    /// Wire name used in `_meta.connection_type`.
    pub fn wire_name(self) -> &'static str {
        match self {
            ConnectionClass::Local => "local",
            ConnectionClass::Tunneled => "cloudflare",
            ConnectionClass::Vpn => "vpn",
            ConnectionClass::Direct => "direct",
        }
    }
}

/// Per-class admission caps: `(cap, window_secs)`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    /// Cap and window for LOCAL connections.
    pub local: (u32, i64),
    /// Cap and window for VPN connections.
    pub vpn: (u32, i64),
    /// Cap and window for TUNNELED connections.
    pub tunneled: (u32, i64),
    /// Cap and window for DIRECT connections.
    pub direct: (u32, i64),
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            local: (1000, 60),
            vpn: (500, 60),
            tunneled: (100, 60),
            direct: (100, 60),
        }
    }
}

impl RateLimits {
    /// The (cap, window) pair that applies to `class`.
    pub fn for_class(&self, class: ConnectionClass) -> (u32, i64) {
        match class {
            ConnectionClass::Local => self.local,
            ConnectionClass::Vpn => self.vpn,
            ConnectionClass::Tunneled => self.tunneled,
            ConnectionClass::Direct => self.direct,
        }
    }
}

/// A registered client connection's metadata. The transport handle itself is
/// stored by the gateway binary, not here, so this type stays dependency-free.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    /// Deterministic id derived from peer + user agent.
    pub id: String,
    /// Trust class assigned at accept.
    pub class: ConnectionClass,
    /// Peer address (possibly replaced by a header, e.g. CF-Connecting-IP).
    pub peer: String,
    /// Unix timestamp (seconds) the connection was accepted.
    pub since: i64,
    /// Whether the connection has completed any authentication handshake.
    pub authenticated: bool,
    /// Raw User-Agent header, if any.
    pub user_agent: Option<String>,
    /// Country code, if resolved from the peer address. Not populated by
    /// this crate; left for a caller-supplied geo lookup.
    pub country: Option<String>,
}

impl ClientConnection {
    /// Deterministic client id: truncated hash of `peer` + `user_agent`,
    /// prefixed by the class's wire name, matching the original's
    /// `md5(ip+ua)[:8]` scheme closely enough that reconnects converge.
    pub fn derive_id(class: ConnectionClass, peer: &str, user_agent: Option<&str>) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        peer.hash(&mut hasher);
        user_agent.unwrap_or("").hash(&mut hasher);
        let digest = hasher.finish();
        format!("{}_{:08x}", class.wire_name(), (digest & 0xffff_ffff) as u32)
    }
}

/// A single JSON message on the WS wire, pre- or post-tagging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Message kind (`message`, `media_upload`, `platform_connect`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Arbitrary structured payload; individual fields beyond `type` are
    /// kept here rather than as named struct fields since the set of frame
    /// kinds is open-ended.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, Value>,
    /// Server-set trust annotation. Always absent on ingress from a client
    /// in good faith; the gateway overwrites whatever the client sent.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<FrameMeta>,
}

impl Frame {
    /// Parse a frame from raw wire text. Any supplied `_meta` is dropped
    /// immediately; callers must call [`Frame::tag`] to set it.
    pub fn parse(text: &str) -> Result<Frame, serde_json::Error> {
        let mut frame: Frame = serde_json::from_str(text)?;
        frame.meta = None;
        Ok(frame)
    }

    /// Overwrite `_meta` with server-observed trust data.
    pub fn tag(&mut self, meta: FrameMeta) {
        self.meta = Some(meta);
    }
}

/// Trust metadata the gateway attaches to every forwarded frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    /// Wire name of the connection class.
    pub connection_type: String,
    /// Registry client id.
    pub client_id: String,
    /// Observed peer address (post header-substitution).
    pub ip_address: String,
    /// Whether the connection is authenticated.
    pub authenticated: bool,
}

/// An egress error frame: `{"error": "..."}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    /// Human-readable error description.
    pub error: String,
}

impl ErrorFrame {
    /// Build an error frame and serialize it to wire text.
    pub fn to_wire(message: impl Into<String>) -> String {
        let frame = ErrorFrame {
            error: message.into(),
        };
        serde_json::to_string(&frame).unwrap_or_else(|_| "{\"error\":\"Internal error\"}".into())
    }
}

/// A message kind on a platform (maps to `MessageType` in the original).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text message.
    Text,
    /// A still image.
    Image,
    /// A video clip.
    Video,
    /// An audio clip or voice note.
    Audio,
    /// An arbitrary document/file.
    Document,
    /// A shared location.
    Location,
    /// A shared contact card.
    Contact,
    /// A sticker.
    Sticker,
    /// A voice/video call event.
    Call,
}

/// A piece of media attached to a [`PlatformMessage`]. Bytes travel
/// base64-encoded on the wire but are held as raw bytes in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    /// Media kind.
    pub kind: MessageKind,
    /// Original filename, if known.
    pub filename: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Raw attachment bytes.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Optional caption.
    pub caption: Option<String>,
    /// Optional thumbnail bytes.
    #[serde(with = "base64_bytes_option", default)]
    pub thumbnail: Option<Vec<u8>>,
}

/// A message normalized to the platform-agnostic shape every adapter
/// produces and consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformMessage {
    /// Unique id within the platform's own namespace.
    pub id: String,
    /// Platform name (e.g. "telegram", "whatsapp").
    pub platform: String,
    /// Sender's platform-specific id.
    pub sender_id: String,
    /// Sender's display name, if known.
    pub sender_name: Option<String>,
    /// Chat/conversation id.
    pub chat_id: String,
    /// Chat display name, if known.
    pub chat_name: Option<String>,
    /// Text content, if any.
    pub content: String,
    /// Message kind.
    pub kind: MessageKind,
    /// Order-preserving list of attachments.
    pub attachments: Vec<MediaAttachment>,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    /// Id of the message this one replies to, if any.
    pub reply_to: Option<String>,
    /// Free-form metadata carried alongside the message.
    pub metadata: HashMap<String, Value>,
    /// Whether the message payload was encrypted in transit.
    pub encrypted: bool,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(raw)
            .map_err(serde::de::Error::custom)
    }
}

mod base64_bytes_option {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&base64::engine::general_purpose::STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            Some(raw) => base64::engine::general_purpose::STANDARD
                .decode(raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_is_deterministic() {
        let a = ClientConnection::derive_id(ConnectionClass::Local, "127.0.0.1", Some("curl"));
        let b = ClientConnection::derive_id(ConnectionClass::Local, "127.0.0.1", Some("curl"));
        assert_eq!(a, b);
        assert!(a.starts_with("local_"));
    }

    #[test]
    fn client_id_differs_by_peer() {
        let a = ClientConnection::derive_id(ConnectionClass::Local, "127.0.0.1", None);
        let b = ClientConnection::derive_id(ConnectionClass::Local, "127.0.0.2", None);
        assert_ne!(a, b);
    }

    #[test]
    fn frame_parse_drops_supplied_meta() {
        let mut frame = Frame::parse(r#"{"type":"message","content":"hi","_meta":{"connection_type":"local","client_id":"x","ip_address":"y","authenticated":true}}"#).unwrap();
        assert!(frame.meta.is_none());
        frame.tag(FrameMeta {
            connection_type: "cloudflare".into(),
            client_id: "c1".into(),
            ip_address: "1.2.3.4".into(),
            authenticated: false,
        });
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["_meta"]["connection_type"], "cloudflare");
        assert_eq!(wire["_meta"]["authenticated"], false);
    }
}
