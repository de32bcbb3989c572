//! chissl common - Shared capture protocol types
//!
//! This crate contains the traffic event wire format served by the capture
//! service and the entity addressing helpers used to build capture URLs.

use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to decode traffic event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error("Unknown filter: {0}")]
    UnknownFilter(String),
}

/// Kind of proxied entity whose traffic can be inspected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Point-to-point tunnel
    Tunnel,

    /// HTTP listener
    Listener,

    /// Multicast tunnel
    Multicast,
}

impl EntityKind {
    /// URL segment the capture service uses for this kind
    pub fn path_segment(&self) -> &'static str {
        match self {
            EntityKind::Tunnel => "tunnels",
            EntityKind::Listener => "listeners",
            EntityKind::Multicast => "multicast",
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Tunnel => "tunnel",
            EntityKind::Listener => "listener",
            EntityKind::Multicast => "multicast",
        }
    }
}

impl FromStr for EntityKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "tunnel" | "tunnels" => Ok(EntityKind::Tunnel),
            "listener" | "listeners" => Ok(EntityKind::Listener),
            k if k.starts_with("multicast") => Ok(EntityKind::Multicast),
            _ => Err(ProtocolError::UnknownEntityKind(s.to_string())),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an entity kind as the dashboard names it to its capture URL segment.
///
/// Matching is exact: `tunnel` and `listener` map to their plural segment
/// and anything starting with `multicast` collapses to `multicast`. Every
/// other string is returned unchanged.
pub fn resolve(kind: &str) -> &str {
    match kind {
        "tunnel" => EntityKind::Tunnel.path_segment(),
        "listener" => EntityKind::Listener.path_segment(),
        k if k.starts_with("multicast") => EntityKind::Multicast.path_segment(),
        k => k,
    }
}

/// An entity under inspection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Capture path prefix, e.g. `/api/capture/tunnels/abc`
    pub fn capture_path(&self) -> String {
        format!(
            "{}/{}/{}",
            constants::CAPTURE_PREFIX,
            self.kind.path_segment(),
            urlencoding::encode(&self.id)
        )
    }

    /// Short form used in titles: first 8 characters of the id
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Direction of a captured event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Request,
    Response,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Request => "request",
            EventKind::Response => "response",
        }
    }
}

/// Which events a history query should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    #[default]
    All,
    Request,
    Response,
}

impl FilterKind {
    /// Value of the `type` query parameter, if any
    pub fn query_value(&self) -> Option<&'static str> {
        match self {
            FilterKind::All => None,
            FilterKind::Request => Some("request"),
            FilterKind::Response => Some("response"),
        }
    }

    /// Check whether an event passes this filter
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            FilterKind::All => true,
            FilterKind::Request => kind == EventKind::Request,
            FilterKind::Response => kind == EventKind::Response,
        }
    }
}

impl FromStr for FilterKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(FilterKind::All),
            "request" | "requests" => Ok(FilterKind::Request),
            "response" | "responses" => Ok(FilterKind::Response),
            _ => Err(ProtocolError::UnknownFilter(s.to_string())),
        }
    }
}

/// A captured request or response as emitted by the capture service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// When the capture service recorded the event
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        serialize_with = "serialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Header names in the order the capture service sent them
    pub headers: Option<IndexMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl TrafficEvent {
    /// Decode a single event from its JSON payload
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }

    /// `METHOD url` when both are present
    pub fn request_line(&self) -> Option<String> {
        match (&self.method, &self.url) {
            (Some(method), Some(url)) => Some(format!("{} {}", method, url)),
            _ => None,
        }
    }
}

/// Timestamps arrive either as epoch milliseconds or RFC 3339 strings
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Float(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Millis(ms)) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
        Some(Raw::Float(ms)) => Utc
            .timestamp_millis_opt(ms as i64)
            .single()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
        Some(Raw::Text(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

fn serialize_timestamp<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match ts {
        Some(ts) => serializer.serialize_i64(ts.timestamp_millis()),
        None => serializer.serialize_none(),
    }
}

/// Response body of the connections listing endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionList {
    #[serde(default)]
    pub connections: Vec<String>,
}

/// Constants for the capture protocol
pub mod constants {
    /// Prefix of every capture endpoint
    pub const CAPTURE_PREFIX: &str = "/api/capture";

    /// Suffix of the live push-stream endpoint
    pub const STREAM_SUFFIX: &str = "stream";

    /// Suffix of the recent history endpoint
    pub const RECENT_SUFFIX: &str = "recent";

    /// Suffix of the persisted connections listing
    pub const CONNECTIONS_SUFFIX: &str = "connections";

    /// System info endpoint
    pub const SYSTEM_PATH: &str = "/api/system";

    /// Tunnel stats endpoint
    pub const STATS_PATH: &str = "/api/stats";

    /// Listener list endpoint
    pub const LISTENERS_PATH: &str = "/api/listeners";
}
