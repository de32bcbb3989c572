//! HTTP client for the capture service and dashboard endpoints
//!
//! `CaptureSource` is the seam the stream client and history loader talk to;
//! `CaptureApi` is the reqwest-backed implementation used by the binary.

use crate::error::{InspectError, Result};
use bytes::Bytes;
use chissl_common::{constants, ConnectionList, EntityKind, EntityRef, FilterKind, TrafficEvent};
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Raw bytes of a push stream, chunked however the transport delivers them
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Source of captured traffic for one capture service
pub trait CaptureSource: Send + Sync + 'static {
    /// Open the live push stream for an entity
    fn open_stream(&self, entity: &EntityRef) -> BoxFuture<'static, Result<ByteStream>>;

    /// Fetch the most recent events for an entity
    fn fetch_recent(
        &self,
        entity: &EntityRef,
        filter: FilterKind,
    ) -> BoxFuture<'static, Result<Vec<TrafficEvent>>>;
}

/// Client for a capture service reachable over HTTP
#[derive(Clone)]
pub struct CaptureApi {
    base_url: String,
    client: Client,
    stream_client: Client,
    auth: Option<(String, String)>,
}

impl CaptureApi {
    /// Create a new client. `auth` uses the `user:password` format.
    pub fn new(server_url: &str, auth: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InspectError::Fetch(format!("failed to build HTTP client: {}", e)))?;

        // Streams stay open indefinitely, so only the connect phase is bounded
        let stream_client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| InspectError::Fetch(format!("failed to build HTTP client: {}", e)))?;

        let auth = auth.map(|a| match a.split_once(':') {
            Some((user, pass)) => (user.to_string(), pass.to_string()),
            None => (a.to_string(), String::new()),
        });

        Ok(Self {
            base_url: server_url.trim_end_matches('/').to_string(),
            client,
            stream_client,
            auth,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a JSON document from the server
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .authorized(self.client.get(self.url(path)))
            .send()
            .await
            .map_err(|e| InspectError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InspectError::Status(response.status().as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| InspectError::Fetch(e.to_string()))?;

        Ok(serde_json::from_str(&text)?)
    }

    /// List persisted capture connections for a tunnel
    pub async fn list_connections(&self, tunnel_id: &str) -> Result<Vec<String>> {
        let entity = EntityRef::new(EntityKind::Tunnel, tunnel_id);
        let path = format!(
            "{}/{}",
            entity.capture_path(),
            constants::CONNECTIONS_SUFFIX
        );
        let list: ConnectionList = self.get_json(&path).await?;
        Ok(list.connections)
    }
}

impl CaptureSource for CaptureApi {
    fn open_stream(&self, entity: &EntityRef) -> BoxFuture<'static, Result<ByteStream>> {
        let url = self.url(&format!(
            "{}/{}",
            entity.capture_path(),
            constants::STREAM_SUFFIX
        ));
        let request = self
            .authorized(self.stream_client.get(&url))
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");

        Box::pin(async move {
            tracing::debug!("Opening capture stream {}", url);

            let response = request
                .send()
                .await
                .map_err(|e| InspectError::Connection(e.to_string()))?;

            if !response.status().is_success() {
                return Err(InspectError::Connection(format!(
                    "stream refused with HTTP {}",
                    response.status()
                )));
            }

            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| InspectError::Connection(e.to_string())));

            Ok(stream.boxed())
        })
    }

    fn fetch_recent(
        &self,
        entity: &EntityRef,
        filter: FilterKind,
    ) -> BoxFuture<'static, Result<Vec<TrafficEvent>>> {
        let url = self.url(&format!(
            "{}/{}",
            entity.capture_path(),
            constants::RECENT_SUFFIX
        ));
        let mut request = self.authorized(self.client.get(&url));
        if let Some(kind) = filter.query_value() {
            request = request.query(&[("type", kind)]);
        }

        Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|e| InspectError::Fetch(e.to_string()))?;

            if !response.status().is_success() {
                return Err(InspectError::Status(response.status().as_u16()));
            }

            let text = response
                .text()
                .await
                .map_err(|e| InspectError::Fetch(e.to_string()))?;

            // An empty ring is encoded as `null` by some capture builds
            let events: Option<Vec<TrafficEvent>> = serde_json::from_str(&text)?;
            Ok(events.unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let api = CaptureApi::new("http://127.0.0.1:8080/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(api.base_url(), "http://127.0.0.1:8080");
        assert_eq!(api.url("/api/system"), "http://127.0.0.1:8080/api/system");
    }

    #[test]
    fn test_auth_split() {
        let api = CaptureApi::new("http://x", Some("admin:s3:cret"), Duration::from_secs(1)).unwrap();
        assert_eq!(
            api.auth,
            Some(("admin".to_string(), "s3:cret".to_string()))
        );
    }
}
