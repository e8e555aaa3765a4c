//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so the engine does not
//! pick an HTTP library (reqwest, ureq, hyper, ...) for the application.
//!
//! Requests are `GET {base_url}/{entity}` with `?since={timestamp}` appended
//! once the entity has a watermark. The response body is a record array in
//! the configured [`PayloadFormat`].

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tidesync_protocol::payload::{decode_records, PayloadFormat};
use tidesync_protocol::{RemoteRecord, Timestamp};
use tracing::{debug, warn};
use url::Url;

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>, String>;

    /// Checks if the client is healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// HTTP-based record transport.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    format: PayloadFormat,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport expecting JSON bodies.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            format: PayloadFormat::Json,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Sets the expected body format.
    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Returns the base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the expected body format.
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Returns the message of the last failed request, cleared on success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns true if the transport is open and the client healthy.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    /// Closes the transport; later fetches fail until [`reopen`](Self::reopen).
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Reopens a closed transport.
    pub fn reopen(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Builds the request URL for an entity.
    ///
    /// The entity name is percent-encoded as a single path segment.
    ///
    /// # Errors
    ///
    /// Returns a fatal transport error if the base URL does not parse or
    /// cannot carry a path.
    pub fn entity_url(&self, entity_name: &str, since: Option<Timestamp>) -> SyncResult<String> {
        let invalid = |reason: &str| {
            SyncError::transport_fatal(format!("invalid base URL '{}': {}", self.base_url, reason))
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(&e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base"))?
            .pop_if_empty()
            .push(entity_name);
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since", &since.value().to_string());
        }
        Ok(url.into())
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }
}

impl<C: HttpClient> RemoteTransport for HttpTransport<C> {
    fn fetch(&self, entity_name: &str, since: Option<Timestamp>) -> SyncResult<Vec<RemoteRecord>> {
        if !self.is_connected() {
            return Err(SyncError::transport_retryable("not connected"));
        }

        let url = self.entity_url(entity_name, since)?;
        debug!(%url, "fetching records");
        let body = self.client.get(&url).map_err(|e| {
            warn!(%url, error = %e, "request failed");
            self.set_error(&e);
            SyncError::transport_retryable(e)
        })?;
        *self.last_error.write() = None;

        Ok(decode_records(entity_name, &body, self.format)?)
    }
}
