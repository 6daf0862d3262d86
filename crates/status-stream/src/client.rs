//! Status stream client

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Result, StatusStreamError};
use crate::sink::StatusSink;
use crate::streaming::{HttpTransport, ReconnectPolicy, Subscription};
use crate::types::ServiceIdentifier;

/// Client for service status streams
///
/// Cheap to clone; clones share one connection pool. Each call to
/// [`StatusClient::open`] creates an independent subscription.
#[derive(Debug, Clone)]
pub struct StatusClient {
    transport: HttpTransport,
    base_url: Url,
    reconnect: ReconnectPolicy,
}

impl StatusClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the status server (e.g., "http://localhost:5000")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(base_url: &str, config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Self::with_http_client(base_url, client, config.reconnect)
    }

    /// Create a client on top of an existing HTTP client
    ///
    /// The HTTP client must not set an overall request timeout.
    pub fn with_http_client(
        base_url: &str,
        client: Client,
        reconnect: ReconnectPolicy,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(StatusStreamError::CannotBeABase(base_url.to_string()));
        }

        Ok(Self {
            transport: HttpTransport::new(client),
            base_url,
            reconnect,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the reconnect policy used for new subscriptions
    pub fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    /// Stream endpoint for `identifier`
    pub fn stream_url(&self, identifier: &ServiceIdentifier) -> Result<Url> {
        identifier.stream_url(&self.base_url)
    }

    /// Open a status subscription for `identifier`, feeding `sink`
    ///
    /// Returns as soon as the connection task is started. An empty
    /// identifier fails here, before any connection is attempted; a
    /// server that cannot be reached does not.
    ///
    /// # Example
    /// ```ignore
    /// let status = LatestStatus::new();
    /// let sub = client.open("checkout-api", status.clone())?;
    ///
    /// // ... status.get() now follows the server
    /// sub.close();
    /// ```
    #[instrument(skip(self, sink))]
    pub fn open<S>(&self, identifier: &str, sink: S) -> Result<Subscription>
    where
        S: StatusSink + 'static,
    {
        let identifier = ServiceIdentifier::new(identifier)?;
        self.open_identifier(&identifier, sink)
    }

    /// Open a subscription for an already validated identifier
    pub fn open_identifier<S>(&self, identifier: &ServiceIdentifier, sink: S) -> Result<Subscription>
    where
        S: StatusSink + 'static,
    {
        let url = self.stream_url(identifier)?;
        debug!("Opening status subscription: {}", url);

        Subscription::open(self.transport.clone(), url, sink, self.reconnect.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::LatestStatus;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_new_client() {
        let client = assert_ok!(StatusClient::new("http://localhost:5000"));
        assert_eq!(client.base_url().as_str(), "http://localhost:5000/");
        assert_eq!(client.reconnect_policy(), &ReconnectPolicy::default());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            StatusClient::new("not a url"),
            Err(StatusStreamError::InvalidUrl(_))
        ));
        assert!(matches!(
            StatusClient::new("mailto:ops@example.com"),
            Err(StatusStreamError::CannotBeABase(_))
        ));
    }

    #[test]
    fn test_stream_url() {
        let client = StatusClient::new("http://localhost:5000").unwrap();
        let id = ServiceIdentifier::new("checkout-api").unwrap();
        assert_eq!(
            client.stream_url(&id).unwrap().as_str(),
            "http://localhost:5000/service/stream/checkout-api"
        );
    }

    #[tokio::test]
    async fn test_open_empty_identifier_fails_fast() {
        let client = StatusClient::new("http://127.0.0.1:9").unwrap();
        let err = assert_err!(client.open("", LatestStatus::new()));
        assert!(matches!(err, StatusStreamError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn test_open_unreachable_server_returns_handle() {
        let client = StatusClient::new("http://127.0.0.1:9").unwrap();
        let sub = assert_ok!(client.open("checkout-api", LatestStatus::new()));
        assert!(!sub.is_closed());
        assert_eq!(
            sub.url().as_str(),
            "http://127.0.0.1:9/service/stream/checkout-api"
        );
        sub.close();
        assert!(sub.is_closed());
    }
}
