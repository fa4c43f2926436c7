//! Request/response transport for the wire protocol

use std::time::Duration;

use async_trait::async_trait;
use mgmt_core::{Command, WireResponse};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, TransportError};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Carries wire requests to a bridge and brings back its responses.
///
/// One call is one round trip. Implementations never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a single request
    async fn execute(&self, command: &Command) -> Result<WireResponse>;

    /// Send several requests in one round trip; responses come back in
    /// request order
    async fn execute_batch(&self, commands: &[Command]) -> Result<Vec<WireResponse>>;
}

/// [`Transport`] over HTTP POST
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Create a transport posting to `endpoint` (e.g. "http://localhost:8778/bridge")
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_config(endpoint, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a transport with custom timeouts
    pub fn with_config(endpoint: &str, timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        let endpoint = Url::parse(endpoint)?;

        Ok(Self { client, endpoint })
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post<B, T>(&self, body: &B) -> Result<T>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, fields(command = command.type_name()))]
    async fn execute(&self, command: &Command) -> Result<WireResponse> {
        debug!(endpoint = %self.endpoint, "Sending request");
        self.post(command).await
    }

    #[instrument(skip_all, fields(count = commands.len()))]
    async fn execute_batch(&self, commands: &[Command]) -> Result<Vec<WireResponse>> {
        debug!(endpoint = %self.endpoint, "Sending batch");
        let responses: Vec<WireResponse> = self.post(commands).await?;
        if responses.len() != commands.len() {
            return Err(TransportError::BatchMismatch {
                sent: commands.len(),
                received: responses.len(),
            });
        }
        Ok(responses)
    }
}
