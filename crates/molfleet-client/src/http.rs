//! HTTP client for the coordinator API

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use molfleet_api::{
    ApiResponse, ApplyVersionRequest, HostDescriptor, OutputPayload, RemoveVersionRequest,
    ServiceAction, ServiceControlRequest, StagingStatus, UploadResponse,
};

use crate::artifact::ArtifactBundle;
use crate::error::{ClientError, Result};
use crate::sse::{DiscoveryStream, decode_discovery};
use crate::traits::{ApplyRequest, FleetApi};

/// Default API path prefix
pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Address used by the server for "the node that received the request"
const SELF_ADDRESS: &str = "self";

/// HTTP client for communicating with a coordinator node
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    api_prefix: String,
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use molfleet_client::HttpClient;
    ///
    /// let client = HttpClient::new("http://192.168.0.10:8888")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new HTTP client with custom `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn with_client(base_url: impl AsRef<str>, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self {
            client,
            base_url,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
        })
    }

    /// Override the API path prefix
    #[must_use]
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        self.api_prefix = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    /// Build a full URL from an endpoint path
    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{}{}", self.api_prefix, path))
            .map_err(ClientError::Url)
    }

    fn url_with_ip(&self, path: &str, ip: Option<&str>) -> Result<Url> {
        let mut url = self.url(path)?;
        if let Some(ip) = ip {
            url.query_pairs_mut().append_pair("ip", ip);
        }
        Ok(url)
    }

    /// Decode the envelope regardless of HTTP status
    ///
    /// The server reports validation failures as 400 with a normal envelope,
    /// so the status code alone does not decide success.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(envelope) => Ok(envelope.into_result()?),
            Err(_) if !status.is_success() => Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            }),
            Err(e) => Err(ClientError::InvalidResponse(e.to_string())),
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.client.get(url).send().await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: impl serde::Serialize) -> Result<T> {
        let url = self.url(path)?;
        let response = self.client.post(url).json(&body).send().await?;
        Self::decode(response).await
    }

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T> {
        let url = self.url(path)?;
        let response = self.client.post(url).multipart(form).send().await?;
        Self::decode(response).await
    }

    fn bundle_form(bundle: &ArtifactBundle) -> Result<Form> {
        let artifact = Part::bytes(bundle.bytes.clone()).file_name(bundle.file_name.clone());
        let config = Part::text(bundle.config.clone())
            .file_name("config.yaml")
            .mime_str("text/yaml")?;
        Ok(Form::new().part("mol", artifact).part("config", config))
    }
}

#[async_trait]
impl FleetApi for HttpClient {
    async fn self_descriptor(&self) -> Result<HostDescriptor> {
        self.get(self.url("/self")?).await
    }

    async fn host_descriptor(&self, ip: &str) -> Result<HostDescriptor> {
        self.get(self.url_with_ip("/host-info", Some(ip))?).await
    }

    async fn service_status(&self, ip: Option<&str>) -> Result<String> {
        let payload: OutputPayload = self.get(self.url_with_ip("/service-status", ip)?).await?;
        Ok(payload.output)
    }

    async fn service_control(&self, ip: Option<&str>, action: ServiceAction) -> Result<String> {
        let request = ServiceControlRequest {
            ip: ip.unwrap_or(SELF_ADDRESS).to_string(),
            action,
        };
        let text: Option<String> = self.post("/service-control", request).await?;
        Ok(text.unwrap_or_default())
    }

    async fn discovery_stream(&self) -> Result<DiscoveryStream> {
        let url = self.url("/discovery/stream")?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            // Failure before streaming starts is a normal envelope
            return Err(Self::decode::<serde_json::Value>(response)
                .await
                .err()
                .unwrap_or_else(|| ClientError::InvalidResponse("stream refused".into())));
        }

        Ok(decode_discovery(response.bytes_stream()))
    }

    async fn staging_status(&self) -> Result<StagingStatus> {
        self.get(self.url("/update-status")?).await
    }

    async fn upload_artifact(&self, bundle: &ArtifactBundle) -> Result<UploadResponse> {
        let form = Self::bundle_form(bundle)?;
        self.post_form("/upload", form).await
    }

    async fn remove_staged(&self, version: &str) -> Result<String> {
        let request = RemoveVersionRequest {
            version: version.to_string(),
        };
        let text: Option<String> = self.post("/upload/remove", request).await?;
        Ok(text.unwrap_or_default())
    }

    async fn apply_update(&self, request: &ApplyRequest) -> Result<String> {
        let text: Option<String> = match request {
            ApplyRequest::Version { version, ip } => {
                let body = ApplyVersionRequest {
                    version: version.clone(),
                    ip: ip.clone(),
                };
                self.post("/apply-update", body).await?
            }
            ApplyRequest::Inline { ip, bundle } => {
                let mut form = Self::bundle_form(bundle)?;
                if let Some(ip) = ip {
                    form = form.text("ip", ip.clone());
                }
                self.post_form("/apply-update", form).await?
            }
        };
        Ok(text.unwrap_or_default())
    }

    async fn update_log(&self) -> Result<String> {
        let payload: OutputPayload = self.get(self.url("/update-log")?).await?;
        Ok(payload.output)
    }
}
