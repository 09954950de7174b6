//! Azure Blob Storage backend over the REST API, authenticated with a
//! shared access signature taken from the connection string.

use std::time::Duration;

use async_trait::async_trait;
use idcheck_core::StorageError;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{StatusCode, Url};

use crate::blob::BlobBackend;

const MS_VERSION: &str = "2023-11-03";
pub const DEFAULT_CONTAINER: &str = "verification-images";

/// Parsed storage connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobConnection {
    /// Blob service endpoint without trailing slash.
    pub endpoint: String,
    /// SAS token without the leading `?`.
    pub sas: String,
}

impl BlobConnection {
    /// Parse `BlobEndpoint=…;SharedAccessSignature=…` or
    /// `AccountName=…;SharedAccessSignature=…[;EndpointSuffix=…]`.
    pub fn parse(connection_string: &str) -> Result<Self, StorageError> {
        let mut endpoint = None;
        let mut account = None;
        let mut sas = None;
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut has_account_key = false;

        for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                return Err(StorageError::Config(format!("malformed connection string segment: {part}")));
            };
            match key {
                "BlobEndpoint" => endpoint = Some(value.trim_end_matches('/').to_string()),
                "AccountName" => account = Some(value.to_string()),
                "SharedAccessSignature" => sas = Some(value.trim_start_matches('?').to_string()),
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "EndpointSuffix" => suffix = value.to_string(),
                "AccountKey" => has_account_key = true,
                _ => {}
            }
        }

        let sas = match sas {
            Some(s) if !s.is_empty() => s,
            _ if has_account_key => {
                return Err(StorageError::Config(
                    "account key auth is not supported; provide a SharedAccessSignature".into(),
                ))
            }
            _ => return Err(StorageError::Config("connection string has no SharedAccessSignature".into())),
        };

        let endpoint = match (endpoint, account) {
            (Some(e), _) => e,
            (None, Some(a)) => format!("{protocol}://{a}.blob.{suffix}"),
            (None, None) => {
                return Err(StorageError::Config(
                    "connection string needs BlobEndpoint or AccountName".into(),
                ))
            }
        };

        Ok(Self { endpoint, sas })
    }
}

/// [`BlobBackend`] for one Azure Storage container.
pub struct AzureBlobBackend {
    client: reqwest::Client,
    connection: BlobConnection,
    container: String,
}

impl AzureBlobBackend {
    pub fn new(connection: BlobConnection, container: &str, timeout: Duration) -> Result<Self, StorageError> {
        // Fail at startup rather than on first upload.
        Url::parse(&connection.endpoint)
            .map_err(|e| StorageError::Config(format!("invalid blob endpoint {}: {e}", connection.endpoint)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            connection,
            container: container.to_string(),
        })
    }

    /// URL of a blob (or of the container when `name` is `None`), without the SAS.
    fn resource_url(&self, name: Option<&str>) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.connection.endpoint)
            .map_err(|e| StorageError::Config(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::Config("blob endpoint cannot be a base URL".into()))?;
            segments.pop_if_empty().push(&self.container);
            if let Some(name) = name {
                segments.extend(name.split('/'));
            }
        }
        Ok(url)
    }

    fn signed(&self, mut url: Url, extra_query: Option<&str>) -> Url {
        let query = match extra_query {
            Some(q) => format!("{q}&{}", self.connection.sas),
            None => self.connection.sas.clone(),
        };
        url.set_query(Some(&query));
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StorageError> {
        request
            .header("x-ms-version", MS_VERSION)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))
    }

    async fn status_error(name: &str, response: reqwest::Response) -> StorageError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StorageError::Status {
            name: name.to_string(),
            status,
            body,
        }
    }
}

#[async_trait]
impl BlobBackend for AzureBlobBackend {
    fn container(&self) -> &str {
        &self.container
    }

    async fn create_container_if_missing(&self) -> Result<(), StorageError> {
        let url = self.signed(self.resource_url(None)?, Some("restype=container"));
        let response = self
            .send(self.client.put(url).header(CONTENT_LENGTH, "0"))
            .await
            .map_err(|e| StorageError::Provision {
                container: self.container.clone(),
                reason: e.to_string(),
            })?;

        match response.status() {
            StatusCode::CREATED => {
                tracing::info!(container = %self.container, "created container");
                Ok(())
            }
            // ContainerAlreadyExists
            StatusCode::CONFLICT => Ok(()),
            status => Err(StorageError::Provision {
                container: self.container.clone(),
                reason: format!("{status}: {}", response.text().await.unwrap_or_default()),
            }),
        }
    }

    async fn put_blob(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<String, StorageError> {
        let reference = self.resource_url(Some(name))?;
        let url = self.signed(reference.clone(), None);
        let response = self
            .send(
                self.client
                    .put(url)
                    .header("x-ms-blob-type", "BlockBlob")
                    .header(CONTENT_TYPE, content_type)
                    .body(bytes.to_vec()),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(name, response).await);
        }
        Ok(reference.to_string())
    }

    async fn get_blob(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.signed(self.resource_url(Some(name))?, None);
        let response = self.send(self.client.get(url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(name.to_string())),
            status if status.is_success() => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| StorageError::Transport(e.to_string())),
            _ => Err(Self::status_error(name, response).await),
        }
    }

    async fn delete_blob(&self, name: &str) -> Result<(), StorageError> {
        let url = self.signed(self.resource_url(Some(name))?, None);
        let response = self.send(self.client.delete(url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(Self::status_error(name, response).await),
        }
    }
}
