//! Docker Engine API client over the local Unix socket.
//!
//! Each request opens its own HTTP/1 connection on the socket. Response
//! bodies are handed out as streams, so image progress feeds and container
//! exports are never buffered in full.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Deserialize;

use platconf_core::config::UpdateConfig;
use platconf_core::error::RuntimeError;

use super::{ByteStream, ContainerRuntime};

/// Docker Engine client.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    socket: PathBuf,
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl DockerEngine {
    /// Create a client for the engine listening on `socket`.
    pub fn new(socket: impl Into<PathBuf>, api_version: impl Into<String>) -> Self {
        Self {
            socket: socket.into(),
            api_version: api_version.into(),
        }
    }

    /// Create a client from the update configuration.
    pub fn from_config(config: &UpdateConfig) -> Self {
        Self::new(&config.docker_socket, &config.docker_api_version)
    }

    /// Socket path this client talks to.
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Build a versioned endpoint path with a query string.
    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut endpoint = format!("/v{}{}", self.api_version, path);
        if query.is_empty() {
            return endpoint;
        }
        let encoded = reqwest::Url::parse_with_params("http://docker/", query)
            .ok()
            .and_then(|url| url.query().map(str::to_string));
        if let Some(q) = encoded {
            endpoint.push('?');
            endpoint.push_str(&q);
        }
        endpoint
    }

    async fn request(
        &self,
        method: Method,
        endpoint: String,
        body: Option<serde_json::Value>,
    ) -> Result<Response<Body>, RuntimeError> {
        let stream = tokio::net::UnixStream::connect(&self.socket)
            .await
            .map_err(|e| RuntimeError::Connect {
                path: self.socket.clone(),
                source: e,
            })?;

        let (mut sender, connection) = hyper::client::conn::handshake(stream)
            .await
            .map_err(|e| RuntimeError::Http(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "Container runtime connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(endpoint.as_str())
            .header(HOST, "docker");
        let body = match body {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                let data = serde_json::to_vec(&value)
                    .map_err(|e| RuntimeError::InvalidResponse(e.to_string()))?;
                Body::from(data)
            }
            None => Body::empty(),
        };
        let request = builder
            .body(body)
            .map_err(|e| RuntimeError::Http(e.to_string()))?;

        tracing::debug!(method = %method, endpoint = %endpoint, "Container runtime request");

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| RuntimeError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let data = hyper::body::to_bytes(response.into_body())
                .await
                .unwrap_or_default();
            return Err(RuntimeError::Status {
                endpoint,
                status: status.as_u16(),
                message: error_message(&data),
            });
        }

        Ok(response)
    }
}

/// Extract the engine's `{"message": ...}` error text, falling back to the raw body.
fn error_message(data: &[u8]) -> String {
    match serde_json::from_slice::<ErrorResponse>(data) {
        Ok(err) => err.message,
        Err(_) => String::from_utf8_lossy(data).trim().to_string(),
    }
}

fn body_stream(body: Body) -> ByteStream {
    body.map_err(|e| RuntimeError::Http(e.to_string())).boxed()
}

#[async_trait]
impl ContainerRuntime for DockerEngine {
    async fn pull_image(&self, name: &str, tag: &str) -> Result<ByteStream, RuntimeError> {
        let endpoint = self.endpoint("/images/create", &[("fromImage", name), ("tag", tag)]);
        let response = self.request(Method::POST, endpoint, None).await?;
        Ok(body_stream(response.into_body()))
    }

    async fn create_container(&self, reference: &str) -> Result<String, RuntimeError> {
        let endpoint = self.endpoint("/containers/create", &[]);
        let response = self
            .request(
                Method::POST,
                endpoint,
                Some(serde_json::json!({ "Image": reference })),
            )
            .await?;

        let data = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| RuntimeError::Http(e.to_string()))?;
        let created: CreateResponse = serde_json::from_slice(&data).map_err(|e| {
            RuntimeError::InvalidResponse(format!("container create response: {}", e))
        })?;
        Ok(created.id)
    }

    async fn export_container(&self, id: &str) -> Result<ByteStream, RuntimeError> {
        let endpoint = self.endpoint(&format!("/containers/{}/export", id), &[]);
        let response = self.request(Method::GET, endpoint, None).await?;
        Ok(body_stream(response.into_body()))
    }

    async fn remove_container(
        &self,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> Result<(), RuntimeError> {
        let force = if force { "true" } else { "false" };
        let volumes = if remove_volumes { "true" } else { "false" };
        let endpoint = self.endpoint(
            &format!("/containers/{}", id),
            &[("force", force), ("v", volumes)],
        );
        let response = self.request(Method::DELETE, endpoint, None).await?;
        if response.status() != StatusCode::NO_CONTENT {
            tracing::debug!(
                container = %id,
                status = %response.status(),
                "Unexpected status removing container"
            );
        }
        Ok(())
    }
}
