//! reqwest implementation of [`StageBackend`].

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;

use super::stage::{decode_model_plan, decode_stage_report, ModelPlan, StageReport};
use super::StageBackend;
use crate::error::{ClientError, ClientResult};

const REQUEST_MODEL_PATH: &str = "request_model/";
const REQUEST_STAGE_PATH: &str = "request_stage/";

/// HTTP client for the model-building backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// HTTP client for API requests
    client: Client,
    /// Base URL, always ending in `/`
    base_url: Url,
}

impl HttpBackend {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let base_url = normalize_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network {
                url: base_url.to_string(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|_| ClientError::InvalidBaseUrl(self.base_url.to_string()))
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: reqwest::RequestBuilder, url: &Url) -> ClientResult<String> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "backend returned error status");
            return Err(ClientError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| ClientError::from_reqwest(url.as_str(), e))
    }
}

#[async_trait]
impl StageBackend for HttpBackend {
    async fn request_model(&self, prompt: &str) -> ClientResult<ModelPlan> {
        let url = self.endpoint(REQUEST_MODEL_PATH)?;
        tracing::info!(url = %url, prompt_len = prompt.len(), "requesting model");

        let request = self.client.post(url.clone()).query(&[("request", prompt)]);
        let body = self.send(request, &url).await?;
        decode_model_plan(&body)
    }

    async fn request_stage(&self) -> ClientResult<Option<StageReport>> {
        let url = self.endpoint(REQUEST_STAGE_PATH)?;
        tracing::debug!(url = %url, "polling stage");

        let body = self.send(self.client.get(url.clone()), &url).await?;
        decode_stage_report(&body)
    }

    fn name(&self) -> &str {
        self.base_url.as_str()
    }
}

/// Parse the base URL and make sure relative joins keep its path.
fn normalize_base_url(base_url: &str) -> ClientResult<Url> {
    let trimmed = base_url.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };
    let url = Url::parse(&with_slash).map_err(|_| ClientError::InvalidBaseUrl(base_url.to_string()))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidBaseUrl(base_url.to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Stage;
    use axum::{
        extract::Query,
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn backend(base_url: &str) -> HttpBackend {
        HttpBackend::new(base_url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:8000").unwrap().as_str(),
            "http://localhost:8000/"
        );
        assert_eq!(
            normalize_base_url("https://abc.ngrok-free.app/api/").unwrap().as_str(),
            "https://abc.ngrok-free.app/api/"
        );
        assert!(normalize_base_url("not a url").is_err());
        assert!(normalize_base_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let backend = backend("http://localhost:8000/api");
        assert_eq!(
            backend.endpoint(REQUEST_STAGE_PATH).unwrap().as_str(),
            "http://localhost:8000/api/request_stage/"
        );
    }

    #[tokio::test]
    async fn test_request_model_sends_prompt_and_double_decodes() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let router = Router::new().route(
            "/request_model/",
            post(move |Query(params): Query<HashMap<String, String>>| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder
                        .lock()
                        .unwrap()
                        .push(params.get("request").cloned().unwrap_or_default());
                    Json(serde_json::Value::String(
                        r#"{"model_type": "gpt4o-mini", "data_type": "images", "webscraping_prompt": "searching for cat images"}"#
                            .to_string(),
                    ))
                }
            }),
        );
        let base = serve(router).await;

        let plan = backend(&base)
            .request_model("build me a cat classifier")
            .await
            .unwrap();

        assert_eq!(plan.webscraping_prompt, "searching for cat images");
        assert_eq!(
            seen.lock().unwrap().clone(),
            vec!["build me a cat classifier".to_string()]
        );
    }

    #[tokio::test]
    async fn test_request_stage_decodes_report() {
        let router = Router::new().route(
            "/request_stage/",
            get(|| async {
                Json(serde_json::json!({"stage": "deploying", "summary": "live at endpoint X"}))
            }),
        );
        let base = serve(router).await;

        let report = backend(&base).request_stage().await.unwrap().unwrap();
        assert_eq!(report.stage, Stage::Deploying);
        assert_eq!(report.summary, "live at endpoint X");
    }

    #[tokio::test]
    async fn test_request_stage_null_body() {
        let router = Router::new().route(
            "/request_stage/",
            get(|| async { Json(serde_json::Value::Null) }),
        );
        let base = serve(router).await;

        assert_eq!(backend(&base).request_stage().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_server_error_is_classified() {
        let router = Router::new().route(
            "/request_stage/",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "warming up") }),
        );
        let base = serve(router).await;

        let err = backend(&base).request_stage().await.unwrap_err();
        assert!(matches!(err, ClientError::HttpStatus { status: 503, .. }));
        assert!(err.category().is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = backend(&format!("http://{}", addr))
            .request_stage()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Network { .. }));
    }
}
