use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use sha2::Sha256;
use std::time::Duration;

use crate::api::{
    client::{RemoteRow, RemoteStore},
    error::ApiError,
    rate_limiter::RateLimiter,
};
use crate::config::RemoteConfig;

type HmacSha256 = Hmac<Sha256>;

const API_PREFIX: &str = "/v1";

/// REST client for the journal backend.
///
/// Upsert is `PUT /v1/{table}/{id}` with the full row as body, delete is
/// `DELETE /v1/{table}/{id}`. Every request is signed with the user's
/// API secret and scoped by the `X-USER-ID` header.
pub struct HttpRemoteStore {
    base_url: String,
    api_key: String,
    api_secret: String,
    user_id: String,
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl HttpRemoteStore {
    pub fn new(config: &RemoteConfig, user_id: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            user_id: user_id.to_string(),
            http_client,
            rate_limiter: RateLimiter::new(&config.rate_limit),
        })
    }

    /// Generate HMAC-SHA256 signature over timestamp + method + path + body
    fn generate_signature(
        &self,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<String, ApiError> {
        sign_request(&self.api_secret, timestamp, method, request_path, body)
    }

    fn build_headers(&self, timestamp: &str, signature: &str) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert(
            "ACCESS-KEY",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| ApiError::AuthenticationError(format!("Invalid API key: {}", e)))?,
        );
        headers.insert(
            "ACCESS-SIGN",
            HeaderValue::from_str(signature)
                .map_err(|e| ApiError::AuthenticationError(format!("Invalid signature: {}", e)))?,
        );
        headers.insert(
            "ACCESS-TIMESTAMP",
            HeaderValue::from_str(timestamp)
                .map_err(|e| ApiError::AuthenticationError(format!("Invalid timestamp: {}", e)))?,
        );
        headers.insert(
            "X-USER-ID",
            HeaderValue::from_str(&self.user_id)
                .map_err(|e| ApiError::AuthenticationError(format!("Invalid user id: {}", e)))?,
        );

        Ok(headers)
    }

    async fn send(&self, method: Method, table: &str, id: &str, body: Option<String>) -> Result<(), ApiError> {
        self.rate_limiter.acquire().await;

        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let request_path = resource_path(table, id);
        let body = body.unwrap_or_default();

        let signature = self.generate_signature(&timestamp, method.as_str(), &request_path, &body)?;
        let headers = self.build_headers(&timestamp, &signature)?;

        let url = format!("{}{}", self.base_url, request_path);
        let mut request = self.http_client.request(method.clone(), &url).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        let response_text = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        check_status(status, method == Method::DELETE, &response_text)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    fn store_name(&self) -> &str {
        "http"
    }

    async fn upsert(&self, row: &RemoteRow) -> Result<(), ApiError> {
        let body = serde_json::to_string(&row.row)?;
        self.send(Method::PUT, &row.table, &row.id, Some(body)).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, table, id, None).await
    }
}

/// Request path as signed and sent. Ids are percent-encoded so one can
/// never escape its path segment.
fn resource_path(table: &str, id: &str) -> String {
    format!("{}/{}/{}", API_PREFIX, table, urlencoding::encode(id))
}

fn sign_request(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, ApiError> {
    let prehash = format!("{}{}{}{}", timestamp, method, request_path, body);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::AuthenticationError(format!("Invalid API secret: {}", e)))?;
    mac.update(prehash.as_bytes());

    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn classify_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::TimeoutError(err.to_string())
    } else if err.is_connect() {
        ApiError::NetworkError(err.to_string())
    } else {
        ApiError::HttpError(err)
    }
}

/// Map a response status to the engine's error taxonomy. A 404 on delete
/// means the row is already gone, which is what we wanted.
fn check_status(status: StatusCode, is_delete: bool, body: &str) -> Result<(), ApiError> {
    if status.is_success() || (is_delete && status == StatusCode::NOT_FOUND) {
        return Ok(());
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimitError(
            "Rate limit exceeded. Please wait before retrying.".to_string(),
        )),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::AuthenticationError(
            "Invalid API credentials or permissions".to_string(),
        )),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            Err(ApiError::TimeoutError(format!("Remote store timed out ({})", status)))
        }
        _ => Err(ApiError::RemoteRejected {
            status: status.as_u16(),
            message: body.to_string(),
        }),
    }
}
