use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::auth::TrackerAuth;
use crate::error::{ApiError, ApiResult};

const UNKNOWN_ERROR: &str = "An unknown API error occurred.";

/// JSON-over-HTTP transport with bearer authentication.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    pub auth: TrackerAuth,
}

impl ApiClient {
    pub fn new(base_url: &str, auth: TrackerAuth) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a request and decodes the JSON body.
    ///
    /// Returns `Ok(None)` for `204 No Content`.
    pub async fn request<B, T>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> ApiResult<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{} {}", method, endpoint);

        let mut req = self.client.request(method.clone(), &url);
        if let Some(token) = self.auth.token().await {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthenticationExpired);
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let bytes = resp.bytes().await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Like [`ApiClient::request`] but treats an empty body as malformed.
    pub async fn request_json<B, T>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        match self.request(method, endpoint, body).await? {
            Some(value) => Ok(value),
            None => Err(ApiError::Api {
                status: StatusCode::NO_CONTENT.as_u16(),
                message: format!("Expected a response body from {endpoint}"),
            }),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request_json::<Value, T>(Method::GET, endpoint, None).await
    }

    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(Method::POST, endpoint, Some(body)).await
    }

    pub async fn put<B, T>(&self, endpoint: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(Method::PUT, endpoint, Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> ApiResult<()> {
        self.request::<Value, Value>(Method::DELETE, endpoint, None)
            .await
            .map(|_| ())
    }
}

/// Human-readable message from an error body: `msg`, then `detail`.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return UNKNOWN_ERROR.to_string();
    };

    ["msg", "detail"]
        .iter()
        .find_map(|key| match value.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            // validation errors arrive as a list of {loc, msg, type}
            Some(Value::Array(items)) => {
                let msgs: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                (!msgs.is_empty()).then(|| msgs.join("; "))
            }
            _ => None,
        })
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}
