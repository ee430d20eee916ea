use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
pub(crate) struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Response of `POST /api/login`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[allow(dead_code)]
    pub token_type: String,
}

/// Account returned by `POST /api/register`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredUser {
    pub user_id: i64,
    pub email: String,
    pub name: Option<String>,
}

/// Holds the bearer token of the current session.
///
/// Clones share the same token, so logging out through one handle logs out
/// every client built from it.
#[derive(Clone, Default)]
pub struct TrackerAuth {
    token: Arc<Mutex<Option<String>>>,
}

impl TrackerAuth {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(Mutex::new(token)),
        }
    }

    pub async fn token(&self) -> Option<String> {
        self.token.lock().await.clone()
    }

    pub async fn set_token(&self, token: String) {
        *self.token.lock().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.token.lock().await = None;
    }

    pub async fn is_logged_in(&self) -> bool {
        self.token.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_the_session() {
        let auth = TrackerAuth::new(Some("abc.def.ghi".to_string()));
        let other = auth.clone();
        assert_eq!(other.token().await.as_deref(), Some("abc.def.ghi"));

        other.set_token("next".to_string()).await;
        assert_eq!(auth.token().await.as_deref(), Some("next"));

        auth.clear().await;
        assert!(!other.is_logged_in().await);
        assert!(other.token().await.is_none());
    }
}
