use tracing::info;

use crate::api::ApiClient;
use crate::auth::{Credentials, RegisteredUser, TokenResponse, TrackerAuth};
use crate::error::ApiResult;
use crate::models::*;

/// The backend operations the state store depends on.
#[allow(async_fn_in_trait)]
pub trait DataApi {
    /// Fetches everything tracked for the logged-in user.
    async fn fetch_tracking_data(&self) -> ApiResult<TrackingData>;

    async fn create_item<D: Draft>(&self, draft: &D) -> ApiResult<D::Entity>;

    async fn update_item<D: Draft>(&self, id: &EntityId, draft: &D) -> ApiResult<D::Entity>;

    async fn delete_item(&self, collection: Collection, id: &EntityId) -> ApiResult<()>;

    async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<Profile>;
}

#[derive(Clone)]
pub struct TrackerClient {
    pub api: ApiClient,
}

impl TrackerClient {
    /// A client without a session; call [`TrackerClient::sign_in`] before use.
    pub fn new(base_url: &str) -> Self {
        Self {
            api: ApiClient::new(base_url, TrackerAuth::default()),
        }
    }

    /// A client resuming an existing session token.
    pub fn with_token(base_url: &str, token: String) -> Self {
        Self {
            api: ApiClient::new(base_url, TrackerAuth::new(Some(token))),
        }
    }

    /// Sign in with email and password.
    pub async fn login(base_url: &str, email: &str, password: &str) -> ApiResult<Self> {
        let client = Self::new(base_url);
        client.sign_in(email, password).await?;
        Ok(client)
    }

    /// Exchanges credentials for a bearer token and keeps it for later requests.
    ///
    /// Wrong credentials come back as `AuthenticationExpired` (HTTP 401).
    pub async fn sign_in(&self, email: &str, password: &str) -> ApiResult<()> {
        let token: TokenResponse = self
            .api
            .post("/api/login", &Credentials { email, password })
            .await?;
        self.api.auth.set_token(token.access_token).await;
        info!("signed in as {email}");
        Ok(())
    }

    /// Creates an account. Does not sign in.
    pub async fn register(&self, email: &str, password: &str) -> ApiResult<RegisteredUser> {
        self.api
            .post("/api/register", &Credentials { email, password })
            .await
    }

    /// Drops the session token.
    pub async fn logout(&self) {
        self.api.auth.clear().await;
    }

    /// Get the user profile. The backend returns an empty profile if none was saved.
    pub async fn get_profile(&self) -> ApiResult<Profile> {
        self.api.get("/api/profile").await
    }

    /// List one entity collection without fetching the full dataset.
    pub async fn list_items<E: Entity>(&self) -> ApiResult<Vec<E>> {
        self.api
            .get(&format!("/api/{}", E::COLLECTION.endpoint()))
            .await
    }
}

impl DataApi for TrackerClient {
    async fn fetch_tracking_data(&self) -> ApiResult<TrackingData> {
        self.api.get("/api/tracking-data").await
    }

    async fn create_item<D: Draft>(&self, draft: &D) -> ApiResult<D::Entity> {
        let endpoint = format!("/api/{}", <D::Entity as Entity>::COLLECTION.endpoint());
        self.api.post(&endpoint, draft).await
    }

    async fn update_item<D: Draft>(&self, id: &EntityId, draft: &D) -> ApiResult<D::Entity> {
        let collection = <D::Entity as Entity>::COLLECTION;
        let endpoint = format!("/api/{}/{}", collection.endpoint(), id);
        self.api.put(&endpoint, draft).await
    }

    async fn delete_item(&self, collection: Collection, id: &EntityId) -> ApiResult<()> {
        let endpoint = format!("/api/{}/{}", collection.endpoint(), id);
        self.api.delete(&endpoint).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<Profile> {
        self.api.put("/api/profile", update).await
    }
}
