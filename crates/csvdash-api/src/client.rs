use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use csvdash_store::KeyValueStore;

use crate::error::ApiError;

/// Persisted credential keys. Always written and cleared together.
pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub mod endpoints {
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const SIGNUP: &str = "/api/v1/auth/signup";
    pub const ME: &str = "/api/v1/auth/me";

    pub const CSV_LIST: &str = "/api/v1/csv/list";
    pub const CSV_UPLOAD: &str = "/api/v1/csv/upload";

    pub fn csv_view(id: i64) -> String {
        format!("/api/v1/csv/{}/view", id)
    }

    pub fn csv_download(id: i64) -> String {
        format!("/api/v1/csv/{}/download", id)
    }

    pub fn csv_delete(id: i64) -> String {
        format!("/api/v1/csv/{}", id)
    }

    pub const USERS: &str = "/api/v1/users/";

    pub fn user(id: i64) -> String {
        format!("/api/v1/users/{}", id)
    }
}

type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Shared HTTP client for all collaborators.
///
/// Every request carries the persisted bearer token, if any. Any 401 response
/// clears the persisted credential and fires the unauthorized hook, so the
/// session can drop to anonymous no matter which call hit it.
pub struct ApiClient {
    http: Client,
    base_url: String,
    storage: Arc<dyn KeyValueStore>,
    on_unauthorized: RwLock<Option<UnauthorizedHook>>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            storage,
            on_unauthorized: RwLock::new(None),
        })
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register the callback run after a 401 has cleared the credential.
    pub fn set_unauthorized_hook<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        match self.on_unauthorized.write() {
            Ok(mut slot) => *slot = Some(Arc::new(hook)),
            Err(e) => warn!("unauthorized hook lock poisoned: {}", e),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start a request with the persisted bearer token attached.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.stored_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Start a request with an explicit token instead of the persisted one.
    pub fn request_with_token(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http.request(method, self.url(path)).bearer_auth(token)
    }

    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let err = ApiError::from_status(status.as_u16(), &body);
        debug!("request failed with {}: {}", status, err);
        if err.is_unauthorized() {
            self.handle_unauthorized();
        }
        Err(err)
    }

    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn stored_token(&self) -> Option<String> {
        match self.storage.get(TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read persisted token: {}", e);
                None
            }
        }
    }

    pub(crate) fn handle_unauthorized(&self) {
        warn!("Received 401, clearing persisted credential");
        clear_persisted(self.storage.as_ref());

        let hook = match self.on_unauthorized.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        if let Some(hook) = hook {
            hook();
        }
    }
}

/// Remove both persisted credential keys. Failures are logged, not returned:
/// a half-cleared store is still treated as logged out by the session.
pub fn clear_persisted(storage: &dyn KeyValueStore) {
    for key in [TOKEN_KEY, USER_KEY] {
        if let Err(e) = storage.remove(key) {
            warn!("Failed to clear persisted {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use csvdash_store::MemoryStore;

    use super::*;

    fn client(storage: Arc<dyn KeyValueStore>) -> ApiClient {
        ApiClient::new("http://localhost:8000/", DEFAULT_TIMEOUT, storage).unwrap()
    }

    #[test]
    fn base_url_is_normalised() {
        let api = client(Arc::new(MemoryStore::new()));
        assert_eq!(api.url(endpoints::ME), "http://localhost:8000/api/v1/auth/me");
        assert_eq!(api.url(&endpoints::csv_view(4)), "http://localhost:8000/api/v1/csv/4/view");
    }

    #[test]
    fn unauthorized_clears_both_keys_and_fires_hook() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(TOKEN_KEY, "stale").unwrap();
        storage.set(USER_KEY, "{}").unwrap();

        let api = client(storage.clone());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        api.set_unauthorized_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        api.handle_unauthorized();

        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(USER_KEY).unwrap(), None);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bearer_token_comes_from_storage() {
        let storage = Arc::new(MemoryStore::new());
        let api = client(storage.clone());

        let req = api.request(Method::GET, endpoints::ME).build().unwrap();
        assert!(req.headers().get(reqwest::header::AUTHORIZATION).is_none());

        storage.set(TOKEN_KEY, "abc").unwrap();
        let req = api.request(Method::GET, endpoints::ME).build().unwrap();
        assert_eq!(req.headers()[reqwest::header::AUTHORIZATION], "Bearer abc");
    }
}
