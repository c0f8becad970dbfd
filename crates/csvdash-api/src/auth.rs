use std::future::Future;
use std::sync::Arc;

use reqwest::Method;

use csvdash_types::api::{LoginRequest, SignupRequest, TokenResponse};
use csvdash_types::models::User;

use crate::client::{ApiClient, endpoints};
use crate::error::ApiError;

/// Authentication collaborator consumed by the session store.
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a bearer token.
    fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<TokenResponse, ApiError>> + Send;

    /// Create an account (admin only). Does not touch the caller's session.
    fn signup(&self, req: &SignupRequest) -> impl Future<Output = Result<User, ApiError>> + Send;

    /// Resolve a token to the identity it authorizes.
    fn whoami(&self, token: &str) -> impl Future<Output = Result<User, ApiError>> + Send;
}

#[derive(Clone)]
pub struct AuthService {
    api: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

impl AuthApi for AuthService {
    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let req = self.api.request(Method::POST, endpoints::LOGIN).json(&body);
        self.api.send_json(req).await
    }

    async fn signup(&self, req: &SignupRequest) -> Result<User, ApiError> {
        let builder = self.api.request(Method::POST, endpoints::SIGNUP).json(req);
        self.api.send_json(builder).await
    }

    async fn whoami(&self, token: &str) -> Result<User, ApiError> {
        let req = self.api.request_with_token(Method::GET, endpoints::ME, token);
        self.api.send_json(req).await
    }
}
