use std::sync::Arc;

use reqwest::Method;

use csvdash_types::api::UserUpdate;
use csvdash_types::models::User;

use crate::client::{ApiClient, endpoints};
use crate::error::ApiError;

/// Admin-only user management.
#[derive(Clone)]
pub struct UserService {
    api: Arc<ApiClient>,
}

impl UserService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self, skip: usize, limit: usize) -> Result<Vec<User>, ApiError> {
        let req = self
            .api
            .request(Method::GET, endpoints::USERS)
            .query(&[("skip", skip), ("limit", limit)]);
        self.api.send_json(req).await
    }

    pub async fn update(&self, id: i64, update: &UserUpdate) -> Result<User, ApiError> {
        if update.is_empty() {
            return Err(ApiError::Validation("Nothing to update".into()));
        }
        let req = self.api.request(Method::PUT, &endpoints::user(id)).json(update);
        self.api.send_json(req).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let req = self.api.request(Method::DELETE, &endpoints::user(id));
        self.api.send(req).await?;
        Ok(())
    }
}
