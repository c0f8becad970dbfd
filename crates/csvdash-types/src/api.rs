use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Role;

// -- Auth --

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".into()
}

/// Admin-only account creation. Never changes the caller's own session.
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

// -- Users --

/// Partial update; absent fields are left untouched by the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.password.is_none() && self.role.is_none()
    }
}

// -- Errors --

/// Structured error payload returned by the server. `detail` is a string for
/// domain errors but a list of objects for request validation failures.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub detail: Value,
    #[serde(default)]
    pub status_code: Option<u16>,
}

impl ApiErrorBody {
    pub fn message(&self) -> Option<&str> {
        match &self.detail {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_update_omits_absent_fields() {
        let update = UserUpdate {
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"role":"admin"}"#);
        assert!(UserUpdate::default().is_empty());
    }

    #[test]
    fn only_string_details_are_messages() {
        let body: ApiErrorBody = serde_json::from_str(r#"{"detail":"CSV file not found: 4"}"#).unwrap();
        assert_eq!(body.message(), Some("CSV file not found: 4"));

        let body: ApiErrorBody =
            serde_json::from_str(r#"{"detail":[{"loc":["body","email"],"msg":"field required"}]}"#)
                .unwrap();
        assert_eq!(body.message(), None);
    }

    #[test]
    fn token_type_defaults_to_bearer() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"t"}"#).unwrap();
        assert_eq!(token.token_type, "bearer");
    }
}
