use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use csvdash_store::KeyValueStore;
use csvdash_types::api::SignupRequest;
use csvdash_types::models::User;

use crate::auth::AuthApi;
use crate::client::{TOKEN_KEY, USER_KEY, clear_persisted};
use crate::error::ApiError;

/// A live bearer token and the identity it authorizes.
#[derive(Clone, PartialEq)]
pub struct Credential {
    token: String,
    user: User,
}

impl Credential {
    pub fn new(token: String, user: User) -> Self {
        Self { token, user }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> &User {
        &self.user
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("user", &self.user.username)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Restore has not finished; neither authenticated nor anonymous yet.
    Loading,
    Anonymous,
    Authenticated(Credential),
}

impl SessionState {
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            SessionState::Authenticated(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }
}

/// Notified synchronously whenever a credential appears, disappears, or is
/// replaced, and again on every successful login. Implementations must not
/// block.
pub trait SessionObserver: Send + Sync {
    fn credential_changed(&self, credential: Option<&Credential>);
}

/// Single owner of the current credential.
pub struct SessionStore<A> {
    auth: A,
    storage: Arc<dyn KeyValueStore>,
    state: watch::Sender<SessionState>,
    observers: Mutex<Vec<Arc<dyn SessionObserver>>>,
}

impl<A: AuthApi> SessionStore<A> {
    pub fn new(auth: A, storage: Arc<dyn KeyValueStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            auth,
            storage,
            state,
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.state.borrow().credential().cloned()
    }

    pub fn is_admin(&self) -> bool {
        self.state
            .borrow()
            .credential()
            .is_some_and(|c| c.user().is_admin())
    }

    /// Register an observer. It is immediately told about the current
    /// credential so it starts in sync.
    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        match self.observers.lock() {
            Ok(mut observers) => observers.push(observer.clone()),
            Err(e) => {
                warn!("session observer lock poisoned: {}", e);
                return;
            }
        }
        let current = self.credential();
        observer.credential_changed(current.as_ref());
    }

    /// Resolve the persisted token, if any, into a live session. Any failure
    /// discards the persisted credential.
    pub async fn restore(&self) -> SessionState {
        let token = match self.storage.get(TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read persisted token: {}", e);
                None
            }
        };

        let Some(token) = token else {
            debug!("No persisted session");
            self.settle_restore(SessionState::Anonymous);
            return self.state();
        };

        match self.auth.whoami(&token).await {
            Ok(user) => {
                info!("Restored session for {}", user.username);
                self.persist_user(&user);
                self.settle_restore(SessionState::Authenticated(Credential::new(token, user)));
            }
            Err(e) => {
                info!("Persisted session is no longer valid: {}", e);
                clear_persisted(self.storage.as_ref());
                self.settle_restore(SessionState::Anonymous);
            }
        }
        self.state()
    }

    /// Log in and fetch the identity. State only changes once both succeed.
    pub async fn login(&self, email: &str, password: &str) -> Result<Credential, ApiError> {
        let tokens = self.auth.login(email, password).await?;
        let user = self.auth.whoami(&tokens.access_token).await?;

        self.storage.set(TOKEN_KEY, &tokens.access_token)?;
        self.persist_user(&user);

        let credential = Credential::new(tokens.access_token, user);
        info!("Logged in as {}", credential.user().username);
        // Re-announce an unchanged token too, so observers that gave up start over
        self.publish(SessionState::Authenticated(credential.clone()), true);
        Ok(credential)
    }

    /// Create another account. The current session is left as it is.
    pub async fn signup(&self, req: &SignupRequest) -> Result<User, ApiError> {
        let user = self.auth.signup(req).await?;
        info!("Created {} account {}", user.role.as_str(), user.username);
        Ok(user)
    }

    pub fn logout(&self) {
        clear_persisted(self.storage.as_ref());
        if self.state.borrow().credential().is_some() {
            info!("Logged out");
        }
        self.transition(SessionState::Anonymous);
    }

    /// Forced logout after the server rejected the credential.
    pub fn invalidate(&self) {
        if self.state.borrow().credential().is_some() {
            warn!("Session rejected by server, logging out");
        }
        clear_persisted(self.storage.as_ref());
        self.transition(SessionState::Anonymous);
    }

    fn persist_user(&self, user: &User) {
        let result = serde_json::to_string(user)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.storage.set(USER_KEY, &json));
        if let Err(e) = result {
            warn!("Failed to persist user: {}", e);
        }
    }

    /// Apply a restore outcome unless something else (login, 401) already
    /// moved the session out of Loading while the lookup was in flight.
    fn settle_restore(&self, next: SessionState) {
        if self.state.borrow().is_loading() {
            self.transition(next);
        } else {
            debug!("Session changed during restore, discarding restore result");
        }
    }

    fn transition(&self, next: SessionState) {
        self.publish(next, false);
    }

    fn publish(&self, next: SessionState, always_notify: bool) {
        let previous = self.state.send_replace(next.clone());

        let before = previous.credential().map(Credential::token);
        let after = next.credential().map(Credential::token);
        if before == after && !always_notify {
            return;
        }

        let observers = match self.observers.lock() {
            Ok(observers) => observers.clone(),
            Err(e) => {
                warn!("session observer lock poisoned: {}", e);
                return;
            }
        };
        for observer in observers {
            observer.credential_changed(next.credential());
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use csvdash_store::MemoryStore;
    use csvdash_types::api::TokenResponse;
    use csvdash_types::models::Role;

    use super::*;

    fn user(name: &str, role: Role) -> User {
        User {
            id: 1,
            username: name.into(),
            email: format!("{}@example.com", name),
            role,
            created_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    struct FakeAuth {
        valid_token: &'static str,
    }

    impl AuthApi for FakeAuth {
        async fn login(&self, _email: &str, password: &str) -> Result<TokenResponse, ApiError> {
            if password == "secret" {
                Ok(TokenResponse {
                    access_token: self.valid_token.into(),
                    token_type: "bearer".into(),
                })
            } else {
                Err(ApiError::Unauthorized {
                    message: "Incorrect email or password".into(),
                })
            }
        }

        async fn signup(&self, req: &SignupRequest) -> Result<User, ApiError> {
            Ok(user(&req.username, req.role))
        }

        async fn whoami(&self, token: &str) -> Result<User, ApiError> {
            if token == self.valid_token {
                Ok(user("ada", Role::Admin))
            } else {
                Err(ApiError::Unauthorized {
                    message: "Could not validate credentials".into(),
                })
            }
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Option<String>>>);

    impl SessionObserver for Recorder {
        fn credential_changed(&self, credential: Option<&Credential>) {
            self.0
                .lock()
                .unwrap()
                .push(credential.map(|c| c.token().to_string()));
        }
    }

    fn store(storage: Arc<MemoryStore>) -> SessionStore<FakeAuth> {
        SessionStore::new(FakeAuth { valid_token: "tok-1" }, storage)
    }

    #[tokio::test]
    async fn starts_loading_and_restores_to_anonymous_without_token() {
        let session = store(Arc::new(MemoryStore::new()));
        assert!(session.state().is_loading());

        assert_eq!(session.restore().await, SessionState::Anonymous);
        assert!(session.credential().is_none());
    }

    #[tokio::test]
    async fn restore_with_valid_token_authenticates() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(TOKEN_KEY, "tok-1").unwrap();
        let session = store(storage.clone());

        let state = session.restore().await;
        let credential = state.credential().unwrap();
        assert_eq!(credential.token(), "tok-1");
        assert_eq!(credential.user().username, "ada");
        assert!(session.is_admin());
        assert!(storage.get(USER_KEY).unwrap().unwrap().contains("\"ada\""));
    }

    #[tokio::test]
    async fn restore_with_stale_token_clears_both_keys() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(TOKEN_KEY, "expired").unwrap();
        storage.set(USER_KEY, "{}").unwrap();
        let session = store(storage.clone());

        assert_eq!(session.restore().await, SessionState::Anonymous);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(USER_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn failed_login_leaves_state_unchanged() {
        let storage = Arc::new(MemoryStore::new());
        let session = store(storage.clone());
        session.restore().await;

        let err = session.login("ada@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Incorrect email or password");
        assert_eq!(session.state(), SessionState::Anonymous);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn observers_see_every_presence_transition() {
        let storage = Arc::new(MemoryStore::new());
        let session = store(storage.clone());
        let recorder = Arc::new(Recorder::default());
        session.add_observer(recorder.clone());
        session.restore().await;

        session.login("ada@example.com", "secret").await.unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("tok-1"));

        session.logout();
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(USER_KEY).unwrap(), None);

        // Registration, login, logout. Restore to anonymous is not a change.
        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec![None, Some("tok-1".to_string()), None]);
    }

    #[tokio::test]
    async fn repeated_login_with_same_token_notifies_again() {
        let session = store(Arc::new(MemoryStore::new()));
        let recorder = Arc::new(Recorder::default());
        session.restore().await;
        session.add_observer(recorder.clone());

        session.login("ada@example.com", "secret").await.unwrap();
        session.login("ada@example.com", "secret").await.unwrap();
        session.logout();
        session.logout();

        let seen = recorder.0.lock().unwrap().clone();
        let tok = Some("tok-1".to_string());
        assert_eq!(seen, vec![None, tok.clone(), tok, None]);
    }

    #[tokio::test]
    async fn invalidate_drops_to_anonymous() {
        let storage = Arc::new(MemoryStore::new());
        let session = store(storage.clone());
        session.login("ada@example.com", "secret").await.unwrap();

        let mut rx = session.watch();
        session.invalidate();
        assert_eq!(*rx.borrow_and_update(), SessionState::Anonymous);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn signup_does_not_switch_identity() {
        let session = store(Arc::new(MemoryStore::new()));
        session.login("ada@example.com", "secret").await.unwrap();

        let created = session
            .signup(&SignupRequest {
                username: "bob".into(),
                email: "bob@example.com".into(),
                password: "hunter22".into(),
                role: Role::User,
            })
            .await
            .unwrap();
        assert_eq!(created.username, "bob");
        assert_eq!(session.credential().unwrap().user().username, "ada");
    }
}
