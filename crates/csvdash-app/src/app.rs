use std::sync::Arc;

use anyhow::bail;
use tracing::info;

use csvdash_api::auth::AuthService;
use csvdash_api::files::FileService;
use csvdash_api::session::{Credential, SessionState, SessionStore};
use csvdash_api::users::UserService;
use csvdash_api::ApiClient;
use csvdash_gateway::transport::endpoint_url;
use csvdash_gateway::ws::WsConnector;
use csvdash_gateway::Channel;
use csvdash_store::{Database, KeyValueStore};

use crate::config::Config;

/// Everything a command needs, wired once at startup.
pub struct App {
    pub config: Config,
    pub session: Arc<SessionStore<AuthService>>,
    pub files: FileService,
    pub users: UserService,
}

impl App {
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let db = Database::open(&config.state_db)?;
        let storage: Arc<dyn KeyValueStore> = Arc::new(db);

        let api = Arc::new(ApiClient::new(&config.api_url, config.timeout, storage.clone())?);
        let session = Arc::new(SessionStore::new(AuthService::new(api.clone()), storage));

        // Any 401 from any collaborator ends the session
        let weak = Arc::downgrade(&session);
        api.set_unauthorized_hook(move || {
            if let Some(session) = weak.upgrade() {
                session.invalidate();
            }
        });

        if let SessionState::Authenticated(credential) = session.restore().await {
            info!("Session restored for {}", credential.user().username);
        }

        Ok(Self {
            files: FileService::new(api.clone()),
            users: UserService::new(api),
            session,
            config,
        })
    }

    pub fn require_login(&self) -> anyhow::Result<Credential> {
        match self.session.credential() {
            Some(credential) => Ok(credential),
            None => bail!("Not logged in. Run `csvdash login` first."),
        }
    }

    pub fn require_admin(&self) -> anyhow::Result<Credential> {
        let credential = self.require_login()?;
        if !credential.user().is_admin() {
            bail!("This command needs an admin account");
        }
        Ok(credential)
    }

    /// The realtime channel, attached to the session so it follows every
    /// login, logout and forced invalidation.
    pub fn live_channel(&self) -> Channel {
        let channel = Channel::new(
            endpoint_url(&self.config.ws_url),
            self.config.reconnect,
            Arc::new(WsConnector),
        );
        self.session.add_observer(Arc::new(channel.clone()));
        channel
    }
}
