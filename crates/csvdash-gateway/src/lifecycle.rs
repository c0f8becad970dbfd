use tracing::debug;

use csvdash_api::session::{Credential, SessionObserver};

use crate::channel::Channel;

/// The channel follows the session: connected while a credential is held,
/// disconnected as soon as it goes away.
impl SessionObserver for Channel {
    fn credential_changed(&self, credential: Option<&Credential>) {
        match credential {
            Some(credential) => {
                debug!("Credential present for {}", credential.user().username);
                self.ensure_connected(credential.token());
            }
            None => self.disconnect(),
        }
    }
}
