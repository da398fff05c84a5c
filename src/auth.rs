use crate::error::{Error, Result};
use crate::gateway::{BrowserLauncher, Gateway};
use crate::models::{AuthStatus, CredentialSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    NoCredentials,
    CredentialsSavedUnauthenticated,
    Authenticated,
}

impl AuthState {
    /// A session without credentials is not a session.
    pub fn from_status(status: AuthStatus) -> Self {
        match (status.has_credentials, status.is_authenticated) {
            (false, _) => AuthState::NoCredentials,
            (true, false) => AuthState::CredentialsSavedUnauthenticated,
            (true, true) => AuthState::Authenticated,
        }
    }

    pub fn is_authenticated(self) -> bool {
        self == AuthState::Authenticated
    }
}

/// Tracks whether credentials and a session exist. Completion of the browser
/// consent flow is only noticed when `check_status` is called again.
pub struct AuthStateMachine {
    gateway: Arc<dyn Gateway>,
    browser: Box<dyn BrowserLauncher>,
    state: watch::Sender<AuthState>,
}

impl AuthStateMachine {
    pub fn new(gateway: Arc<dyn Gateway>, browser: Box<dyn BrowserLauncher>) -> Self {
        let (state, _) = watch::channel(AuthState::NoCredentials);
        Self {
            gateway,
            browser,
            state,
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    fn transition(&self, next: AuthState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            info!("Auth state {:?} -> {:?}", prev, next);
        }
    }

    pub async fn check_status(&self) -> Result<AuthState> {
        let status = self.gateway.check_auth_status().await?;
        self.transition(AuthState::from_status(status));
        Ok(self.state())
    }

    pub async fn load_credentials(&self) -> Result<Option<CredentialSet>> {
        self.gateway.get_credentials().await
    }

    /// Empty fields are passed through; the gateway decides what is valid.
    pub async fn save_credentials(&self, credentials: &CredentialSet) -> Result<()> {
        self.gateway.save_credentials(credentials).await?;
        self.transition(AuthState::CredentialsSavedUnauthenticated);
        Ok(())
    }

    /// Fetches the consent URL and opens it in the browser. The URL is
    /// returned even when the browser could not be launched.
    ///
    /// Starting a consent flow discards any current session, so an
    /// authenticated machine falls back to `CredentialsSavedUnauthenticated`
    /// until `check_status` sees the new token.
    pub async fn begin_authorization(&self) -> Result<String> {
        if self.state() == AuthState::NoCredentials {
            return Err(Error::CredentialsRequired);
        }

        let url = self.gateway.authorization_url().await?;
        if self.state() == AuthState::Authenticated {
            self.transition(AuthState::CredentialsSavedUnauthenticated);
        }
        if let Err(e) = self.browser.open(&url) {
            warn!("Failed to open browser: {}. Visit {} manually.", e, url);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeGateway;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingBrowser {
        opened: Arc<Mutex<Vec<String>>>,
        broken: bool,
    }

    impl BrowserLauncher for RecordingBrowser {
        fn open(&self, url: &str) -> std::io::Result<()> {
            if self.broken {
                return Err(std::io::Error::other("no display"));
            }
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    fn machine(gateway: Arc<FakeGateway>, browser: RecordingBrowser) -> AuthStateMachine {
        AuthStateMachine::new(gateway, Box::new(browser))
    }

    fn credentials() -> CredentialSet {
        CredentialSet {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        }
    }

    #[test]
    fn test_state_from_status_requires_credentials_for_session() {
        let status = |has_credentials, is_authenticated| AuthStatus {
            has_credentials,
            is_authenticated,
        };
        assert_eq!(AuthState::from_status(status(false, false)), AuthState::NoCredentials);
        assert_eq!(AuthState::from_status(status(false, true)), AuthState::NoCredentials);
        assert_eq!(
            AuthState::from_status(status(true, false)),
            AuthState::CredentialsSavedUnauthenticated
        );
        assert_eq!(AuthState::from_status(status(true, true)), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_check_status_syncs_state_and_notifies_subscribers() {
        let gateway = Arc::new(FakeGateway::authenticated());
        let auth = machine(gateway.clone(), RecordingBrowser::default());
        let rx = auth.subscribe();

        assert_eq!(auth.check_status().await, Ok(AuthState::Authenticated));
        assert_eq!(*rx.borrow(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_check_status_failure_keeps_prior_state() {
        let gateway = Arc::new(FakeGateway::authenticated());
        let auth = machine(gateway.clone(), RecordingBrowser::default());
        auth.check_status().await.unwrap();

        gateway.fail_next(Error::Transport("gateway down".to_string()));
        assert_eq!(
            auth.check_status().await,
            Err(Error::Transport("gateway down".to_string()))
        );
        assert_eq!(auth.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_save_credentials_moves_to_saved_state() {
        let gateway = Arc::new(FakeGateway::default());
        let auth = machine(gateway.clone(), RecordingBrowser::default());

        auth.save_credentials(&credentials()).await.unwrap();
        assert_eq!(auth.state(), AuthState::CredentialsSavedUnauthenticated);
        assert_eq!(*gateway.credentials.lock().unwrap(), Some(credentials()));
    }

    #[tokio::test]
    async fn test_save_credentials_sends_empty_fields_to_gateway() {
        let gateway = Arc::new(FakeGateway::default());
        let auth = machine(gateway.clone(), RecordingBrowser::default());

        gateway.fail_next(Error::InvalidCredentials("client_id is empty".to_string()));
        let result = auth.save_credentials(&CredentialSet::default()).await;

        assert_eq!(
            result,
            Err(Error::InvalidCredentials("client_id is empty".to_string()))
        );
        assert_eq!(gateway.calls(), vec!["save_credentials"]);
        assert_eq!(auth.state(), AuthState::NoCredentials);
    }

    #[tokio::test]
    async fn test_begin_authorization_requires_credentials() {
        let gateway = Arc::new(FakeGateway::default());
        let auth = machine(gateway.clone(), RecordingBrowser::default());

        assert_eq!(auth.begin_authorization().await, Err(Error::CredentialsRequired));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_begin_authorization_opens_browser_without_completing() {
        let gateway = Arc::new(FakeGateway::default());
        let browser = RecordingBrowser::default();
        let auth = machine(gateway.clone(), browser.clone());
        auth.save_credentials(&credentials()).await.unwrap();

        let url = auth.begin_authorization().await.unwrap();

        assert_eq!(*browser.opened.lock().unwrap(), vec![url]);
        assert_eq!(auth.state(), AuthState::CredentialsSavedUnauthenticated);
    }

    #[tokio::test]
    async fn test_begin_authorization_from_authenticated_drops_session() {
        let gateway = Arc::new(FakeGateway::authenticated());
        let auth = machine(gateway.clone(), RecordingBrowser::default());
        let rx = auth.subscribe();
        auth.check_status().await.unwrap();

        auth.begin_authorization().await.unwrap();

        assert_eq!(auth.state(), AuthState::CredentialsSavedUnauthenticated);
        assert_eq!(*rx.borrow(), AuthState::CredentialsSavedUnauthenticated);

        // The consent screen was completed.
        gateway.status.lock().unwrap().is_authenticated = true;
        assert_eq!(auth.check_status().await, Ok(AuthState::Authenticated));
    }

    #[tokio::test]
    async fn test_failed_authorization_keeps_session() {
        let gateway = Arc::new(FakeGateway::authenticated());
        let auth = machine(gateway.clone(), RecordingBrowser::default());
        auth.check_status().await.unwrap();

        gateway.fail_next(Error::Transport("no route".to_string()));
        assert!(auth.begin_authorization().await.is_err());
        assert_eq!(auth.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_begin_authorization_survives_browser_failure() {
        let gateway = Arc::new(FakeGateway::default());
        let browser = RecordingBrowser {
            broken: true,
            ..Default::default()
        };
        let auth = machine(gateway.clone(), browser);
        auth.save_credentials(&credentials()).await.unwrap();

        assert_eq!(
            auth.begin_authorization().await,
            Ok("https://accounts.example.test/consent".to_string())
        );
    }
}
