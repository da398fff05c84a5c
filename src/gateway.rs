use crate::error::Result;
use crate::models::{AuthStatus, CredentialSet, Filter, Label};
use async_trait::async_trait;

/// Everything that needs the network or the secret store. Implementations
/// own validation of credentials and of filter contents.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn check_auth_status(&self) -> Result<AuthStatus>;
    async fn get_credentials(&self) -> Result<Option<CredentialSet>>;
    async fn save_credentials(&self, credentials: &CredentialSet) -> Result<()>;
    /// Starts the consent flow and returns the URL the user has to visit.
    /// Any current session is discarded.
    async fn authorization_url(&self) -> Result<String>;
    async fn list_filters(&self) -> Result<Vec<Filter>>;
    async fn list_labels(&self) -> Result<Vec<Label>>;
    async fn create_filter(&self, filter: &Filter) -> Result<Filter>;
    async fn delete_filter(&self, filter_id: &str) -> Result<()>;
}

pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}
