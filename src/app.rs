use crate::auth::{AuthState, AuthStateMachine};
use crate::codec::FilterDraft;
use crate::filters::FilterStore;
use crate::gateway::{BrowserLauncher, Gateway};
use crate::models::CredentialSet;
use crate::notify::{NotificationChannel, Severity};
use std::sync::Arc;
use tracing::warn;

/// Application state shared by the views. Every operation reports its
/// outcome through `notifications`; errors stop here.
pub struct App {
    pub auth: AuthStateMachine,
    pub store: FilterStore,
    pub notifications: NotificationChannel,
    pub draft: FilterDraft,
    /// Stored credentials, or a blank set with the default redirect URI.
    pub credentials: CredentialSet,
    /// Consent URL of the last authorization attempt, shown until connected.
    pub auth_url: Option<String>,
}

impl App {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        browser: Box<dyn BrowserLauncher>,
        default_redirect_uri: String,
    ) -> Self {
        let auth = AuthStateMachine::new(gateway.clone(), browser);
        let store = FilterStore::new(gateway, auth.subscribe());
        Self {
            auth,
            store,
            notifications: NotificationChannel::default(),
            draft: FilterDraft::default(),
            credentials: CredentialSet {
                redirect_uri: default_redirect_uri,
                ..Default::default()
            },
            auth_url: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.state().is_authenticated()
    }

    pub async fn start(&mut self) {
        match self.auth.load_credentials().await {
            Ok(Some(credentials)) => self.credentials = credentials,
            Ok(None) => {}
            Err(e) => warn!("Error loading credentials: {}", e),
        }
        self.check_status().await;
    }

    /// Re-reads the auth status; on becoming authenticated the filter and
    /// label views are loaded.
    pub async fn check_status(&mut self) {
        let before = self.auth.state();
        match self.auth.check_status().await {
            Ok(AuthState::Authenticated) if before != AuthState::Authenticated => {
                self.auth_url = None;
                self.reload_filters().await;
                self.reload_labels().await;
            }
            Ok(_) => {}
            Err(e) => self
                .notifications
                .post(format!("Error checking auth status: {}", e), Severity::Error),
        }
    }

    pub async fn save_credentials(&mut self, credentials: CredentialSet) {
        match self.auth.save_credentials(&credentials).await {
            Ok(()) => {
                self.credentials = credentials;
                self.notifications
                    .post("Credentials saved successfully", Severity::Success);
            }
            Err(e) => self
                .notifications
                .post(format!("Error saving credentials: {}", e), Severity::Error),
        }
    }

    pub async fn connect(&mut self) {
        match self.auth.begin_authorization().await {
            Ok(url) => {
                self.auth_url = Some(url);
                self.notifications.post(
                    "Please complete authentication in your browser",
                    Severity::Info,
                );
            }
            Err(e) => self
                .notifications
                .post(format!("Error getting auth URL: {}", e), Severity::Error),
        }
    }

    pub async fn reload_filters(&mut self) {
        match self.store.list().await {
            Ok(_) => self
                .notifications
                .post("Filters loaded successfully", Severity::Success),
            Err(e) => self
                .notifications
                .post(format!("Error loading filters: {}", e), Severity::Error),
        }
    }

    pub async fn reload_labels(&mut self) {
        if let Err(e) = self.store.list_labels().await {
            self.notifications
                .post(format!("Error loading labels: {}", e), Severity::Error);
        }
    }

    /// Submits the current draft. The draft is reset only when the filter was
    /// created; returns whether that happened.
    pub async fn submit_draft(&mut self) -> bool {
        match self.store.create(&self.draft).await {
            Ok(_) => {
                self.draft = FilterDraft::default();
                self.notifications
                    .post("Filter created successfully", Severity::Success);
                true
            }
            Err(e) => {
                self.notifications
                    .post(format!("Error creating filter: {}", e), Severity::Error);
                false
            }
        }
    }

    /// Confirmation is the caller's job.
    pub async fn delete_filter(&mut self, filter_id: &str) {
        match self.store.delete(filter_id).await {
            Ok(()) => self
                .notifications
                .post("Filter deleted successfully", Severity::Success),
            Err(e) => self
                .notifications
                .post(format!("Error deleting filter: {}", e), Severity::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::gateway::fake::FakeGateway;
    use crate::models::{AuthStatus, Label, LabelType};

    struct NoBrowser;

    impl BrowserLauncher for NoBrowser {
        fn open(&self, _url: &str) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn app(gateway: &Arc<FakeGateway>) -> App {
        App::new(
            gateway.clone(),
            Box::new(NoBrowser),
            "http://localhost:3000/auth/callback".to_string(),
        )
    }

    fn notice(app: &App) -> (String, Severity) {
        let n = app.notifications.current().expect("notification");
        (n.message.clone(), n.severity)
    }

    #[tokio::test]
    async fn test_start_loads_filters_and_labels_when_authenticated() {
        let gateway = Arc::new(FakeGateway::authenticated().with_filter_ids(&["A"]));
        *gateway.labels.lock().unwrap() = vec![Label {
            id: "Label_1".to_string(),
            name: "Receipts".to_string(),
            label_type: LabelType::User,
        }];
        let mut app = app(&gateway);

        app.start().await;

        assert!(app.is_authenticated());
        assert_eq!(app.store.filters().len(), 1);
        assert_eq!(app.store.labels().len(), 1);
        assert_eq!(
            gateway.calls(),
            vec!["get_credentials", "check_auth_status", "list_filters", "list_labels"]
        );
    }

    #[tokio::test]
    async fn test_start_without_credentials_keeps_default_redirect() {
        let gateway = Arc::new(FakeGateway::default());
        let mut app = app(&gateway);

        app.start().await;

        assert_eq!(app.auth.state(), AuthState::NoCredentials);
        assert_eq!(app.credentials.redirect_uri, "http://localhost:3000/auth/callback");
        assert_eq!(gateway.call_count("list_filters"), 0);
    }

    #[tokio::test]
    async fn test_check_status_after_browser_flow_loads_data_once() {
        let gateway = Arc::new(FakeGateway::default());
        let mut app = app(&gateway);
        app.save_credentials(CredentialSet {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        })
        .await;
        app.connect().await;
        assert!(app.auth_url.is_some());
        assert_eq!(notice(&app).1, Severity::Info);

        // The user finished the consent screen.
        *gateway.status.lock().unwrap() = AuthStatus {
            has_credentials: true,
            is_authenticated: true,
        };
        app.check_status().await;
        app.check_status().await;

        assert!(app.is_authenticated());
        assert!(app.auth_url.is_none());
        assert_eq!(gateway.call_count("list_filters"), 1);
        assert_eq!(gateway.call_count("list_labels"), 1);
    }

    #[tokio::test]
    async fn test_finished_consent_waits_for_check_status() {
        let gateway = Arc::new(FakeGateway::default());
        let mut app = app(&gateway);
        app.save_credentials(CredentialSet {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        })
        .await;
        app.connect().await;
        gateway.status.lock().unwrap().is_authenticated = true;

        assert!(!app.is_authenticated());
        assert!(app.auth_url.is_some());
        assert_eq!(gateway.call_count("check_auth_status"), 0);

        app.check_status().await;
        assert!(app.is_authenticated());
        assert_eq!(gateway.call_count("check_auth_status"), 1);
    }

    #[tokio::test]
    async fn test_submit_success_resets_draft() {
        let gateway = Arc::new(FakeGateway::authenticated());
        let mut app = app(&gateway);
        app.start().await;
        app.draft.criteria.from = "a@b.com".to_string();

        assert!(app.submit_draft().await);

        assert_eq!(app.draft, FilterDraft::default());
        assert_eq!(
            notice(&app),
            ("Filter created successfully".to_string(), Severity::Success)
        );
        assert_eq!(app.store.filters().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_failure_keeps_draft_and_reports_reason() {
        let gateway = Arc::new(FakeGateway::authenticated().with_filter_ids(&["A"]));
        let mut app = app(&gateway);
        app.start().await;
        app.draft.action.forward = "unverified@else.where".to_string();
        let before = app.draft.clone();

        gateway.fail_next(Error::RemoteRejected(
            "Forwarding address not verified".to_string(),
        ));
        assert!(!app.submit_draft().await);

        assert_eq!(app.draft, before);
        assert_eq!(app.store.filters().len(), 1);
        assert_eq!(
            notice(&app),
            (
                "Error creating filter: Forwarding address not verified".to_string(),
                Severity::Error
            )
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_submit_reports_without_gateway_call() {
        let gateway = Arc::new(FakeGateway::default());
        let mut app = app(&gateway);

        assert!(!app.submit_draft().await);
        assert_eq!(
            notice(&app),
            (
                "Error creating filter: Not authenticated with Gmail".to_string(),
                Severity::Error
            )
        );
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_outcome() {
        let gateway = Arc::new(FakeGateway::authenticated().with_filter_ids(&["X", "Y"]));
        let mut app = app(&gateway);
        app.start().await;

        app.delete_filter("X").await;
        assert_eq!(notice(&app).0, "Filter deleted successfully");

        gateway.fail_next(Error::Transport("connection reset".to_string()));
        app.delete_filter("Y").await;
        assert_eq!(
            notice(&app).0,
            "Error deleting filter: Connection error: connection reset"
        );
        assert_eq!(app.store.filters().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_without_credentials_is_reported() {
        let gateway = Arc::new(FakeGateway::default());
        let mut app = app(&gateway);

        app.connect().await;

        assert_eq!(
            notice(&app),
            (
                "Error getting auth URL: No credentials saved".to_string(),
                Severity::Error
            )
        );
        assert!(app.auth_url.is_none());
    }
}
