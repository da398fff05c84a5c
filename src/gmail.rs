use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::models::{
    AuthStatus, CredentialSet, Filter, FilterAction, FilterCriteria, Label, LabelType,
};
use crate::secrets::{RingStorage, Secrets};
use async_trait::async_trait;
use futures::future::BoxFuture;
use google_gmail1::oauth2::authenticator::DefaultAuthenticator;
use google_gmail1::oauth2::authenticator_delegate::InstalledFlowDelegate;
use google_gmail1::oauth2::storage::TokenStorage;
use google_gmail1::oauth2::{
    ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
};
use google_gmail1::{Gmail, api};
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.settings.basic",
    "https://www.googleapis.com/auth/gmail.labels",
];

const USER_ID: &str = "me";
const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

// System labels Gmail uses to express the boolean filter actions.
const UNREAD: &str = "UNREAD";
const IMPORTANT: &str = "IMPORTANT";
const TRASH: &str = "TRASH";
const SPAM: &str = "SPAM";

type Hub = Gmail<HttpsConnector<HttpConnector>>;
type UrlSlot = Arc<Mutex<Option<oneshot::Sender<String>>>>;

/// Hands the consent URL to a waiting `ConsentFlow::start`. With nobody
/// waiting the flow is refused and `refused` fires, so API calls never start
/// an interactive login on their own.
struct UrlDelegate {
    slot: UrlSlot,
    refused: Arc<Notify>,
    redirect_uri: String,
}

impl InstalledFlowDelegate for UrlDelegate {
    fn redirect_uri(&self) -> Option<&str> {
        Some(&self.redirect_uri)
    }

    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> BoxFuture<'a, std::result::Result<String, String>> {
        let waiting = self.slot.lock().ok().and_then(|mut slot| slot.take());
        if waiting.is_none() {
            self.refused.notify_waiters();
        }
        Box::pin(async move {
            match waiting {
                Some(tx) => {
                    let _ = tx.send(url.to_string());
                    Ok(String::new())
                }
                None => Err("Authorization required".to_string()),
            }
        })
    }
}

/// The interactive consent flow. At most one runs at a time; it owns the
/// redirect port until the user finishes or a new flow replaces it.
#[derive(Clone, Default)]
struct ConsentFlow {
    pending_url: UrlSlot,
    refused: Arc<Notify>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConsentFlow {
    fn delegate(&self, redirect_uri: &str) -> UrlDelegate {
        UrlDelegate {
            slot: self.pending_url.clone(),
            refused: self.refused.clone(),
            redirect_uri: redirect_uri.to_string(),
        }
    }

    async fn abort_pending(&self) {
        let previous = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = previous {
            handle.abort();
            let _ = handle.await;
            // Let the aborted flow's redirect listener shut down.
            tokio::task::yield_now().await;
            debug!("Aborted previous consent flow");
        }
    }

    /// Requests a token in the background and returns the consent URL the
    /// flow presents. A flow still waiting from an earlier call is aborted.
    async fn start(&self, auth: DefaultAuthenticator) -> Result<String> {
        self.abort_pending().await;

        let (tx, rx) = oneshot::channel();
        if let Ok(mut slot) = self.pending_url.lock() {
            *slot = Some(tx);
        }

        let slot = self.pending_url.clone();
        let handle = tokio::spawn(async move {
            match auth.token(SCOPES).await {
                Ok(_) => info!("Gmail authorization completed"),
                Err(e) => warn!("Gmail authorization did not complete: {}", e),
            }
            // Release a caller still waiting for a URL that never came.
            if let Ok(mut slot) = slot.lock() {
                slot.take();
            }
        });
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }

        rx.await.map_err(|_| {
            Error::Transport("Authorization flow ended before presenting a URL".to_string())
        })
    }

    /// Runs an API call, ending it with `AuthRequired` as soon as it would
    /// need interactive consent.
    async fn guard<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let refused = self.refused.notified();
        tokio::select! {
            result = call => result,
            _ = refused => {
                warn!("Stored token is no longer usable; consent required");
                Err(Error::AuthRequired)
            }
        }
    }
}

async fn build_authenticator(
    credentials: &CredentialSet,
    delegate: UrlDelegate,
    storage: Box<dyn TokenStorage>,
) -> Result<DefaultAuthenticator> {
    let port = validate_credentials(credentials)?;
    InstalledFlowAuthenticator::builder(
        application_secret(credentials),
        InstalledFlowReturnMethod::HTTPPortRedirect(port),
    )
    .flow_delegate(Box::new(delegate))
    .with_storage(storage)
    .build()
    .await
    .map_err(|e| Error::Transport(format!("Failed to build authenticator: {}", e)))
}

#[derive(Clone)]
struct Session {
    auth: DefaultAuthenticator,
    hub: Hub,
}

/// Gateway backed by the Gmail REST API, with secrets in the OS keyring.
pub struct GmailGateway {
    session: tokio::sync::Mutex<Option<Session>>,
    consent: ConsentFlow,
}

impl Default for GmailGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl GmailGateway {
    pub fn new() -> Self {
        Self {
            session: tokio::sync::Mutex::new(None),
            consent: ConsentFlow::default(),
        }
    }

    async fn session(&self) -> Result<Session> {
        let mut session = self.session.lock().await;
        if let Some(existing) = session.as_ref() {
            return Ok(existing.clone());
        }

        let credentials = Secrets::load_credentials()?.ok_or(Error::CredentialsRequired)?;
        let created = self.build_session(&credentials).await?;
        *session = Some(created.clone());
        Ok(created)
    }

    async fn build_session(&self, credentials: &CredentialSet) -> Result<Session> {
        let auth = build_authenticator(
            credentials,
            self.consent.delegate(&credentials.redirect_uri),
            Box::new(RingStorage),
        )
        .await?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| Error::Transport(format!("Failed to load native roots: {}", e)))?
            .https_only()
            .enable_http1()
            .build();
        let hub = Gmail::new(hyper::Client::builder().build(connector), auth.clone());

        Ok(Session { auth, hub })
    }

    async fn hub(&self) -> Result<Hub> {
        if !Secrets::has_token()? {
            return Err(Error::AuthRequired);
        }
        Ok(self.session().await?.hub)
    }
}

#[async_trait]
impl Gateway for GmailGateway {
    async fn check_auth_status(&self) -> Result<AuthStatus> {
        let has_credentials = Secrets::load_credentials()?.is_some_and(|c| c.is_complete());
        let is_authenticated = has_credentials && Secrets::has_token()?;
        Ok(AuthStatus {
            has_credentials,
            is_authenticated,
        })
    }

    async fn get_credentials(&self) -> Result<Option<CredentialSet>> {
        Secrets::load_credentials()
    }

    async fn save_credentials(&self, credentials: &CredentialSet) -> Result<()> {
        validate_credentials(credentials)?;
        Secrets::store_credentials(credentials)?;

        // Tokens belong to the previous OAuth client.
        Secrets::clear_token()?;
        *self.session.lock().await = None;
        info!("Stored OAuth client credentials");
        Ok(())
    }

    async fn authorization_url(&self) -> Result<String> {
        let session = self.session().await?;
        Secrets::clear_token()?;
        self.consent.start(session.auth).await
    }

    async fn list_filters(&self) -> Result<Vec<Filter>> {
        let hub = self.hub().await?;
        let (_, response) = self
            .consent
            .guard(async {
                hub.users()
                    .settings_filters_list(USER_ID)
                    .add_scopes(SCOPES)
                    .doit()
                    .await
                    .map_err(|e| api_error("Failed to list filters", e))
            })
            .await?;

        let filters: Vec<Filter> = response
            .filter
            .unwrap_or_default()
            .into_iter()
            .map(from_api_filter)
            .collect();
        debug!("Gmail returned {} filters", filters.len());
        Ok(filters)
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        let hub = self.hub().await?;
        let (_, label_list) = self
            .consent
            .guard(async {
                hub.users()
                    .labels_list(USER_ID)
                    .add_scopes(SCOPES)
                    .doit()
                    .await
                    .map_err(|e| api_error("Failed to list labels", e))
            })
            .await?;

        Ok(label_list
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| Label {
                id: l.id.unwrap_or_default(),
                name: l.name.unwrap_or_default(),
                label_type: if l.type_.as_deref() == Some("user") {
                    LabelType::User
                } else {
                    LabelType::System
                },
            })
            .collect())
    }

    async fn create_filter(&self, filter: &Filter) -> Result<Filter> {
        debug!("Creating filter: {:?}", filter);
        let hub = self.hub().await?;
        let (_, created) = self
            .consent
            .guard(async {
                hub.users()
                    .settings_filters_create(to_api_filter(filter), USER_ID)
                    .add_scopes(SCOPES)
                    .doit()
                    .await
                    .map_err(|e| api_error("Failed to create filter", e))
            })
            .await?;

        Ok(from_api_filter(created))
    }

    async fn delete_filter(&self, filter_id: &str) -> Result<()> {
        debug!("Deleting filter: {}", filter_id);
        let hub = self.hub().await?;
        self.consent
            .guard(async {
                hub.users()
                    .settings_filters_delete(USER_ID, filter_id)
                    .add_scopes(SCOPES)
                    .doit()
                    .await
                    .map_err(|e| api_error("Failed to delete filter", e))
            })
            .await?;
        Ok(())
    }
}

/// Checks the three fields and returns the port the OAuth redirect listens on.
fn validate_credentials(credentials: &CredentialSet) -> Result<u16> {
    let fields = [
        ("Client ID", &credentials.client_id),
        ("Client Secret", &credentials.client_secret),
        ("Redirect URI", &credentials.redirect_uri),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(Error::InvalidCredentials(format!("{} is required", name)));
    }

    let redirect = Url::parse(&credentials.redirect_uri)
        .map_err(|e| Error::InvalidCredentials(format!("Redirect URI: {}", e)))?;
    redirect.port_or_known_default().ok_or_else(|| {
        Error::InvalidCredentials("Redirect URI must include a port".to_string())
    })
}

fn application_secret(credentials: &CredentialSet) -> ApplicationSecret {
    ApplicationSecret {
        client_id: credentials.client_id.clone(),
        client_secret: credentials.client_secret.clone(),
        auth_uri: AUTH_URI.to_string(),
        token_uri: TOKEN_URI.to_string(),
        redirect_uris: vec![credentials.redirect_uri.clone()],
        ..Default::default()
    }
}

fn api_error(context: &str, e: google_gmail1::Error) -> Error {
    match e {
        google_gmail1::Error::BadRequest(detail) => {
            let error = &detail["error"];
            if error["code"].as_u64() == Some(401) {
                return Error::AuthRequired;
            }
            match error["message"].as_str() {
                Some(message) => Error::RemoteRejected(message.to_string()),
                None => Error::RemoteRejected(format!("{}: {}", context, detail)),
            }
        }
        google_gmail1::Error::MissingToken(_) => Error::AuthRequired,
        google_gmail1::Error::Failure(response) => match response.status().as_u16() {
            401 => Error::AuthRequired,
            status => Error::RemoteRejected(format!("{} (HTTP {})", context, status)),
        },
        other => Error::Transport(format!("{}: {}", context, other)),
    }
}

fn non_empty_list(ids: Vec<String>) -> Option<Vec<String>> {
    (!ids.is_empty()).then_some(ids)
}

/// Gmail has no boolean actions; they are expressed as system label changes.
fn to_api_filter(filter: &Filter) -> api::Filter {
    let c = &filter.criteria;
    let a = &filter.action;

    let mut add = a.add_label_ids.clone();
    if a.mark_as_important {
        add.push(IMPORTANT.to_string());
    }
    if a.delete {
        add.push(TRASH.to_string());
    }
    let mut remove = a.remove_label_ids.clone();
    if a.mark_as_read {
        remove.push(UNREAD.to_string());
    }
    if a.never_spam {
        remove.push(SPAM.to_string());
    }

    api::Filter {
        id: filter.id.clone(),
        criteria: Some(api::FilterCriteria {
            from: c.from.clone(),
            to: c.to.clone(),
            subject: c.subject.clone(),
            query: c.query.clone(),
            has_attachment: c.has_attachment.then_some(true),
            exclude_chats: c.exclude_chats.then_some(true),
            ..Default::default()
        }),
        action: Some(api::FilterAction {
            add_label_ids: non_empty_list(add),
            remove_label_ids: non_empty_list(remove),
            forward: a.forward.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn from_api_filter(filter: api::Filter) -> Filter {
    let c = filter.criteria.unwrap_or_default();
    let a = filter.action.unwrap_or_default();
    let text = |v: Option<String>| v.filter(|s| !s.is_empty());

    let mut action = FilterAction {
        forward: text(a.forward),
        ..Default::default()
    };
    for id in a.add_label_ids.unwrap_or_default() {
        match id.as_str() {
            IMPORTANT => action.mark_as_important = true,
            TRASH => action.delete = true,
            _ => action.add_label_ids.push(id),
        }
    }
    for id in a.remove_label_ids.unwrap_or_default() {
        match id.as_str() {
            UNREAD => action.mark_as_read = true,
            SPAM => action.never_spam = true,
            _ => action.remove_label_ids.push(id),
        }
    }

    Filter {
        id: filter.id,
        criteria: FilterCriteria {
            from: text(c.from),
            to: text(c.to),
            subject: text(c.subject),
            query: text(c.query),
            has_attachment: c.has_attachment.unwrap_or(false),
            exclude_chats: c.exclude_chats.unwrap_or(false),
        },
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::oauth2::storage::TokenInfo;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Default)]
    struct MemoryStorage {
        token: Mutex<Option<TokenInfo>>,
    }

    #[async_trait]
    impl TokenStorage for MemoryStorage {
        async fn set(&self, _scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
            *self.token.lock().unwrap() = Some(token);
            Ok(())
        }

        async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
            self.token.lock().unwrap().clone()
        }
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn authenticator(
        consent: &ConsentFlow,
        creds: &CredentialSet,
    ) -> DefaultAuthenticator {
        build_authenticator(
            creds,
            consent.delegate(&creds.redirect_uri),
            Box::new(MemoryStorage::default()),
        )
        .await
        .unwrap()
    }

    fn credentials(redirect_uri: &str) -> CredentialSet {
        CredentialSet {
            client_id: "123.apps.googleusercontent.com".to_string(),
            client_secret: "shh".to_string(),
            redirect_uri: redirect_uri.to_string(),
        }
    }

    #[test]
    fn test_validate_credentials_returns_redirect_port() {
        assert_eq!(
            validate_credentials(&credentials("http://localhost:3000/auth/callback")),
            Ok(3000)
        );
        assert_eq!(validate_credentials(&credentials("http://localhost/cb")), Ok(80));
    }

    #[test]
    fn test_validate_credentials_rejects_blank_fields() {
        let mut creds = credentials("http://localhost:3000/auth/callback");
        creds.client_secret = "  ".to_string();
        assert_eq!(
            validate_credentials(&creds),
            Err(Error::InvalidCredentials("Client Secret is required".to_string()))
        );
        assert!(matches!(
            validate_credentials(&credentials("not a url")),
            Err(Error::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_boolean_actions_map_to_system_labels() {
        let filter = Filter {
            id: None,
            criteria: FilterCriteria {
                from: Some("a@b.com".to_string()),
                exclude_chats: true,
                ..Default::default()
            },
            action: FilterAction {
                add_label_ids: vec!["Label_1".to_string()],
                mark_as_read: true,
                mark_as_important: true,
                delete: true,
                never_spam: true,
                ..Default::default()
            },
        };

        let api_filter = to_api_filter(&filter);
        let action = api_filter.action.clone().unwrap();
        assert_eq!(
            action.add_label_ids,
            Some(vec!["Label_1".to_string(), IMPORTANT.to_string(), TRASH.to_string()])
        );
        assert_eq!(
            action.remove_label_ids,
            Some(vec![UNREAD.to_string(), SPAM.to_string()])
        );
        let criteria = api_filter.criteria.clone().unwrap();
        assert_eq!(criteria.has_attachment, None);
        assert_eq!(criteria.exclude_chats, Some(true));

        assert_eq!(from_api_filter(api_filter), filter);
    }

    #[test]
    fn test_from_api_filter_drops_empty_values() {
        let api_filter = api::Filter {
            id: Some("ANe1Bmj".to_string()),
            criteria: Some(api::FilterCriteria {
                from: Some(String::new()),
                query: Some("list:dev.example.org".to_string()),
                has_attachment: Some(false),
                ..Default::default()
            }),
            action: Some(api::FilterAction {
                remove_label_ids: Some(vec!["INBOX".to_string()]),
                add_label_ids: Some(vec![]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let filter = from_api_filter(api_filter);
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({
                "id": "ANe1Bmj",
                "criteria": { "query": "list:dev.example.org" },
                "action": { "removeLabelIds": ["INBOX"] }
            })
        );
    }

    #[test]
    fn test_api_error_classification() {
        let rejected = api_error(
            "Failed to create filter",
            google_gmail1::Error::BadRequest(json!({
                "error": { "code": 400, "message": "Filter doesn't have any criteria" }
            })),
        );
        assert_eq!(
            rejected,
            Error::RemoteRejected("Filter doesn't have any criteria".to_string())
        );

        let expired = api_error(
            "Failed to list filters",
            google_gmail1::Error::BadRequest(json!({
                "error": { "code": 401, "message": "Invalid Credentials" }
            })),
        );
        assert_eq!(expired, Error::AuthRequired);

        assert!(matches!(
            api_error("Failed to list labels", google_gmail1::Error::Cancelled),
            Error::Transport(_)
        ));
    }

    #[tokio::test]
    async fn test_consent_url_carries_saved_redirect_uri() {
        let redirect = format!("http://localhost:{}/auth/callback", free_port());
        let creds = credentials(&redirect);
        let consent = ConsentFlow::default();
        let auth = authenticator(&consent, &creds).await;

        let url = timeout(Duration::from_secs(5), consent.start(auth))
            .await
            .unwrap()
            .unwrap();

        let url = Url::parse(&url).unwrap();
        let sent: Vec<String> = url
            .query_pairs()
            .filter(|(key, _)| key == "redirect_uri")
            .map(|(_, value)| value.into_owned())
            .collect();
        assert_eq!(sent, vec![redirect]);
        consent.abort_pending().await;
    }

    #[tokio::test]
    async fn test_restarting_consent_releases_redirect_port() {
        let creds = credentials(&format!("http://localhost:{}/auth/callback", free_port()));
        let consent = ConsentFlow::default();
        let auth = authenticator(&consent, &creds).await;

        let first = timeout(Duration::from_secs(5), consent.start(auth.clone())).await;
        assert!(matches!(first, Ok(Ok(_))));

        // The first flow still listens on the port until it is replaced.
        let second = timeout(Duration::from_secs(5), consent.start(auth)).await;
        assert!(matches!(second, Ok(Ok(_))));
        consent.abort_pending().await;
    }

    #[tokio::test]
    async fn test_call_needing_consent_ends_with_auth_required() {
        let creds = credentials(&format!("http://localhost:{}/auth/callback", free_port()));
        let consent = ConsentFlow::default();
        let auth = authenticator(&consent, &creds).await;

        let call = consent.guard(async {
            auth.token(SCOPES)
                .await
                .map(|_| ())
                .map_err(|e| Error::Transport(e.to_string()))
        });
        let result = timeout(Duration::from_secs(5), call).await;

        assert_eq!(result, Ok(Err(Error::AuthRequired)));
    }

    #[tokio::test]
    async fn test_guard_passes_through_results() {
        let consent = ConsentFlow::default();
        assert_eq!(consent.guard(async { Ok(7) }).await, Ok(7));
        assert_eq!(
            consent
                .guard(async { Err::<(), _>(Error::RemoteRejected("nope".to_string())) })
                .await,
            Err(Error::RemoteRejected("nope".to_string()))
        );
    }

    #[test]
    fn test_delegate_reports_saved_redirect_uri() {
        let consent = ConsentFlow::default();
        let delegate = consent.delegate("http://localhost:3000/auth/callback");
        assert_eq!(
            delegate.redirect_uri(),
            Some("http://localhost:3000/auth/callback")
        );
    }
}
