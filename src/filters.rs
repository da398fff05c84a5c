use crate::auth::AuthState;
use crate::codec::{self, FilterDraft, LabelLookup};
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::models::{Filter, Label, LabelType};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Sole owner of the cached filters and labels of the signed-in account.
///
/// Caches are replaced wholesale on every fetch. Operations are not guarded
/// against concurrent use; the UI issues them one at a time.
pub struct FilterStore {
    gateway: Arc<dyn Gateway>,
    auth: watch::Receiver<AuthState>,
    filters: Vec<Filter>,
    labels: Vec<Label>,
}

impl FilterStore {
    pub fn new(gateway: Arc<dyn Gateway>, auth: watch::Receiver<AuthState>) -> Self {
        Self {
            gateway,
            auth,
            filters: Vec::new(),
            labels: Vec::new(),
        }
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.auth.borrow().is_authenticated() {
            Ok(())
        } else {
            Err(Error::AuthRequired)
        }
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Labels a new filter may add or remove. System labels are excluded.
    pub fn assignable_labels(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter().filter(|l| l.label_type == LabelType::User)
    }

    pub fn label_lookup(&self) -> LabelLookup<'_> {
        LabelLookup::new(self.labels())
    }

    pub async fn list(&mut self) -> Result<&[Filter]> {
        self.ensure_authenticated()?;
        let filters = self.gateway.list_filters().await?;
        debug!("Loaded {} filters", filters.len());
        self.filters = filters;
        Ok(&self.filters)
    }

    /// Encodes and submits the draft, then reloads the whole list so the cache
    /// carries server-assigned ids. The draft itself is never modified.
    pub async fn create(&mut self, draft: &FilterDraft) -> Result<Filter> {
        self.ensure_authenticated()?;
        let filter = codec::encode(draft);
        let created = self.gateway.create_filter(&filter).await?;
        debug!("Created filter {:?}", created.id);

        if let Err(e) = self.list().await {
            warn!("Filter created but reloading filters failed: {}", e);
        }
        Ok(created)
    }

    pub async fn delete(&mut self, filter_id: &str) -> Result<()> {
        self.ensure_authenticated()?;
        self.gateway.delete_filter(filter_id).await?;
        self.filters.retain(|f| f.id.as_deref() != Some(filter_id));
        debug!("Deleted filter {}", filter_id);
        Ok(())
    }

    pub async fn list_labels(&mut self) -> Result<&[Label]> {
        self.ensure_authenticated()?;
        let labels = self.gateway.list_labels().await?;
        debug!("Loaded {} labels", labels.len());
        self.labels = labels;
        Ok(&self.labels)
    }
}
