//! Session Manager
//!
//! Owns the single upstream client handle and the map of resident sessions.
//! Sessions are bound to the client generation that created them; after a
//! credential refresh they are rebuilt from metadata, never migrated.
//!
//! Concurrent requests for the same id are not deduplicated: both may build a
//! session and the last insert wins.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::credentials::CredentialPair;
use crate::storage::ConversationStore;
use crate::types::{ConversationId, RelayError, Result, UpstreamError};
use crate::upstream::{UpstreamClient, UpstreamConnector, UpstreamModel, UpstreamSession};

/// Where an acquired session came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    /// Resident in this process
    Memory,
    /// Rebuilt from a persisted conversation record
    Persisted,
    /// Started without prior metadata
    Fresh,
}

impl SessionOrigin {
    pub fn is_recovered(&self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

pub struct AcquiredSession {
    pub id: ConversationId,
    pub session: Arc<dyn UpstreamSession>,
    pub origin: SessionOrigin,
}

pub struct SessionManager {
    connector: Arc<dyn UpstreamConnector>,
    store: Arc<dyn ConversationStore>,
    client: RwLock<Option<Arc<dyn UpstreamClient>>>,
    sessions: DashMap<ConversationId, Arc<dyn UpstreamSession>>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn UpstreamConnector>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            connector,
            store,
            client: RwLock::new(None),
            sessions: DashMap::new(),
        }
    }

    pub async fn has_client(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// Resident session count
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// (Re)initialize the shared client; the old handle is kept on failure
    pub async fn replace_client(&self, pair: &CredentialPair) -> std::result::Result<(), UpstreamError> {
        let client = self.connector.connect(pair).await?;
        *self.client.write().await = Some(client);
        info!("Upstream client replaced: {}", pair.preview());
        Ok(())
    }

    async fn current_client(&self) -> Result<Arc<dyn UpstreamClient>> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| RelayError::InitializationFailed("upstream client not initialized".into()))
    }

    /// Memory → persisted record → fresh session
    pub async fn get_or_create(
        &self,
        conversation_id: Option<ConversationId>,
        model: UpstreamModel,
    ) -> Result<AcquiredSession> {
        let client = self.current_client().await?;

        let Some(id) = conversation_id else {
            let id = ConversationId::generate();
            debug!(conversation_id = %id, "Starting new conversation");
            return Ok(self.insert_fresh(&client, id, None, model, SessionOrigin::Fresh));
        };

        if let Some(session) = self.sessions.get(&id).map(|entry| entry.value().clone()) {
            debug!(conversation_id = %id, "Using resident session");
            return Ok(AcquiredSession {
                id,
                session,
                origin: SessionOrigin::Memory,
            });
        }

        match self.load_record(&id).await {
            Some(metadata) => {
                info!(conversation_id = %id, "Recovered session from persisted record");
                Ok(self.insert_fresh(&client, id, Some(metadata), model, SessionOrigin::Persisted))
            }
            None => {
                debug!(conversation_id = %id, "No record; starting fresh session");
                Ok(self.insert_fresh(&client, id, None, model, SessionOrigin::Fresh))
            }
        }
    }

    /// Rebuild a session against the current client, keeping its metadata
    pub async fn rederive(
        &self,
        id: &ConversationId,
        model: UpstreamModel,
    ) -> Result<Arc<dyn UpstreamSession>> {
        let client = self.current_client().await?;

        let resident = self
            .sessions
            .get(id)
            .and_then(|entry| entry.value().metadata());
        let metadata = match resident {
            Some(metadata) => Some(metadata),
            None => self.load_record(id).await,
        };

        debug!(
            conversation_id = %id,
            has_metadata = metadata.is_some(),
            "Rederiving session on refreshed client"
        );
        let session = client.start_session(metadata, model);
        self.sessions.insert(id.clone(), session.clone());
        Ok(session)
    }

    /// Evict a resident session; returns whether one was resident
    pub fn forget(&self, id: &ConversationId) -> bool {
        self.sessions.remove(id).is_some()
    }

    fn insert_fresh(
        &self,
        client: &Arc<dyn UpstreamClient>,
        id: ConversationId,
        metadata: Option<Value>,
        model: UpstreamModel,
        origin: SessionOrigin,
    ) -> AcquiredSession {
        let session = client.start_session(metadata, model);
        self.sessions.insert(id.clone(), session.clone());
        AcquiredSession {
            id,
            session,
            origin,
        }
    }

    /// Unreadable records count as absent so the request can continue fresh
    async fn load_record(&self, id: &ConversationId) -> Option<Value> {
        match self.store.get(id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(conversation_id = %id, "Failed to load conversation record: {}", e);
                None
            }
        }
    }
}
