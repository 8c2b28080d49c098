use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::persistence_gateway::PersistenceGateway;
use super::reply_engine::ReplyEngine;
use crate::models::SharedStore;

/// Source of the signed-in user at startup.
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    async fn current_user(&self) -> Option<String>;
}

/// Provider with a fixed answer, for the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSessionProvider {
    user_id: Option<String>,
}

impl StaticSessionProvider {
    pub fn new(user_id: Option<String>) -> Self {
        Self { user_id }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn current_user(&self) -> Option<String> {
        self.user_id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(String),
    SignedOut,
}

/// Keeps the store and the persistence session in step with sign-in state.
///
/// Every event bumps a generation counter; a hydration only lands in the
/// store if no other event arrived while it was loading.
#[derive(Clone)]
pub struct SessionBridge {
    store: SharedStore,
    gateway: PersistenceGateway,
    provider: Arc<dyn SessionProvider>,
    engine: Option<ReplyEngine>,
    generation: Arc<AtomicU64>,
}

impl SessionBridge {
    pub fn new(
        store: SharedStore,
        gateway: PersistenceGateway,
        provider: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            store,
            gateway,
            provider,
            engine: None,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stop the engine's in-flight replies on sign-out.
    pub fn with_engine(mut self, engine: ReplyEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Resolve the existing session, hydrating when someone is signed in.
    /// Returns true if a hydration was applied.
    pub async fn mount(&self) -> bool {
        match self.provider.current_user().await {
            Some(user_id) => self.handle_event(SessionEvent::SignedIn(user_id)).await,
            None => {
                debug!("No session on mount, keeping local conversations");
                false
            }
        }
    }

    /// Apply one event and wait for its hydration, if any. Returns false when
    /// a hydration failed or was superseded.
    pub async fn handle_event(&self, event: SessionEvent) -> bool {
        match self.begin(event) {
            Some((user_id, generation)) => self.hydrate(&user_id, generation).await,
            None => true,
        }
    }

    /// Consume events until every sender is dropped. Hydrations run in the
    /// background so a sign-out never waits behind a slow load.
    pub async fn run(self, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if let Some((user_id, generation)) = self.begin(event) {
                let bridge = self.clone();
                tokio::spawn(async move {
                    bridge.hydrate(&user_id, generation).await;
                });
            }
        }
        debug!("Session event channel closed");
    }

    /// The synchronous part of an event. Returns the hydration to run.
    fn begin(&self, event: SessionEvent) -> Option<(String, u64)> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        match event {
            SessionEvent::SignedIn(user_id) => {
                info!(user_id = %user_id, generation, "Signed in");
                self.gateway.set_session(Some(user_id.clone()));
                Some((user_id, generation))
            }
            SessionEvent::SignedOut => {
                info!(generation, "Signed out");
                self.gateway.set_session(None);
                if let Some(engine) = &self.engine {
                    engine.stop_all();
                }
                self.store.lock().reset();
                None
            }
        }
    }

    async fn hydrate(&self, user_id: &str, generation: u64) -> bool {
        // The gateway logs failures; the store stays as it was.
        let Ok(conversations) = self.gateway.hydrate(user_id).await else {
            return false;
        };

        let mut store = self.store.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(user_id = %user_id, generation, "Discarding stale hydration");
            return false;
        }
        store.replace_all(conversations);
        true
    }
}
