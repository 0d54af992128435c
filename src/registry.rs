use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use futures_util::future::{BoxFuture, FutureExt as _, Shared};
use tokio::sync::watch;

use crate::{
    engine::{Engine, EngineError, Session},
    history::{self, HistoryStore},
    logging::shorten_identifier,
    magnet::{self, InfoHash},
};

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to add session for '{}': {cause}", shorten_identifier(.identifier))]
    EngineAddFailed {
        identifier: String,
        cause: EngineError,
    },
    #[error("no session for {0}")]
    NotFound(InfoHash),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStatus {
    Created,
    AlreadyActive,
}

impl AddStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "added",
            Self::AlreadyActive => "already_added",
        }
    }
}

type Creation = Shared<BoxFuture<'static, Result<Arc<dyn Session>>>>;

enum Slot {
    Pending(Creation),
    Active {
        session: Arc<dyn Session>,
        generation: u64,
    },
}

#[derive(Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    by_hash: HashMap<InfoHash, String>,
    next_generation: u64,
}

impl Inner {
    fn activate(&mut self, identifier: &str, session: Arc<dyn Session>) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.by_hash
            .insert(session.info_hash(), identifier.to_string());
        self.slots.insert(
            identifier.to_string(),
            Slot::Active {
                session,
                generation,
            },
        );
        generation
    }

    /// Points `info_hash` at a pending identifier unless a live slot already
    /// owns it.
    fn index_pending(&mut self, info_hash: InfoHash, identifier: &str) {
        let owned = self
            .by_hash
            .get(&info_hash)
            .is_some_and(|current| self.slots.contains_key(current));
        if !owned {
            self.by_hash.insert(info_hash, identifier.to_string());
        }
    }

    fn drop_pending(&mut self, identifier: &str) {
        if matches!(self.slots.get(identifier), Some(Slot::Pending(_))) {
            self.slots.remove(identifier);
        }
        self.by_hash.retain(|_, id| id != identifier);
    }
}

#[derive(Debug, Clone, Copy)]
enum Origin {
    Add,
    Recover,
}

enum Attach {
    Active(Arc<dyn Session>),
    Pending(Creation, AddStatus),
}

#[derive(Clone)]
pub struct SessionRegistry {
    engine: Arc<dyn Engine>,
    history: Arc<HistoryStore>,
    inner: Arc<Mutex<Inner>>,
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    match inner.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("session registry lock poisoned; continuing with recovered state");
            poisoned.into_inner()
        }
    }
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn Engine>, history: Arc<HistoryStore>) -> Self {
        Self {
            engine,
            history,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Number of sessions that finished creation and have not failed.
    pub fn active_count(&self) -> usize {
        lock_inner(&self.inner)
            .slots
            .values()
            .filter(|s| matches!(s, Slot::Active { .. }))
            .count()
    }

    pub fn is_active(&self, info_hash: &InfoHash) -> bool {
        self.lookup_active(info_hash).is_some()
    }

    pub fn contains_identifier(&self, identifier: &str) -> bool {
        lock_inner(&self.inner).slots.contains_key(identifier.trim())
    }

    /// Returns the session for `identifier`, creating it through the engine
    /// on first use. Resolves after the history entry for a new session has
    /// been written.
    pub async fn add_or_get(&self, identifier: &str) -> Result<(InfoHash, AddStatus)> {
        let identifier = identifier.trim();
        match self.attach_or_start(identifier, Origin::Add) {
            Attach::Active(session) => Ok((session.info_hash(), AddStatus::AlreadyActive)),
            Attach::Pending(creation, status) => {
                let session = creation.await?;
                Ok((session.info_hash(), status))
            }
        }
    }

    /// Looks up a session by content hash, re-creating it from history when
    /// it is no longer live. A creation already in flight for the hash is
    /// awaited instead of starting another.
    pub async fn get(&self, info_hash: &InfoHash) -> Result<Arc<dyn Session>> {
        match self.lookup(info_hash) {
            Some(Attach::Active(session)) => return Ok(session),
            Some(Attach::Pending(creation, _)) => return creation.await,
            None => {}
        }
        if let Some(session) = self.adopt_engine_session(info_hash) {
            return Ok(session);
        }

        let Some(record) = self.history.find(info_hash).await else {
            return Err(RegistryError::NotFound(*info_hash));
        };
        let identifier = record
            .magnet_uri
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| magnet::magnet_uri_for(*info_hash));
        tracing::info!(
            info_hash = %info_hash,
            identifier = %shorten_identifier(&identifier),
            "session not live; re-creating from history"
        );

        let session = match self.attach_or_start(identifier.trim(), Origin::Recover) {
            Attach::Active(session) => session,
            Attach::Pending(creation, _) => creation.await?,
        };
        if session.info_hash() != *info_hash {
            tracing::warn!(
                requested = %info_hash,
                resolved = %session.info_hash(),
                "history identifier resolved to a different info hash"
            );
        }
        Ok(session)
    }

    fn lookup_active(&self, info_hash: &InfoHash) -> Option<Arc<dyn Session>> {
        match self.lookup(info_hash)? {
            Attach::Active(session) => Some(session),
            Attach::Pending(..) => None,
        }
    }

    fn lookup(&self, info_hash: &InfoHash) -> Option<Attach> {
        let inner = lock_inner(&self.inner);
        let identifier = inner.by_hash.get(info_hash)?;
        match inner.slots.get(identifier)? {
            Slot::Active { session, .. } => Some(Attach::Active(session.clone())),
            Slot::Pending(creation) => {
                Some(Attach::Pending(creation.clone(), AddStatus::AlreadyActive))
            }
        }
    }

    /// Registers a healthy session the engine already runs but this registry
    /// never saw.
    fn adopt_engine_session(&self, info_hash: &InfoHash) -> Option<Arc<dyn Session>> {
        let session = self.engine.get_session(info_hash)?;
        let errors = session.errors();
        if errors.borrow().is_some() {
            return None;
        }

        let identifier = magnet::magnet_uri_for(*info_hash);
        let generation = {
            let mut inner = lock_inner(&self.inner);
            if inner.slots.contains_key(&identifier) {
                return Some(session);
            }
            inner.activate(&identifier, session.clone())
        };
        tracing::info!(info_hash = %info_hash, "adopted session already running in engine");
        self.watch_failures(identifier, generation, errors);
        Some(session)
    }

    /// Lookup and pending insertion share one lock with no await in between,
    /// so concurrent callers for a new identifier attach to the same creation.
    fn attach_or_start(&self, identifier: &str, origin: Origin) -> Attach {
        let mut inner = lock_inner(&self.inner);
        match inner.slots.get(identifier) {
            Some(Slot::Active { session, .. }) => return Attach::Active(session.clone()),
            Some(Slot::Pending(creation)) => {
                return Attach::Pending(creation.clone(), AddStatus::AlreadyActive);
            }
            None => {}
        }

        let creation = self.start_creation(identifier.to_string(), origin);
        inner
            .slots
            .insert(identifier.to_string(), Slot::Pending(creation.clone()));
        if let Ok(link) = magnet::parse_identifier(identifier) {
            inner.index_pending(link.info_hash, identifier);
        }
        Attach::Pending(creation, AddStatus::Created)
    }

    /// The engine call runs in its own task so it completes, and the slot is
    /// settled, even when every waiting request has gone away.
    fn start_creation(&self, identifier: String, origin: Origin) -> Creation {
        let this = self.clone();
        let id = identifier.clone();
        let task = tokio::spawn(async move { this.create(id, origin).await });

        let inner = Arc::downgrade(&self.inner);
        async move {
            match task.await {
                Ok(res) => res,
                Err(join_err) => {
                    if let Some(inner) = inner.upgrade() {
                        lock_inner(&inner).drop_pending(&identifier);
                    }
                    Err(RegistryError::EngineAddFailed {
                        identifier,
                        cause: EngineError::Unavailable(format!(
                            "session creation task failed: {join_err}"
                        )),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn create(&self, identifier: String, origin: Origin) -> Result<Arc<dyn Session>> {
        let session = match self.engine.add_session(&identifier).await {
            Ok(session) => session,
            Err(cause) => {
                lock_inner(&self.inner).drop_pending(&identifier);
                tracing::warn!(
                    identifier = %shorten_identifier(&identifier),
                    error = %cause,
                    "engine failed to add session"
                );
                return Err(RegistryError::EngineAddFailed { identifier, cause });
            }
        };

        let info_hash = session.info_hash();
        let errors = session.errors();
        let generation = lock_inner(&self.inner).activate(&identifier, session.clone());
        self.watch_failures(identifier.clone(), generation, errors);

        match origin {
            Origin::Add => {
                tracing::info!(
                    info_hash = %info_hash,
                    identifier = %shorten_identifier(&identifier),
                    files = session.files().len(),
                    "session added"
                );
                let record = history::extract_record(session.as_ref(), &identifier);
                self.history.prepend(record).await;
            }
            Origin::Recover => {
                tracing::info!(info_hash = %info_hash, "session re-created from history");
            }
        }
        Ok(session)
    }

    /// Drops the slot once the session reports a terminal error. Holds only a
    /// weak reference so a dropped registry does not keep watchers alive.
    fn watch_failures(
        &self,
        identifier: String,
        generation: u64,
        mut errors: watch::Receiver<Option<String>>,
    ) {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let failure = errors.borrow_and_update().clone();
                if let Some(reason) = failure {
                    evict(&inner, &identifier, generation, &reason);
                    return;
                }
                if errors.changed().await.is_err() {
                    return;
                }
            }
        });
    }
}

fn evict(inner: &Weak<Mutex<Inner>>, identifier: &str, generation: u64, reason: &str) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut inner = lock_inner(&inner);
    let info_hash = match inner.slots.get(identifier) {
        Some(Slot::Active {
            session,
            generation: current,
        }) if *current == generation => session.info_hash(),
        _ => return,
    };
    inner.slots.remove(identifier);
    if inner.by_hash.get(&info_hash).map(String::as_str) == Some(identifier) {
        inner.by_hash.remove(&info_hash);
    }
    tracing::warn!(
        info_hash = %info_hash,
        identifier = %shorten_identifier(identifier),
        reason = %reason,
        "session failed; removed from registry"
    );
}
