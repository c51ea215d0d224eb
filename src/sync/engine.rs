//! Sync entry point.

use super::{collection, document};
use crate::config::SyncContext;
use crate::error::{Result, SyncError};
use crate::projection::{Placement, Projector};
use crate::query::{validate_target, QueryDescriptor, SyncTarget};
use crate::source::RemoteSource;
use crate::store::EntityStore;
use crate::subscriptions::{Subscription, SyncEvent, SyncHandle};
use crossbeam_channel::{bounded, Sender, TrySendError};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// State shared by every listener of one `sync` call.
pub(crate) struct Session {
    ctx: Arc<SyncContext>,
    events: Sender<SyncEvent>,
}

impl Session {
    pub(crate) fn source(&self) -> &dyn RemoteSource {
        self.ctx.source.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn EntityStore {
        self.ctx.store.as_ref()
    }

    pub(crate) fn ctx(&self) -> &SyncContext {
        &self.ctx
    }

    pub(crate) fn id_key(&self) -> &str {
        &self.ctx.config.id_key
    }

    pub(crate) fn projector(&self) -> Projector<'_> {
        Projector::new(self.store(), self.id_key())
    }

    /// Hand an event to the caller. Dropped with a warning when the buffer is full.
    pub(crate) fn report(&self, event: SyncEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(path = event.path(), "event buffer full, dropping {:?}", event);
            }
            // Handle already gone; nobody is listening.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub(crate) fn fail(&self, path: &str, error: SyncError) {
        warn!(path, %error, "sync failed");
        self.report(SyncEvent::Failed {
            path: path.to_string(),
            error,
        });
    }
}

/// Keeps a flat entity store in sync with nested remote queries.
///
/// # Example
///
/// ```ignore
/// let engine = SyncEngine::new(SyncContext::new(source, store));
///
/// let handle = engine.sync(
///     document_descriptor("users/u1")
///         .child("todos", collection_descriptor("users/u1/todos", None)),
/// )?;
/// ```
#[derive(Clone, Debug)]
pub struct SyncEngine {
    ctx: Arc<SyncContext>,
}

impl SyncEngine {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Start syncing a path, a descriptor, or several of them.
    ///
    /// Fails with [`SyncError::InvalidQueryShape`] before opening anything if
    /// the target is malformed. If a top-level listener cannot be opened,
    /// everything opened so far is closed and the error is returned.
    pub fn sync(&self, target: impl Into<SyncTarget>) -> Result<SyncHandle> {
        let target = target.into();
        validate_target(&target)?;

        let (sender, receiver) = bounded(self.ctx.config.event_buffer);
        let session = Arc::new(Session {
            ctx: Arc::clone(&self.ctx),
            events: sender,
        });

        let root = Subscription::new();
        let mut members = Vec::new();
        if let Err(e) = open_target(&session, &target, &root, &mut members) {
            root.cancel();
            return Err(e);
        }

        debug!(members = members.len(), "sync started");
        Ok(SyncHandle::new(root, members, receiver))
    }

    /// Start syncing a dynamically shaped query (see [`SyncTarget::from_json`]).
    pub fn sync_json(&self, query: &Value) -> Result<SyncHandle> {
        self.sync(SyncTarget::from_json(query)?)
    }
}

fn open_target(
    session: &Arc<Session>,
    target: &SyncTarget,
    root: &Subscription,
    members: &mut Vec<Subscription>,
) -> Result<()> {
    match target {
        SyncTarget::Path(path) => {
            let desc = QueryDescriptor::new(path.as_str());
            members.push(open_query(session, &desc, Placement::Root, root)?);
        }
        SyncTarget::Descriptor(desc) => {
            members.push(open_query(session, desc, Placement::Root, root)?);
        }
        SyncTarget::Many(targets) => {
            for target in targets {
                open_target(session, target, root, members)?;
            }
        }
    }
    Ok(())
}

/// Open the listener for `desc`, owned by `owner`. Document paths get a
/// document flow, collection paths a collection flow.
pub(crate) fn open_query(
    session: &Arc<Session>,
    desc: &QueryDescriptor,
    placement: Placement,
    owner: &Subscription,
) -> Result<Subscription> {
    if desc.is_document() {
        document::open(session, desc, placement, owner)
    } else {
        collection::open(session, desc, placement, owner)
    }
}
