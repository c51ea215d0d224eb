//! Collection flow.
//!
//! One listener per collection path. Each batch is applied under the
//! listener's registry lock, in delivery order, so a batch is atomic with
//! respect to other batches and to teardown.

use super::children;
use super::engine::Session;
use crate::error::{Result, SyncError};
use crate::projection::Placement;
use crate::query::QueryDescriptor;
use crate::source::BatchSink;
use crate::subscriptions::{Registry, Subscription, SyncEvent};
use crate::types::{with_id, ChangeBatch, ChangeKind, DocumentChange, Emission};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct CollectionListener {
    session: Arc<Session>,
    desc: QueryDescriptor,
    child_keys: Vec<String>,
    /// Placement of each member entity.
    members: Placement,
    registry: Arc<Mutex<Registry>>,
    scope: Subscription,
}

pub(super) fn open(
    session: &Arc<Session>,
    desc: &QueryDescriptor,
    placement: Placement,
    owner: &Subscription,
) -> Result<Subscription> {
    let scope = Subscription::new();
    let registry = Arc::new(Mutex::new(Registry::new()));

    let listener = Arc::new(CollectionListener {
        session: Arc::clone(session),
        desc: desc.clone(),
        child_keys: desc.child_keys(),
        members: placement.members(),
        registry: Arc::clone(&registry),
        scope: scope.clone(),
    });
    let sink: BatchSink = Arc::new(move |emission| listener.on_emission(emission));

    let remote = session
        .source()
        .watch_collection(&desc.path, desc.filter.as_ref(), sink)?;
    debug!(path = %desc.path, "collection listener opened");

    scope.add(move || remote.close());
    let path = desc.path.clone();
    scope.add(move || {
        let mut registry = registry.lock();
        let handles = registry.close();
        let count = handles.len();
        for handle in handles {
            handle.cancel();
        }
        trace!(path = %path, entities = count, "collection listener closed");
    });

    owner.add_child(&scope);
    Ok(scope)
}

impl CollectionListener {
    fn on_emission(&self, emission: Emission<ChangeBatch>) {
        let mut registry = self.registry.lock();
        if registry.is_closed() {
            return;
        }

        match emission {
            Emission::Next(batch) => {
                trace!(path = %self.desc.path, changes = batch.len(), "applying batch");
                for change in batch {
                    if let Err(error) = self.apply(&mut registry, change) {
                        self.terminate(registry, SyncEvent::Failed {
                            path: self.desc.path.clone(),
                            error,
                        });
                        return;
                    }
                }
            }
            Emission::Failed(message) => {
                let error = SyncError::UpstreamListenerFailure {
                    path: self.desc.path.clone(),
                    message,
                };
                self.terminate(registry, SyncEvent::Failed {
                    path: self.desc.path.clone(),
                    error,
                });
            }
            Emission::Completed => {
                self.terminate(registry, SyncEvent::Completed {
                    path: self.desc.path.clone(),
                });
            }
        }
    }

    fn apply(&self, registry: &mut Registry, change: DocumentChange) -> Result<()> {
        let projector = self.session.projector();
        let DocumentChange { kind, id, data } = change;

        match kind {
            ChangeKind::Added => {
                // Re-added without a removal in between: the old children belong
                // to a stale lifetime.
                if let Some(stale) = registry.deregister(&id) {
                    warn!(path = %self.desc.path, id = %id, "entity added twice, replacing");
                    stale.cancel();
                }

                let handle = Subscription::new();
                if self.desc.children.is_empty() {
                    projector.put_entity(&self.members, &id, data, &self.child_keys)?;
                } else {
                    let parent = with_id(self.session.id_key(), &id, data.clone());
                    projector.put_entity(&self.members, &id, data, &self.child_keys)?;
                    children::open(
                        &self.session,
                        &self.desc.children,
                        &self.members.slot_for(&id),
                        &parent,
                        &handle,
                    );
                }
                registry.register(id, handle);
            }
            ChangeKind::Modified => {
                projector.merge_entity(&self.members, &id, data)?;
            }
            ChangeKind::Removed => match registry.deregister(&id) {
                Some(handle) => {
                    handle.cancel();
                    projector.drop_entity(&self.members, &id)?;
                }
                None => {
                    let error = SyncError::OrphanRemoval {
                        path: self.desc.path.clone(),
                        id,
                    };
                    warn!(%error, "skipping removal");
                    self.session.report(SyncEvent::Inconsistency {
                        path: self.desc.path.clone(),
                        error,
                    });
                }
            },
        }
        Ok(())
    }

    /// End this listener: cancel every entity's children, then report.
    /// Records already written stay in the store.
    fn terminate(&self, mut registry: MutexGuard<'_, Registry>, event: SyncEvent) {
        for handle in registry.close() {
            handle.cancel();
        }
        drop(registry);

        self.scope.cancel();
        match event {
            SyncEvent::Failed { path, error } => self.session.fail(&path, error),
            other => self.session.report(other),
        }
    }
}
