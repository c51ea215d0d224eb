//! Single-document flow.

use super::children;
use super::engine::Session;
use crate::config::MissingDocumentPolicy;
use crate::error::{Result, SyncError};
use crate::projection::Placement;
use crate::query::QueryDescriptor;
use crate::source::DocumentSink;
use crate::subscriptions::{Subscription, SyncEvent};
use crate::types::{with_id, Emission, Entity};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Default)]
struct DocumentFlow {
    /// Children of the current lifetime of the document, opened on its first
    /// emission.
    children: Option<Subscription>,
    closed: bool,
}

impl DocumentFlow {
    fn cancel_children(&mut self) {
        if let Some(children) = self.children.take() {
            children.cancel();
        }
    }
}

struct DocumentListener {
    session: Arc<Session>,
    desc: QueryDescriptor,
    child_keys: Vec<String>,
    placement: Placement,
    id: String,
    flow: Arc<Mutex<DocumentFlow>>,
    scope: Subscription,
}

pub(super) fn open(
    session: &Arc<Session>,
    desc: &QueryDescriptor,
    placement: Placement,
    owner: &Subscription,
) -> Result<Subscription> {
    let id = desc
        .id()
        .ok_or_else(|| SyncError::InvalidQueryShape(format!("empty path {:?}", desc.path)))?
        .to_string();
    let scope = Subscription::new();
    let flow = Arc::new(Mutex::new(DocumentFlow::default()));

    let listener = Arc::new(DocumentListener {
        session: Arc::clone(session),
        desc: desc.clone(),
        child_keys: desc.child_keys(),
        placement,
        id,
        flow: Arc::clone(&flow),
        scope: scope.clone(),
    });
    let sink: DocumentSink = Arc::new(move |emission| listener.on_emission(emission));

    let remote = session.source().watch_document(&desc.path, sink)?;
    debug!(path = %desc.path, "document listener opened");

    scope.add(move || remote.close());
    let path = desc.path.clone();
    scope.add(move || {
        let mut flow = flow.lock();
        flow.closed = true;
        flow.cancel_children();
        trace!(path = %path, "document listener closed");
    });

    owner.add_child(&scope);
    Ok(scope)
}

impl DocumentListener {
    fn on_emission(&self, emission: Emission<Option<Entity>>) {
        let mut flow = self.flow.lock();
        if flow.closed {
            return;
        }

        match emission {
            Emission::Next(Some(data)) => {
                if let Err(error) = self.write(&mut flow, data) {
                    self.terminate(flow, SyncEvent::Failed {
                        path: self.desc.path.clone(),
                        error,
                    });
                }
            }
            Emission::Next(None) => {
                if let Err(error) = self.vanish(&mut flow) {
                    self.terminate(flow, SyncEvent::Failed {
                        path: self.desc.path.clone(),
                        error,
                    });
                }
            }
            Emission::Completed => {
                let event = match self.vanish(&mut flow) {
                    Ok(()) => SyncEvent::Completed {
                        path: self.desc.path.clone(),
                    },
                    Err(error) => SyncEvent::Failed {
                        path: self.desc.path.clone(),
                        error,
                    },
                };
                self.terminate(flow, event);
            }
            Emission::Failed(message) => {
                let error = SyncError::UpstreamListenerFailure {
                    path: self.desc.path.clone(),
                    message,
                };
                self.terminate(flow, SyncEvent::Failed {
                    path: self.desc.path.clone(),
                    error,
                });
            }
        }
    }

    /// Replace the stored document; open its children on the first emission
    /// of this lifetime.
    fn write(&self, flow: &mut DocumentFlow, data: Entity) -> Result<()> {
        let projector = self.session.projector();
        let parent = if flow.children.is_none() && !self.desc.children.is_empty() {
            Some(with_id(self.session.id_key(), &self.id, data.clone()))
        } else {
            None
        };

        projector.put_entity(&self.placement, &self.id, data, &self.child_keys)?;
        trace!(path = %self.desc.path, "document written");

        if let Some(parent) = parent {
            let children = Subscription::new();
            children::open(
                &self.session,
                &self.desc.children,
                &self.placement.slot_for(&self.id),
                &parent,
                &children,
            );
            flow.children = Some(children);
        }
        Ok(())
    }

    /// The document no longer exists: drop its children, then its data.
    fn vanish(&self, flow: &mut DocumentFlow) -> Result<()> {
        flow.cancel_children();
        match self.session.ctx().config.missing_document {
            MissingDocumentPolicy::Clear => {
                debug!(path = %self.desc.path, "document gone, clearing");
                self.session.projector().drop_entity(&self.placement, &self.id)
            }
            MissingDocumentPolicy::Keep => Ok(()),
        }
    }

    /// End this listener: tear down the subtree, then report.
    fn terminate(&self, mut flow: parking_lot::MutexGuard<'_, DocumentFlow>, event: SyncEvent) {
        flow.closed = true;
        flow.cancel_children();
        drop(flow);

        self.scope.cancel();
        match event {
            SyncEvent::Failed { path, error } => self.session.fail(&path, error),
            other => self.session.report(other),
        }
    }
}
