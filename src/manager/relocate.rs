// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::Manager;
use crate::{
    element::{Element, ElementId},
    error::{Error, Result},
    lifecycle::Operation,
    payload::Payload,
    session::Session,
    validation::Validation,
};

/// The stored parent a subtree moved to `to` hangs off; `None` is the root.
///
/// A target that is no longer stored resolves to the root.
fn target_parent<I, P>(destination: &Session<I, P>, to: Option<&Element<I, P>>) -> Option<I>
where
    I: ElementId,
    P: Payload,
{
    to.filter(|t| !t.is_root())
        .and_then(|t| destination.resolve(t.id()))
}

impl<I, P> Manager<I, P>
where
    I: ElementId,
    P: Payload,
{
    /// Moves `from` and its subtree below `to`.
    ///
    /// The subtree leaves its session and joins the session of `to`. With `to` set to `None`,
    /// or to an element that is no longer stored, the subtree becomes a direct child of the root
    /// of the current session; with `to` set to a root element, of that root's session. The moved
    /// element's parent id is rewritten to the new parent.
    ///
    /// Source and target must be fully [`Attached`](crate::Lifecycle::Attached). Within one
    /// session, moving an element below its own subtree fails with [`Error::Cycle`]; across
    /// sessions, none of the moving ids may be taken in the destination.
    pub fn cut(
        &mut self,
        from: &Element<I, P>,
        to: Option<&Element<I, P>>,
    ) -> Result<Element<I, P>, I> {
        let plan = Validation::new(&self.transaction, Operation::Cut, from, to).run()?;
        let id = from.id().cloned().ok_or(Error::RootElement)?;
        let source = plan.source.ok_or(Error::StaleSession)?;
        if !self.session(source)?.contains_id(&id) {
            return Err(Error::ElementNotFound { id });
        }
        let parent = target_parent(self.session(plan.destination)?, to);

        if source == plan.destination {
            let session = self.session_mut(source)?;
            if let Some(parent) = &parent {
                if *parent == id || session.is_descendant(&id, parent) {
                    return Err(Error::Cycle { id });
                }
            }
            session.unlink(&id);
            session.link(&id, parent.clone());
            if let Some(node) = session.node_mut(&id) {
                node.parent_id = parent;
            }
        } else {
            let nodes = self.session_mut(source)?.take_subtree(&id);
            self.session_mut(plan.destination)?
                .adopt(nodes, &id, parent);
        }

        let destination = self.session(plan.destination)?;
        tracing::debug!(
            session = destination.name(),
            id = ?id,
            cross_session = source != plan.destination,
            "element cut"
        );
        destination.get(&id).ok_or(Error::ElementNotFound { id })
    }

    /// Copies `from` and its subtree below `to` in another session.
    ///
    /// The destination is chosen as for [`Manager::cut`]. Ids are kept, so copying into the
    /// session `from` lives in always fails with [`Error::DuplicateId`]. The source is left
    /// untouched.
    pub fn copy(
        &mut self,
        from: &Element<I, P>,
        to: Option<&Element<I, P>>,
    ) -> Result<Element<I, P>, I> {
        let plan = Validation::new(&self.transaction, Operation::Copy, from, to).run()?;
        let id = from.id().cloned().ok_or(Error::RootElement)?;
        let source = self.session(plan.source.ok_or(Error::StaleSession)?)?;
        if !source.contains_id(&id) {
            return Err(Error::ElementNotFound { id });
        }
        let nodes = source.clone_subtree(&id);

        let destination = self.session_mut(plan.destination)?;
        let parent = target_parent(destination, to);
        destination.adopt(nodes, &id, parent);
        tracing::debug!(session = destination.name(), id = ?id, "element copied");
        destination.get(&id).ok_or(Error::ElementNotFound { id })
    }
}
