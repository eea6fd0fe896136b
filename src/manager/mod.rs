// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Operations on the sessions of a [`Transaction`].
//!
//! Every mutating operation runs its [validation pipeline](crate::validation) first and only
//! touches a tree once all checks passed. Results are always fresh snapshots of what was stored.
//!
//! # Snapshots and commits
//!
//! [`Manager::get_element_by_id`] and friends hand out owned [`Element`]s. Editing a snapshot
//! marks it [`Lifecycle::Detached`](crate::Lifecycle::Detached) and changes nothing stored; the
//! only way to commit an edit is [`Manager::update_element`]. Detached elements cannot be cut,
//! copied or removed until they have been committed.
//!
//! # Moving between sessions
//!
//! [`Manager::cut`] and [`Manager::copy`] take their destination from the target element: its
//! session receives the subtree. Without a target, or with a root element as target, the subtree
//! lands below the root of the current session (or of the root's session, respectively).
use crate::{
    element::{Element, ElementId},
    error::{Error, Result},
    lifecycle::{Lifecycle, Operation},
    payload::Payload,
    session::{Session, SessionKey},
    transaction::Transaction,
    validation::{self, Validation},
};

mod relocate;
mod update;

/// Entry point for building and restructuring session trees.
#[derive(Debug, Clone)]
pub struct Manager<I, P> {
    transaction: Transaction<I, P>,
}

impl<I, P> Default for Manager<I, P> {
    fn default() -> Self {
        Self {
            transaction: Transaction::default(),
        }
    }
}

impl<I, P> Manager<I, P>
where
    I: ElementId,
    P: Payload,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The session registry.
    pub fn transaction(&self) -> &Transaction<I, P> {
        &self.transaction
    }

    /// The session registry, for creating, selecting and destroying sessions.
    pub fn transaction_mut(&mut self) -> &mut Transaction<I, P> {
        &mut self.transaction
    }

    fn session(&self, key: SessionKey) -> Result<&Session<I, P>, I> {
        self.transaction
            .session_by_key(key)
            .ok_or(Error::StaleSession)
    }

    fn session_mut(&mut self, key: SessionKey) -> Result<&mut Session<I, P>, I> {
        self.transaction
            .session_by_key_mut(key)
            .ok_or(Error::StaleSession)
    }

    fn current(&self) -> Result<&Session<I, P>, I> {
        validation::checked_out(&self.transaction)
    }

    /// Creates a new element that is not part of any session yet.
    ///
    /// This is the same as [`Element::new`]; the element still has to be persisted.
    pub fn create_element(
        &self,
        id: I,
        parent_id: Option<I>,
        payload: Option<P>,
    ) -> Result<Element<I, P>, I> {
        Element::new(id, parent_id, payload)
    }

    /// Stores a new element and its subtree in the current session.
    ///
    /// The element is linked under the element its parent id names, or under the root if no such
    /// element exists. Every element of the subtree must be
    /// [`NotExisted`](Lifecycle::NotExisted) and no id may be taken already.
    ///
    /// ```rust
    /// # use arbor::{Error, Manager, triples};
    /// let mut manager = Manager::<u32, &str>::new();
    /// manager.transaction_mut().initialize_session("s", triples![(5, None, "old")])?;
    ///
    /// let fresh = manager.create_element(5, None, Some("new"))?;
    /// assert_eq!(manager.persist_element(&fresh), Err(Error::DuplicateId { id: 5 }));
    /// assert_eq!(manager.get_element_by_id(&5)?.unwrap().payload(), Some(&"old"));
    /// # Ok::<(), Error<u32>>(())
    /// ```
    pub fn persist_element(&mut self, element: &Element<I, P>) -> Result<Element<I, P>, I> {
        let plan = Validation::new(&self.transaction, Operation::Persist, element, None).run()?;
        let id = element.id().cloned().ok_or(Error::RootElement)?;
        let session = self.session_mut(plan.destination)?;
        let parent = session.resolve(element.parent_id());
        session.insert(element, parent);
        tracing::debug!(
            session = session.name(),
            id = ?id,
            count = element.size(),
            "element persisted"
        );
        session.get(&id).ok_or(Error::ElementNotFound { id })
    }

    /// Removes an element and its subtree from its session.
    ///
    /// Returns the removed subtree, now [`NotExisted`](Lifecycle::NotExisted) and free to be
    /// persisted again, or `None` if the element was no longer stored.
    pub fn remove_element(&mut self, element: &Element<I, P>) -> Result<Option<Element<I, P>>, I> {
        let plan = Validation::new(&self.transaction, Operation::Remove, element, None).run()?;
        let id = element.id().ok_or(Error::RootElement)?;
        let session = self.session_mut(plan.destination)?;
        let removed = session.evict(id);
        if let Some(removed) = &removed {
            tracing::debug!(
                session = session.name(),
                id = ?id,
                count = removed.size(),
                "element removed"
            );
        }
        Ok(removed)
    }

    /// A snapshot of the element stored under `id` in the current session.
    pub fn get_element_by_id(&self, id: &I) -> Result<Option<Element<I, P>>, I> {
        Ok(self.current()?.get(id))
    }

    /// Whether `element` is attached to the current session.
    ///
    /// Elements of other sessions and elements that are not
    /// [`Attached`](Lifecycle::Attached) yield `false`.
    pub fn contains(&self, element: &Element<I, P>) -> Result<bool, I> {
        let current = self.current()?;
        Ok(attached_to(current, element))
    }

    /// Whether `child` sits below `parent` in the current session.
    ///
    /// Both elements must be attached to the current session; `parent` may be its root.
    pub fn contains_element(
        &self,
        parent: &Element<I, P>,
        child: &Element<I, P>,
    ) -> Result<bool, I> {
        let current = self.current()?;
        if !attached_to(current, parent) || !attached_to(current, child) || child.is_root() {
            return Ok(false);
        }
        Ok(match (parent.id(), child.id()) {
            (None, Some(_)) => true,
            (Some(parent), Some(child)) => current.is_descendant(parent, child),
            _ => false,
        })
    }

    /// Whether the element stored under `child_id` sits below the one under `parent_id` in the
    /// current session.
    pub fn contains_id(&self, parent_id: &I, child_id: &I) -> Result<bool, I> {
        Ok(self.current()?.is_descendant(parent_id, child_id))
    }

    /// Snapshots of the current session's elements matching `predicate`, in pre-order.
    pub fn search(
        &self,
        predicate: impl Fn(&Element<I, P>) -> bool,
    ) -> Result<Vec<Element<I, P>>, I> {
        let root = self.current()?.root();
        Ok(root.search(predicate).into_iter().cloned().collect())
    }

    /// Runs `action` on a snapshot of every element of the current session, in pre-order.
    ///
    /// This is a read-only visit: unlike [`Element::apply`], which hands out `&mut` elements of
    /// a snapshot the caller owns, the snapshots seen here are discarded afterwards. To edit the
    /// session, take a snapshot with [`Manager::root`] or [`Manager::get_element_by_id`], edit it
    /// with [`Element::apply`] or [`Element::apply_filtered`], and commit it with
    /// [`Manager::update_element`].
    ///
    /// ```rust
    /// # use arbor::{Error, Manager, triples};
    /// let mut manager = Manager::<u32, &str>::new();
    /// manager
    ///     .transaction_mut()
    ///     .initialize_session("s", triples![(1, None, "a"), (2, Some(1), "b")])?;
    ///
    /// let mut seen = Vec::new();
    /// manager.apply(|e| seen.extend(e.id().copied()))?;
    /// assert_eq!(seen, [1, 2]);
    ///
    /// let mut one = manager.get_element_by_id(&1)?.unwrap();
    /// one.apply(|e| e.set_payload("edited"));
    /// manager.update_element(&one)?;
    /// assert_eq!(manager.get_element_by_id(&2)?.unwrap().payload(), Some(&"edited"));
    /// # Ok::<(), Error<u32>>(())
    /// ```
    pub fn apply(&self, action: impl FnMut(&Element<I, P>)) -> Result<(), I> {
        self.apply_filtered(action, |_| true)
    }

    /// Like [`Manager::apply`], restricted to elements matching `predicate`.
    pub fn apply_filtered(
        &self,
        mut action: impl FnMut(&Element<I, P>),
        predicate: impl Fn(&Element<I, P>) -> bool,
    ) -> Result<(), I> {
        let root = self.current()?.root();
        for element in root.flatten() {
            if predicate(element) {
                action(element);
            }
        }
        Ok(())
    }

    /// A snapshot of the whole current session below its root.
    pub fn root(&self) -> Result<Element<I, P>, I> {
        Ok(self.current()?.root())
    }
}

fn attached_to<I, P>(session: &Session<I, P>, element: &Element<I, P>) -> bool
where
    I: ElementId,
    P: Payload,
{
    element.session() == Some(session.key())
        && element.lifecycle() == Lifecycle::Attached
        && element
            .id()
            .is_none_or(|id| !element.is_root() && session.contains_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triples;

    pub(super) type TestManager = Manager<u32, &'static str>;

    /// `1 -> {2 -> {4}, 3}` in session "a".
    pub(super) fn manager() -> TestManager {
        let mut manager = TestManager::new();
        manager
            .transaction_mut()
            .initialize_session(
                "a",
                triples![(1, None, "A"), (2, Some(1), "B"), (3, Some(1), "C"), (4, Some(2), "D")],
            )
            .unwrap();
        manager
    }

    pub(super) fn get(manager: &TestManager, id: u32) -> Element<u32, &'static str> {
        manager.get_element_by_id(&id).unwrap().unwrap()
    }

    #[test]
    fn persist_links_under_declared_parent() {
        let mut manager = manager();
        let mut five = manager.create_element(5, Some(3), Some("E")).unwrap();
        five.add_child(manager.create_element(6, None, Some("F")).unwrap());

        let stored = manager.persist_element(&five).unwrap();
        assert_eq!(stored.lifecycle(), Lifecycle::Attached);
        assert_eq!(stored.child(&6).unwrap().lifecycle(), Lifecycle::Attached);
        assert!(manager.contains_id(&3, &6).unwrap());
        assert_eq!(get(&manager, 6).parent_id(), Some(&5));
    }

    #[test]
    fn persist_with_unknown_parent_lands_on_root() {
        let mut manager = manager();
        let seven = manager.create_element(7, Some(70), Some("G")).unwrap();
        manager.persist_element(&seven).unwrap();
        assert!(manager.root().unwrap().child(&7).is_some());
        assert_eq!(get(&manager, 7).parent_id(), Some(&70));
    }

    #[test]
    fn persist_rejects_stored_elements() {
        let mut manager = manager();
        let two = get(&manager, 2);
        assert_eq!(
            manager.persist_element(&two),
            Err(Error::WrongLifecycle {
                operation: Operation::Persist,
                state: Lifecycle::Attached
            })
        );
    }

    #[test]
    fn failed_persist_leaves_the_tree_alone() {
        let mut manager = manager();
        let before = manager.root().unwrap();
        let mut five = manager.create_element(5, None, Some("E")).unwrap();
        five.add_child(manager.create_element(4, None, Some("dup")).unwrap());

        assert_eq!(manager.persist_element(&five), Err(Error::DuplicateId { id: 4 }));
        assert_eq!(manager.root().unwrap(), before);
        assert_eq!(manager.get_element_by_id(&5).unwrap(), None);
    }

    #[test]
    fn remove_cascades_and_returns_fresh_elements() {
        let mut manager = manager();
        let two = get(&manager, 2);
        let removed = manager.remove_element(&two).unwrap().unwrap();

        assert_eq!(removed.lifecycle(), Lifecycle::NotExisted);
        assert_eq!(removed.child(&4).unwrap().lifecycle(), Lifecycle::NotExisted);
        assert_eq!(manager.get_element_by_id(&4).unwrap(), None);
        assert_eq!(manager.root().unwrap().size(), 2);

        // the removed subtree can come back
        manager.persist_element(&removed).unwrap();
        assert!(manager.contains_id(&1, &4).unwrap());
    }

    #[test]
    fn removing_twice_finds_nothing() {
        let mut manager = manager();
        let three = get(&manager, 3);
        assert!(manager.remove_element(&three).unwrap().is_some());
        assert_eq!(manager.remove_element(&three).unwrap(), None);
    }

    #[test]
    fn remove_rejects_detached_descendants() {
        let mut manager = manager();
        let mut one = manager.root().unwrap().child(&1).unwrap().clone();
        one.apply_filtered(
            &mut |e: &mut Element<u32, &'static str>| e.set_payload("x"),
            &|e: &Element<u32, &'static str>| e.id() == Some(&4),
        );
        assert!(matches!(
            manager.remove_element(&one),
            Err(Error::WrongLifecycle {
                operation: Operation::Remove,
                state: Lifecycle::Detached
            })
        ));
    }

    #[test]
    fn queries_answer_for_the_current_session_only() {
        let mut manager = manager();
        let two = get(&manager, 2);
        let four = get(&manager, 4);
        let root = manager.root().unwrap();
        assert!(manager.contains(&two).unwrap());
        assert!(manager.contains(&root).unwrap());
        assert!(manager.contains_element(&two, &four).unwrap());
        assert!(manager.contains_element(&root, &four).unwrap());
        assert!(!manager.contains_element(&four, &two).unwrap());

        let mut edited = two.clone();
        edited.set_payload("z");
        assert!(!manager.contains(&edited).unwrap());
        let fresh = manager.create_element(2, None, None).unwrap();
        assert!(!manager.contains(&fresh).unwrap());

        manager
            .transaction_mut()
            .initialize_session("b", triples![(2, None, "other")])
            .unwrap();
        assert!(!manager.contains(&two).unwrap());
        assert_eq!(get(&manager, 2).payload(), Some(&"other"));
    }

    #[test]
    fn queries_still_need_an_active_session() {
        let mut manager = manager();
        manager.transaction_mut().deactivate_session("a").unwrap();
        assert_eq!(
            manager.get_element_by_id(&1),
            Err(Error::SessionInactive { name: "a".into() })
        );
        manager.transaction_mut().destroy_all_sessions();
        assert_eq!(manager.contains_id(&1, &2), Err(Error::NoSession));
    }

    #[test]
    fn search_and_apply_walk_snapshots() {
        let manager = manager();
        let found = manager.search(|e| e.payload() >= Some(&"C")).unwrap();
        assert_eq!(
            found.iter().map(|e| e.id().copied()).collect::<Vec<_>>(),
            [Some(4), Some(3)]
        );

        let mut visited = Vec::new();
        manager.apply(|e| visited.push(*e.id().unwrap())).unwrap();
        assert_eq!(visited, [1, 2, 4, 3]);

        let mut leaves = Vec::new();
        manager
            .apply_filtered(|e| leaves.push(*e.id().unwrap()), |e| e.children().is_empty())
            .unwrap();
        assert_eq!(leaves, [4, 3]);
    }

    #[test]
    fn snapshots_are_isolated() {
        let manager = manager();
        let mut one = get(&manager, 1);
        one.set_payload("changed");
        one.remove_child(&2);
        assert_eq!(get(&manager, 1).payload(), Some(&"A"));
        assert!(get(&manager, 1).child(&2).is_some());
    }
}
