// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::Manager;
use crate::{
    TreeRandomState, create_map, create_set,
    element::{Element, ElementId},
    error::{Error, Result},
    lifecycle::{Lifecycle, Operation},
    payload::Payload,
    session::Session,
    validation::Validation,
};
use std::collections::HashMap;

impl<I, P> Manager<I, P>
where
    I: ElementId,
    P: Payload,
{
    /// Commits the edits made to a snapshot.
    ///
    /// Every [`Detached`](Lifecycle::Detached) element of `element`'s subtree is reconciled
    /// against the stored tree:
    ///
    /// 1. a changed parent id re-links the element under the new parent (the root if the id is not
    ///    stored);
    /// 2. children added with [`Element::add_child`] are taken from wherever they were stored and
    ///    linked below the element;
    /// 3. **stored children missing from the snapshot are removed from the session, with their
    ///    whole subtree.** The snapshot is the truth: a child dropped from it with
    ///    [`Element::remove_child`] is deleted, not moved. Re-read the element before editing it
    ///    if the stored tree may have grown since the snapshot was taken, or the new children
    ///    are lost;
    /// 4. payloads staged with [`Element::set_payload`] or [`Element::clear_payload`] are written;
    /// 5. ids staged with [`Element::set_id`] are applied, and children follow the new id.
    ///
    /// Attached elements without detached descendants are left as stored. The update applies
    /// completely or not at all: it works on a copy of the session that only replaces the stored
    /// one once every step succeeded.
    ///
    /// Returns a snapshot of the updated element under its new id.
    ///
    /// ```rust
    /// # use arbor::{Error, Manager, triples};
    /// let mut manager = Manager::<u32, &str>::new();
    /// manager.transaction_mut().initialize_session(
    ///     "s",
    ///     triples![(1, None, "A"), (2, Some(1), "B"), (3, Some(1), "C")],
    /// )?;
    ///
    /// let mut one = manager.get_element_by_id(&1)?.unwrap();
    /// one.set_id(10);
    /// one.remove_child(&3);
    /// let one = manager.update_element(&one)?;
    ///
    /// assert_eq!(one.id(), Some(&10));
    /// assert_eq!(one.child(&2).unwrap().parent_id(), Some(&10));
    /// // dropping the child from the snapshot deleted it
    /// assert!(manager.get_element_by_id(&3)?.is_none());
    /// # Ok::<(), Error<u32>>(())
    /// ```
    pub fn update_element(&mut self, element: &Element<I, P>) -> Result<Element<I, P>, I> {
        let plan = Validation::new(&self.transaction, Operation::Update, element, None).run()?;
        let id = element.id().cloned().ok_or(Error::RootElement)?;
        let stored = self.session(plan.destination)?;
        if !stored.contains_id(&id) {
            return Err(Error::ElementNotFound { id });
        }

        let mut reconcile = Reconcile::new(stored, element);
        reconcile.restructure(element)?;
        if reconcile.working.reachable() != reconcile.working.len() {
            return Err(Error::Cycle { id });
        }
        reconcile.prune(element);
        reconcile.rewrite(element)?;

        let working = reconcile.working;
        let updated = element.effective_id().cloned().unwrap_or(id);
        let snapshot = working
            .get(&updated)
            .ok_or_else(|| Error::ElementNotFound {
                id: updated.clone(),
            })?;
        tracing::debug!(
            session = working.name(),
            id = ?updated,
            count = snapshot.size(),
            "element updated"
        );
        self.transaction.commit(working);
        Ok(snapshot)
    }
}

/// A working copy of a session being brought in line with an edited snapshot.
struct Reconcile<'a, I, P> {
    stored: &'a Session<I, P>,
    working: Session<I, P>,
    /// Staged id -> stored id, so parent ids naming a renamed element still resolve.
    renamed: HashMap<I, I, TreeRandomState>,
}

impl<'a, I, P> Reconcile<'a, I, P>
where
    I: ElementId,
    P: Payload,
{
    fn new(stored: &'a Session<I, P>, element: &Element<I, P>) -> Self {
        let mut renamed = create_map();
        for e in element.flatten() {
            if let (Some(id), Some(pending)) = (e.id(), e.pending_id()) {
                renamed.insert(pending.clone(), id.clone());
            }
        }
        Self {
            stored,
            working: stored.clone(),
            renamed,
        }
    }

    fn stored_id(&self, element: &Element<I, P>) -> Result<I, I> {
        let id = element.id().cloned().ok_or(Error::RootElement)?;
        if self.working.contains_id(&id) {
            Ok(id)
        } else {
            Err(Error::ElementNotFound { id })
        }
    }

    fn resolve(&self, parent_id: Option<&I>) -> Option<I> {
        let parent_id = parent_id.map(|p| self.renamed.get(p).unwrap_or(p));
        self.working.resolve(parent_id)
    }

    fn relink(&mut self, id: &I, parent: Option<I>, declared: Option<I>) {
        self.working.unlink(id);
        self.working.link(id, parent);
        if let Some(node) = self.working.node_mut(id) {
            node.parent_id = declared;
        }
    }

    /// Re-parents edited elements and adopts added children, top-down.
    fn restructure(&mut self, element: &Element<I, P>) -> Result<(), I> {
        if element.lifecycle() == Lifecycle::Detached {
            let id = self.stored_id(element)?;
            let declared = self.working.node(&id).map(|n| n.parent_id.as_ref());
            if declared != Some(element.parent_id()) {
                let parent = self.resolve(element.parent_id());
                if parent.as_ref() == Some(&id) {
                    return Err(Error::Cycle { id });
                }
                self.relink(&id, parent, element.parent_id().cloned());
            }

            let stored = self.stored;
            let prior = stored.node(&id).map(|n| &n.children);
            for child in element.children() {
                let child_id = self.stored_id(child)?;
                if child_id == id {
                    return Err(Error::Cycle { id });
                }
                if prior.is_some_and(|p| p.contains(&child_id)) {
                    continue;
                }
                tracing::trace!(id = ?child_id, parent = ?id, "adopting child");
                self.relink(&child_id, Some(id.clone()), Some(id.clone()));
            }
        }
        for child in element.children().iter().filter(|c| c.needs_reconcile()) {
            self.restructure(child)?;
        }
        Ok(())
    }

    /// Evicts stored children that edited elements no longer list.
    fn prune(&mut self, element: &Element<I, P>) {
        if let (Lifecycle::Detached, Some(id)) = (element.lifecycle(), element.id()) {
            let mut keep = create_set();
            keep.extend(element.children().iter().filter_map(Element::id));
            let stored = self.stored;
            let doomed: Vec<I> = match (stored.node(id), self.working.node(id)) {
                (Some(before), Some(now)) => before
                    .children
                    .iter()
                    .filter(|c| !keep.contains(c) && now.children.contains(*c))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            for child in doomed {
                if let Some(evicted) = self.working.evict(&child) {
                    tracing::trace!(id = ?child, count = evicted.size(), "evicting dropped child");
                }
            }
        }
        for child in element.children().iter().filter(|c| c.needs_reconcile()) {
            self.prune(child);
        }
    }

    /// Writes staged payloads, then applies staged renames.
    fn rewrite(&mut self, element: &Element<I, P>) -> Result<(), I> {
        let edited: Vec<&Element<I, P>> = element
            .flatten()
            .into_iter()
            .filter(|e| e.lifecycle() == Lifecycle::Detached)
            .collect();
        for e in &edited {
            if let (Some(id), Some(staged)) = (e.id(), e.pending_payload.as_ref()) {
                if let Some(node) = self.working.node_mut(id) {
                    node.payload = staged.clone();
                }
                self.working.settle_kind(staged.as_ref());
            }
        }
        for e in &edited {
            if let (Some(id), Some(pending)) = (e.id(), e.pending_id()) {
                if !self.working.rename(id, pending.clone()) {
                    return Err(Error::DuplicateId {
                        id: pending.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Element, Error, Lifecycle, Operation,
        manager::tests::{get, manager},
    };

    #[test]
    fn payload_and_parent_changes_commit() {
        let mut manager = manager();
        let mut four = get(&manager, 4);
        four.set_payload("D2");
        four.set_parent_id(Some(3));

        let updated = manager.update_element(&four).unwrap();
        assert_eq!(updated.lifecycle(), Lifecycle::Attached);
        assert_eq!(updated.payload(), Some(&"D2"));
        assert!(manager.contains_id(&3, &4).unwrap());
        assert!(!manager.contains_id(&2, &4).unwrap());
    }

    #[test]
    fn payloads_can_be_cleared() {
        let mut manager = manager();
        let mut three = get(&manager, 3);
        three.clear_payload();
        manager.update_element(&three).unwrap();
        assert_eq!(get(&manager, 3).payload(), None);
    }

    #[test]
    fn unresolvable_parent_moves_to_root() {
        let mut manager = manager();
        let mut two = get(&manager, 2);
        two.set_parent_id(Some(99));
        manager.update_element(&two).unwrap();

        assert!(manager.root().unwrap().child(&2).is_some());
        assert_eq!(get(&manager, 2).parent_id(), Some(&99));
    }

    #[test]
    fn renames_carry_children_along() {
        let mut manager = manager();
        let mut two = get(&manager, 2);
        two.set_id(20);
        let updated = manager.update_element(&two).unwrap();

        assert_eq!(updated.id(), Some(&20));
        assert_eq!(updated.pending_id(), None);
        assert_eq!(get(&manager, 4).parent_id(), Some(&20));
        assert!(manager.contains_id(&1, &4).unwrap());
        assert_eq!(manager.get_element_by_id(&2).unwrap(), None);
    }

    #[test]
    fn renames_onto_taken_ids_are_rejected() {
        let mut manager = manager();
        let mut two = get(&manager, 2);
        two.set_id(3);
        assert_eq!(manager.update_element(&two), Err(Error::DuplicateId { id: 3 }));
        assert!(get(&manager, 3).payload() == Some(&"C"));
    }

    #[test]
    fn dropped_children_are_evicted() {
        let mut manager = manager();
        let mut one = get(&manager, 1);
        one.remove_child(&2);
        let updated = manager.update_element(&one).unwrap();

        assert_eq!(updated.children().len(), 1);
        assert_eq!(manager.get_element_by_id(&2).unwrap(), None);
        assert_eq!(manager.get_element_by_id(&4).unwrap(), None);
        assert_eq!(manager.root().unwrap().size(), 2);
    }

    #[test]
    fn added_children_move_from_their_old_parent() {
        let mut manager = manager();
        let mut three = get(&manager, 3);
        let four = get(&manager, 4);
        three.add_child(four);
        manager.update_element(&three).unwrap();

        insta::assert_snapshot!(manager.root().unwrap().render(), @r"
        1
          2
          3
            4
        ");
        assert_eq!(get(&manager, 4).parent_id(), Some(&3));
    }

    #[test]
    fn children_added_below_a_renamed_parent_follow_the_rename() {
        let mut manager = manager();
        let mut three = get(&manager, 3);
        three.set_id(30);
        three.add_child(get(&manager, 4));
        manager.update_element(&three).unwrap();

        assert_eq!(get(&manager, 4).parent_id(), Some(&30));
        assert!(manager.contains_id(&30, &4).unwrap());
        assert!(manager.contains_id(&1, &30).unwrap());
    }

    #[test]
    fn nested_edits_are_reconciled() {
        let mut manager = manager();
        let mut one = get(&manager, 1);
        one.apply_filtered(
            &mut |e: &mut Element<u32, &'static str>| e.set_payload("deep"),
            &|e: &Element<u32, &'static str>| e.id() == Some(&4),
        );
        assert_eq!(one.lifecycle(), Lifecycle::Attached);
        manager.update_element(&one).unwrap();
        assert_eq!(get(&manager, 4).payload(), Some(&"deep"));
        assert_eq!(get(&manager, 1).payload(), Some(&"A"));
    }

    #[test]
    fn reparenting_below_own_subtree_is_a_cycle() {
        let mut manager = manager();
        let mut one = get(&manager, 1);
        one.set_parent_id(Some(4));
        assert_eq!(manager.update_element(&one), Err(Error::Cycle { id: 1 }));

        let mut two = get(&manager, 2);
        two.add_child(get(&manager, 1));
        // the adopted ancestor brings the element itself along
        assert_eq!(manager.update_element(&two), Err(Error::DuplicateId { id: 2 }));
        assert_eq!(manager.root().unwrap().size(), 4);
    }

    #[test]
    fn update_rejects_new_elements() {
        let mut manager = manager();
        let fresh = manager.create_element(9, None, Some("N")).unwrap();
        assert_eq!(
            manager.update_element(&fresh),
            Err(Error::WrongLifecycle {
                operation: Operation::Update,
                state: Lifecycle::NotExisted
            })
        );

        let mut one = get(&manager, 1);
        one.add_child(fresh);
        assert!(matches!(
            manager.update_element(&one),
            Err(Error::WrongLifecycle { .. })
        ));
    }

    #[test]
    fn updated_elements_can_be_cut_again() {
        let mut manager = manager();
        let mut two = get(&manager, 2);
        two.set_payload("B2");
        assert!(manager.cut(&two, None).is_err());
        let two = manager.update_element(&two).unwrap();
        assert!(manager.cut(&two, None).is_ok());
    }
}
