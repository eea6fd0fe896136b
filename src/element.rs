// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Caller-side view of a node and its subtree.
//!
//! An [`Element`] is an owned snapshot. The engine never hands out references into the stored
//! trees, so editing an element changes nothing until it is passed back to
//! [`Manager::update_element`](crate::Manager::update_element).
//!
//! Edits go through the setters. Once an element has been persisted, a setter flips it to
//! [`Lifecycle::Detached`] and renames and payload rewrites are *staged*: [`Element::id`] keeps
//! returning the id under which the element is stored, while [`Element::pending_id`] and
//! [`Element::payload`] reflect what the next update will commit.
use crate::{
    error::{Error, Result},
    lifecycle::{Lifecycle, Operation},
    session::SessionKey,
};
use std::{fmt, fmt::Write as _, hash::Hash};

/// Bounds every element identifier satisfies: comparable, hashable for the id cache and
/// printable for error messages.
pub trait ElementId: Clone + Eq + Hash + Ord + fmt::Debug {}

impl<T> ElementId for T where T: Clone + Eq + Hash + Ord + fmt::Debug {}

/// A node of a session tree: identifier, parent identifier, payload, children and lifecycle.
#[derive(Clone)]
pub struct Element<I, P> {
    pub(crate) id: Option<I>,
    pub(crate) parent_id: Option<I>,
    pub(crate) payload: Option<P>,
    pub(crate) children: Vec<Element<I, P>>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) session: Option<SessionKey>,
    pub(crate) is_root: bool,
    pub(crate) pending_id: Option<I>,
    pub(crate) pending_payload: Option<Option<P>>,
}

impl<I, P> Element<I, P>
where
    I: Clone + Eq,
{
    /// Creates a brand new element, not yet part of any session.
    ///
    /// ```rust
    /// # use arbor::{Element, Lifecycle};
    /// let element = Element::new(1u32, None, Some("payload")).unwrap();
    /// assert_eq!(element.lifecycle(), Lifecycle::NotExisted);
    /// assert!(Element::new(1u32, Some(1), Some("payload")).is_err());
    /// ```
    pub fn new(id: I, parent_id: Option<I>, payload: Option<P>) -> Result<Self, I> {
        if parent_id.as_ref() == Some(&id) {
            return Err(Error::SelfParent { id });
        }
        Ok(Self {
            id: Some(id),
            parent_id,
            payload,
            children: Vec::new(),
            lifecycle: Lifecycle::NotExisted,
            session: None,
            is_root: false,
            pending_id: None,
            pending_payload: None,
        })
    }

    pub(crate) fn root(session: SessionKey, children: Vec<Self>) -> Self {
        Self {
            id: None,
            parent_id: None,
            payload: None,
            children,
            lifecycle: Lifecycle::Attached,
            session: Some(session),
            is_root: true,
            pending_id: None,
            pending_payload: None,
        }
    }

    /// The id under which the element is stored (`None` for the root).
    pub fn id(&self) -> Option<&I> {
        self.id.as_ref()
    }

    /// A rename staged by [`Element::set_id`] and committed by the next update.
    pub fn pending_id(&self) -> Option<&I> {
        self.pending_id.as_ref()
    }

    /// The id the element will carry once staged changes are committed.
    pub fn effective_id(&self) -> Option<&I> {
        self.pending_id.as_ref().or(self.id.as_ref())
    }

    pub fn parent_id(&self) -> Option<&I> {
        self.parent_id.as_ref()
    }

    /// The payload, including a rewrite staged by [`Element::set_payload`] or
    /// [`Element::clear_payload`].
    pub fn payload(&self) -> Option<&P> {
        match &self.pending_payload {
            Some(staged) => staged.as_ref(),
            None => self.payload.as_ref(),
        }
    }

    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// The direct child with the given id.
    pub fn child(&self, id: &I) -> Option<&Self> {
        self.children.iter().find(|c| c.id.as_ref() == Some(id))
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Handle of the session this element was read from, if any.
    pub fn session(&self) -> Option<SessionKey> {
        self.session
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    fn touch(&mut self) {
        self.lifecycle = self.lifecycle.touched();
    }

    /// Renames the element.
    ///
    /// A new element is renamed in place (its children follow). A stored element stages the
    /// rename until the next update.
    pub fn set_id(&mut self, id: I) {
        if self.lifecycle == Lifecycle::NotExisted {
            for child in &mut self.children {
                child.parent_id = Some(id.clone());
            }
            self.id = Some(id);
        } else if self.id.as_ref() == Some(&id) {
            self.pending_id = None;
        } else {
            self.pending_id = Some(id);
        }
        self.touch();
    }

    /// Re-parents the element. `None` or an id unknown to the session places it below the root.
    pub fn set_parent_id(&mut self, parent_id: Option<I>) {
        self.parent_id = parent_id;
        self.touch();
    }

    pub fn set_payload(&mut self, payload: P) {
        self.stage_payload(Some(payload));
    }

    pub fn clear_payload(&mut self) {
        self.stage_payload(None);
    }

    fn stage_payload(&mut self, payload: Option<P>) {
        if self.lifecycle == Lifecycle::NotExisted {
            self.payload = payload;
        } else {
            self.pending_payload = Some(payload);
        }
        self.touch();
    }

    /// Adds `child` below this element, replacing any child with the same id.
    ///
    /// The child's parent id is pointed at this element.
    pub fn add_child(&mut self, mut child: Self) {
        let parent = self.effective_id().cloned();
        if child.parent_id != parent {
            child.set_parent_id(parent);
        }
        match self
            .children
            .iter_mut()
            .find(|c| c.id.is_some() && c.id == child.id)
        {
            Some(slot) => *slot = child,
            None => self.children.push(child),
        }
        self.touch();
    }

    /// Removes the direct child with the given id.
    pub fn remove_child(&mut self, id: &I) -> Option<Self> {
        let index = self
            .children
            .iter()
            .position(|c| c.id.as_ref() == Some(id))?;
        self.touch();
        Some(self.children.remove(index))
    }

    /// Finds an element by id in this subtree, including this element itself.
    pub fn find(&self, id: &I) -> Option<&Self> {
        self.flatten()
            .into_iter()
            .find(|e| e.id.as_ref() == Some(id))
    }

    /// Returns whether a strict descendant of this element has the given id.
    pub fn contains(&self, id: &I) -> bool {
        self.children.iter().any(|c| c.find(id).is_some())
    }

    /// All elements of the subtree in pre-order, the root excluded.
    pub fn flatten(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(next) = stack.pop() {
            if !next.is_root {
                out.push(next);
            }
            stack.extend(next.children.iter().rev());
        }
        out
    }

    /// Number of elements in the subtree, the root excluded.
    pub fn size(&self) -> usize {
        self.flatten().len()
    }

    /// Ids of the subtree in pre-order.
    pub fn ids(&self) -> Vec<&I> {
        self.flatten().into_iter().filter_map(|e| e.id.as_ref()).collect()
    }

    /// Elements of the subtree matching `predicate`, in pre-order.
    pub fn search(&self, predicate: impl Fn(&Self) -> bool) -> Vec<&Self> {
        self.flatten().into_iter().filter(|e| predicate(e)).collect()
    }

    /// Runs `action` on every element of the subtree, the root excluded.
    pub fn apply(&mut self, mut action: impl FnMut(&mut Self)) {
        self.apply_filtered(&mut action, &|_: &Self| true);
    }

    /// Runs `action` on every element of the subtree matching `predicate`.
    ///
    /// The predicate sees each element before the action runs on it.
    pub fn apply_filtered(
        &mut self,
        action: &mut impl FnMut(&mut Self),
        predicate: &impl Fn(&Self) -> bool,
    ) {
        let mut stack = vec![self];
        while let Some(next) = stack.pop() {
            if !next.is_root && predicate(next) {
                action(next);
            }
            stack.extend(next.children.iter_mut().rev());
        }
    }

    /// The first lifecycle state in the subtree that does not permit `op`.
    pub(crate) fn lifecycle_violation(&self, op: Operation) -> Option<Lifecycle> {
        self.flatten()
            .into_iter()
            .map(Self::lifecycle)
            .find(|state| !state.permits(op))
    }

    /// Whether this subtree holds staged changes an update has to reconcile.
    pub(crate) fn needs_reconcile(&self) -> bool {
        self.flatten()
            .iter()
            .any(|e| e.lifecycle == Lifecycle::Detached)
    }

    /// Turns a subtree taken out of a session into fresh, unattached elements.
    pub(crate) fn into_not_existed(mut self) -> Self {
        {
            let mut stack = vec![&mut self];
            while let Some(next) = stack.pop() {
                next.lifecycle = Lifecycle::NotExisted;
                next.session = None;
                next.pending_id = None;
                next.pending_payload = None;
                stack.extend(next.children.iter_mut());
            }
        }
        self
    }
}

impl<I, P> Element<I, P>
where
    I: Clone + Eq + Ord + fmt::Debug,
{
    /// Renders the subtree as an indented outline of ids, children sorted by id.
    ///
    /// ```rust
    /// # use arbor::Element;
    /// let mut top = Element::new(1u32, None, Some("A")).unwrap();
    /// top.add_child(Element::new(3, None, Some("C")).unwrap());
    /// top.add_child(Element::new(2, None, Some("B")).unwrap());
    /// assert_eq!(top.render(), "1\n  2\n  3");
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<(&Self, usize)> = if self.is_root {
            self.sorted_children().into_iter().rev().map(|c| (c, 0)).collect()
        } else {
            vec![(self, 0)]
        };
        while let Some((next, depth)) = stack.pop() {
            // writing into a String cannot fail
            let _ = writeln!(out, "{:indent$}{:?}", "", Label(next), indent = depth * 2);
            stack.extend(
                next.sorted_children()
                    .into_iter()
                    .rev()
                    .map(|c| (c, depth + 1)),
            );
        }
        out.truncate(out.trim_end().len());
        out
    }

    fn sorted_children(&self) -> Vec<&Self> {
        let mut children: Vec<_> = self.children.iter().collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        children
    }
}

struct Label<'a, I, P>(&'a Element<I, P>);

impl<I: fmt::Debug, P> fmt::Debug for Label<'_, I, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.0.id, &self.0.pending_id) {
            (Some(id), Some(pending)) => write!(f, "{id:?} -> {pending:?}"),
            (Some(id), None) => write!(f, "{id:?}"),
            (None, _) => f.write_str("<root>"),
        }
    }
}

impl<I, P> fmt::Debug for Element<I, P>
where
    I: fmt::Debug,
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(if self.is_root { "Root" } else { "Element" });
        if !self.is_root {
            s.field("id", &self.id)
                .field("parent_id", &self.parent_id)
                .field("payload", &self.payload)
                .field("lifecycle", &self.lifecycle);
            if self.pending_id.is_some() {
                s.field("pending_id", &self.pending_id);
            }
            if self.pending_payload.is_some() {
                s.field("pending_payload", &self.pending_payload);
            }
        }
        s.field("children", &self.children).finish()
    }
}

// Unnests the subtree before dropping it, so deep chains do not exhaust the stack.
impl<I, P> Drop for Element<I, P> {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut next) = pending.pop() {
            pending.append(&mut next.children);
        }
    }
}

/// Structural equality: children compare as a set keyed by id and the session handle is ignored.
impl<I, P> PartialEq for Element<I, P>
where
    I: Clone + Eq,
    P: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.parent_id == other.parent_id
            && self.payload == other.payload
            && self.lifecycle == other.lifecycle
            && self.is_root == other.is_root
            && self.pending_id == other.pending_id
            && self.pending_payload == other.pending_payload
            && self.children.len() == other.children.len()
            && self.children.iter().all(|c| {
                c.id
                    .as_ref()
                    .and_then(|id| other.child(id))
                    .is_some_and(|o| o == c)
            })
    }
}
