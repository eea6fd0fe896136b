// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! One independent tree and its id index.
//!
//! A [`Session`] stores its tree as an arena: the cache maps every attached id to a node that
//! knows its declared parent id, the parent it actually hangs off, its payload and its children.
//! The root is implicit; its children are kept in a separate ordered set. Elements handed to
//! callers are snapshots built from this arena on demand.
use crate::{
    TreeRandomState, create_map,
    element::Element,
    lifecycle::Lifecycle,
    payload::{Payload, PayloadKind},
};
use smallvec::SmallVec;
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    hash::Hash,
};

/// Non-owning handle to a session, carried by every element read from it.
///
/// Keys are never reused, so an element outliving its session can be told apart from an element
/// of a new session with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SessionKey(u64);

impl SessionKey {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node<I, P> {
    /// The parent id the element declares.
    pub(crate) parent_id: Option<I>,
    /// The parent the element is linked under; `None` is the root.
    pub(crate) linked: Option<I>,
    pub(crate) payload: Option<P>,
    pub(crate) children: BTreeSet<I>,
}

/// A tree of elements plus its id cache.
#[derive(Clone)]
pub struct Session<I, P> {
    name: String,
    key: SessionKey,
    active: bool,
    payload_kind: Option<PayloadKind>,
    top: BTreeSet<I>,
    cache: HashMap<I, Node<I, P>, TreeRandomState>,
}

impl<I, P> fmt::Debug for Session<I, P>
where
    I: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("active", &self.active)
            .field("payload_kind", &self.payload_kind)
            .field("top", &self.top)
            .field("len", &self.cache.len())
            .finish()
    }
}

impl<I, P> Session<I, P>
where
    I: Clone + Eq + Hash + Ord,
    P: Payload,
{
    pub(crate) fn new(name: String, key: SessionKey, payload_kind: Option<PayloadKind>) -> Self {
        Self {
            name,
            key,
            active: true,
            payload_kind,
            top: BTreeSet::new(),
            cache: create_map(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// The kind every payload of this session must have.
    ///
    /// An untyped session (`None`) takes the kind of the first payload stored in it.
    pub fn payload_kind(&self) -> Option<PayloadKind> {
        self.payload_kind
    }

    /// Fixes the kind of an untyped session from a payload about to be stored.
    pub(crate) fn settle_kind(&mut self, payload: Option<&P>) {
        if self.payload_kind.is_none() {
            self.payload_kind = payload.map(P::kind);
            if let Some(kind) = self.payload_kind {
                tracing::debug!(session = %self.name, %kind, "session payload kind fixed");
            }
        }
    }

    /// Checks a payload against the session's kind; absent payloads always pass.
    pub(crate) fn kind_mismatch(&self, payload: Option<&P>) -> Option<(PayloadKind, PayloadKind)> {
        let expected = self.payload_kind?;
        let found = payload?.kind();
        (expected != found).then_some((expected, found))
    }

    /// Number of elements stored, the root excluded.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn contains_id(&self, id: &I) -> bool {
        self.cache.contains_key(id)
    }

    /// Ids of the root's direct children, in order.
    pub fn top_level(&self) -> impl Iterator<Item = &I> {
        self.top.iter()
    }

    /// Every stored id, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &I> {
        self.cache.keys()
    }

    /// A snapshot of the stored element and its subtree.
    pub fn get(&self, id: &I) -> Option<Element<I, P>> {
        // built bottom-up, so every child exists before its parent asks for it
        let mut built: HashMap<I, Element<I, P>, TreeRandomState> = create_map();
        for next in self.subtree_ids(id).into_iter().rev() {
            let Some(node) = self.cache.get(&next) else {
                continue;
            };
            let mut element = Element::new(next.clone(), None, node.payload.clone()).ok()?;
            element.parent_id = node.parent_id.clone();
            element.lifecycle = Lifecycle::Attached;
            element.session = Some(self.key);
            element.children = node
                .children
                .iter()
                .filter_map(|child| built.remove(child))
                .collect();
            built.insert(next, element);
        }
        built.remove(id)
    }

    /// A snapshot of the whole tree below a synthesized root.
    pub fn root(&self) -> Element<I, P> {
        Element::root(
            self.key,
            self.top.iter().filter_map(|id| self.get(id)).collect(),
        )
    }

    pub(crate) fn node(&self, id: &I) -> Option<&Node<I, P>> {
        self.cache.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: &I) -> Option<&mut Node<I, P>> {
        self.cache.get_mut(id)
    }

    /// The parent an element declaring `parent_id` gets linked under.
    pub(crate) fn resolve(&self, parent_id: Option<&I>) -> Option<I> {
        parent_id.filter(|p| self.cache.contains_key(*p)).cloned()
    }

    /// Whether `id` sits strictly below `ancestor`.
    pub(crate) fn is_descendant(&self, ancestor: &I, id: &I) -> bool {
        let mut current = self.cache.get(id).and_then(|n| n.linked.as_ref());
        // bounded by the number of nodes so a corrupted chain cannot spin forever
        for _ in 0..self.cache.len() {
            match current {
                Some(parent) if parent == ancestor => return true,
                Some(parent) => current = self.cache.get(parent).and_then(|n| n.linked.as_ref()),
                None => return false,
            }
        }
        false
    }

    /// Ids of the subtree rooted at `id`, in pre-order.
    pub(crate) fn subtree_ids(&self, id: &I) -> Vec<I> {
        let mut out = Vec::new();
        let mut stack: SmallVec<[&I; 16]> = SmallVec::new();
        if self.cache.contains_key(id) {
            stack.push(id);
        }
        while let Some(next) = stack.pop() {
            if out.len() == self.cache.len() {
                break;
            }
            out.push(next.clone());
            if let Some(node) = self.cache.get(next) {
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Number of elements reachable from the root.
    pub(crate) fn reachable(&self) -> usize {
        self.top
            .iter()
            .map(|id| self.subtree_ids(id).len())
            .sum()
    }

    /// Hangs a stored element under `parent` (`None` is the root).
    pub(crate) fn link(&mut self, id: &I, parent: Option<I>) {
        match &parent {
            Some(p) => {
                if let Some(node) = self.cache.get_mut(p) {
                    node.children.insert(id.clone());
                }
            }
            None => {
                self.top.insert(id.clone());
            }
        }
        if let Some(node) = self.cache.get_mut(id) {
            node.linked = parent;
        }
    }

    /// Takes a stored element off its parent, leaving it and its subtree in the cache.
    pub(crate) fn unlink(&mut self, id: &I) {
        let Some(linked) = self.cache.get(id).map(|n| n.linked.clone()) else {
            return;
        };
        match linked {
            Some(p) => {
                if let Some(node) = self.cache.get_mut(&p) {
                    node.children.remove(id);
                }
            }
            None => {
                self.top.remove(id);
            }
        }
    }

    /// Unlinks the subtree at `id` and moves its nodes out of the cache.
    pub(crate) fn take_subtree(&mut self, id: &I) -> Vec<(I, Node<I, P>)> {
        self.unlink(id);
        self.subtree_ids(id)
            .into_iter()
            .filter_map(|i| self.cache.remove(&i).map(|node| (i, node)))
            .collect()
    }

    /// Copies the nodes of the subtree at `id`.
    pub(crate) fn clone_subtree(&self, id: &I) -> Vec<(I, Node<I, P>)> {
        self.subtree_ids(id)
            .into_iter()
            .filter_map(|i| self.cache.get(&i).cloned().map(|node| (i, node)))
            .collect()
    }

    /// Inserts nodes produced by [`Session::take_subtree`] or [`Session::clone_subtree`] and
    /// links their top element `id` under `parent`.
    pub(crate) fn adopt(&mut self, nodes: Vec<(I, Node<I, P>)>, id: &I, parent: Option<I>) {
        for (_, node) in &nodes {
            self.settle_kind(node.payload.as_ref());
        }
        self.cache.extend(nodes);
        if let Some(node) = self.cache.get_mut(id) {
            node.parent_id = parent.clone();
        }
        self.link(id, parent);
    }

    /// Stores a new element and its subtree, linking it under `parent`.
    pub(crate) fn insert(&mut self, element: &Element<I, P>, parent: Option<I>) {
        let Some(id) = element.id.clone() else {
            return;
        };
        self.settle_kind(element.payload());
        self.cache.insert(
            id.clone(),
            Node {
                parent_id: element.parent_id.clone(),
                linked: None,
                payload: element.payload().cloned(),
                children: BTreeSet::new(),
            },
        );
        self.link(&id, parent);
        for child in &element.children {
            self.insert(child, Some(id.clone()));
            if let Some(node) = child.id.as_ref().and_then(|c| self.cache.get_mut(c)) {
                node.parent_id = Some(id.clone());
            }
        }
    }

    /// Removes the subtree at `id`, returning it as elements that no longer exist.
    pub(crate) fn evict(&mut self, id: &I) -> Option<Element<I, P>> {
        let snapshot = self.get(id)?;
        self.take_subtree(id);
        Some(snapshot.into_not_existed())
    }

    /// Moves the stored element `old` to the id `new`, rewriting every reference to it.
    pub(crate) fn rename(&mut self, old: &I, new: I) -> bool {
        if self.cache.contains_key(&new) {
            return false;
        }
        let Some(node) = self.cache.remove(old) else {
            return false;
        };
        match &node.linked {
            Some(p) => {
                if let Some(parent) = self.cache.get_mut(p) {
                    parent.children.remove(old);
                    parent.children.insert(new.clone());
                }
            }
            None => {
                self.top.remove(old);
                self.top.insert(new.clone());
            }
        }
        for child in &node.children {
            if let Some(child) = self.cache.get_mut(child) {
                child.parent_id = Some(new.clone());
                child.linked = Some(new.clone());
            }
        }
        self.cache.insert(new, node);
        true
    }

    /// Places a node built by tree assembly, without linking it.
    pub(crate) fn place(&mut self, id: I, parent_id: Option<I>, payload: Option<P>) {
        self.cache.insert(
            id,
            Node {
                parent_id,
                linked: None,
                payload,
                children: BTreeSet::new(),
            },
        );
    }

    pub(crate) fn rekeyed(&self, name: String, key: SessionKey) -> Self {
        Self {
            name,
            key,
            ..self.clone()
        }
    }
}
