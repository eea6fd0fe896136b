// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The registry of sessions.
//!
//! A [`Transaction`] owns every [`Session`] by name and points at the one that is checked out.
//! Sessions created through it are activated and checked out right away; cloned sessions are
//! registered but leave the checkout untouched.
//!
//! ```rust
//! # use arbor::{Transaction, Error, triples};
//! let mut tx = Transaction::<u32, &str>::new();
//! tx.initialize_session("left", triples![(1, None, "A")])?;
//! tx.clone_session("left", "right")?;
//! assert_eq!(tx.current_session().unwrap().name(), "left");
//!
//! tx.session_checkout("right")?;
//! assert_eq!(tx.current_session().unwrap().len(), 1);
//! assert!(tx.destroy_session("right"));
//! assert!(tx.current_session().is_none());
//! # Ok::<(), Error<u32>>(())
//! ```
use crate::{
    assembly::{self, Triple},
    element::ElementId,
    error::{Error, Result},
    payload::{Payload, PayloadKind},
    session::{Session, SessionKey},
};
use std::collections::BTreeMap;

/// All sessions plus the pointer to the current one.
#[derive(Debug, Clone)]
pub struct Transaction<I, P> {
    sessions: BTreeMap<String, Session<I, P>>,
    current: Option<String>,
    next_key: u64,
}

impl<I, P> Default for Transaction<I, P> {
    fn default() -> Self {
        Self {
            sessions: BTreeMap::new(),
            current: None,
            next_key: 0,
        }
    }
}

impl<I, P> Transaction<I, P>
where
    I: ElementId,
    P: Payload,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_key(&mut self) -> SessionKey {
        self.next_key += 1;
        SessionKey::from_raw(self.next_key)
    }

    fn vacant(&self, name: &str) -> Result<(), I> {
        if name.is_empty() {
            return Err(Error::EmptySessionName);
        }
        if self.sessions.contains_key(name) {
            return Err(Error::SessionExists {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    /// Assembles a session from `triples`, then registers, activates and checks it out.
    ///
    /// Nothing is registered if assembly fails. See [`assembly`](crate::assembly) for how the
    /// tree is built.
    pub fn initialize_session<T>(
        &mut self,
        name: impl Into<String>,
        triples: impl IntoIterator<Item = T>,
    ) -> Result<SessionKey, I>
    where
        T: Into<Triple<I, P>>,
    {
        let name = name.into();
        self.vacant(&name)?;
        let key = self.allocate_key();
        let session = assembly::assemble(
            name,
            key,
            triples.into_iter().map(Into::into).collect(),
        )?;
        tracing::debug!(
            session = session.name(),
            %key,
            count = session.len(),
            "session initialized"
        );
        Ok(self.register(session))
    }

    /// Registers an empty tree, activated and checked out.
    ///
    /// With `payload_kind` unset the session takes the kind of the first payload stored in it.
    pub fn initialize_empty_session(
        &mut self,
        name: impl Into<String>,
        payload_kind: Option<PayloadKind>,
    ) -> Result<SessionKey, I> {
        let name = name.into();
        self.vacant(&name)?;
        let key = self.allocate_key();
        tracing::debug!(session = %name, %key, "empty session initialized");
        Ok(self.register(Session::new(name, key, payload_kind)))
    }

    fn register(&mut self, session: Session<I, P>) -> SessionKey {
        let key = session.key();
        let name = session.name().to_owned();
        self.sessions.insert(name.clone(), session);
        self.current = Some(name);
        key
    }

    /// Drops the session and its tree. Returns whether it existed.
    ///
    /// Destroying the current session leaves no session checked out.
    pub fn destroy_session(&mut self, name: &str) -> bool {
        let Some(session) = self.sessions.remove(name) else {
            return false;
        };
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        tracing::debug!(session = name, key = %session.key(), "session destroyed");
        true
    }

    pub fn destroy_all_sessions(&mut self) {
        tracing::debug!(count = self.sessions.len(), "destroying all sessions");
        self.sessions.clear();
        self.current = None;
    }

    /// Makes `name` the current session.
    pub fn session_checkout(&mut self, name: &str) -> Result<SessionKey, I> {
        let key = self.named(name)?.key();
        self.current = Some(name.to_owned());
        tracing::debug!(session = name, %key, "session checked out");
        Ok(key)
    }

    pub fn activate_session(&mut self, name: &str) -> Result<(), I> {
        self.named_mut(name)?.set_active(true);
        tracing::debug!(session = name, "session activated");
        Ok(())
    }

    /// Deactivates `name`. Operations reaching an inactive session fail with
    /// [`Error::SessionInactive`] until it is activated again.
    pub fn deactivate_session(&mut self, name: &str) -> Result<(), I> {
        self.named_mut(name)?.set_active(false);
        tracing::debug!(session = name, "session deactivated");
        Ok(())
    }

    /// Registers a deep copy of `from` under the name `to`.
    ///
    /// The copy gets its own key, so elements read from one session never resolve to the other.
    /// The copy keeps the active flag of `from` and is not checked out.
    pub fn clone_session(&mut self, from: &str, to: impl Into<String>) -> Result<SessionKey, I> {
        let to = to.into();
        self.vacant(&to)?;
        let key = self.allocate_key();
        let copy = self.named(from)?.rekeyed(to.clone(), key);
        tracing::debug!(from, to = %to, %key, "session cloned");
        self.sessions.insert(to, copy);
        Ok(key)
    }

    /// Registered sessions, ordered by name.
    pub fn sessions(&self) -> impl Iterator<Item = &Session<I, P>> {
        self.sessions.values()
    }

    pub fn session(&self, name: &str) -> Option<&Session<I, P>> {
        self.sessions.get(name)
    }

    pub fn current_session(&self) -> Option<&Session<I, P>> {
        self.current
            .as_deref()
            .and_then(|name| self.sessions.get(name))
    }

    fn named(&self, name: &str) -> Result<&Session<I, P>, I> {
        self.sessions.get(name).ok_or_else(|| Error::UnknownSession {
            name: name.to_owned(),
        })
    }

    fn named_mut(&mut self, name: &str) -> Result<&mut Session<I, P>, I> {
        self.sessions
            .get_mut(name)
            .ok_or_else(|| Error::UnknownSession {
                name: name.to_owned(),
            })
    }

    pub(crate) fn session_by_key(&self, key: SessionKey) -> Option<&Session<I, P>> {
        self.sessions.values().find(|s| s.key() == key)
    }

    pub(crate) fn session_by_key_mut(&mut self, key: SessionKey) -> Option<&mut Session<I, P>> {
        self.sessions.values_mut().find(|s| s.key() == key)
    }

    /// Swaps in a working copy of a registered session.
    pub(crate) fn commit(&mut self, session: Session<I, P>) {
        if let Some(slot) = self.session_by_key_mut(session.key()) {
            *slot = session;
        }
    }
}
