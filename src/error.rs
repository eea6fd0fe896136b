// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Error types shared by every operation of the engine.
//!
//! Errors fall in two classes. **Usage errors** are raised for arguments that can never lead to a
//! valid outcome, independent of what is stored. **State errors** are raised after validation ran
//! against the stored trees, and always before any tree is mutated. Use [`Error::is_usage`] to
//! tell them apart.
use crate::{lifecycle::Lifecycle, lifecycle::Operation, payload::PayloadKind};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T, I> = std::result::Result<T, Error<I>>;

/// Errors produced by [`Manager`](crate::Manager) and [`Transaction`](crate::Transaction).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error<I> {
    /// An element was declared to be its own parent.
    #[error("element {id:?} cannot be its own parent")]
    SelfParent { id: I },

    /// A session was requested from an empty batch of triples.
    #[error("cannot assemble a session from an empty batch")]
    EmptyInput,

    /// Sessions must be named.
    #[error("session name must not be empty")]
    EmptySessionName,

    /// No session is checked out.
    #[error("no session selected")]
    NoSession,

    /// The session exists but is deactivated.
    #[error("session '{name}' is inactive")]
    SessionInactive { name: String },

    /// No session is registered under this name.
    #[error("unknown session '{name}'")]
    UnknownSession { name: String },

    /// The element refers to a session that has since been destroyed.
    #[error("element refers to a destroyed session")]
    StaleSession,

    /// A session with this name is already registered.
    #[error("session '{name}' already exists")]
    SessionExists { name: String },

    /// A payload does not have the kind the owning session holds.
    #[error("payload type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: PayloadKind,
        found: PayloadKind,
    },

    /// The root element cannot be the subject of an operation.
    #[error("operation not permitted on the root element")]
    RootElement,

    /// An element of the subtree is in a state the operation does not accept.
    #[error("{operation:?} is not permitted on an element in state {state:?}")]
    WrongLifecycle {
        operation: Operation,
        state: Lifecycle,
    },

    /// The id is already taken in the destination tree.
    #[error("duplicate id {id:?}")]
    DuplicateId { id: I },

    /// The subtree holds an element read from a different session than its top element.
    #[error("element {id:?} belongs to another session")]
    ForeignElement { id: I },

    /// The element is not stored in its session.
    #[error("element {id:?} not found")]
    ElementNotFound { id: I },

    /// The move would put an element below itself.
    #[error("element {id:?} cannot be moved below its own subtree")]
    Cycle { id: I },

    /// Tree assembly lost or duplicated elements.
    #[error("assembled tree holds {found} elements, expected {expected}")]
    AssemblyMismatch { expected: usize, found: usize },
}

impl<I> Error<I> {
    /// Returns true for errors caused by invalid arguments rather than by stored state.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::SelfParent { .. } | Error::EmptyInput | Error::EmptySessionName
        )
    }
}
