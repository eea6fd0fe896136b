// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The element state machine.
//!
//! ```text
//!  NotExisted --persist--> Attached --setter--> Detached
//!      ^                     |  ^                  |
//!      +------remove---------+  +-----update-------+
//! ```
//!
//! A brand new element is never [`Lifecycle::Detached`]: it has nothing to diverge from, so it is
//! mutated in place until persisted.

/// Where an element stands relative to the stored tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum Lifecycle {
    /// Never stored, or removed.
    #[default]
    NotExisted,
    /// Mirrors the stored copy.
    Attached,
    /// Diverged from the stored copy; pending an update.
    Detached,
}

/// The operations gated by [`Lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum Operation {
    Cut,
    Copy,
    Persist,
    Update,
    Remove,
    Contains,
}

impl Lifecycle {
    /// Returns whether an element in this state may take part in `op`.
    pub fn permits(self, op: Operation) -> bool {
        use Lifecycle::*;
        use Operation::*;
        match (self, op) {
            (NotExisted, Persist) => true,
            (Attached, Cut | Copy | Remove | Update | Contains) => true,
            (Detached, Update) => true,
            _ => false,
        }
    }

    /// The state an element moves to when one of its fields is mutated.
    pub(crate) fn touched(self) -> Self {
        match self {
            Lifecycle::NotExisted => Lifecycle::NotExisted,
            Lifecycle::Attached | Lifecycle::Detached => Lifecycle::Detached,
        }
    }
}
