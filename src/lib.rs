// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Arbor: session-scoped trees assembled from id/parent-id triples
//!
//! This crate builds, queries and restructures hierarchical collections of arbitrary payloads,
//! where the hierarchy is expressed purely through an identifier / parent-identifier
//! relationship. Several independent trees ("sessions") can live side by side; exactly one of
//! them is the working target at any time.
//!
//! ## Core Concepts
//!
//! - [`Element`]: one node (id, parent id, payload, children) together with its [`Lifecycle`]
//!   state. Elements handed out by the engine are owned snapshots.
//! - [`Session`]: one tree plus an id index for constant-time lookup.
//! - [`Transaction`]: the registry of sessions and the pointer to the current one.
//! - [`Manager`]: the operations on the current session (persist, update, remove, cut, copy,
//!   queries), each running a validation pipeline before touching any tree.
//!
//! ## Lifecycle
//!
//! An element starts [`Lifecycle::NotExisted`] and becomes [`Lifecycle::Attached`] when
//! persisted. Editing an attached element through a setter flips it to [`Lifecycle::Detached`]:
//! the snapshot has diverged from what is stored and must be committed with
//! [`Manager::update_element`] before it can be cut, copied or removed again.
//!
//! ```rust
//! use arbor::{Error, Lifecycle, Manager, Operation, triples};
//!
//! let mut manager = Manager::<u32, &str>::new();
//! manager
//!     .transaction_mut()
//!     .initialize_session("docs", triples![(1, None, "A"), (2, Some(1), "B")])?;
//!
//! // Snapshots are isolated: editing one does not change the stored tree.
//! let mut two = manager.get_element_by_id(&2)?.unwrap();
//! two.set_payload("B2");
//! assert_eq!(two.lifecycle(), Lifecycle::Detached);
//! assert_eq!(manager.get_element_by_id(&2)?.unwrap().payload(), Some(&"B"));
//!
//! // Detached elements cannot be moved until they are committed.
//! assert!(matches!(
//!     manager.cut(&two, None),
//!     Err(Error::WrongLifecycle { operation: Operation::Cut, .. })
//! ));
//!
//! let two = manager.update_element(&two)?;
//! let two = manager.cut(&two, None)?;
//! assert_eq!(two.parent_id(), None);
//! assert_eq!(two.payload(), Some(&"B2"));
//! # Ok::<(), Error<u32>>(())
//! ```
//!
//! ## Tree Assembly
//!
//! Sessions are created from flat batches of [`Triple`]s. Elements whose parent id does not name
//! another element of the batch become direct children of the root. See the [`assembly`] module.
//!
//! ## Threading
//!
//! Everything is synchronous and in memory. None of the types synchronize internally; callers
//! sharing a [`Manager`] across threads must serialize access themselves.
//!
//! ## Features
//!
//! - `json`: Renders elements into `serde_json::Value` documents and lets
//!   `serde_json::Value` be used as a payload. This feature is enabled by default.
//! - `serde`: Provides `serde` support for the plain-data types.
//! - `arbitrary`: Implements `quickcheck::Arbitrary` for well-formed triple batches, useful for
//!   property-based testing.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use ahash::RandomState;
use std::{
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

// Fixed seeds, so benchmark and snapshot runs hash alike.
pub(crate) const DETERMINISTIC_HASHER: RandomState = RandomState::with_seeds(48, 1516, 23, 42);

pub mod assembly;
pub use assembly::Triple;
mod element;
pub use element::{Element, ElementId};
mod error;
pub use error::{Error, Result};
mod lifecycle;
pub use lifecycle::{Lifecycle, Operation};
pub mod manager;
pub use manager::Manager;
mod payload;
pub use payload::{Payload, PayloadKind};
mod session;
pub use session::{Session, SessionKey};
mod transaction;
pub use transaction::Transaction;
pub mod validation;
#[cfg(feature = "json")]
mod json;
/// Macros usable for tests and initialization
pub mod macros;
#[cfg(any(test, feature = "arbitrary"))]
pub mod test_util;

static ENABLE_DETERMINISM: AtomicBool = AtomicBool::new(false);

/// Pins the seeds of every id cache created from now on.
///
/// Meant for tests and benchmarks only: fixed seeds make the caches open to hash flooding.
#[doc(hidden)]
pub fn enable_determinism() {
    ENABLE_DETERMINISM.store(true, Ordering::Release);
}

fn create_map<K, V>() -> std::collections::HashMap<K, V, TreeRandomState> {
    std::collections::HashMap::with_hasher(TreeRandomState::default())
}

fn create_set<K>() -> std::collections::HashSet<K, TreeRandomState> {
    std::collections::HashSet::with_hasher(TreeRandomState::default())
}

/// Hasher state of the id caches: random seeds, or fixed ones once [`enable_determinism`] has
/// been called.
#[derive(Clone)]
pub struct TreeRandomState(RandomState);

impl Default for TreeRandomState {
    #[inline]
    fn default() -> Self {
        Self(if ENABLE_DETERMINISM.load(Ordering::Acquire) {
            DETERMINISTIC_HASHER
        } else {
            RandomState::new()
        })
    }
}

impl BuildHasher for TreeRandomState {
    type Hasher = <RandomState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        self.0.build_hasher()
    }
}
