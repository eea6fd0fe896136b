// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Tree assembly: from flat `(id, parent_id, payload)` triples to a session tree.
//!
//! Producing the triples is the caller's business. Any mapping from the caller's own records
//! works, as long as it yields a [`Triple`] (or something convertible into one) per record, with
//! unique ids.
//!
//! Assembly runs in three steps:
//!
//! 1. one node is placed per triple, indexed by id;
//! 2. every node is linked under the node its `parent_id` names, or under the root when no such
//!    node exists;
//! 3. the tree is walked from the root and the element count compared to the number of triples.
//!
//! A mismatch in step 3 means nodes were lost (duplicate ids) or cut off from the root (parent
//! cycles); the session under construction is dropped and nothing is registered.
use crate::{
    error::{Error, Result},
    payload::Payload,
    session::{Session, SessionKey},
};
use std::hash::Hash;

/// One record of a flat tree description.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Triple<I, P> {
    pub id: I,
    pub parent_id: Option<I>,
    pub payload: Option<P>,
}

impl<I, P> Triple<I, P> {
    pub fn new(id: I, parent_id: Option<I>, payload: P) -> Self {
        Self {
            id,
            parent_id,
            payload: Some(payload),
        }
    }

    pub fn without_payload(id: I, parent_id: Option<I>) -> Self {
        Self {
            id,
            parent_id,
            payload: None,
        }
    }
}

impl<I, P> From<(I, Option<I>, P)> for Triple<I, P> {
    fn from((id, parent_id, payload): (I, Option<I>, P)) -> Self {
        Self::new(id, parent_id, payload)
    }
}

impl<I, P> From<(I, Option<I>, Option<P>)> for Triple<I, P> {
    fn from((id, parent_id, payload): (I, Option<I>, Option<P>)) -> Self {
        Self {
            id,
            parent_id,
            payload,
        }
    }
}

/// Builds a session from `triples`. The session is returned active but unregistered.
pub(crate) fn assemble<I, P>(
    name: String,
    key: SessionKey,
    triples: Vec<Triple<I, P>>,
) -> Result<Session<I, P>, I>
where
    I: Clone + Eq + Hash + Ord,
    P: Payload,
{
    if triples.is_empty() {
        return Err(Error::EmptyInput);
    }

    let mut kinds = triples.iter().filter_map(|t| t.payload.as_ref().map(P::kind));
    let payload_kind = kinds.next();
    if let Some(expected) = payload_kind {
        if let Some(found) = kinds.find(|k| *k != expected) {
            return Err(Error::TypeMismatch { expected, found });
        }
    }
    if let Some(t) = triples.iter().find(|t| t.parent_id.as_ref() == Some(&t.id)) {
        return Err(Error::SelfParent { id: t.id.clone() });
    }

    let expected = triples.len();
    let mut session = Session::new(name, key, payload_kind);
    let links: Vec<(I, Option<I>)> = triples
        .iter()
        .map(|t| (t.id.clone(), t.parent_id.clone()))
        .collect();
    for Triple {
        id,
        parent_id,
        payload,
    } in triples
    {
        session.place(id, parent_id, payload);
    }
    for (id, parent_id) in links {
        let parent = session.resolve(parent_id.as_ref());
        session.link(&id, parent);
    }

    let found = session.reachable();
    if found != expected {
        tracing::warn!(
            session = session.name(),
            expected,
            found,
            "assembled tree lost elements, discarding session"
        );
        return Err(Error::AssemblyMismatch { expected, found });
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{payload::PayloadKind, triples};

    fn build(triples: Vec<Triple<u32, &'static str>>) -> Result<Session<u32, &'static str>, u32> {
        assemble("t".into(), SessionKey::from_raw(1), triples)
    }

    #[test]
    fn unresolvable_parents_hang_off_the_root() {
        let session = build(triples![
            (1, None, "A"),
            (2, Some(1), "B"),
            (3, Some(1), "C"),
            (4, Some(99), "D"),
        ])
        .unwrap();

        assert_eq!(session.len(), 4);
        assert_eq!(session.top_level().collect::<Vec<_>>(), [&1, &4]);
        let one = session.get(&1).unwrap();
        assert_eq!(one.children().len(), 2);
        assert!(one.child(&2).is_some() && one.child(&3).is_some());
        // the declared parent survives even though it does not resolve
        assert_eq!(session.get(&4).unwrap().parent_id(), Some(&99));
        assert_eq!(
            session.payload_kind(),
            Some(PayloadKind::of::<&'static str>())
        );
    }

    #[test]
    fn input_order_does_not_matter() {
        let session =
            build(triples![(3, Some(2), "C"), (2, Some(1), "B"), (1, None, "A")]).unwrap();
        insta::assert_snapshot!(session.root().render(), @r"
        1
          2
            3
        ");
    }

    #[test]
    fn empty_batches_are_rejected() {
        assert_eq!(build(Vec::new()).unwrap_err(), Error::EmptyInput);
    }

    #[test]
    fn duplicate_ids_trip_the_count_guard() {
        let err = build(triples![(1, None, "A"), (1, None, "B")]).unwrap_err();
        assert_eq!(
            err,
            Error::AssemblyMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn parent_cycles_trip_the_count_guard() {
        let err =
            build(triples![(1, None, "A"), (2, Some(3), "B"), (3, Some(2), "C")]).unwrap_err();
        assert_eq!(
            err,
            Error::AssemblyMismatch {
                expected: 3,
                found: 1
            }
        );
    }

    #[test]
    fn self_parents_are_rejected() {
        let err = build(triples![(1, Some(1), "A")]).unwrap_err();
        assert_eq!(err, Error::SelfParent { id: 1 });
    }

    #[test]
    fn mixed_payload_kinds_are_rejected() {
        let triples: Vec<Triple<u32, records::Record>> = vec![
            Triple::new(1, None, records::Record::Person),
            Triple::new(2, Some(1), records::Record::Place),
        ];
        let err = assemble("t".into(), SessionKey::from_raw(1), triples).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn payload_less_batches_are_untyped() {
        let triples: Vec<Triple<u32, String>> = vec![Triple::without_payload(1, None)];
        let session = assemble("t".into(), SessionKey::from_raw(1), triples).unwrap();
        assert_eq!(session.payload_kind(), None);
    }

    mod records {
        use crate::payload::{Payload, PayloadKind};

        #[derive(Debug, Clone, PartialEq)]
        pub enum Record {
            Person,
            Place,
        }

        impl Payload for Record {
            fn kind(&self) -> PayloadKind {
                match self {
                    Record::Person => PayloadKind::named("person"),
                    Record::Place => PayloadKind::named("place"),
                }
            }
        }
    }
}
