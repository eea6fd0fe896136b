// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The checks every [`Manager`](crate::Manager) operation runs before it touches a tree.
//!
//! Which checks run, and in which order, is data: [`pipeline`] maps each [`Operation`] to a fixed
//! slice of [`Check`]s. The first failing check aborts the operation; since all checks run before
//! any mutation, a rejected operation leaves every session exactly as it was.
//!
//! | operation | session | root | lifecycle | type | duplicate ids |
//! |-----------|:-------:|:----:|:---------:|:----:|:-------------:|
//! | cut       | x       | x    | x         | x    | x             |
//! | copy      | x       | x    | x         | x    | x             |
//! | persist   | x       | x    | x         | x    | x             |
//! | update    | x       | x    | x         | x    | x             |
//! | remove    | x       | x    | x         | x    |               |
//! | contains  | x       |      |           |      |               |
use crate::{
    create_set,
    element::{Element, ElementId},
    error::{Error, Result},
    lifecycle::{Lifecycle, Operation},
    payload::Payload,
    session::{Session, SessionKey},
    transaction::Transaction,
};

/// One step of a validation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum Check {
    /// A session is checked out and active, and so is every session the operation reaches.
    /// Elements read from a session are only combined with elements of the same session.
    SessionActive,
    /// The source element is not the root.
    RootHandling,
    /// Source and target subtrees are in states the operation accepts.
    LifecycleMatch,
    /// Payloads have the kind of the session they end up in.
    TypeMatch,
    /// No id would be stored twice in the destination tree.
    DuplicateIds,
}

const STRUCTURAL: &[Check] = &[
    Check::SessionActive,
    Check::RootHandling,
    Check::LifecycleMatch,
    Check::TypeMatch,
    Check::DuplicateIds,
];

const REMOVE: &[Check] = &[
    Check::SessionActive,
    Check::RootHandling,
    Check::LifecycleMatch,
    Check::TypeMatch,
];

const QUERY: &[Check] = &[Check::SessionActive];

/// The checks `operation` runs, in order.
///
/// ```rust
/// # use arbor::{Operation, validation::{pipeline, Check}};
/// assert_eq!(pipeline(Operation::Contains), [Check::SessionActive]);
/// assert_eq!(pipeline(Operation::Cut)[0], Check::SessionActive);
/// ```
pub const fn pipeline(operation: Operation) -> &'static [Check] {
    match operation {
        Operation::Cut | Operation::Copy | Operation::Persist | Operation::Update => STRUCTURAL,
        Operation::Remove => REMOVE,
        Operation::Contains => QUERY,
    }
}

/// Sessions an operation was validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Plan {
    /// Session the source element is stored in; `None` for persist.
    pub(crate) source: Option<SessionKey>,
    /// Session the result ends up in.
    pub(crate) destination: SessionKey,
}

struct Scope<'a, I, P> {
    source: Option<&'a Session<I, P>>,
    destination: &'a Session<I, P>,
    /// Session of a non-root target.
    target: Option<&'a Session<I, P>>,
}

/// Context threaded through the checks of one operation.
pub(crate) struct Validation<'a, I, P> {
    transaction: &'a Transaction<I, P>,
    operation: Operation,
    source: &'a Element<I, P>,
    target: Option<&'a Element<I, P>>,
}

impl<'a, I, P> Validation<'a, I, P>
where
    I: ElementId,
    P: Payload,
{
    pub(crate) fn new(
        transaction: &'a Transaction<I, P>,
        operation: Operation,
        source: &'a Element<I, P>,
        target: Option<&'a Element<I, P>>,
    ) -> Self {
        Self {
            transaction,
            operation,
            source,
            target,
        }
    }

    /// Runs the pipeline of the operation.
    pub(crate) fn run(self) -> Result<Plan, I> {
        let mut scope = None;
        for &check in pipeline(self.operation) {
            let outcome = match check {
                Check::SessionActive => match self.sessions() {
                    Ok(resolved) => {
                        scope = Some(resolved);
                        Ok(())
                    }
                    Err(err) => Err(err),
                },
                Check::RootHandling => self.root_handling(),
                Check::LifecycleMatch => self.lifecycle_match(),
                // the session check is always first, so the scope is known past it
                Check::TypeMatch => match &scope {
                    Some(scope) => self.type_match(scope),
                    None => Err(Error::NoSession),
                },
                Check::DuplicateIds => match &scope {
                    Some(scope) => self.duplicate_ids(scope),
                    None => Err(Error::NoSession),
                },
            };
            if let Err(err) = outcome {
                tracing::debug!(
                    operation = ?self.operation,
                    ?check,
                    %err,
                    "validation rejected operation"
                );
                return Err(err);
            }
        }
        let scope = scope.ok_or(Error::NoSession)?;
        Ok(Plan {
            source: scope.source.map(Session::key),
            destination: scope.destination.key(),
        })
    }

    fn lookup(&self, key: SessionKey) -> Result<&'a Session<I, P>, I> {
        let session = self
            .transaction
            .session_by_key(key)
            .ok_or(Error::StaleSession)?;
        active(session)
    }

    fn sessions(&self) -> Result<Scope<'a, I, P>, I> {
        let current = checked_out(self.transaction)?;
        if self.operation == Operation::Contains {
            return Ok(Scope {
                source: None,
                destination: current,
                target: None,
            });
        }

        Self::same_session(self.source)?;
        if let Some(target) = self.target {
            Self::same_session(target)?;
        }
        let source = match self.operation {
            Operation::Persist => None,
            _ => self.source.session.map(|key| self.lookup(key)).transpose()?,
        };
        let target_session = match self.target {
            Some(target) => target.session.map(|key| self.lookup(key)).transpose()?,
            None => None,
        };
        let destination = match self.operation {
            Operation::Cut | Operation::Copy => target_session.unwrap_or(current),
            Operation::Update | Operation::Remove => source.unwrap_or(current),
            Operation::Persist | Operation::Contains => current,
        };
        Ok(Scope {
            source,
            destination,
            target: target_session.filter(|_| self.target.is_some_and(|t| !t.is_root)),
        })
    }

    fn root_handling(&self) -> Result<(), I> {
        if self.source.is_root || self.source.id.is_none() {
            return Err(Error::RootElement);
        }
        Ok(())
    }

    fn lifecycle_match(&self) -> Result<(), I> {
        let violation = self.source.lifecycle_violation(self.operation).or_else(|| {
            self.target
                .and_then(|target| target.lifecycle_violation(self.operation))
        });
        match violation {
            Some(state) => Err(Error::WrongLifecycle {
                operation: self.operation,
                state,
            }),
            None => Ok(()),
        }
    }

    /// Every element of a stored `tree` that was read from a session must come from `tree`'s
    /// session. New trees are left to the lifecycle check.
    fn same_session(tree: &Element<I, P>) -> Result<(), I> {
        if tree.lifecycle() == Lifecycle::NotExisted {
            return Ok(());
        }
        let foreign = tree
            .flatten()
            .into_iter()
            .filter(|e| e.lifecycle() != Lifecycle::NotExisted)
            .find(|e| e.session != tree.session);
        match foreign.and_then(|e| e.id.clone()) {
            Some(id) => Err(Error::ForeignElement { id }),
            None => Ok(()),
        }
    }

    /// The payloads the operation writes into the destination.
    ///
    /// Cut and copy move what is stored, which may have grown since the snapshot was taken.
    fn payloads(&self, scope: &Scope<'a, I, P>) -> Vec<&'a P> {
        match (self.operation, scope.source, self.source.id.as_ref()) {
            (Operation::Cut | Operation::Copy, Some(source), Some(id)) => source
                .subtree_ids(id)
                .iter()
                .filter_map(|i| source.node(i)?.payload.as_ref())
                .collect(),
            _ => self
                .source
                .flatten()
                .into_iter()
                .filter_map(Element::payload)
                .collect(),
        }
    }

    fn type_match(&self, scope: &Scope<'a, I, P>) -> Result<(), I> {
        // an untyped destination takes the kind of the first payload written to it
        let mut expected = scope.destination.payload_kind();
        for payload in self.payloads(scope) {
            let found = payload.kind();
            match expected {
                Some(kind) if kind != found => {
                    return Err(Error::TypeMismatch {
                        expected: kind,
                        found,
                    });
                }
                Some(_) => {}
                None => expected = Some(found),
            }
        }
        let target = scope.target.zip(self.target).filter(|(_, t)| !t.is_root);
        if let Some((session, target)) = target {
            if let Some((expected, found)) = session.kind_mismatch(target.payload()) {
                return Err(Error::TypeMismatch { expected, found });
            }
        }
        Ok(())
    }

    fn duplicate_ids(&self, scope: &Scope<'a, I, P>) -> Result<(), I> {
        let destination = scope.destination;
        match self.operation {
            Operation::Cut | Operation::Copy => {
                let Some((source, id)) = scope.source.zip(self.source.id.as_ref()) else {
                    return Ok(());
                };
                if source.key() == destination.key() {
                    return match self.operation {
                        Operation::Copy => Err(Error::DuplicateId { id: id.clone() }),
                        _ => Ok(()),
                    };
                }
                match source
                    .subtree_ids(id)
                    .into_iter()
                    .find(|i| destination.contains_id(i))
                {
                    Some(id) => Err(Error::DuplicateId { id }),
                    None => Ok(()),
                }
            }
            Operation::Persist => {
                let mut seen = create_set();
                for id in self.source.ids() {
                    if !seen.insert(id) || destination.contains_id(id) {
                        return Err(Error::DuplicateId { id: id.clone() });
                    }
                }
                Ok(())
            }
            Operation::Update => {
                let mut committed = create_set();
                let mut renamed = create_set();
                for element in self.source.flatten() {
                    if let Some(id) = element.id.as_ref() {
                        if !committed.insert(id) {
                            return Err(Error::DuplicateId { id: id.clone() });
                        }
                    }
                    if let Some(id) = element.pending_id.as_ref() {
                        if !renamed.insert(id) || destination.contains_id(id) {
                            return Err(Error::DuplicateId { id: id.clone() });
                        }
                    }
                }
                Ok(())
            }
            Operation::Remove | Operation::Contains => Ok(()),
        }
    }
}

/// The current session, provided it is active.
pub(crate) fn checked_out<I, P>(transaction: &Transaction<I, P>) -> Result<&Session<I, P>, I>
where
    I: ElementId,
    P: Payload,
{
    active(transaction.current_session().ok_or(Error::NoSession)?)
}

fn active<I, P>(session: &Session<I, P>) -> Result<&Session<I, P>, I>
where
    I: ElementId,
    P: Payload,
{
    if session.is_active() {
        Ok(session)
    } else {
        Err(Error::SessionInactive {
            name: session.name().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::Triple, payload::PayloadKind, triples};

    fn transaction() -> Transaction<u32, &'static str> {
        let mut tx = Transaction::new();
        tx.initialize_session("b", triples![(10, None, "X")]).unwrap();
        tx.initialize_session("a", triples![(1, None, "A"), (2, Some(1), "B")])
            .unwrap();
        tx
    }

    fn stored(
        tx: &Transaction<u32, &'static str>,
        name: &str,
        id: u32,
    ) -> Element<u32, &'static str> {
        tx.session(name).unwrap().get(&id).unwrap()
    }

    #[test]
    fn every_pipeline_starts_with_the_session_check() {
        for op in [
            Operation::Cut,
            Operation::Copy,
            Operation::Persist,
            Operation::Update,
            Operation::Remove,
            Operation::Contains,
        ] {
            assert_eq!(pipeline(op).first(), Some(&Check::SessionActive));
        }
        assert!(!pipeline(Operation::Remove).contains(&Check::DuplicateIds));
    }

    #[test]
    fn missing_and_inactive_sessions_are_told_apart() {
        let empty = Transaction::<u32, &str>::new();
        let e = Element::new(1, None, Some("A")).unwrap();
        let err = Validation::new(&empty, Operation::Persist, &e, None)
            .run()
            .unwrap_err();
        assert_eq!(err, Error::NoSession);

        let mut tx = transaction();
        tx.deactivate_session("a").unwrap();
        let err = Validation::new(&tx, Operation::Persist, &e, None)
            .run()
            .unwrap_err();
        assert_eq!(err, Error::SessionInactive { name: "a".into() });
    }

    #[test]
    fn session_check_runs_before_lifecycle() {
        let mut tx = transaction();
        let two = stored(&tx, "a", 2);
        tx.deactivate_session("a").unwrap();
        // two is attached, so persisting it would also be a lifecycle error
        let err = Validation::new(&tx, Operation::Persist, &two, None)
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::SessionInactive { .. }));
    }

    #[test]
    fn root_is_rejected() {
        let tx = transaction();
        let root = tx.session("a").unwrap().root();
        let err = Validation::new(&tx, Operation::Remove, &root, None)
            .run()
            .unwrap_err();
        assert_eq!(err, Error::RootElement);
    }

    #[test]
    fn lifecycle_covers_targets() {
        let tx = transaction();
        let one = stored(&tx, "a", 1);
        let mut ten = stored(&tx, "b", 10);
        ten.set_payload("Y");
        let err = Validation::new(&tx, Operation::Cut, &one, Some(&ten))
            .run()
            .unwrap_err();
        assert_eq!(
            err,
            Error::WrongLifecycle {
                operation: Operation::Cut,
                state: Lifecycle::Detached
            }
        );
    }

    #[test]
    fn plan_names_source_and_destination() {
        let tx = transaction();
        let one = stored(&tx, "a", 1);
        let ten = stored(&tx, "b", 10);
        let plan = Validation::new(&tx, Operation::Cut, &one, Some(&ten))
            .run()
            .unwrap();
        assert_eq!(plan.source, Some(tx.session("a").unwrap().key()));
        assert_eq!(plan.destination, tx.session("b").unwrap().key());

        let plan = Validation::new(&tx, Operation::Cut, &one, None).run().unwrap();
        assert_eq!(plan.destination, tx.session("a").unwrap().key());
    }

    #[test]
    fn duplicate_ids_per_operation() {
        let tx = transaction();
        let one = stored(&tx, "a", 1);
        let err = Validation::new(&tx, Operation::Copy, &one, None)
            .run()
            .unwrap_err();
        assert_eq!(err, Error::DuplicateId { id: 1 });

        let mut fresh = Element::new(5, None, Some("E")).unwrap();
        fresh.add_child(Element::new(2, None, Some("F")).unwrap());
        let err = Validation::new(&tx, Operation::Persist, &fresh, None)
            .run()
            .unwrap_err();
        assert_eq!(err, Error::DuplicateId { id: 2 });

        let mut one = stored(&tx, "a", 1);
        one.set_id(2);
        let err = Validation::new(&tx, Operation::Update, &one, None)
            .run()
            .unwrap_err();
        assert_eq!(err, Error::DuplicateId { id: 2 });
    }

    #[test]
    fn stale_handles_are_reported() {
        let mut tx = transaction();
        let ten = stored(&tx, "b", 10);
        assert!(tx.destroy_session("b"));
        let err = Validation::new(&tx, Operation::Remove, &ten, None)
            .run()
            .unwrap_err();
        assert_eq!(err, Error::StaleSession);
    }

    #[test]
    fn subtrees_must_come_from_one_session() {
        let tx = transaction();
        let mut one = stored(&tx, "a", 1);
        one.add_child(stored(&tx, "b", 10));
        let err = Validation::new(&tx, Operation::Update, &one, None)
            .run()
            .unwrap_err();
        assert_eq!(err, Error::ForeignElement { id: 10 });

        // targets are held to the same rule
        let two = stored(&tx, "a", 2);
        let mut ten = stored(&tx, "b", 10);
        ten.add_child(stored(&tx, "a", 1));
        let err = Validation::new(&tx, Operation::Cut, &two, Some(&ten))
            .run()
            .unwrap_err();
        assert_eq!(err, Error::ForeignElement { id: 1 });
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Value {
        Num(i64),
        Text(&'static str),
    }

    impl Payload for Value {
        fn kind(&self) -> PayloadKind {
            match self {
                Value::Num(_) => PayloadKind::named("num"),
                Value::Text(_) => PayloadKind::named("text"),
            }
        }
    }

    #[test]
    fn type_match_reads_the_stored_subtree() {
        let mut tx = Transaction::<u32, Value>::new();
        tx.initialize_session("text", triples![(10, None, Value::Text("ten"))])
            .unwrap();
        let loose = tx
            .initialize_session("loose", vec![Triple::without_payload(1, None)])
            .unwrap();
        let one = tx.session("loose").unwrap().get(&1).unwrap();
        let text_root = tx.session("text").unwrap().root();

        // the stored subtree grows after the snapshot was taken
        let seven = Element::new(2, Some(1), Some(Value::Num(7))).unwrap();
        tx.session_by_key_mut(loose).unwrap().insert(&seven, Some(1));

        for op in [Operation::Cut, Operation::Copy] {
            let err = Validation::new(&tx, op, &one, Some(&text_root))
                .run()
                .unwrap_err();
            assert_eq!(
                err,
                Error::TypeMismatch {
                    expected: PayloadKind::named("text"),
                    found: PayloadKind::named("num"),
                }
            );
        }
    }

    #[test]
    fn untyped_destinations_expect_one_kind() {
        let mut tx = Transaction::<u32, Value>::new();
        tx.initialize_empty_session("empty", None).unwrap();
        let mut mixed = Element::new(1, None, Some(Value::Num(1))).unwrap();
        mixed.add_child(Element::new(2, None, Some(Value::Text("two"))).unwrap());

        let err = Validation::new(&tx, Operation::Persist, &mixed, None)
            .run()
            .unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch {
                expected: PayloadKind::named("num"),
                found: PayloadKind::named("text"),
            }
        );
        assert_eq!(tx.current_session().unwrap().payload_kind(), None);
    }
}
