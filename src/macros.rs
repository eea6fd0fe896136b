// (c) Copyright 2025 Helsing GmbH. All rights reserved.
/// Convenience macro for building a batch of [`Triple`](crate::Triple)s.
///
/// Each entry is `(id, parent_id, payload)`, with `parent_id` an `Option`.
///
/// ```rust
/// # use arbor::{triples, Triple};
/// let batch = triples![
///     (1, None, "A"),
///     (2, Some(1), "B"),
/// ];
/// assert_eq!(batch[1], Triple::new(2, Some(1), "B"));
/// ```
#[macro_export]
macro_rules! triples {
    ($(($id:expr, $parent:expr, $payload:expr)),* $(,)?) => {
        ::std::vec![$($crate::Triple::new($id, $parent, $payload)),*]
    };
}
