// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Implementation of the quickcheck::Arbitrary trait for triple batches.
use crate::assembly::Triple;
use quickcheck::{Arbitrary, Gen};

/// A well-formed batch of triples with unique ids.
///
/// Ids are `1..=n`. Each triple either has no parent, names an earlier id of the batch, or names
/// an id outside of the batch, so the assembled tree always accounts for every triple.
#[derive(Debug, Clone)]
pub struct Forest {
    pub triples: Vec<Triple<u32, String>>,
    /// Number of triples that end up as direct children of the root.
    pub top_level: usize,
}

impl Forest {
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.triples.iter().map(|t| t.id)
    }
}

impl Arbitrary for Forest {
    fn arbitrary(g: &mut Gen) -> Self {
        let size = u32::try_from(g.size().max(1)).unwrap_or(u32::MAX);
        let n = u32::arbitrary(g) % size + 1;
        let mut triples = Vec::new();
        let mut top_level = 0;
        for id in 1..=n {
            let parent = match u8::arbitrary(g) % 4 {
                // only the first element has no earlier id to hang off
                _ if id == 1 => None,
                0 => None,
                1 => Some(n + 1 + u32::from(u8::arbitrary(g))),
                _ => Some(u32::arbitrary(g) % (id - 1) + 1),
            };
            if parent.is_none_or(|p| p > n) {
                top_level += 1;
            }
            triples.push(Triple::new(id, parent, format!("p{id}")));
        }
        // Fisher-Yates, since assembly must not depend on input order
        for i in (1..triples.len()).rev() {
            let j = usize::arbitrary(g) % (i + 1);
            triples.swap(i, j);
        }
        Self { triples, top_level }
    }
}
