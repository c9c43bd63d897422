//! Partitioning of sign/verify batches by key version.
//!
//! The signing and verification endpoints accept one key version per call, so
//! a heterogeneous batch becomes one remote call per distinct version.

use std::collections::HashMap;

use crate::correlation::ensure_count;
use crate::errors::{Error, Result};
use crate::types::{SigningRequest, VerificationRequest};

/// Requests that may pin a key version.
pub trait KeyVersioned {
    fn key_version(&self) -> Option<u32>;
}

impl KeyVersioned for SigningRequest {
    fn key_version(&self) -> Option<u32> {
        SigningRequest::key_version(self)
    }
}

impl KeyVersioned for VerificationRequest {
    fn key_version(&self) -> Option<u32> {
        VerificationRequest::key_version(self)
    }
}

/// Positions of the requests sharing one key version. `None` collects the
/// requests that did not ask for a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchGroup {
    key_version: Option<u32>,
    members: Vec<usize>,
}

impl BatchGroup {
    pub fn key_version(&self) -> Option<u32> {
        self.key_version
    }

    /// Input positions of the members, in input order.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members resolved against the list the group was built from.
    pub fn select<'a, R>(&'a self, requests: &'a [R]) -> impl Iterator<Item = &'a R> + 'a {
        self.members.iter().map(move |&position| &requests[position])
    }
}

/// Group requests by key version, in order of first encounter.
pub fn group_by_key_version<R: KeyVersioned>(requests: &[R]) -> Vec<BatchGroup> {
    let mut groups: Vec<BatchGroup> = Vec::new();
    let mut index: HashMap<Option<u32>, usize> = HashMap::new();

    for (position, request) in requests.iter().enumerate() {
        let version = request.key_version();
        let slot = *index.entry(version).or_insert_with(|| {
            groups.push(BatchGroup {
                key_version: version,
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push(position);
    }

    groups
}

/// Put each group's results back at their members' input positions.
pub fn scatter<'a, T>(
    len: usize,
    completed: impl IntoIterator<Item = (&'a BatchGroup, Vec<T>)>,
) -> Result<Vec<T>> {
    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(len).collect();
    let mut filled = 0usize;

    for (group, results) in completed {
        ensure_count(group.len(), results.len())?;
        for (&position, result) in group.members.iter().zip(results) {
            let slot = slots.get_mut(position).ok_or(Error::Protocol {
                requests: len,
                results: position + 1,
            })?;
            *slot = Some(result);
            filled += 1;
        }
    }

    ensure_count(len, filled)?;
    slots
        .into_iter()
        .map(|slot| slot.ok_or(Error::Protocol {
            requests: len,
            results: filled,
        }))
        .collect()
}
