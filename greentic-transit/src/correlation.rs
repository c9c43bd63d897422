//! Request to outcome correlation keyed by submission position.
//!
//! Two requests with identical fields are still two work items, so entries are
//! never keyed by value: the position a request was submitted at is its
//! identity.

use crate::errors::{Error, Result};

/// Ordered `(request, value)` pairs, one per submitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation<R, V> {
    entries: Vec<(R, V)>,
}

impl<R, V> Correlation<R, V> {
    /// Pair requests with values by position. Mismatched lengths mean the
    /// remote service broke the batch contract.
    pub fn zip(requests: Vec<R>, values: Vec<V>) -> Result<Self> {
        ensure_count(requests.len(), values.len())?;
        Ok(Self {
            entries: requests.into_iter().zip(values).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for the request submitted at `position`.
    pub fn get(&self, position: usize) -> Option<(&R, &V)> {
        self.entries
            .get(position)
            .map(|(request, value)| (request, value))
    }

    pub fn value(&self, position: usize) -> Option<&V> {
        self.entries.get(position).map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&R, &V)> {
        self.entries.iter().map(|(request, value)| (request, value))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn requests(&self) -> impl Iterator<Item = &R> {
        self.entries.iter().map(|(request, _)| request)
    }

    pub fn map_values<U>(self, mut f: impl FnMut(V) -> U) -> Correlation<R, U> {
        Correlation {
            entries: self
                .entries
                .into_iter()
                .map(|(request, value)| (request, f(value)))
                .collect(),
        }
    }

    pub fn into_entries(self) -> Vec<(R, V)> {
        self.entries
    }
}

impl<R, V> IntoIterator for Correlation<R, V> {
    type Item = (R, V);
    type IntoIter = std::vec::IntoIter<(R, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

pub(crate) fn ensure_count(requests: usize, results: usize) -> Result<()> {
    if requests != results {
        return Err(Error::Protocol { requests, results });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_requests_keep_separate_entries() {
        let correlation =
            Correlation::zip(vec!["x", "x"], vec![1, 2]).expect("lengths match");
        assert_eq!(correlation.len(), 2);
        assert_eq!(correlation.get(0), Some((&"x", &1)));
        assert_eq!(correlation.get(1), Some((&"x", &2)));
    }

    #[test]
    fn length_mismatch_is_a_protocol_error() {
        let err = Correlation::zip(vec!["a", "b", "c"], vec![1, 2]).expect_err("mismatch");
        assert!(matches!(
            err,
            Error::Protocol {
                requests: 3,
                results: 2
            }
        ));
    }

    #[test]
    fn map_values_preserves_order() {
        let correlation = Correlation::zip(vec!['a', 'b'], vec![1, 2])
            .expect("zip")
            .map_values(|value| value * 10);
        assert_eq!(correlation.into_entries(), vec![('a', 10), ('b', 20)]);
    }
}
