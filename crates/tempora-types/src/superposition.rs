//! Superposed values: a set of candidate values, optionally weighted.
//!
//! The timeline engine treats this as an opaque algebraic value. It needs
//! set union, set equality, elementwise arithmetic (cartesian product over
//! both operands), and a collapse to a single observed value.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::CollapseError;

/// An ordered, de-duplicated set of candidate values.
///
/// Unweighted candidates carry an implicit weight of `1.0`. Duplicates
/// produced by arithmetic accumulate their weights.
#[derive(Clone, Debug, PartialEq)]
pub struct Superposition<T: Ord> {
    states: BTreeMap<T, f64>,
    weighted: bool,
}

impl<T: Ord + Copy> Superposition<T> {
    /// A superposition with no candidates.
    pub fn empty() -> Self {
        Self {
            states: BTreeMap::new(),
            weighted: false,
        }
    }

    /// A single definite value.
    pub fn scalar(value: T) -> Self {
        let mut states = BTreeMap::new();
        states.insert(value, 1.0);
        Self {
            states,
            weighted: false,
        }
    }

    /// Unweighted candidates; duplicates collapse.
    pub fn from_values<I: IntoIterator<Item = T>>(values: I) -> Self {
        let mut states = BTreeMap::new();
        for v in values {
            states.insert(v, 1.0);
        }
        Self {
            states,
            weighted: false,
        }
    }

    /// Weighted candidates; duplicate values sum their weights.
    pub fn weighted<I: IntoIterator<Item = (T, f64)>>(pairs: I) -> Self {
        let mut states = BTreeMap::new();
        for (v, w) in pairs {
            *states.entry(v).or_insert(0.0) += w;
        }
        Self {
            states,
            weighted: true,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Exactly one candidate.
    pub fn is_scalar(&self) -> bool {
        self.states.len() == 1
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub fn contains(&self, value: &T) -> bool {
        self.states.contains_key(value)
    }

    /// Candidates in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.states.keys()
    }

    /// Candidates in ascending order, copied.
    pub fn values(&self) -> Vec<T> {
        self.states.keys().copied().collect()
    }

    pub fn weight_of(&self, value: &T) -> Option<f64> {
        self.states.get(value).copied()
    }

    /// Candidate-set equality; weights are ignored.
    pub fn set_eq(&self, other: &Self) -> bool {
        self.states.len() == other.states.len()
            && self.states.keys().zip(other.states.keys()).all(|(a, b)| a == b)
    }

    /// Union of both candidate sets. Shared candidates sum their weights
    /// when either side is weighted.
    pub fn union(&self, other: &Self) -> Self {
        let weighted = self.weighted || other.weighted;
        let mut states = self.states.clone();
        for (v, w) in &other.states {
            let entry = states.entry(*v).or_insert(0.0);
            if weighted {
                *entry += w;
            } else {
                *entry = 1.0;
            }
        }
        Self { states, weighted }
    }

    /// Union of many superpositions.
    pub fn union_all<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
        T: 'a,
    {
        items
            .into_iter()
            .fold(Self::empty(), |acc, next| acc.union(next))
    }

    /// Apply `f` to every candidate.
    pub fn map<F: Fn(T) -> T>(&self, f: F) -> Self {
        let mut states = BTreeMap::new();
        for (v, w) in &self.states {
            self.accumulate(&mut states, f(*v), *w);
        }
        Self {
            states,
            weighted: self.weighted,
        }
    }

    /// Apply a fallible `f` to every candidate; `None` if any candidate fails.
    pub fn try_map<F: Fn(T) -> Option<T>>(&self, f: F) -> Option<Self> {
        let mut states = BTreeMap::new();
        for (v, w) in &self.states {
            self.accumulate(&mut states, f(*v)?, *w);
        }
        Some(Self {
            states,
            weighted: self.weighted,
        })
    }

    /// Elementwise `f` over the cartesian product of both candidate sets.
    pub fn combine<F: Fn(T, T) -> T>(&self, other: &Self, f: F) -> Self {
        let weighted = self.weighted || other.weighted;
        let mut states = BTreeMap::new();
        for (a, wa) in &self.states {
            for (b, wb) in &other.states {
                Self::accumulate_with(&mut states, f(*a, *b), wa * wb, weighted);
            }
        }
        Self { states, weighted }
    }

    /// Fallible cartesian combination; `None` if any pair fails.
    pub fn try_combine<F: Fn(T, T) -> Option<T>>(&self, other: &Self, f: F) -> Option<Self> {
        let weighted = self.weighted || other.weighted;
        let mut states = BTreeMap::new();
        for (a, wa) in &self.states {
            for (b, wb) in &other.states {
                Self::accumulate_with(&mut states, f(*a, *b)?, wa * wb, weighted);
            }
        }
        Some(Self { states, weighted })
    }

    /// Collapse to a single value.
    ///
    /// The highest weight wins; ties (and unweighted sets) resolve to the
    /// smallest candidate.
    pub fn observe(&self) -> Result<T, CollapseError> {
        if self.states.is_empty() {
            return Err(CollapseError::Empty);
        }
        if !self.weighted {
            return self.states.keys().next().copied().ok_or(CollapseError::Empty);
        }

        let mut best: Option<(T, f64)> = None;
        for (v, w) in &self.states {
            if *w <= 0.0 {
                continue;
            }
            match best {
                Some((_, bw)) if *w <= bw => {}
                _ => best = Some((*v, *w)),
            }
        }
        best.map(|(v, _)| v).ok_or(CollapseError::ZeroWeight)
    }

    fn accumulate(&self, states: &mut BTreeMap<T, f64>, value: T, weight: f64) {
        Self::accumulate_with(states, value, weight, self.weighted);
    }

    fn accumulate_with(states: &mut BTreeMap<T, f64>, value: T, weight: f64, weighted: bool) {
        let entry = states.entry(value).or_insert(0.0);
        if weighted {
            *entry += weight;
        } else {
            *entry = 1.0;
        }
    }
}

impl<T: Ord + Copy> From<T> for Superposition<T> {
    fn from(value: T) -> Self {
        Self::scalar(value)
    }
}

impl<T: Ord + Copy> FromIterator<T> for Superposition<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

impl<T: Ord + Copy + fmt::Display> fmt::Display for Superposition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scalar() {
            if let Some(v) = self.states.keys().next() {
                return write!(f, "{v}");
            }
        }
        write!(f, "any(")?;
        for (i, v) in self.states.keys().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values_dedupes_and_sorts() {
        let s = Superposition::from_values([3, 1, 2, 3]);
        assert_eq!(s.values(), vec![1, 2, 3]);
        assert_eq!(s.len(), 3);
        assert!(!s.is_scalar());
    }

    #[test]
    fn test_set_eq_ignores_weights() {
        let a = Superposition::weighted([(1, 0.2), (2, 0.8)]);
        let b = Superposition::from_values([2, 1]);
        assert!(a.set_eq(&b));
        assert!(!a.set_eq(&Superposition::scalar(1)));
    }

    #[test]
    fn test_combine_is_cartesian() {
        let a = Superposition::from_values([1, 2]);
        let b = Superposition::from_values([10, 20]);
        let sum = a.combine(&b, |x, y| x + y);
        assert_eq!(sum.values(), vec![11, 12, 21, 22]);
    }

    #[test]
    fn test_try_map_fails_atomically() {
        let s = Superposition::from_values([0, 2]);
        assert!(s.try_map(|v| if v == 0 { None } else { Some(v) }).is_none());
    }

    #[test]
    fn test_observe() {
        assert_eq!(Superposition::from_values([5, 3, 9]).observe(), Ok(3));
        assert_eq!(Superposition::weighted([(1, 0.1), (7, 0.6), (9, 0.3)]).observe(), Ok(7));
        assert_eq!(Superposition::<i32>::empty().observe(), Err(CollapseError::Empty));
        assert_eq!(
            Superposition::weighted([(1, 0.0), (2, 0.0)]).observe(),
            Err(CollapseError::ZeroWeight)
        );
    }

    #[test]
    fn test_union_sums_weights_when_weighted() {
        let a = Superposition::weighted([(1, 0.5)]);
        let b = Superposition::weighted([(1, 0.25), (2, 0.25)]);
        let u = a.union(&b);
        assert_eq!(u.weight_of(&1), Some(0.75));
        assert_eq!(u.weight_of(&2), Some(0.25));
    }

    #[test]
    fn test_display() {
        assert_eq!(Superposition::scalar(4).to_string(), "4");
        assert_eq!(Superposition::from_values([0, 1, 2]).to_string(), "any(0, 1, 2)");
        assert_eq!(Superposition::<i32>::empty().to_string(), "any()");
    }
}
