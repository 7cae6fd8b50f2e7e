//! Reverse-replay engine.
//!
//! Given the operations a forward commit applied, reconstruct the value
//! that must have existed before them by applying each inverse in reverse
//! order. Modulus, the lossy bitwise operators and truncating integer
//! division have no inverse: many forward values map to the same result. Replay does not guess; it reports
//! the chain as approximate and the caller keeps its forward-evaluated value.

use tempora_types::{Superposition, TemporalValue};

use crate::ledger::LedgerOp;

/// Result of replaying a commit's operations backwards.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplayOutcome<T: Ord> {
    /// Every inverse applied; this is the reconstructed prior slice.
    Exact(Superposition<T>),
    /// No operations to undo.
    Empty,
    /// An operation in the chain cannot be inverted.
    Approximate { op: &'static str },
}

/// Undo `ops` (given in application order) starting from `current`.
pub fn replay<T: TemporalValue>(
    current: &Superposition<T>,
    ops: &[LedgerOp<T>],
) -> ReplayOutcome<T> {
    if ops.is_empty() {
        return ReplayOutcome::Empty;
    }

    let mut value = current.clone();
    for op in ops.iter().rev() {
        match invert(op, &value) {
            Some(prior) => value = prior,
            None => return ReplayOutcome::Approximate { op: op.name() },
        }
    }
    ReplayOutcome::Exact(value)
}

/// Apply the algebraic inverse of one operation to `result`.
///
/// `None` when the operation (or this particular operand) is not invertible.
pub fn invert<T: TemporalValue>(
    op: &LedgerOp<T>,
    result: &Superposition<T>,
) -> Option<Superposition<T>> {
    match op {
        LedgerOp::Add(o) => Some(result.combine(o, T::sub_value)),
        LedgerOp::Sub(o) => Some(result.combine(o, T::add_value)),
        // r = o - x  =>  x = o - r
        LedgerOp::SubFrom(o) => Some(o.combine(result, T::sub_value)),
        LedgerOp::Mul(o) => {
            if o.iter().any(|v| v.is_zero()) {
                return None;
            }
            result.try_combine(o, T::div_value)
        }
        LedgerOp::Div { exact: false, .. } | LedgerOp::DivInto { exact: false, .. } => None,
        LedgerOp::Div { divisor, .. } => Some(result.combine(divisor, T::mul_value)),
        // r = o / x  =>  x = o / r
        LedgerOp::DivInto { dividend, .. } => dividend.try_combine(result, T::div_value),
        LedgerOp::Neg => Some(result.map(T::neg_value)),
        LedgerOp::Not => result.try_map(T::not_bits),
        LedgerOp::Xor(o) => result.try_combine(o, T::xor_bits),
        LedgerOp::Rem(_) | LedgerOp::And(_) | LedgerOp::Or(_) | LedgerOp::Shl(_) | LedgerOp::Shr(_) => {
            None
        }
    }
}

/// Reverse reconstruction for `target = f(source)` where the source is a
/// different variable.
///
/// The offset `k = incoming - source` is re-applied to the target's own
/// baseline, so the source's ledger is never consulted or consumed.
pub fn reconstruct_cross_variable<T: TemporalValue>(
    incoming: &Superposition<T>,
    source: &Superposition<T>,
    baseline: &Superposition<T>,
) -> Superposition<T> {
    let offset = incoming.combine(source, T::sub_value);
    baseline.combine(&offset, T::add_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(values: &[i64]) -> Superposition<i64> {
        Superposition::from_values(values.iter().copied())
    }

    #[test]
    fn test_invertible_ops_roundtrip() {
        let x = s(&[6]);
        let cases = vec![
            (LedgerOp::Add(s(&[3])), s(&[9])),
            (LedgerOp::Sub(s(&[3])), s(&[3])),
            (LedgerOp::SubFrom(s(&[10])), s(&[4])),
            (LedgerOp::Mul(s(&[4])), s(&[24])),
            (LedgerOp::Div { divisor: s(&[2]), exact: true }, s(&[3])),
            (LedgerOp::DivInto { dividend: s(&[12]), exact: true }, s(&[2])),
            (LedgerOp::Neg, s(&[-6])),
            (LedgerOp::Not, s(&[!6])),
            (LedgerOp::Xor(s(&[5])), s(&[6 ^ 5])),
        ];

        for (op, forward) in cases {
            assert_eq!(invert(&op, &forward), Some(x.clone()), "inverse of {}", op.name());
        }
    }

    #[test]
    fn test_replay_applies_in_reverse_order() {
        // x = (x + 1) * 2 from 4 gives 10
        let ops = vec![LedgerOp::Add(s(&[1])), LedgerOp::Mul(s(&[2]))];
        assert_eq!(replay(&s(&[10]), &ops), ReplayOutcome::Exact(s(&[4])));
    }

    #[test]
    fn test_modulus_is_flagged_not_corrected() {
        let ops = vec![LedgerOp::Add(s(&[1])), LedgerOp::Rem(s(&[3]))];
        assert_eq!(replay(&s(&[1]), &ops), ReplayOutcome::Approximate { op: "rem" });
    }

    #[test]
    fn test_multiply_by_zero_is_not_invertible() {
        assert_eq!(invert(&LedgerOp::Mul(s(&[0])), &s(&[0])), None);
        assert_eq!(
            invert(&LedgerOp::DivInto { dividend: s(&[8]), exact: true }, &s(&[0, 4])),
            None
        );
    }

    #[test]
    fn test_truncating_division_is_approximate() {
        // 7 / 2 gives 3; multiplying back would claim 6
        let ops = vec![LedgerOp::Div { divisor: s(&[2]), exact: false }];
        assert_eq!(replay(&s(&[3]), &ops), ReplayOutcome::Approximate { op: "div" });
    }

    #[test]
    fn test_empty_chain() {
        assert_eq!(replay(&s(&[1]), &[]), ReplayOutcome::Empty);
    }

    #[test]
    fn test_cross_variable_reconstruction() {
        let rebuilt = reconstruct_cross_variable(&s(&[12]), &s(&[10]), &s(&[20]));
        assert_eq!(rebuilt, s(&[22]));
    }
}
