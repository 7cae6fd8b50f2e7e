//! Operation ledger.
//!
//! Every forward commit to a temporal variable is logged here together with
//! the invertible operations that produced the committed value. A reverse
//! half-cycle pops the matching entry and hands its operations to the
//! replay engine. The ledger is a single stack per runtime; entries for
//! different variables interleave, so lookups filter by target.
//!
//! Inside a convergence run each forward half-cycle begins with a boundary
//! record. Lookups never cross the top boundary, and the reverse half-cycle
//! that follows discards its whole frame once it finishes, so entries are
//! consumed or skipped exactly once.

use tempora_types::{Direction, Superposition, TemporalValue, VarId};

/// How a committed value relates to the variable receiving it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A literal value, no source variable.
    Constant,
    /// Derived from the target's own current value (`x = x + 1`).
    SelfFeedback,
    /// Derived from a different variable (`b = a + 2`).
    CrossVariable(VarId),
}

impl WriteOrigin {
    /// Classify an expression source relative to the write target.
    pub fn classify(source: Option<VarId>, target: VarId) -> Self {
        match source {
            None => WriteOrigin::Constant,
            Some(id) if id == target => WriteOrigin::SelfFeedback,
            Some(id) => WriteOrigin::CrossVariable(id),
        }
    }

    pub fn is_cross_variable(&self) -> bool {
        matches!(self, WriteOrigin::CrossVariable(_))
    }
}

/// One operation applied by a deferred expression.
///
/// The set is closed: these are the only kinds the replay engine knows how
/// to invert (or knows it cannot).
#[derive(Clone, Debug, PartialEq)]
pub enum LedgerOp<T: Ord> {
    /// `x + operand`
    Add(Superposition<T>),
    /// `x - operand`
    Sub(Superposition<T>),
    /// `operand - x`
    SubFrom(Superposition<T>),
    /// `x * operand`
    Mul(Superposition<T>),
    /// `x / divisor`. `exact` is false when any quotient was truncated.
    Div { divisor: Superposition<T>, exact: bool },
    /// `dividend / x`. `exact` is false when any quotient was truncated.
    DivInto { dividend: Superposition<T>, exact: bool },
    /// `x % operand`
    Rem(Superposition<T>),
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `x & operand`
    And(Superposition<T>),
    /// `x | operand`
    Or(Superposition<T>),
    /// `x ^ operand`
    Xor(Superposition<T>),
    /// `x << bits`
    Shl(u32),
    /// `x >> bits`
    Shr(u32),
}

impl<T: TemporalValue> LedgerOp<T> {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerOp::Add(_) => "add",
            LedgerOp::Sub(_) => "sub",
            LedgerOp::SubFrom(_) => "rsub",
            LedgerOp::Mul(_) => "mul",
            LedgerOp::Div { .. } => "div",
            LedgerOp::DivInto { .. } => "rdiv",
            LedgerOp::Rem(_) => "rem",
            LedgerOp::Neg => "neg",
            LedgerOp::Not => "not",
            LedgerOp::And(_) => "and",
            LedgerOp::Or(_) => "or",
            LedgerOp::Xor(_) => "xor",
            LedgerOp::Shl(_) => "shl",
            LedgerOp::Shr(_) => "shr",
        }
    }

    /// Whether the operation kind has an algebraic inverse at all.
    ///
    /// Value-dependent cases (multiplying by zero, truncating division) are
    /// decided during replay.
    pub fn is_invertible(&self) -> bool {
        !matches!(
            self,
            LedgerOp::Rem(_) | LedgerOp::And(_) | LedgerOp::Or(_) | LedgerOp::Shl(_) | LedgerOp::Shr(_)
        )
    }
}

/// A logged forward commit.
#[derive(Clone, Debug)]
pub struct LedgerEntry<T: Ord> {
    /// Variable the value was committed to.
    pub target: VarId,
    /// Commit sequence number, unique within the ledger.
    pub seq: u64,
    /// Epoch active when the commit happened.
    pub epoch: i64,
    /// Direction at record time. Always forward; kept for diagnostics.
    pub direction: Direction,
    pub origin: WriteOrigin,
    /// Operations in application order.
    pub ops: Vec<LedgerOp<T>>,
}

#[derive(Clone, Debug)]
enum LedgerRecord<T: Ord> {
    Entry(LedgerEntry<T>),
    Boundary { epoch: i64 },
}

/// Stack of forward commits for one runtime.
#[derive(Debug)]
pub struct OperationLedger<T: Ord> {
    records: Vec<LedgerRecord<T>>,
    next_seq: u64,
}

impl<T: TemporalValue> Default for OperationLedger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TemporalValue> OperationLedger<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_seq: 1,
        }
    }

    /// Log a forward commit. Returns its sequence number.
    pub fn record(
        &mut self,
        target: VarId,
        epoch: i64,
        origin: WriteOrigin,
        ops: Vec<LedgerOp<T>>,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.push(LedgerRecord::Entry(LedgerEntry {
            target,
            seq,
            epoch,
            direction: Direction::Forward,
            origin,
            ops,
        }));
        seq
    }

    /// Open a new frame. Lookups stop here until the frame is closed.
    pub fn push_boundary(&mut self, epoch: i64) {
        self.records.push(LedgerRecord::Boundary { epoch });
    }

    /// Pop the most recent entry for `target` in the top frame.
    pub fn take_latest(&mut self, target: VarId) -> Option<LedgerEntry<T>> {
        let mut found = None;
        for (idx, record) in self.records.iter().enumerate().rev() {
            match record {
                LedgerRecord::Boundary { .. } => break,
                LedgerRecord::Entry(entry) if entry.target == target => {
                    found = Some(idx);
                    break;
                }
                LedgerRecord::Entry(_) => {}
            }
        }

        match self.records.remove(found?) {
            LedgerRecord::Entry(entry) => Some(entry),
            LedgerRecord::Boundary { .. } => None,
        }
    }

    /// Discard the top frame, including its boundary.
    ///
    /// Returns how many unconsumed entries were dropped with it.
    pub fn close_frame(&mut self) -> usize {
        let mut skipped = 0;
        while let Some(record) = self.records.pop() {
            match record {
                LedgerRecord::Boundary { epoch } => {
                    tracing::debug!(epoch, skipped, "closed ledger frame");
                    return skipped;
                }
                LedgerRecord::Entry(entry) => {
                    tracing::debug!(
                        target_var = %entry.target,
                        seq = entry.seq,
                        "skipping unconsumed ledger entry"
                    );
                    skipped += 1;
                }
            }
        }
        skipped
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of logged entries (boundaries excluded).
    pub fn depth(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, LedgerRecord::Entry(_)))
            .count()
    }

    /// Number of open frames.
    pub fn frames(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, LedgerRecord::Boundary { .. }))
            .count()
    }

    /// Entries currently logged for `target`, across all frames.
    pub fn depth_for(&self, target: VarId) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, LedgerRecord::Entry(e) if e.target == target))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(n: i64) -> LedgerOp<i64> {
        LedgerOp::Add(Superposition::scalar(n))
    }

    #[test]
    fn test_take_latest_filters_by_target() {
        let a = VarId::next();
        let b = VarId::next();
        let mut ledger = OperationLedger::<i64>::new();

        ledger.record(a, 1, WriteOrigin::SelfFeedback, vec![add(1)]);
        ledger.record(b, 1, WriteOrigin::SelfFeedback, vec![add(2)]);
        ledger.record(a, 1, WriteOrigin::SelfFeedback, vec![add(3)]);

        let latest = ledger.take_latest(a).unwrap();
        assert_eq!(latest.ops, vec![add(3)]);
        assert_eq!(ledger.depth(), 2);

        let next = ledger.take_latest(a).unwrap();
        assert_eq!(next.ops, vec![add(1)]);
        assert!(ledger.take_latest(a).is_none());
        assert_eq!(ledger.depth_for(b), 1);
    }

    #[test]
    fn test_boundary_stops_lookup() {
        let a = VarId::next();
        let mut ledger = OperationLedger::<i64>::new();

        ledger.record(a, -1, WriteOrigin::SelfFeedback, vec![add(1)]);
        ledger.push_boundary(2);
        assert!(ledger.take_latest(a).is_none());

        ledger.record(a, 2, WriteOrigin::SelfFeedback, vec![add(5)]);
        assert_eq!(ledger.take_latest(a).unwrap().epoch, 2);
    }

    #[test]
    fn test_close_frame_counts_skipped() {
        let a = VarId::next();
        let b = VarId::next();
        let mut ledger = OperationLedger::<i64>::new();

        ledger.record(a, -1, WriteOrigin::Constant, vec![]);
        ledger.push_boundary(2);
        ledger.record(a, 2, WriteOrigin::SelfFeedback, vec![add(1)]);
        ledger.record(b, 2, WriteOrigin::CrossVariable(a), vec![add(1)]);

        assert_eq!(ledger.frames(), 1);
        assert_eq!(ledger.close_frame(), 2);
        assert_eq!(ledger.frames(), 0);
        assert_eq!(ledger.depth(), 1);
    }

    #[test]
    fn test_classify_origin() {
        let a = VarId::next();
        let b = VarId::next();
        assert_eq!(WriteOrigin::classify(None, a), WriteOrigin::Constant);
        assert_eq!(WriteOrigin::classify(Some(a), a), WriteOrigin::SelfFeedback);
        assert!(WriteOrigin::classify(Some(a), b).is_cross_variable());
    }

    #[test]
    fn test_invertibility_by_kind() {
        assert!(add(1).is_invertible());
        assert!(LedgerOp::<i64>::Neg.is_invertible());
        assert!(LedgerOp::Xor(Superposition::scalar(3i64)).is_invertible());
        assert!(!LedgerOp::Rem(Superposition::scalar(3i64)).is_invertible());
        assert!(!LedgerOp::<i64>::Shl(2).is_invertible());
    }
}
