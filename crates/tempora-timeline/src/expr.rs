//! Deferred expressions over temporal variables.
//!
//! An [`Expr`] is a pure builder: each operator evaluates eagerly against
//! the value captured when the expression was started and remembers the
//! operation, but nothing reaches a timeline or the ledger until the
//! expression is committed to a variable.

use std::ops;

use tempora_types::{Superposition, TemporalValue, VarId};

use crate::Result;
use crate::error::TemporalError;
use crate::ledger::LedgerOp;

/// Variable an expression was started from.
#[derive(Clone, Debug)]
pub struct ExprSource<T: Ord> {
    pub var: VarId,
    /// The source's current slice at the moment the expression began.
    pub snapshot: Superposition<T>,
}

/// A computed value plus the operations that produced it.
#[derive(Clone, Debug)]
pub struct Expr<T: Ord> {
    value: Superposition<T>,
    source: Option<ExprSource<T>>,
    ops: Vec<LedgerOp<T>>,
}

impl<T: TemporalValue> Expr<T> {
    /// A literal with no source variable.
    pub fn constant(value: impl Into<Superposition<T>>) -> Self {
        Self {
            value: value.into(),
            source: None,
            ops: Vec::new(),
        }
    }

    pub(crate) fn from_var(var: VarId, current: Superposition<T>) -> Self {
        Self {
            value: current.clone(),
            source: Some(ExprSource {
                var,
                snapshot: current,
            }),
            ops: Vec::new(),
        }
    }

    pub fn value(&self) -> &Superposition<T> {
        &self.value
    }

    pub fn source(&self) -> Option<&ExprSource<T>> {
        self.source.as_ref()
    }

    pub fn source_id(&self) -> Option<VarId> {
        self.source.as_ref().map(|s| s.var)
    }

    pub fn ops(&self) -> &[LedgerOp<T>] {
        &self.ops
    }

    pub fn into_value(self) -> Superposition<T> {
        self.value
    }

    pub(crate) fn into_parts(self) -> (Superposition<T>, Option<ExprSource<T>>, Vec<LedgerOp<T>>) {
        (self.value, self.source, self.ops)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, rhs: impl Into<Superposition<T>>) -> Self {
        let rhs = rhs.into();
        self.value = self.value.combine(&rhs, T::add_value);
        self.ops.push(LedgerOp::Add(rhs));
        self
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(mut self, rhs: impl Into<Superposition<T>>) -> Self {
        let rhs = rhs.into();
        self.value = self.value.combine(&rhs, T::sub_value);
        self.ops.push(LedgerOp::Sub(rhs));
        self
    }

    /// `lhs - self`
    pub fn rsub(mut self, lhs: impl Into<Superposition<T>>) -> Self {
        let lhs = lhs.into();
        self.value = lhs.combine(&self.value, T::sub_value);
        self.ops.push(LedgerOp::SubFrom(lhs));
        self
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(mut self, rhs: impl Into<Superposition<T>>) -> Self {
        let rhs = rhs.into();
        self.value = self.value.combine(&rhs, T::mul_value);
        self.ops.push(LedgerOp::Mul(rhs));
        self
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(mut self, rhs: impl Into<Superposition<T>>) -> Result<Self> {
        let divisor = rhs.into();
        let quotient = self
            .value
            .try_combine(&divisor, T::div_value)
            .ok_or(TemporalError::DivisionByZero { op: "div" })?;
        let exact = divides_exactly(&self.value, &divisor);
        self.value = quotient;
        self.ops.push(LedgerOp::Div { divisor, exact });
        Ok(self)
    }

    /// `lhs / self`
    pub fn rdiv(mut self, lhs: impl Into<Superposition<T>>) -> Result<Self> {
        let dividend = lhs.into();
        let quotient = dividend
            .try_combine(&self.value, T::div_value)
            .ok_or(TemporalError::DivisionByZero { op: "rdiv" })?;
        let exact = divides_exactly(&dividend, &self.value);
        self.value = quotient;
        self.ops.push(LedgerOp::DivInto { dividend, exact });
        Ok(self)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn rem(mut self, rhs: impl Into<Superposition<T>>) -> Result<Self> {
        let rhs = rhs.into();
        self.value = self
            .value
            .try_combine(&rhs, T::rem_value)
            .ok_or(TemporalError::DivisionByZero { op: "rem" })?;
        self.ops.push(LedgerOp::Rem(rhs));
        Ok(self)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(mut self) -> Self {
        self.value = self.value.map(T::neg_value);
        self.ops.push(LedgerOp::Neg);
        self
    }

    pub fn bit_not(mut self) -> Result<Self> {
        T::require_integral("not")?;
        self.value = self.value.try_map(T::not_bits).ok_or_else(unsupported::<T>("not"))?;
        self.ops.push(LedgerOp::Not);
        Ok(self)
    }

    pub fn bit_and(self, rhs: impl Into<Superposition<T>>) -> Result<Self> {
        self.bitwise("and", rhs.into(), T::and_bits, LedgerOp::And)
    }

    pub fn bit_or(self, rhs: impl Into<Superposition<T>>) -> Result<Self> {
        self.bitwise("or", rhs.into(), T::or_bits, LedgerOp::Or)
    }

    pub fn bit_xor(self, rhs: impl Into<Superposition<T>>) -> Result<Self> {
        self.bitwise("xor", rhs.into(), T::xor_bits, LedgerOp::Xor)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn shl(mut self, bits: u32) -> Result<Self> {
        T::require_integral("shl")?;
        self.value = self
            .value
            .try_map(|v| v.shl_bits(bits))
            .ok_or_else(unsupported::<T>("shl"))?;
        self.ops.push(LedgerOp::Shl(bits));
        Ok(self)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn shr(mut self, bits: u32) -> Result<Self> {
        T::require_integral("shr")?;
        self.value = self
            .value
            .try_map(|v| v.shr_bits(bits))
            .ok_or_else(unsupported::<T>("shr"))?;
        self.ops.push(LedgerOp::Shr(bits));
        Ok(self)
    }

    fn bitwise(
        mut self,
        name: &'static str,
        rhs: Superposition<T>,
        f: fn(T, T) -> Option<T>,
        record: fn(Superposition<T>) -> LedgerOp<T>,
    ) -> Result<Self> {
        T::require_integral(name)?;
        self.value = self
            .value
            .try_combine(&rhs, f)
            .ok_or_else(unsupported::<T>(name))?;
        self.ops.push(record(rhs));
        Ok(self)
    }
}

fn divides_exactly<T: TemporalValue>(dividends: &Superposition<T>, divisors: &Superposition<T>) -> bool {
    dividends
        .iter()
        .all(|&n| divisors.iter().all(|&d| n.divides_exactly(d)))
}

fn unsupported<T: TemporalValue>(op: &'static str) -> impl FnOnce() -> TemporalError {
    move || {
        TemporalError::UnsupportedOperation(tempora_types::TypeError::NotIntegral {
            op,
            type_name: T::TYPE_NAME,
        })
    }
}

impl<T: TemporalValue, R: Into<Superposition<T>>> ops::Add<R> for Expr<T> {
    type Output = Expr<T>;

    fn add(self, rhs: R) -> Expr<T> {
        Expr::add(self, rhs)
    }
}

impl<T: TemporalValue, R: Into<Superposition<T>>> ops::Sub<R> for Expr<T> {
    type Output = Expr<T>;

    fn sub(self, rhs: R) -> Expr<T> {
        Expr::sub(self, rhs)
    }
}

impl<T: TemporalValue, R: Into<Superposition<T>>> ops::Mul<R> for Expr<T> {
    type Output = Expr<T>;

    fn mul(self, rhs: R) -> Expr<T> {
        Expr::mul(self, rhs)
    }
}

impl<T: TemporalValue> ops::Neg for Expr<T> {
    type Output = Expr<T>;

    fn neg(self) -> Expr<T> {
        Expr::neg(self)
    }
}
