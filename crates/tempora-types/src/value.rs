//! The closed arithmetic trait every temporal element type implements.
//!
//! Operators are resolved at compile time through [`TemporalValue`] rather
//! than by inspecting the element type at runtime. Integral kinds use
//! wrapping arithmetic, so addition, subtraction and negation invert
//! exactly even across overflow. Multiplication and division do not, and
//! integer division also truncates. Bitwise operators return `None` for
//! fractional kinds.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Broad category of an element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Fixed-width integers. Bitwise operators are available.
    Integral,
    /// Totally ordered floating point.
    Fractional,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Integral => "integral",
            ValueKind::Fractional => "fractional",
        }
    }

    pub fn supports_bitwise(&self) -> bool {
        matches!(self, ValueKind::Integral)
    }
}

/// Element type of a temporal variable.
///
/// `Ord` is required: convergence detection compares candidate sets, and a
/// type without a total order cannot be placed in a timeline.
pub trait TemporalValue:
    Copy + Ord + Hash + Debug + Display + Send + Sync + 'static
{
    /// Category of this type.
    const KIND: ValueKind;

    /// Human-readable type name for diagnostics.
    const TYPE_NAME: &'static str;

    fn zero() -> Self;

    fn add_value(self, rhs: Self) -> Self;
    fn sub_value(self, rhs: Self) -> Self;
    fn mul_value(self, rhs: Self) -> Self;
    /// `None` when `rhs` is zero.
    fn div_value(self, rhs: Self) -> Option<Self>;
    /// `None` when `rhs` is zero.
    fn rem_value(self, rhs: Self) -> Option<Self>;
    fn neg_value(self) -> Self;

    /// Whether `self / rhs` loses nothing, so multiplying back recovers
    /// `self`. Fractional kinds always answer `true`.
    fn divides_exactly(self, rhs: Self) -> bool {
        !rhs.is_zero()
    }

    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    fn not_bits(self) -> Option<Self> {
        None
    }
    fn and_bits(self, _rhs: Self) -> Option<Self> {
        None
    }
    fn or_bits(self, _rhs: Self) -> Option<Self> {
        None
    }
    fn xor_bits(self, _rhs: Self) -> Option<Self> {
        None
    }
    fn shl_bits(self, _rhs: u32) -> Option<Self> {
        None
    }
    fn shr_bits(self, _rhs: u32) -> Option<Self> {
        None
    }

    /// Fail with [`TypeError::NotIntegral`] unless bitwise operators apply.
    fn require_integral(op: &'static str) -> Result<(), TypeError> {
        if Self::KIND.supports_bitwise() {
            Ok(())
        } else {
            Err(TypeError::NotIntegral {
                op,
                type_name: Self::TYPE_NAME,
            })
        }
    }
}

macro_rules! impl_integral {
    ($($t:ty),* $(,)?) => {
        $(
            impl TemporalValue for $t {
                const KIND: ValueKind = ValueKind::Integral;
                const TYPE_NAME: &'static str = stringify!($t);

                fn zero() -> Self {
                    0
                }
                fn add_value(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }
                fn sub_value(self, rhs: Self) -> Self {
                    self.wrapping_sub(rhs)
                }
                fn mul_value(self, rhs: Self) -> Self {
                    self.wrapping_mul(rhs)
                }
                fn div_value(self, rhs: Self) -> Option<Self> {
                    if rhs == 0 { None } else { Some(self.wrapping_div(rhs)) }
                }
                fn rem_value(self, rhs: Self) -> Option<Self> {
                    if rhs == 0 { None } else { Some(self.wrapping_rem(rhs)) }
                }
                fn neg_value(self) -> Self {
                    self.wrapping_neg()
                }
                fn divides_exactly(self, rhs: Self) -> bool {
                    rhs != 0 && self.wrapping_rem(rhs) == 0
                }
                fn not_bits(self) -> Option<Self> {
                    Some(!self)
                }
                fn and_bits(self, rhs: Self) -> Option<Self> {
                    Some(self & rhs)
                }
                fn or_bits(self, rhs: Self) -> Option<Self> {
                    Some(self | rhs)
                }
                fn xor_bits(self, rhs: Self) -> Option<Self> {
                    Some(self ^ rhs)
                }
                fn shl_bits(self, rhs: u32) -> Option<Self> {
                    Some(self.wrapping_shl(rhs))
                }
                fn shr_bits(self, rhs: u32) -> Option<Self> {
                    Some(self.wrapping_shr(rhs))
                }
            }
        )*
    };
}

impl_integral!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_fractional {
    ($($t:ty),* $(,)?) => {
        $(
            impl TemporalValue for OrderedFloat<$t> {
                const KIND: ValueKind = ValueKind::Fractional;
                const TYPE_NAME: &'static str = concat!("OrderedFloat<", stringify!($t), ">");

                fn zero() -> Self {
                    OrderedFloat(0.0)
                }
                fn add_value(self, rhs: Self) -> Self {
                    OrderedFloat(self.0 + rhs.0)
                }
                fn sub_value(self, rhs: Self) -> Self {
                    OrderedFloat(self.0 - rhs.0)
                }
                fn mul_value(self, rhs: Self) -> Self {
                    OrderedFloat(self.0 * rhs.0)
                }
                fn div_value(self, rhs: Self) -> Option<Self> {
                    if rhs.0 == 0.0 { None } else { Some(OrderedFloat(self.0 / rhs.0)) }
                }
                fn rem_value(self, rhs: Self) -> Option<Self> {
                    if rhs.0 == 0.0 { None } else { Some(OrderedFloat(self.0 % rhs.0)) }
                }
                fn neg_value(self) -> Self {
                    OrderedFloat(-self.0)
                }
            }
        )*
    };
}

impl_fractional!(f32, f64);

/// Wrap an `f64` as a fractional element, rejecting NaN (which has no
/// place in a total order).
pub fn ordered_f64(value: f64) -> Result<OrderedFloat<f64>, TypeError> {
    if value.is_nan() {
        Err(TypeError::Unordered { type_name: "f64 (NaN)" })
    } else {
        Ok(OrderedFloat(value))
    }
}
