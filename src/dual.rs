//! Forward-mode dual numbers: tape-free, stack-allocated, nestable.
//!
//! `Dual<T>` carries a value and its tangent, propagated by the standard
//! dual-number rules. The parameter is any [`Scalar`](crate::Scalar), so
//! duals nest for higher-order derivatives (`Dual<Dual<f64>>`) and wrap
//! reverse-mode handles for mixed mode (`Dual<Var<f64>>`). The math
//! surface is identical to [`Var`](crate::Var): the two modes produce
//! identical forward values for identical inputs.

use std::fmt::{self, Display};

use crate::scalar::Scalar;

/// A value paired with its tangent: `val + der·ε` where `ε² = 0`.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dual<T> {
    /// Primal value.
    pub val: T,
    /// Tangent (derivative) value.
    pub der: T,
}

impl<T: Scalar> Dual<T> {
    /// Create a dual from explicit value and tangent.
    #[inline]
    pub fn new(val: T, der: T) -> Self {
        Dual { val, der }
    }

    /// Create a constant (zero tangent).
    #[inline]
    pub fn constant(val: T) -> Self {
        Dual {
            val,
            der: T::zero(),
        }
    }

    /// Create the variable of differentiation (unit tangent).
    #[inline]
    pub fn variable(val: T) -> Self {
        Dual { val, der: T::one() }
    }

    /// Apply the chain rule: given `f(val)` and `f'(val)`, produce the
    /// dual result.
    #[inline]
    fn chain(self, f_val: T, f_der: T) -> Self {
        Dual {
            val: f_val,
            der: self.der * f_der,
        }
    }

    // ── Powers ──

    #[inline]
    pub fn recip(self) -> Self {
        let inv = T::one() / self.val;
        self.chain(inv, -inv * inv)
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        self.chain(s, T::one() / (s + s))
    }

    #[inline]
    pub fn cbrt(self) -> Self {
        let c = self.val.cbrt();
        let three = T::from_f64(3.0).unwrap();
        self.chain(c, T::one() / (three * c * c))
    }

    #[inline]
    pub fn powi(self, n: i32) -> Self {
        let partial = T::from_i32(n).unwrap() * self.val.powi(n - 1);
        self.chain(self.val.powi(n), partial)
    }

    #[inline]
    pub fn powf(self, n: Self) -> Self {
        // d(x^y) = y·x^(y-1)·dx + x^y·ln x·dy
        let value = self.val.powf(n.val);
        Dual {
            val: value,
            der: n.val * self.val.powf(n.val - T::one()) * self.der
                + value * self.val.ln() * n.der,
        }
    }

    // ── Exp / log ──

    #[inline]
    pub fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e)
    }

    #[inline]
    pub fn exp2(self) -> Self {
        let e = self.val.exp2();
        self.chain(e, e * T::LN_2())
    }

    #[inline]
    pub fn exp_m1(self) -> Self {
        self.chain(self.val.exp_m1(), self.val.exp())
    }

    #[inline]
    pub fn ln(self) -> Self {
        self.chain(self.val.ln(), T::one() / self.val)
    }

    #[inline]
    pub fn log2(self) -> Self {
        self.chain(self.val.log2(), T::one() / (self.val * T::LN_2()))
    }

    #[inline]
    pub fn log10(self) -> Self {
        self.chain(self.val.log10(), T::one() / (self.val * T::LN_10()))
    }

    #[inline]
    pub fn ln_1p(self) -> Self {
        self.chain(self.val.ln_1p(), T::one() / (T::one() + self.val))
    }

    #[inline]
    pub fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }

    // ── Trig ──

    #[inline]
    pub fn sin(self) -> Self {
        self.chain(self.val.sin(), self.val.cos())
    }

    #[inline]
    pub fn cos(self) -> Self {
        self.chain(self.val.cos(), -self.val.sin())
    }

    #[inline]
    pub fn tan(self) -> Self {
        let t = self.val.tan();
        self.chain(t, T::one() + t * t)
    }

    #[inline]
    pub fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    #[inline]
    pub fn asin(self) -> Self {
        self.chain(
            self.val.asin(),
            T::one() / (T::one() - self.val * self.val).sqrt(),
        )
    }

    #[inline]
    pub fn acos(self) -> Self {
        self.chain(
            self.val.acos(),
            -T::one() / (T::one() - self.val * self.val).sqrt(),
        )
    }

    #[inline]
    pub fn atan(self) -> Self {
        self.chain(self.val.atan(), T::one() / (T::one() + self.val * self.val))
    }

    #[inline]
    pub fn atan2(self, other: Self) -> Self {
        // self is y, other is x
        let denom = self.val * self.val + other.val * other.val;
        Dual {
            val: self.val.atan2(other.val),
            der: (other.val * self.der - self.val * other.der) / denom,
        }
    }

    // ── Hyperbolic ──

    #[inline]
    pub fn sinh(self) -> Self {
        self.chain(self.val.sinh(), self.val.cosh())
    }

    #[inline]
    pub fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }

    #[inline]
    pub fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.chain(t, T::one() - t * t)
    }

    #[inline]
    pub fn asinh(self) -> Self {
        self.chain(
            self.val.asinh(),
            T::one() / (self.val * self.val + T::one()).sqrt(),
        )
    }

    #[inline]
    pub fn acosh(self) -> Self {
        self.chain(
            self.val.acosh(),
            T::one() / (self.val * self.val - T::one()).sqrt(),
        )
    }

    #[inline]
    pub fn atanh(self) -> Self {
        self.chain(self.val.atanh(), T::one() / (T::one() - self.val * self.val))
    }

    // ── Misc ──

    #[inline]
    pub fn abs(self) -> Self {
        self.chain(self.val.abs(), self.val.signum())
    }

    #[inline]
    pub fn signum(self) -> Self {
        Dual::constant(self.val.signum())
    }

    #[inline]
    pub fn floor(self) -> Self {
        Dual::constant(self.val.floor())
    }

    #[inline]
    pub fn ceil(self) -> Self {
        Dual::constant(self.val.ceil())
    }

    #[inline]
    pub fn round(self) -> Self {
        Dual::constant(self.val.round())
    }

    #[inline]
    pub fn trunc(self) -> Self {
        Dual::constant(self.val.trunc())
    }

    #[inline]
    pub fn fract(self) -> Self {
        Dual {
            val: self.val.fract(),
            der: self.der,
        }
    }

    #[inline]
    pub fn mul_add(self, a: Self, b: Self) -> Self {
        Dual {
            val: self.val.mul_add(a.val, b.val),
            der: self.der * a.val + self.val * a.der + b.der,
        }
    }

    #[inline]
    pub fn hypot(self, other: Self) -> Self {
        let h = self.val.hypot(other.val);
        Dual {
            val: h,
            der: (self.val * self.der + other.val * other.der) / h,
        }
    }

    /// The larger operand; the tangent follows the winner.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        if self.val >= other.val {
            self
        } else {
            other
        }
    }

    /// The smaller operand; the tangent follows the winner.
    #[inline]
    pub fn min(self, other: Self) -> Self {
        if self.val <= other.val {
            self
        } else {
            other
        }
    }
}

impl<T: Scalar> Display for Dual<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}ε", self.val, self.der)
    }
}
