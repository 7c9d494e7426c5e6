//! The differentiable handle: a value plus a tape reference.

use std::fmt::{self, Display};

use crate::node::{NodeId, UnaryKind};
use crate::tape_stack::{with_active_stack, StackThreadLocal};
use crate::Float;

/// Reverse-mode differentiable scalar.
///
/// A `Var` is a cheap, copyable reference into the active tape: the eager
/// forward value plus a [`NodeId`]. Copying or assigning a handle never
/// touches the tape; many handles may alias one node, which lives until
/// its tape epoch is bulk-recovered. Arithmetic and math calls allocate
/// nodes on the thread's active [`TapeStack`](crate::TapeStack).
///
/// A handle must not be read after the scope that created its node has
/// been recovered; `NodeId` indices keep that mistake memory-safe, but the
/// values read back are garbage from a later epoch.
#[derive(Clone, Copy, Debug)]
pub struct Var<F: Float> {
    pub(crate) value: F,
    pub(crate) id: NodeId,
}

impl<F: Float> Var<F> {
    /// Create a constant: participates in arithmetic, never in gradients,
    /// and is not recorded on the tape.
    #[inline]
    pub fn constant(value: F) -> Self {
        Var {
            value,
            id: NodeId::CONSTANT,
        }
    }

    /// Current forward value.
    #[inline]
    pub fn value(&self) -> F {
        self.value
    }

    /// Tape reference (for diagnostics and the sweep entry point).
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Whether this handle is an untracked constant.
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.id.is_constant()
    }

    #[inline]
    pub(crate) fn from_parts(value: F, id: NodeId) -> Self {
        Var { value, id }
    }
}

impl<F: Float + StackThreadLocal> Var<F> {
    /// Record an independent variable on the active tape.
    #[inline]
    pub fn new(value: F) -> Self {
        let id = with_active_stack(|t| t.push_leaf(value));
        Var { value, id }
    }

    /// Accumulated adjoint after a sweep. Zero before any sweep; constants
    /// always report zero.
    #[inline]
    pub fn adjoint(&self) -> F {
        if self.id.is_constant() {
            F::zero()
        } else {
            with_active_stack(|t: &mut crate::TapeStack<F>| t.adjoint(self.id))
        }
    }

    /// Build a handle from a caller-computed value and explicit partials,
    /// bypassing the operator layer. The escape hatch for wrapping an
    /// external computation whose gradient is known in closed form.
    pub fn with_partials(value: F, terms: &[(Var<F>, F)]) -> Self {
        let tracked = terms.iter().filter(|(v, _)| !v.is_constant()).count();
        if tracked == 0 {
            return Var::constant(value);
        }
        let id = with_active_stack(|t| {
            t.push_aggregate(
                value,
                terms
                    .iter()
                    .filter(|(v, _)| !v.is_constant())
                    .map(|&(v, partial)| crate::arena::Term { id: v.id, partial })
                    .collect::<Vec<_>>()
                    .into_iter(),
            )
        });
        Var { value, id }
    }

    // ── Node-building helpers ──

    #[inline]
    pub(crate) fn unary(self, value: F, kind: UnaryKind) -> Self {
        if self.id.is_constant() {
            return Var::constant(value);
        }
        let id = with_active_stack(|t| t.push_unary(value, self.id, kind));
        Var { value, id }
    }

    #[inline]
    pub(crate) fn unary_scaled(self, value: F, partial: F) -> Self {
        if self.id.is_constant() {
            return Var::constant(value);
        }
        let id = with_active_stack(|t| t.push_unary_scaled(value, self.id, partial));
        Var { value, id }
    }

    #[inline]
    pub(crate) fn binary_scaled(value: F, a: Var<F>, b: Var<F>, partials: [F; 2]) -> Self {
        if a.id.is_constant() && b.id.is_constant() {
            return Var::constant(value);
        }
        let id = with_active_stack(|t| t.push_binary_scaled(value, [a.id, b.id], partials));
        Var { value, id }
    }

    // ── Powers ──

    #[inline]
    pub fn recip(self) -> Self {
        self.unary(self.value.recip(), UnaryKind::Recip)
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        self.unary(self.value.sqrt(), UnaryKind::Sqrt)
    }

    #[inline]
    pub fn cbrt(self) -> Self {
        self.unary(self.value.cbrt(), UnaryKind::Cbrt)
    }

    #[inline]
    pub fn powi(self, n: i32) -> Self {
        let partial = F::from_i32(n).unwrap() * self.value.powi(n - 1);
        self.unary_scaled(self.value.powi(n), partial)
    }

    pub fn powf(self, n: Self) -> Self {
        let value = self.value.powf(n.value);
        if n.id.is_constant() {
            return self.unary_scaled(value, n.value * self.value.powf(n.value - F::one()));
        }
        // d/dx x^y = y·x^(y-1),  d/dy x^y = x^y·ln x
        Var::binary_scaled(
            value,
            self,
            n,
            [
                n.value * self.value.powf(n.value - F::one()),
                value * self.value.ln(),
            ],
        )
    }

    // ── Exp / log ──

    #[inline]
    pub fn exp(self) -> Self {
        self.unary(self.value.exp(), UnaryKind::Exp)
    }

    #[inline]
    pub fn exp2(self) -> Self {
        self.unary(self.value.exp2(), UnaryKind::Exp2)
    }

    #[inline]
    pub fn exp_m1(self) -> Self {
        self.unary(self.value.exp_m1(), UnaryKind::ExpM1)
    }

    #[inline]
    pub fn ln(self) -> Self {
        self.unary(self.value.ln(), UnaryKind::Ln)
    }

    #[inline]
    pub fn log2(self) -> Self {
        self.unary(self.value.log2(), UnaryKind::Log2)
    }

    #[inline]
    pub fn log10(self) -> Self {
        self.unary(self.value.log10(), UnaryKind::Log10)
    }

    #[inline]
    pub fn ln_1p(self) -> Self {
        self.unary(self.value.ln_1p(), UnaryKind::Ln1p)
    }

    #[inline]
    pub fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }

    // ── Trig ──

    #[inline]
    pub fn sin(self) -> Self {
        self.unary(self.value.sin(), UnaryKind::Sin)
    }

    #[inline]
    pub fn cos(self) -> Self {
        self.unary(self.value.cos(), UnaryKind::Cos)
    }

    #[inline]
    pub fn tan(self) -> Self {
        self.unary(self.value.tan(), UnaryKind::Tan)
    }

    #[inline]
    pub fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    #[inline]
    pub fn asin(self) -> Self {
        self.unary(self.value.asin(), UnaryKind::Asin)
    }

    #[inline]
    pub fn acos(self) -> Self {
        self.unary(self.value.acos(), UnaryKind::Acos)
    }

    #[inline]
    pub fn atan(self) -> Self {
        self.unary(self.value.atan(), UnaryKind::Atan)
    }

    pub fn atan2(self, other: Self) -> Self {
        // self is y, other is x:  ∂y = x/(x²+y²),  ∂x = -y/(x²+y²)
        let denom = self.value * self.value + other.value * other.value;
        Var::binary_scaled(
            self.value.atan2(other.value),
            self,
            other,
            [other.value / denom, -self.value / denom],
        )
    }

    // ── Hyperbolic ──

    #[inline]
    pub fn sinh(self) -> Self {
        self.unary(self.value.sinh(), UnaryKind::Sinh)
    }

    #[inline]
    pub fn cosh(self) -> Self {
        self.unary(self.value.cosh(), UnaryKind::Cosh)
    }

    #[inline]
    pub fn tanh(self) -> Self {
        self.unary(self.value.tanh(), UnaryKind::Tanh)
    }

    #[inline]
    pub fn asinh(self) -> Self {
        self.unary(self.value.asinh(), UnaryKind::Asinh)
    }

    #[inline]
    pub fn acosh(self) -> Self {
        self.unary(self.value.acosh(), UnaryKind::Acosh)
    }

    #[inline]
    pub fn atanh(self) -> Self {
        self.unary(self.value.atanh(), UnaryKind::Atanh)
    }

    // ── Misc ──

    #[inline]
    pub fn abs(self) -> Self {
        self.unary(self.value.abs(), UnaryKind::Abs)
    }

    /// Piecewise-constant: zero derivative wherever defined.
    #[inline]
    pub fn signum(self) -> Self {
        Var::constant(self.value.signum())
    }

    #[inline]
    pub fn floor(self) -> Self {
        Var::constant(self.value.floor())
    }

    #[inline]
    pub fn ceil(self) -> Self {
        Var::constant(self.value.ceil())
    }

    #[inline]
    pub fn round(self) -> Self {
        Var::constant(self.value.round())
    }

    #[inline]
    pub fn trunc(self) -> Self {
        Var::constant(self.value.trunc())
    }

    #[inline]
    pub fn fract(self) -> Self {
        self.unary_scaled(self.value.fract(), F::one())
    }

    pub fn mul_add(self, a: Self, b: Self) -> Self {
        let value = self.value.mul_add(a.value, b.value);
        if self.id.is_constant() && a.id.is_constant() && b.id.is_constant() {
            return Var::constant(value);
        }
        let id = with_active_stack(|t| {
            t.push_ternary_scaled(value, [self.id, a.id, b.id], [a.value, self.value, F::one()])
        });
        Var { value, id }
    }

    pub fn hypot(self, other: Self) -> Self {
        let h = self.value.hypot(other.value);
        Var::binary_scaled(h, self, other, [self.value / h, other.value / h])
    }

    /// The larger operand; gradient flows to the winner only.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        if self.value >= other.value {
            self
        } else {
            other
        }
    }

    /// The smaller operand; gradient flows to the winner only.
    #[inline]
    pub fn min(self, other: Self) -> Self {
        if self.value <= other.value {
            self
        } else {
            other
        }
    }
}

impl<F: Float> Display for Var<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<F: Float> Default for Var<F> {
    fn default() -> Self {
        Var::constant(F::zero())
    }
}

impl<F: Float> From<F> for Var<F> {
    /// Lift a plain float as a constant.
    #[inline]
    fn from(value: F) -> Self {
        Var::constant(value)
    }
}
