use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

use crate::dual::Dual;
use crate::float::Float;
use crate::node::BinaryKind;
use crate::scalar::Scalar;
use crate::tape_stack::{with_active_stack, StackThreadLocal};
use crate::var::Var;

// ──────────────────────────────────────────────
//  Dual<T> operators
// ──────────────────────────────────────────────

impl<T: Scalar> Add for Dual<T> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Dual {
            val: self.val + rhs.val,
            der: self.der + rhs.der,
        }
    }
}

impl<T: Scalar> Sub for Dual<T> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Dual {
            val: self.val - rhs.val,
            der: self.der - rhs.der,
        }
    }
}

impl<T: Scalar> Mul for Dual<T> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Dual {
            val: self.val * rhs.val,
            der: self.val * rhs.der + self.der * rhs.val,
        }
    }
}

impl<T: Scalar> Div for Dual<T> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        let inv = T::one() / rhs.val;
        Dual {
            val: self.val * inv,
            der: (self.der * rhs.val - self.val * rhs.der) * inv * inv,
        }
    }
}

impl<T: Scalar> Neg for Dual<T> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Dual {
            val: -self.val,
            der: -self.der,
        }
    }
}

impl<T: Scalar> Rem for Dual<T> {
    type Output = Self;
    #[inline]
    fn rem(self, rhs: Self) -> Self {
        Dual {
            val: self.val % rhs.val,
            der: self.der,
        }
    }
}

impl<T: Scalar> AddAssign for Dual<T> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T: Scalar> SubAssign for Dual<T> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<T: Scalar> MulAssign for Dual<T> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<T: Scalar> DivAssign for Dual<T> {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl<T: Scalar> RemAssign for Dual<T> {
    #[inline]
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl<T: Scalar> PartialEq for Dual<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl<T: Scalar> PartialOrd for Dual<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.val.partial_cmp(&other.val)
    }
}

// Mixed ops: Dual with primitive floats, generated for f32 and f64.
macro_rules! impl_dual_scalar_ops {
    ($f:ty) => {
        impl Add<$f> for Dual<$f> {
            type Output = Dual<$f>;
            #[inline]
            fn add(self, rhs: $f) -> Dual<$f> {
                Dual {
                    val: self.val + rhs,
                    der: self.der,
                }
            }
        }

        impl Add<Dual<$f>> for $f {
            type Output = Dual<$f>;
            #[inline]
            fn add(self, rhs: Dual<$f>) -> Dual<$f> {
                Dual {
                    val: self + rhs.val,
                    der: rhs.der,
                }
            }
        }

        impl Sub<$f> for Dual<$f> {
            type Output = Dual<$f>;
            #[inline]
            fn sub(self, rhs: $f) -> Dual<$f> {
                Dual {
                    val: self.val - rhs,
                    der: self.der,
                }
            }
        }

        impl Sub<Dual<$f>> for $f {
            type Output = Dual<$f>;
            #[inline]
            fn sub(self, rhs: Dual<$f>) -> Dual<$f> {
                Dual {
                    val: self - rhs.val,
                    der: -rhs.der,
                }
            }
        }

        impl Mul<$f> for Dual<$f> {
            type Output = Dual<$f>;
            #[inline]
            fn mul(self, rhs: $f) -> Dual<$f> {
                Dual {
                    val: self.val * rhs,
                    der: self.der * rhs,
                }
            }
        }

        impl Mul<Dual<$f>> for $f {
            type Output = Dual<$f>;
            #[inline]
            fn mul(self, rhs: Dual<$f>) -> Dual<$f> {
                Dual {
                    val: self * rhs.val,
                    der: self * rhs.der,
                }
            }
        }

        impl Div<$f> for Dual<$f> {
            type Output = Dual<$f>;
            #[inline]
            fn div(self, rhs: $f) -> Dual<$f> {
                let inv = 1.0 / rhs;
                Dual {
                    val: self.val * inv,
                    der: self.der * inv,
                }
            }
        }

        impl Div<Dual<$f>> for $f {
            type Output = Dual<$f>;
            #[inline]
            fn div(self, rhs: Dual<$f>) -> Dual<$f> {
                let inv = 1.0 / rhs.val;
                Dual {
                    val: self * inv,
                    der: -self * rhs.der * inv * inv,
                }
            }
        }

        impl Rem<$f> for Dual<$f> {
            type Output = Dual<$f>;
            #[inline]
            fn rem(self, rhs: $f) -> Dual<$f> {
                Dual {
                    val: self.val % rhs,
                    der: self.der,
                }
            }
        }

        impl Rem<Dual<$f>> for $f {
            type Output = Dual<$f>;
            #[inline]
            fn rem(self, rhs: Dual<$f>) -> Dual<$f> {
                Dual {
                    val: self % rhs.val,
                    der: 0.0,
                }
            }
        }
    };
}

impl_dual_scalar_ops!(f32);
impl_dual_scalar_ops!(f64);

// ──────────────────────────────────────────────
//  Var<F> operators
// ──────────────────────────────────────────────

/// Shared shape of the four arithmetic operators: fold a constant side
/// into a precomputed partial on the tracked side, record a recomputing
/// binary node only when both operands live on the tape.
#[inline]
fn var_binary<F: Float + StackThreadLocal>(
    a: Var<F>,
    b: Var<F>,
    value: F,
    kind: BinaryKind,
    partial_a: F,
    partial_b: F,
) -> Var<F> {
    match (a.is_constant(), b.is_constant()) {
        (true, true) => Var::constant(value),
        (false, true) => a.unary_scaled(value, partial_a),
        (true, false) => b.unary_scaled(value, partial_b),
        (false, false) => {
            let id = with_active_stack(|t| t.push_binary(value, a.id(), b.id(), kind));
            Var::from_parts(value, id)
        }
    }
}

impl<F: Float + StackThreadLocal> Add for Var<F> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        let value = self.value() + rhs.value();
        var_binary(self, rhs, value, BinaryKind::Add, F::one(), F::one())
    }
}

impl<F: Float + StackThreadLocal> Sub for Var<F> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        let value = self.value() - rhs.value();
        var_binary(self, rhs, value, BinaryKind::Sub, F::one(), -F::one())
    }
}

impl<F: Float + StackThreadLocal> Mul for Var<F> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let value = self.value() * rhs.value();
        var_binary(self, rhs, value, BinaryKind::Mul, rhs.value(), self.value())
    }
}

impl<F: Float + StackThreadLocal> Div for Var<F> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        let inv = F::one() / rhs.value();
        let value = self.value() * inv;
        var_binary(self, rhs, value, BinaryKind::Div, inv, -value * inv)
    }
}

impl<F: Float + StackThreadLocal> Neg for Var<F> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        self.unary(-self.value(), crate::node::UnaryKind::Neg)
    }
}

impl<F: Float + StackThreadLocal> Rem for Var<F> {
    type Output = Self;
    #[inline]
    fn rem(self, rhs: Self) -> Self {
        // Remainder is piecewise x - k·y: unit partial on the numerator,
        // the denominator contributes nothing almost everywhere.
        self.unary_scaled(self.value() % rhs.value(), F::one())
    }
}

impl<F: Float + StackThreadLocal> AddAssign for Var<F> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<F: Float + StackThreadLocal> SubAssign for Var<F> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<F: Float + StackThreadLocal> MulAssign for Var<F> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<F: Float + StackThreadLocal> DivAssign for Var<F> {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl<F: Float + StackThreadLocal> RemAssign for Var<F> {
    #[inline]
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl<F: Float> PartialEq for Var<F> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl<F: Float> PartialOrd for Var<F> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

// Mixed ops: Var with primitive floats. A constant side never reaches the
// tape; the tracked side gets the constant folded into its partial.
macro_rules! impl_var_scalar_ops {
    ($f:ty) => {
        impl Add<$f> for Var<$f> {
            type Output = Var<$f>;
            #[inline]
            fn add(self, rhs: $f) -> Var<$f> {
                self.unary_scaled(self.value() + rhs, 1.0)
            }
        }

        impl Add<Var<$f>> for $f {
            type Output = Var<$f>;
            #[inline]
            fn add(self, rhs: Var<$f>) -> Var<$f> {
                rhs.unary_scaled(self + rhs.value(), 1.0)
            }
        }

        impl Sub<$f> for Var<$f> {
            type Output = Var<$f>;
            #[inline]
            fn sub(self, rhs: $f) -> Var<$f> {
                self.unary_scaled(self.value() - rhs, 1.0)
            }
        }

        impl Sub<Var<$f>> for $f {
            type Output = Var<$f>;
            #[inline]
            fn sub(self, rhs: Var<$f>) -> Var<$f> {
                rhs.unary_scaled(self - rhs.value(), -1.0)
            }
        }

        impl Mul<$f> for Var<$f> {
            type Output = Var<$f>;
            #[inline]
            fn mul(self, rhs: $f) -> Var<$f> {
                self.unary_scaled(self.value() * rhs, rhs)
            }
        }

        impl Mul<Var<$f>> for $f {
            type Output = Var<$f>;
            #[inline]
            fn mul(self, rhs: Var<$f>) -> Var<$f> {
                rhs.unary_scaled(self * rhs.value(), self)
            }
        }

        impl Div<$f> for Var<$f> {
            type Output = Var<$f>;
            #[inline]
            fn div(self, rhs: $f) -> Var<$f> {
                let inv = 1.0 / rhs;
                self.unary_scaled(self.value() * inv, inv)
            }
        }

        impl Div<Var<$f>> for $f {
            type Output = Var<$f>;
            #[inline]
            fn div(self, rhs: Var<$f>) -> Var<$f> {
                let v = rhs.value();
                rhs.unary_scaled(self / v, -self / (v * v))
            }
        }

        impl Rem<$f> for Var<$f> {
            type Output = Var<$f>;
            #[inline]
            fn rem(self, rhs: $f) -> Var<$f> {
                self.unary_scaled(self.value() % rhs, 1.0)
            }
        }

        impl Rem<Var<$f>> for $f {
            type Output = Var<$f>;
            #[inline]
            fn rem(self, rhs: Var<$f>) -> Var<$f> {
                Var::constant(self % rhs.value())
            }
        }
    };
}

impl_var_scalar_ops!(f32);
impl_var_scalar_ops!(f64);
