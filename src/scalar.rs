//! The [`Scalar`] trait for AD-generic numeric code.
//!
//! Write model code as `fn f<T: Scalar>(x: &[T]) -> T` and it runs
//! unchanged on plain `f64`, forward-mode [`Dual`], reverse-mode [`Var`],
//! and their nestings.

use std::fmt::{Debug, Display};

use num_traits::FromPrimitive;

use crate::dual::Dual;
use crate::float::Float;
use crate::tape_stack::StackThreadLocal;
use crate::var::Var;

/// The central trait for AD-generic numeric code.
///
/// Everything a differentiable scalar needs: full float arithmetic,
/// constants, primitive conversions, and a way to lift plain floats in and
/// project primal values out.
pub trait Scalar:
    num_traits::Float
    + num_traits::FloatConst
    + FromPrimitive
    + Copy
    + Default
    + Debug
    + Display
    + Send
    + 'static
{
    /// The underlying primitive float type.
    type Float: Float;

    /// Lift a plain float into this scalar as a constant.
    fn lift(val: Self::Float) -> Self;

    /// The primal (innermost forward) value.
    fn primal(&self) -> Self::Float;
}

impl Scalar for f32 {
    type Float = f32;

    #[inline]
    fn lift(val: f32) -> Self {
        val
    }

    #[inline]
    fn primal(&self) -> f32 {
        *self
    }
}

impl Scalar for f64 {
    type Float = f64;

    #[inline]
    fn lift(val: f64) -> Self {
        val
    }

    #[inline]
    fn primal(&self) -> f64 {
        *self
    }
}

impl<T: Scalar> Scalar for Dual<T> {
    type Float = T::Float;

    #[inline]
    fn lift(val: T::Float) -> Self {
        Dual::constant(T::lift(val))
    }

    #[inline]
    fn primal(&self) -> T::Float {
        self.val.primal()
    }
}

impl<F: Float + StackThreadLocal> Scalar for Var<F> {
    type Float = F;

    #[inline]
    fn lift(val: F) -> Self {
        Var::constant(val)
    }

    #[inline]
    fn primal(&self) -> F {
        self.value()
    }
}
