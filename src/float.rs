use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

/// Marker trait for the primitive float types a tape can be built over.
///
/// Bundles the numeric and utility traits the engine needs everywhere.
/// Only `f32` and `f64` implement this; AD wrapper types implement
/// [`Scalar`](crate::Scalar) instead.
pub trait Float:
    NumFloat + FloatConst + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
}

impl Float for f32 {}
impl Float for f64 {}
