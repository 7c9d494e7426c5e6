//! Tape-based reverse-mode automatic differentiation for probabilistic
//! programming.
//!
//! A forward computation over [`Var`] handles records one node per
//! operation onto the thread's active [`TapeStack`]; a single reverse
//! sweep then yields the gradient with respect to every input at once.
//! Nested scopes ([`TapeStack::start_nested`]) make bounded
//! sub-computations discardable in bulk, and the tape-free [`Dual`]
//! companion covers forward mode and composes with `Var` for higher-order
//! and mixed derivatives.
//!
//! ```
//! let (val, grad) = tapir::gradient(
//!     |x: &[tapir::Var<f64>]| x[0] * x[1] + x[0].sin(),
//!     &[2.0, 3.0],
//! );
//! assert!((val - (6.0 + 2.0_f64.sin())).abs() < 1e-12);
//! assert!((grad[0] - (3.0 + 2.0_f64.cos())).abs() < 1e-12);
//! assert!((grad[1] - 2.0).abs() < 1e-12);
//! ```

pub mod aggregates;
pub mod api;
pub mod arena;
pub mod dual;
pub mod error;
pub mod float;
pub mod node;
pub mod scalar;
mod sweep;
pub mod tape_stack;
mod traits;
pub mod var;

pub use aggregates::{dot_product, log_sum_exp, mat_vec, softmax, sum, weighted_sum};
pub use api::{derivative, gradient, gradient_in, jacobian};
pub use dual::Dual;
pub use error::TapeError;
pub use float::Float;
pub use node::NodeId;
pub use scalar::Scalar;
pub use tape_stack::{with_active_stack, Mark, StackGuard, StackThreadLocal, TapeEntry, TapeStack};
pub use var::Var;

/// Type alias for reverse-mode handles over `f64`.
pub type Var64 = Var<f64>;
/// Type alias for reverse-mode handles over `f32`.
pub type Var32 = Var<f32>;
/// Type alias for forward-mode dual numbers over `f64`.
pub type Dual64 = Dual<f64>;
/// Type alias for forward-mode dual numbers over `f32`.
pub type Dual32 = Dual<f32>;
