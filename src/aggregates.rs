//! Aggregate operations: reductions, dot products, and multi-output
//! vector/matrix ops recorded as single tape nodes.
//!
//! A naive reduction over N handles records N-1 binary nodes; the
//! aggregate forms here record one node whose operand array is carved from
//! the term pool, which keeps the tape short and the sweep cache-friendly.
//! Multi-output ops (softmax, matrix-vector product) write their results
//! into non-chaining slots and install one driver node that propagates all
//! the slots' adjoints back to the inputs in a single chain step.

use crate::arena::Term;
use crate::node::{MultiKind, Op};
use crate::tape_stack::{with_active_stack, StackThreadLocal};
use crate::var::Var;
use crate::Float;

/// Sum of a slice of handles as one aggregate node.
pub fn sum<F: Float + StackThreadLocal>(xs: &[Var<F>]) -> Var<F> {
    let value = xs.iter().fold(F::zero(), |acc, x| acc + x.value());
    aggregate(value, xs.iter().map(|x| (*x, F::one())))
}

/// Dot product of two equal-length slices of handles.
pub fn dot_product<F: Float + StackThreadLocal>(xs: &[Var<F>], ys: &[Var<F>]) -> Var<F> {
    assert_eq!(xs.len(), ys.len(), "dot_product requires equal lengths");
    let value = xs
        .iter()
        .zip(ys.iter())
        .fold(F::zero(), |acc, (x, y)| acc + x.value() * y.value());
    aggregate(
        value,
        xs.iter()
            .zip(ys.iter())
            .flat_map(|(x, y)| [(*x, y.value()), (*y, x.value())]),
    )
}

/// Dot product of plain weights against handles: `Σ wᵢ·xᵢ`.
pub fn weighted_sum<F: Float + StackThreadLocal>(w: &[F], xs: &[Var<F>]) -> Var<F> {
    assert_eq!(w.len(), xs.len(), "weighted_sum requires equal lengths");
    let value = w
        .iter()
        .zip(xs.iter())
        .fold(F::zero(), |acc, (w, x)| acc + *w * x.value());
    aggregate(value, xs.iter().zip(w.iter()).map(|(x, w)| (*x, *w)))
}

/// Numerically stable `ln Σ exp(xᵢ)` as one aggregate node.
///
/// The partials are the softmax weights `exp(xᵢ - lse)`, precomputed at
/// construction. Empty input yields `-∞`, matching the empty sum.
pub fn log_sum_exp<F: Float + StackThreadLocal>(xs: &[Var<F>]) -> Var<F> {
    if xs.is_empty() {
        return Var::constant(F::neg_infinity());
    }
    let m = xs
        .iter()
        .fold(F::neg_infinity(), |acc, x| acc.max(x.value()));
    let sum_exp = xs
        .iter()
        .fold(F::zero(), |acc, x| acc + (x.value() - m).exp());
    let value = m + sum_exp.ln();
    aggregate(value, xs.iter().map(|x| (*x, (x.value() - value).exp())))
}

/// Softmax over a slice of handles.
///
/// Outputs are non-chaining slots; one driver node propagates all their
/// adjoints through the full softmax Jacobian in a single chain step.
pub fn softmax<F: Float + StackThreadLocal>(xs: &[Var<F>]) -> Vec<Var<F>> {
    if xs.is_empty() {
        return Vec::new();
    }
    let m = xs
        .iter()
        .fold(F::neg_infinity(), |acc, x| acc.max(x.value()));
    let sum_exp = xs
        .iter()
        .fold(F::zero(), |acc, x| acc + (x.value() - m).exp());
    let values: Vec<F> = xs
        .iter()
        .map(|x| (x.value() - m).exp() / sum_exp)
        .collect();

    if xs.iter().all(|x| x.is_constant()) {
        return values.into_iter().map(Var::constant).collect();
    }

    with_active_stack(|t| {
        let inputs = t.record_ids(xs.iter().map(|x| x.id()));
        let out_ids: Vec<_> = values.iter().map(|&v| t.push_slot(v)).collect();
        let outputs = t.record_ids(out_ids.iter().copied());
        // Driver value: the log-normalizer, purely informational.
        t.push_node(
            m + sum_exp.ln(),
            Op::MultiOut {
                inputs,
                outputs,
                kind: MultiKind::Softmax,
            },
        );
        out_ids
            .into_iter()
            .zip(values)
            .map(|(id, v)| Var::from_parts(v, id))
            .collect()
    })
}

/// Dense matrix-vector product `y = A·x` with `A` stored row-major.
///
/// Snapshots of the matrix and vector values are kept in the owned list
/// (they are needed during the sweep and have real destructors); outputs
/// are non-chaining slots driven by a single chain node.
pub fn mat_vec<F: Float + StackThreadLocal>(
    a: &[Var<F>],
    rows: usize,
    cols: usize,
    x: &[Var<F>],
) -> Vec<Var<F>> {
    assert_eq!(a.len(), rows * cols, "matrix shape mismatch");
    assert_eq!(x.len(), cols, "vector length must equal matrix columns");
    if rows == 0 {
        return Vec::new();
    }

    let a_vals: Box<[F]> = a.iter().map(|v| v.value()).collect();
    let x_vals: Box<[F]> = x.iter().map(|v| v.value()).collect();
    let y_vals: Vec<F> = (0..rows)
        .map(|i| {
            (0..cols).fold(F::zero(), |acc, j| {
                acc + a_vals[i * cols + j] * x_vals[j]
            })
        })
        .collect();

    if a.iter().all(|v| v.is_constant()) && x.iter().all(|v| v.is_constant()) {
        return y_vals.into_iter().map(Var::constant).collect();
    }

    with_active_stack(|t| {
        let vals = t.own(a_vals);
        t.own(x_vals);
        let in_ids: Vec<_> = a.iter().chain(x.iter()).map(|v| v.id()).collect();
        let inputs = t.record_ids(in_ids.into_iter());
        let out_ids: Vec<_> = y_vals.iter().map(|&v| t.push_slot(v)).collect();
        let outputs = t.record_ids(out_ids.iter().copied());
        t.push_node(
            F::zero(),
            Op::MultiOut {
                inputs,
                outputs,
                kind: MultiKind::MatVec {
                    rows: rows as u32,
                    cols: cols as u32,
                    vals,
                },
            },
        );
        out_ids
            .into_iter()
            .zip(y_vals)
            .map(|(id, v)| Var::from_parts(v, id))
            .collect()
    })
}

fn aggregate<F: Float + StackThreadLocal>(
    value: F,
    terms: impl Iterator<Item = (Var<F>, F)>,
) -> Var<F> {
    let tracked: Vec<Term<F>> = terms
        .filter(|(v, _)| !v.is_constant())
        .map(|(v, partial)| Term {
            id: v.id(),
            partial,
        })
        .collect();
    if tracked.is_empty() {
        return Var::constant(value);
    }
    let id = with_active_stack(|t| t.push_aggregate(value, tracked.into_iter()));
    Var::from_parts(value, id)
}
