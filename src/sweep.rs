//! Reverse sweep: replay the tape backwards, accumulating adjoints.
//!
//! Creation order is a valid reverse-topological order — every operand was
//! recorded strictly before its consumer — so one strict reverse walk over
//! the chaining sequence propagates the chain rule exactly. Dispatch is a
//! `match` over the closed node union; each arm only ever *adds* the
//! node's adjoint, scaled by its partials, into its operands' adjoints.

use crate::node::{MultiKind, NodeId, Op};
use crate::tape_stack::{Mark, TapeStack};
use crate::Float;

impl<F: Float> TapeStack<F> {
    /// Propagate adjoints from `objective` through the whole tape.
    ///
    /// Seeds the objective's adjoint with 1 and replays every chaining
    /// node in reverse creation order. Adjoints are accumulated on top of
    /// whatever they currently hold: run
    /// [`zero_adjoints`](TapeStack::zero_adjoints) first when reusing a
    /// tape, or a second sweep double-counts.
    ///
    /// A constant objective has no dependence on the tape; the sweep is a
    /// no-op and every adjoint stays as-is (zero on a fresh tape).
    pub fn sweep(&mut self, objective: NodeId) {
        self.sweep_range(0, objective)
    }

    /// Restricted sweep: replay only the nodes created after `mark`.
    ///
    /// Used for partial gradients of a nested sub-computation; nodes below
    /// the mark keep their adjoints untouched.
    pub fn sweep_from(&mut self, mark: Mark, objective: NodeId) {
        self.sweep_range(mark.nodes as usize, objective)
    }

    fn sweep_range(&mut self, from: usize, objective: NodeId) {
        if objective.is_constant() {
            return;
        }
        self.add_adjoint(objective, F::one());

        for i in (from..self.num_nodes()).rev() {
            // Nodes are plain `Copy` data; lift the current one out so the
            // adjoint writes below can borrow the pools freely.
            let node = self.nodes.get(i as u32);
            let adj = node.adjoint;

            // Zero adjoint means nothing downstream consumed this node;
            // multi-output drivers are exempt because their own adjoint is
            // never seeded — their outputs carry it.
            if adj == F::zero() && !matches!(node.op, Op::MultiOut { .. }) {
                continue;
            }

            match node.op {
                Op::Leaf => {}
                Op::Unary { arg, kind } => {
                    let partial = kind.partial(self.value(arg), node.value);
                    self.add_adjoint(arg, adj * partial);
                }
                Op::UnaryScaled { arg, partial } => {
                    self.add_adjoint(arg, adj * partial);
                }
                Op::Binary { args, kind } => {
                    let partials =
                        kind.partials(self.value(args[0]), self.value(args[1]), node.value);
                    self.add_adjoint(args[0], adj * partials[0]);
                    self.add_adjoint(args[1], adj * partials[1]);
                }
                Op::BinaryScaled { args, partials } => {
                    self.add_adjoint(args[0], adj * partials[0]);
                    self.add_adjoint(args[1], adj * partials[1]);
                }
                Op::TernaryScaled { args, partials } => {
                    self.add_adjoint(args[0], adj * partials[0]);
                    self.add_adjoint(args[1], adj * partials[1]);
                    self.add_adjoint(args[2], adj * partials[2]);
                }
                Op::Aggregate { terms } => {
                    for k in terms.range() {
                        let term = self.terms.get(k as u32);
                        self.add_adjoint(term.id, adj * term.partial);
                    }
                }
                Op::MultiOut {
                    inputs,
                    outputs,
                    kind,
                } => self.chain_multi(inputs, outputs, kind),
            }
        }

        log::trace!(
            "sweep complete: {} nodes replayed from objective {:?}",
            self.num_nodes() - from,
            objective
        );
    }

    fn chain_multi(&mut self, inputs: crate::arena::Span, outputs: crate::arena::Span, kind: MultiKind) {
        match kind {
            MultiKind::Softmax => {
                // adj(x_j) += s_j * (adj(s_j) - Σ_i adj(s_i) * s_i)
                let mut dot = F::zero();
                for k in outputs.range() {
                    let out = self.terms.get(k as u32).id;
                    dot = dot + self.adjoint(out) * self.value(out);
                }
                for (ki, ko) in inputs.range().zip(outputs.range()) {
                    let x = self.terms.get(ki as u32).id;
                    let out = self.terms.get(ko as u32).id;
                    let delta = self.value(out) * (self.adjoint(out) - dot);
                    self.add_adjoint(x, delta);
                }
            }
            MultiKind::MatVec { rows, cols, vals } => {
                // inputs = rows*cols matrix ids followed by cols vector
                // ids; value snapshots were taken at construction.
                let (rows, cols) = (rows as usize, cols as usize);
                for i in 0..rows {
                    let out = self.terms.get((outputs.range().start + i) as u32).id;
                    let out_adj = self.adjoint(out);
                    if out_adj == F::zero() {
                        continue;
                    }
                    for j in 0..cols {
                        let a_ij = self.terms.get((inputs.range().start + i * cols + j) as u32).id;
                        let x_j = self
                            .terms
                            .get((inputs.range().start + rows * cols + j) as u32)
                            .id;
                        let a_val = self.owned[vals as usize][i * cols + j];
                        let x_val = self.owned[vals as usize + 1][j];
                        self.add_adjoint(a_ij, out_adj * x_val);
                        self.add_adjoint(x_j, out_adj * a_val);
                    }
                }
            }
        }
    }
}
