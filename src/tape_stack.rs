//! The tape stack: append-only record of a forward computation.
//!
//! A [`TapeStack`] owns four bump pools — chaining nodes, non-chaining
//! slots, aggregate term records, and the separately tracked owned payloads
//! with real destructors — plus a stack of nested watermark frames. Node
//! construction happens through the thread-local active stack (see
//! [`StackGuard`]), so `Var` stays `Copy` and operator overloading works
//! without threading `&mut` through every expression. The stack itself is
//! an ordinary caller-owned value: independent computations use independent
//! stacks, one per thread.

use std::cell::Cell;

use crate::arena::{Pool, Span, Term};
use crate::error::TapeError;
use crate::node::{Node, NodeId, Op, Slot, UnaryKind};
use crate::Float;

/// Watermark over every pool of a [`TapeStack`].
///
/// Records the lengths of all sequences at one instant. Recovering to a
/// mark bulk-releases everything recorded after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mark {
    pub(crate) nodes: u32,
    pub(crate) slots: u32,
    pub(crate) terms: u32,
    pub(crate) owned: u32,
}

/// One row of the diagnostic tape enumeration.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TapeEntry<F> {
    pub index: u32,
    pub value: F,
    pub adjoint: F,
}

/// Append-only tape of a reverse-mode computation.
pub struct TapeStack<F: Float> {
    pub(crate) nodes: Pool<Node<F>>,
    pub(crate) slots: Pool<Slot<F>>,
    pub(crate) terms: Pool<Term<F>>,
    pub(crate) owned: Vec<Box<[F]>>,
    frames: Vec<Mark>,
}

impl<F: Float> Default for TapeStack<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> TapeStack<F> {
    /// Create an empty stack.
    pub fn new() -> Self {
        TapeStack {
            nodes: Pool::new(),
            slots: Pool::new(),
            terms: Pool::new(),
            owned: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Create a stack pre-sized for roughly `est_nodes` operations.
    pub fn with_capacity(est_nodes: usize) -> Self {
        TapeStack {
            nodes: Pool::with_capacity(est_nodes),
            slots: Pool::new(),
            terms: Pool::with_capacity(est_nodes / 4),
            owned: Vec::new(),
            frames: Vec::new(),
        }
    }

    // ── Reads ──

    /// Forward value of a tape entry. Must not be the constant sentinel.
    #[inline]
    pub fn value(&self, id: NodeId) -> F {
        debug_assert!(!id.is_constant());
        if id.is_slot() {
            self.slots.get(id.index()).value
        } else {
            self.nodes.get(id.index()).value
        }
    }

    /// Accumulated adjoint of a tape entry. Constants report zero.
    #[inline]
    pub fn adjoint(&self, id: NodeId) -> F {
        if id.is_constant() {
            F::zero()
        } else if id.is_slot() {
            self.slots.get(id.index()).adjoint
        } else {
            self.nodes.get(id.index()).adjoint
        }
    }

    /// Add `delta` into the adjoint of `id`. Constants absorb silently —
    /// a partial with respect to a constant is discarded, not stored.
    #[inline]
    pub(crate) fn add_adjoint(&mut self, id: NodeId, delta: F) {
        if id.is_constant() {
            return;
        }
        if id.is_slot() {
            let slot = self.slots.get_mut(id.index());
            slot.adjoint = slot.adjoint + delta;
        } else {
            let node = self.nodes.get_mut(id.index());
            node.adjoint = node.adjoint + delta;
        }
    }

    /// Number of chaining nodes currently recorded.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of non-chaining slots currently recorded.
    #[inline]
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Bytes occupied by live tape entries across every sequence.
    pub fn used_bytes(&self) -> usize {
        let owned: usize = self
            .owned
            .iter()
            .map(|p| p.len() * std::mem::size_of::<F>())
            .sum();
        self.nodes.used_bytes() + self.slots.used_bytes() + self.terms.used_bytes() + owned
    }

    /// Bytes reserved by the pools, whether live or recovered.
    pub fn allocated_bytes(&self) -> usize {
        self.nodes.allocated_bytes() + self.slots.allocated_bytes() + self.terms.allocated_bytes()
    }

    // ── Node construction ──

    /// Creation-order check: an operand must already be on the tape.
    #[inline]
    fn assert_ordered(&self, arg: NodeId) {
        debug_assert!(
            arg.is_constant()
                || (if arg.is_slot() {
                    (arg.index() as usize) < self.slots.len()
                } else {
                    (arg.index() as usize) < self.nodes.len()
                }),
            "operand created after its consumer; tape order violated"
        );
    }

    #[inline]
    pub(crate) fn push_node(&mut self, value: F, op: Op<F>) -> NodeId {
        NodeId::chain(self.nodes.push(Node::new(value, op)))
    }

    /// Record an independent variable.
    #[inline]
    pub fn push_leaf(&mut self, value: F) -> NodeId {
        self.push_node(value, Op::Leaf)
    }

    /// Record a non-chaining value slot.
    #[inline]
    pub(crate) fn push_slot(&mut self, value: F) -> NodeId {
        NodeId::slot(self.slots.push(Slot::new(value)))
    }

    /// Record `value = kind(arg)` with the partial recomputed in the sweep.
    #[inline]
    pub(crate) fn push_unary(&mut self, value: F, arg: NodeId, kind: UnaryKind) -> NodeId {
        debug_assert!(!arg.is_constant());
        self.assert_ordered(arg);
        self.push_node(value, Op::Unary { arg, kind })
    }

    /// Record a unary operation with a precomputed partial.
    #[inline]
    pub(crate) fn push_unary_scaled(&mut self, value: F, arg: NodeId, partial: F) -> NodeId {
        debug_assert!(!arg.is_constant());
        self.assert_ordered(arg);
        self.push_node(value, Op::UnaryScaled { arg, partial })
    }

    /// Record `value = kind(a, b)` with partials recomputed in the sweep.
    /// Both operands must be on the tape.
    #[inline]
    pub(crate) fn push_binary(
        &mut self,
        value: F,
        a: NodeId,
        b: NodeId,
        kind: crate::node::BinaryKind,
    ) -> NodeId {
        debug_assert!(!a.is_constant() && !b.is_constant());
        self.assert_ordered(a);
        self.assert_ordered(b);
        self.push_node(value, Op::Binary { args: [a, b], kind })
    }

    /// Record a binary operation with precomputed partials. A constant
    /// operand is allowed; its partial is discarded during the sweep.
    #[inline]
    pub(crate) fn push_binary_scaled(
        &mut self,
        value: F,
        args: [NodeId; 2],
        partials: [F; 2],
    ) -> NodeId {
        self.assert_ordered(args[0]);
        self.assert_ordered(args[1]);
        self.push_node(value, Op::BinaryScaled { args, partials })
    }

    /// Record a ternary operation with precomputed partials.
    #[inline]
    pub(crate) fn push_ternary_scaled(
        &mut self,
        value: F,
        args: [NodeId; 3],
        partials: [F; 3],
    ) -> NodeId {
        self.assert_ordered(args[0]);
        self.assert_ordered(args[1]);
        self.assert_ordered(args[2]);
        self.push_node(value, Op::TernaryScaled { args, partials })
    }

    /// Record an aggregate with precomputed `(operand, partial)` terms.
    /// Constant operands should be filtered out by the caller.
    pub(crate) fn push_aggregate(
        &mut self,
        value: F,
        terms: impl ExactSizeIterator<Item = Term<F>>,
    ) -> NodeId {
        let span = self.terms.extend(terms);
        #[cfg(debug_assertions)]
        for i in span.range() {
            let term = self.terms.get(i as u32);
            debug_assert!(!term.id.is_constant());
            self.assert_ordered(term.id);
        }
        self.push_node(value, Op::Aggregate { terms: span })
    }

    /// Carve a run of ids (as partial-less terms) from the term pool.
    pub(crate) fn record_ids(&mut self, ids: impl ExactSizeIterator<Item = NodeId>) -> Span {
        self.terms.extend(ids.map(|id| Term {
            id,
            partial: F::zero(),
        }))
    }

    /// Track a payload whose destructor must run at bulk-release time.
    /// Returns its index in the owned list.
    pub(crate) fn own(&mut self, payload: Box<[F]>) -> u32 {
        let idx = self.owned.len() as u32;
        self.owned.push(payload);
        idx
    }

    // ── Lifecycle ──

    /// Reset every adjoint in both node sequences to zero, keeping the
    /// tape itself intact. Required between independent sweeps.
    pub fn zero_adjoints(&mut self) {
        for node in self.nodes.as_mut_slice() {
            node.adjoint = F::zero();
        }
        for slot in self.slots.as_mut_slice() {
            slot.adjoint = F::zero();
        }
    }

    /// Record the current watermark over every sequence.
    pub fn mark(&self) -> Mark {
        Mark {
            nodes: self.nodes.mark(),
            slots: self.slots.mark(),
            terms: self.terms.mark(),
            owned: self.owned.len() as u32,
        }
    }

    /// Bulk-release everything recorded after `mark`: runs destructors for
    /// owned payloads past the mark, truncates all sequences, and makes
    /// the recovered region reusable. This is the only release path.
    pub fn recover_to(&mut self, mark: Mark) -> Result<(), TapeError> {
        if mark.nodes as usize > self.nodes.len()
            || mark.slots as usize > self.slots.len()
            || mark.terms as usize > self.terms.len()
            || mark.owned as usize > self.owned.len()
        {
            return Err(TapeError::StaleMark);
        }
        self.owned.truncate(mark.owned as usize);
        self.nodes.truncate(mark.nodes);
        self.slots.truncate(mark.slots);
        self.terms.truncate(mark.terms);
        Ok(())
    }

    /// Open a nested scope: push a watermark frame that a later
    /// [`recover_nested`](TapeStack::recover_nested) restores. Scopes nest
    /// arbitrarily. An abandoned scope is never recovered implicitly.
    pub fn start_nested(&mut self) -> Mark {
        let mark = self.mark();
        self.frames.push(mark);
        mark
    }

    /// Close the most recent nested scope, discarding every node, slot,
    /// term, and owned payload recorded inside it.
    pub fn recover_nested(&mut self) -> Result<(), TapeError> {
        let mark = self.frames.pop().ok_or(TapeError::NoNestedScope)?;
        let before = self.nodes.len();
        self.recover_to(mark)?;
        log::debug!(
            "recovered nested scope: {} nodes discarded, {} remain",
            before - self.nodes.len(),
            self.nodes.len()
        );
        Ok(())
    }

    /// Depth of currently open nested scopes.
    #[inline]
    pub fn nested_depth(&self) -> usize {
        self.frames.len()
    }

    /// Top-level bulk reset between independent uses (e.g. between sampler
    /// iterations). Discards everything, keeps capacity.
    pub fn reset(&mut self) {
        log::debug!("tape reset: discarding {} nodes", self.nodes.len());
        self.owned.clear();
        self.nodes.truncate(0);
        self.slots.truncate(0);
        self.terms.truncate(0);
        self.frames.clear();
    }

    // ── Diagnostics ──

    /// Enumerate the chaining sequence as `(index, value, adjoint)` rows.
    /// Inspection only; replaying the tape goes through the sweep.
    pub fn entries(&self) -> impl Iterator<Item = TapeEntry<F>> + '_ {
        self.nodes
            .as_slice()
            .iter()
            .enumerate()
            .map(|(i, node)| TapeEntry {
                index: i as u32,
                value: node.value,
                adjoint: node.adjoint,
            })
    }

    /// Re-check the reverse-topological ordering invariant over the whole
    /// tape: every operand of node `i` must have been created before `i`.
    pub fn validate(&self) -> Result<(), TapeError> {
        for i in 0..self.nodes.len() {
            let ok = |arg: NodeId| {
                arg.is_constant()
                    || if arg.is_slot() {
                        (arg.index() as usize) < self.slots.len()
                    } else {
                        (arg.index() as usize) < i
                    }
            };
            let in_order = match self.nodes.get(i as u32).op {
                Op::Leaf => true,
                Op::Unary { arg, .. } | Op::UnaryScaled { arg, .. } => ok(arg),
                Op::Binary { args, .. } | Op::BinaryScaled { args, .. } => {
                    args.iter().copied().all(ok)
                }
                Op::TernaryScaled { args, .. } => args.iter().copied().all(ok),
                Op::Aggregate { terms } => self.terms.slice(terms).iter().all(|t| ok(t.id)),
                Op::MultiOut {
                    inputs, outputs, ..
                } => {
                    self.terms.slice(inputs).iter().all(|t| ok(t.id))
                        && self.terms.slice(outputs).iter().all(|t| t.id.is_slot() && ok(t.id))
                }
            };
            if !in_order {
                return Err(TapeError::OperandOrder { node: i });
            }
        }
        Ok(())
    }
}

// ── Thread-local active stack ──

thread_local! {
    static STACK_F32: Cell<*mut TapeStack<f32>> = const { Cell::new(std::ptr::null_mut()) };
    static STACK_F64: Cell<*mut TapeStack<f64>> = const { Cell::new(std::ptr::null_mut()) };
}

/// Selects the thread-local active-stack cell for a float type.
pub trait StackThreadLocal: Float {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut TapeStack<Self>>>;
}

impl StackThreadLocal for f32 {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut TapeStack<Self>>> {
        &STACK_F32
    }
}

impl StackThreadLocal for f64 {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut TapeStack<Self>>> {
        &STACK_F64
    }
}

/// Run `f` against the active stack for the current thread.
///
/// Panics if no stack is active — node-constructing operations are only
/// meaningful inside a [`StackGuard`] scope (or the closure APIs that set
/// one up).
#[inline]
pub fn with_active_stack<F: StackThreadLocal, R>(f: impl FnOnce(&mut TapeStack<F>) -> R) -> R {
    F::cell().with(|cell| {
        let ptr = cell.get();
        assert!(
            !ptr.is_null(),
            "No active tape stack. Use tapir::gradient() or activate one with StackGuard::new()."
        );
        // SAFETY: StackGuard keeps the pointer valid for its whole scope,
        // and thread-local access means at most one mutable reference is
        // live at a time.
        let stack = unsafe { &mut *ptr };
        f(stack)
    })
}

/// RAII guard that installs a stack as the thread's active stack and
/// restores the previous one on drop, so guards nest.
pub struct StackGuard<F: StackThreadLocal> {
    prev: *mut TapeStack<F>,
}

impl<F: StackThreadLocal> StackGuard<F> {
    /// Activate `stack` for the current thread.
    pub fn new(stack: &mut TapeStack<F>) -> Self {
        let prev = F::cell().with(|cell| {
            let prev = cell.get();
            cell.set(stack as *mut TapeStack<F>);
            prev
        });
        StackGuard { prev }
    }
}

impl<F: StackThreadLocal> Drop for StackGuard<F> {
    fn drop(&mut self) {
        F::cell().with(|cell| {
            cell.set(self.prev);
        });
    }
}
