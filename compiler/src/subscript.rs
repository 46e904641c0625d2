// subscript.rs — Induction-variable and array-subscript analysis
//
// Recognizes loads and stores whose address is an `Index` computation driven
// by a loop counter, and rewrites such addresses by a constant offset so the
// scheduler can issue the next iteration's access early.
//
// Preconditions: the induction set names canonical loop counters of the
//                enclosing function; blocks are valid (see `ir::Block::validate`).
// Postconditions: `increment_index_offset` leaves the effective index equal to
//                 the original plus `delta` (modulo the index bit width).
// Failure modes: `IndexError::NotASubscript`, `IndexError::UnsupportedIndexKind`.
// Side effects: events reported to the caller's `EventSink`.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::events::{Event, EventSink};
use crate::id::OpId;
use crate::ir::{wrap_to_width, BinOp, Block, OpKind, Operand};

// ── Public types ────────────────────────────────────────────────────────────

/// Value names recognized as canonical loop counters. Built once per
/// function and shared read-only by every block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InductionSet {
    names: BTreeSet<String>,
}

impl InductionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for InductionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        InductionSet {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// An `Index` operation whose index is induction-derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressExpr {
    pub index_op: OpId,
    pub base: Operand,
    pub index: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Load,
    Store,
}

/// How an index expression can absorb a constant offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexShape {
    /// `x + k` or `k + x`: fold into the constant at operand slot `slot`.
    AddConst { op: OpId, slot: usize },
    /// `x - k`: the constant shrinks by delta.
    SubConstRight { op: OpId },
    /// `k - x`: the constant grows by delta.
    SubConstLeft { op: OpId },
    /// Bare counter or add/sub without a constant: wrap in a new add.
    Wrap,
    /// Any other operator; carries its mnemonic.
    Unsupported(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("{op} is not a subscript access")]
    NotASubscript { op: OpId },
    #[error("index of {op} is a '{shape}' expression, which cannot absorb an offset")]
    UnsupportedIndexKind { op: OpId, shape: &'static str },
}

/// Load and store subscripts of one block, in program order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptSummary {
    pub loads: Vec<(OpId, AddressExpr)>,
    pub stores: Vec<(OpId, AddressExpr)>,
}

impl SubscriptSummary {
    pub fn len(&self) -> usize {
        self.loads.len() + self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loads.is_empty() && self.stores.is_empty()
    }
}

// ── Analyzer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SubscriptAnalyzer<'a> {
    induction: &'a InductionSet,
}

impl<'a> SubscriptAnalyzer<'a> {
    pub fn new(induction: &'a InductionSet) -> Self {
        SubscriptAnalyzer { induction }
    }

    pub fn is_induction_variable(&self, block: &Block, operand: &Operand) -> bool {
        block
            .value_name(operand)
            .is_some_and(|name| self.induction.contains(name))
    }

    /// True for a binary operation with at least one induction-variable operand.
    pub fn is_modified_induction_variable(&self, block: &Block, operand: &Operand) -> bool {
        let Some(op) = operand.as_op().and_then(|id| block.get(id)) else {
            return false;
        };
        match &op.kind {
            OpKind::Binary { lhs, rhs, .. } => {
                self.is_induction_variable(block, lhs) || self.is_induction_variable(block, rhs)
            }
            _ => false,
        }
    }

    pub fn is_address_calculation(&self, block: &Block, operand: &Operand) -> Option<AddressExpr> {
        let id = operand.as_op()?;
        match &block.get(id)?.kind {
            OpKind::Index { base, index }
                if self.is_induction_variable(block, index)
                    || self.is_modified_induction_variable(block, index) =>
            {
                Some(AddressExpr {
                    index_op: id,
                    base: base.clone(),
                    index: index.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn is_load_subscript(&self, block: &Block, op: OpId) -> Option<AddressExpr> {
        match &block.get(op)?.kind {
            OpKind::Load { addr } => self.is_address_calculation(block, addr),
            _ => None,
        }
    }

    pub fn is_store_subscript(&self, block: &Block, op: OpId) -> Option<AddressExpr> {
        match &block.get(op)?.kind {
            OpKind::Store { addr, .. } => self.is_address_calculation(block, addr),
            _ => None,
        }
    }

    pub fn subscript_of(&self, block: &Block, op: OpId) -> Option<(AccessKind, AddressExpr)> {
        if let Some(addr) = self.is_store_subscript(block, op) {
            return Some((AccessKind::Store, addr));
        }
        self.is_load_subscript(block, op)
            .map(|addr| (AccessKind::Load, addr))
    }

    /// Collect every subscript access of `block` in program order.
    pub fn detect(&self, block: &Block, sink: &mut dyn EventSink) -> SubscriptSummary {
        let mut summary = SubscriptSummary::default();
        for id in block.program_order() {
            let Some((kind, addr)) = self.subscript_of(block, id) else {
                continue;
            };
            sink.emit(Event::SubscriptFound {
                block: block.name.clone(),
                op: id,
                store: kind == AccessKind::Store,
            });
            match kind {
                AccessKind::Load => summary.loads.push((id, addr)),
                AccessKind::Store => summary.stores.push((id, addr)),
            }
        }
        summary
    }

    /// Decide how the index of `addr` would absorb an offset.
    pub fn index_shape(&self, block: &Block, addr: &AddressExpr) -> IndexShape {
        if self.is_induction_variable(block, &addr.index) {
            return IndexShape::Wrap;
        }
        let Some(id) = addr.index.as_op() else {
            return IndexShape::Unsupported("value");
        };
        match &block.op(id).kind {
            OpKind::Binary {
                bin: BinOp::Add,
                lhs,
                rhs,
            } => match (lhs, rhs) {
                (_, Operand::Const(_)) => IndexShape::AddConst { op: id, slot: 1 },
                (Operand::Const(_), _) => IndexShape::AddConst { op: id, slot: 0 },
                _ => IndexShape::Wrap,
            },
            OpKind::Binary {
                bin: BinOp::Sub,
                lhs,
                rhs,
            } => match (lhs, rhs) {
                (_, Operand::Const(_)) => IndexShape::SubConstRight { op: id },
                (Operand::Const(_), _) => IndexShape::SubConstLeft { op: id },
                _ => IndexShape::Wrap,
            },
            other => IndexShape::Unsupported(other.mnemonic()),
        }
    }

    /// Move the effective index of the subscript access `op` by `delta`.
    ///
    /// Constant-carrying add/sub indices are folded in place. Otherwise a
    /// wire-only `add` is created in the arena, spliced into program order
    /// before the address computation, and the index edge redirected to it.
    pub fn increment_index_offset(
        &self,
        block: &mut Block,
        op: OpId,
        delta: i64,
        sink: &mut dyn EventSink,
    ) -> Result<(), IndexError> {
        let (_, addr) = self
            .subscript_of(block, op)
            .ok_or(IndexError::NotASubscript { op })?;

        let created = match self.index_shape(block, &addr) {
            IndexShape::AddConst { op: bin, slot } => {
                fold_constant(block, bin, slot, delta);
                None
            }
            IndexShape::SubConstRight { op: bin } => {
                fold_constant(block, bin, 1, delta.wrapping_neg());
                None
            }
            IndexShape::SubConstLeft { op: bin } => {
                fold_constant(block, bin, 0, delta);
                None
            }
            IndexShape::Wrap => Some(wrap_index(block, &addr, delta)),
            IndexShape::Unsupported(shape) => {
                return Err(IndexError::UnsupportedIndexKind { op, shape });
            }
        };

        sink.emit(Event::IndexRewritten {
            block: block.name.clone(),
            index_op: addr.index_op,
            delta,
            created,
        });
        Ok(())
    }

    /// Evaluate the index of subscript access `op` with induction variables
    /// bound by `env`. `None` when the access is not a subscript or a value
    /// it depends on is unbound.
    pub fn effective_index(
        &self,
        block: &Block,
        op: OpId,
        env: &BTreeMap<String, i64>,
    ) -> Option<i64> {
        let (_, addr) = self.subscript_of(block, op)?;
        eval_operand(block, &addr.index, env, block.len() + 1)
    }
}

fn fold_constant(block: &mut Block, bin: OpId, slot: usize, delta: i64) {
    let mut operands = block.op_mut(bin).kind.operands_mut();
    if let Some(Operand::Const(c)) = operands.get_mut(slot).map(|o| &mut **o) {
        c.value = wrap_to_width(c.value.wrapping_add(delta), c.width);
    }
}

fn wrap_index(block: &mut Block, addr: &AddressExpr, delta: i64) -> OpId {
    let width = block.operand_width(&addr.index);
    let name = format!("{}_offset", block.operand_label(&addr.index));
    let new = block.alloc(
        Some(name),
        width,
        true,
        OpKind::Binary {
            bin: BinOp::Add,
            lhs: addr.index.clone(),
            rhs: Operand::constant(wrap_to_width(delta, width), width),
        },
    );
    block.insert_before(addr.index_op, new);
    if let OpKind::Index { index, .. } = &mut block.op_mut(addr.index_op).kind {
        *index = Operand::Op(new);
    }
    new
}

fn eval_operand(
    block: &Block,
    operand: &Operand,
    env: &BTreeMap<String, i64>,
    fuel: usize,
) -> Option<i64> {
    if fuel == 0 {
        return None;
    }
    if let Some(value) = block.value_name(operand).and_then(|n| env.get(n)) {
        return Some(*value);
    }
    match operand {
        Operand::Const(c) => Some(c.value),
        Operand::Input(_) | Operand::Global(_) => None,
        Operand::Op(id) => {
            let op = block.get(*id)?;
            match &op.kind {
                OpKind::Binary { bin, lhs, rhs } => {
                    let l = eval_operand(block, lhs, env, fuel - 1)?;
                    let r = eval_operand(block, rhs, env, fuel - 1)?;
                    Some(wrap_to_width(bin.eval(l, r)?, op.width))
                }
                OpKind::Cast { value, .. } => {
                    let v = eval_operand(block, value, env, fuel - 1)?;
                    Some(wrap_to_width(v, op.width))
                }
                _ => None,
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
