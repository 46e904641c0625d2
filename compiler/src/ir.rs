// ir.rs — Basic-block operation arena consumed by the scheduler
//
// Operations are a closed sum type over kinds, each carrying its own operand
// references. A block owns an arena of operations (indexed by `OpId`) plus a
// separate program order, so rewrites can append an operation and splice it
// into the order without moving existing handles.
//
// Preconditions: blocks come from the front-end (or JSON) in SSA form.
// Postconditions: `Function::validate` guarantees ids match arena slots,
//                 operands reference earlier operations, and the terminator
//                 (if any) is last in program order.
// Failure modes: malformed input → `IrError`.
// Side effects: none.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{IdAllocator, OpId};

/// Bit width used for pointers and for index operands of unknown width.
pub const POINTER_WIDTH: u32 = 32;

fn default_width() -> u32 {
    POINTER_WIDTH
}

/// Memory-port name → data width in bits.
pub type MemportMap = BTreeMap<String, u32>;

// ── Operands ────────────────────────────────────────────────────────────────

/// An integer constant with an explicit bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constant {
    pub value: i64,
    #[serde(default = "default_width")]
    pub width: u32,
}

impl Constant {
    pub fn new(value: i64, width: u32) -> Self {
        Constant { value, width }
    }
}

/// Truncate `value` to `width` bits, sign-extending back to i64.
/// Width 1 is treated as an unsigned flag.
pub fn wrap_to_width(value: i64, width: u32) -> i64 {
    match width {
        0 | 64.. => value,
        1 => value & 1,
        w => {
            let shift = 64 - w;
            (value << shift) >> shift
        }
    }
}

/// A reference consumed by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Const(Constant),
    /// Function argument or value defined outside this block.
    Input(String),
    /// Named global value owned by the `GlobalRegistry`.
    Global(String),
    /// Result of another operation in the same block.
    Op(OpId),
}

impl Operand {
    pub fn constant(value: i64, width: u32) -> Self {
        Operand::Const(Constant::new(value, width))
    }

    pub fn input(name: impl Into<String>) -> Self {
        Operand::Input(name.into())
    }

    pub fn as_op(&self) -> Option<OpId> {
        match self {
            Operand::Op(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<Constant> {
        match self {
            Operand::Const(c) => Some(*c),
            _ => None,
        }
    }
}

// ── Operation kinds ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SRem => "rem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
        }
    }

    /// Evaluate on two's-complement values; `None` on division by zero.
    pub fn eval(self, lhs: i64, rhs: i64) -> Option<i64> {
        let shift = (rhs & 63) as u32;
        Some(match self {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            BinOp::SRem => lhs.checked_rem(rhs)?,
            BinOp::And => lhs & rhs,
            BinOp::Or => lhs | rhs,
            BinOp::Xor => lhs ^ rhs,
            BinOp::Shl => lhs.wrapping_shl(shift),
            BinOp::LShr => ((lhs as u64) >> shift) as i64,
            BinOp::AShr => lhs >> shift,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl CmpPred {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Slt => "slt",
            CmpPred::Sle => "sle",
            CmpPred::Sgt => "sgt",
            CmpPred::Sge => "sge",
            CmpPred::Ult => "ult",
            CmpPred::Ule => "ule",
            CmpPred::Ugt => "ugt",
            CmpPred::Uge => "uge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastKind {
    ZExt,
    SExt,
    Trunc,
    BitCast,
    IntToPtr,
    PtrToInt,
}

impl CastKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastKind::ZExt => "zext",
            CastKind::SExt => "sext",
            CastKind::Trunc => "trunc",
            CastKind::BitCast => "bitcast",
            CastKind::IntToPtr => "inttoptr",
            CastKind::PtrToInt => "ptrtoint",
        }
    }
}

/// One incoming edge of a phi merge point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhiIncoming {
    pub block: String,
    pub value: Operand,
}

/// Closed set of operation kinds, each with its own operand layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpKind {
    Binary {
        bin: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
    Cmp {
        pred: CmpPred,
        lhs: Operand,
        rhs: Operand,
    },
    Select {
        cond: Operand,
        on_true: Operand,
        on_false: Operand,
    },
    Cast {
        cast: CastKind,
        value: Operand,
    },
    /// Address computation `base + index` (array subscript).
    Index {
        base: Operand,
        index: Operand,
    },
    Load {
        addr: Operand,
    },
    Store {
        value: Operand,
        addr: Operand,
    },
    Phi {
        incoming: Vec<PhiIncoming>,
    },
    Call {
        intrinsic: String,
        args: Vec<Operand>,
    },
    Branch {
        #[serde(default)]
        cond: Option<Operand>,
        targets: Vec<String>,
    },
    Return {
        #[serde(default)]
        value: Option<Operand>,
    },
    Alloca,
}

impl OpKind {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            OpKind::Binary { bin, .. } => bin.mnemonic(),
            OpKind::Cmp { .. } => "cmp",
            OpKind::Select { .. } => "select",
            OpKind::Cast { cast, .. } => cast.mnemonic(),
            OpKind::Index { .. } => "index",
            OpKind::Load { .. } => "load",
            OpKind::Store { .. } => "store",
            OpKind::Phi { .. } => "phi",
            OpKind::Call { .. } => "call",
            OpKind::Branch { .. } => "br",
            OpKind::Return { .. } => "ret",
            OpKind::Alloca => "alloca",
        }
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            OpKind::Binary { lhs, rhs, .. } | OpKind::Cmp { lhs, rhs, .. } => vec![lhs, rhs],
            OpKind::Select {
                cond,
                on_true,
                on_false,
            } => vec![cond, on_true, on_false],
            OpKind::Cast { value, .. } => vec![value],
            OpKind::Index { base, index } => vec![base, index],
            OpKind::Load { addr } => vec![addr],
            OpKind::Store { value, addr } => vec![value, addr],
            OpKind::Phi { incoming } => incoming.iter().map(|i| &i.value).collect(),
            OpKind::Call { args, .. } => args.iter().collect(),
            OpKind::Branch { cond, .. } => cond.iter().collect(),
            OpKind::Return { value } => value.iter().collect(),
            OpKind::Alloca => Vec::new(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            OpKind::Binary { lhs, rhs, .. } | OpKind::Cmp { lhs, rhs, .. } => vec![lhs, rhs],
            OpKind::Select {
                cond,
                on_true,
                on_false,
            } => vec![cond, on_true, on_false],
            OpKind::Cast { value, .. } => vec![value],
            OpKind::Index { base, index } => vec![base, index],
            OpKind::Load { addr } => vec![addr],
            OpKind::Store { value, addr } => vec![value, addr],
            OpKind::Phi { incoming } => incoming.iter_mut().map(|i| &mut i.value).collect(),
            OpKind::Call { args, .. } => args.iter_mut().collect(),
            OpKind::Branch { cond, .. } => cond.iter_mut().collect(),
            OpKind::Return { value } => value.iter_mut().collect(),
            OpKind::Alloca => Vec::new(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, OpKind::Branch { .. } | OpKind::Return { .. })
    }

    /// Address operand of a memory access.
    pub fn memory_address(&self) -> Option<&Operand> {
        match self {
            OpKind::Load { addr } | OpKind::Store { addr, .. } => Some(addr),
            _ => None,
        }
    }
}

// ── Operation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OpId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    /// Pure combinational: inlined into consumers, never given a cycle.
    #[serde(default)]
    pub wire_only: bool,
    pub kind: OpKind,
}

// ── Block ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IrError {
    #[error("block '{block}': operation at slot {slot} carries id {found}")]
    IdMismatch {
        block: String,
        slot: usize,
        found: OpId,
    },
    #[error("block '{block}': {op} references {operand}, which is not defined before it")]
    ForwardReference {
        block: String,
        op: OpId,
        operand: OpId,
    },
    #[error("block '{block}': program order lists {count} of {total} operations")]
    IncompleteOrder {
        block: String,
        count: usize,
        total: usize,
    },
    #[error("block '{block}': program order names {op}, which is not in the arena")]
    UnknownOp { block: String, op: OpId },
    #[error("block '{block}': terminator {op} is not the last operation")]
    MisplacedTerminator { block: String, op: OpId },
    #[error("duplicate block name '{0}'")]
    DuplicateBlock(String),
}

/// A basic block: an arena of operations plus their program order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub ops: Vec<Operation>,
    /// Program order. Empty in serialized input means arena order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<OpId>,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Block {
            name: name.into(),
            ops: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn op(&self, id: OpId) -> &Operation {
        &self.ops[id.index()]
    }

    pub fn op_mut(&mut self, id: OpId) -> &mut Operation {
        &mut self.ops[id.index()]
    }

    pub fn get(&self, id: OpId) -> Option<&Operation> {
        self.ops.get(id.index())
    }

    /// Program order (arena order until the first splice).
    pub fn program_order(&self) -> Vec<OpId> {
        if self.order.len() == self.ops.len() {
            self.order.clone()
        } else {
            self.ops.iter().map(|op| op.id).collect()
        }
    }

    fn seal_order(&mut self) {
        if self.order.is_empty() {
            self.order = self.ops.iter().map(|op| op.id).collect();
        }
    }

    /// Allocate a new operation in the arena without placing it in program order.
    pub fn alloc(
        &mut self,
        name: Option<String>,
        width: u32,
        wire_only: bool,
        kind: OpKind,
    ) -> OpId {
        self.seal_order();
        let id = IdAllocator::starting_at(self.ops.len()).alloc_op();
        self.ops.push(Operation {
            id,
            name,
            width,
            wire_only,
            kind,
        });
        id
    }

    /// Append an operation at the end of program order.
    pub fn push(&mut self, name: &str, width: u32, kind: OpKind) -> OpId {
        let id = self.alloc(Some(name.to_string()), width, false, kind);
        self.order.push(id);
        id
    }

    /// Append a wire-only operation at the end of program order.
    pub fn push_wire(&mut self, name: &str, width: u32, kind: OpKind) -> OpId {
        let id = self.alloc(Some(name.to_string()), width, true, kind);
        self.order.push(id);
        id
    }

    /// Splice `new` into program order immediately before `anchor`.
    pub fn insert_before(&mut self, anchor: OpId, new: OpId) {
        self.seal_order();
        self.order.retain(|&id| id != new);
        let pos = self
            .order
            .iter()
            .position(|&id| id == anchor)
            .unwrap_or(self.order.len());
        self.order.insert(pos, new);
    }

    /// Splice `new` into program order immediately after `anchor`.
    pub fn insert_after(&mut self, anchor: OpId, new: OpId) {
        self.seal_order();
        self.order.retain(|&id| id != new);
        let pos = self
            .order
            .iter()
            .position(|&id| id == anchor)
            .map(|p| p + 1)
            .unwrap_or(self.order.len());
        self.order.insert(pos, new);
    }

    /// Every operation whose operand list references `target`.
    pub fn users_of(&self, target: OpId) -> Vec<OpId> {
        self.ops
            .iter()
            .filter(|op| op.kind.operands().contains(&&Operand::Op(target)))
            .map(|op| op.id)
            .collect()
    }

    pub fn operand_width(&self, operand: &Operand) -> u32 {
        match operand {
            Operand::Const(c) => c.width,
            Operand::Op(id) => self.get(*id).map_or(POINTER_WIDTH, |op| op.width),
            Operand::Input(_) | Operand::Global(_) => POINTER_WIDTH,
        }
    }

    /// Value name of an operand, as SSA names appear across blocks.
    pub fn value_name<'a>(&'a self, operand: &'a Operand) -> Option<&'a str> {
        match operand {
            Operand::Input(name) | Operand::Global(name) => Some(name),
            Operand::Op(id) => self.get(*id).and_then(|op| op.name.as_deref()),
            Operand::Const(_) => None,
        }
    }

    /// Follow an address back through casts and index computations to the
    /// memory port it lives in.
    pub fn memory_port<'a>(&'a self, addr: &'a Operand, ports: &MemportMap) -> Option<&'a str> {
        let mut current = addr;
        for _ in 0..=self.ops.len() {
            match current {
                Operand::Input(name) | Operand::Global(name) => {
                    return ports.contains_key(name).then_some(name.as_str());
                }
                Operand::Const(_) => return None,
                Operand::Op(id) => match &self.get(*id)?.kind {
                    OpKind::Index { base, .. } => current = base,
                    OpKind::Cast { value, .. } => current = value,
                    _ => return None,
                },
            }
        }
        None
    }

    pub fn label(&self, id: OpId) -> String {
        match self.get(id).and_then(|op| op.name.as_deref()) {
            Some(name) => name.to_string(),
            None => id.to_string(),
        }
    }

    pub fn operand_label(&self, operand: &Operand) -> String {
        match operand {
            Operand::Const(c) => c.value.to_string(),
            Operand::Input(name) => name.clone(),
            Operand::Global(name) => format!("@{name}"),
            Operand::Op(id) => self.label(*id),
        }
    }

    /// One-line textual form, e.g. `t1 = add a, b`.
    pub fn render_op(&self, id: OpId) -> String {
        let op = self.op(id);
        let args: Vec<String> = op
            .kind
            .operands()
            .into_iter()
            .map(|o| self.operand_label(o))
            .collect();
        let head = match &op.kind {
            OpKind::Cmp { pred, .. } => format!("cmp {}", pred.mnemonic()),
            OpKind::Call { intrinsic, .. } => format!("call {intrinsic}"),
            other => other.mnemonic().to_string(),
        };
        let body = if args.is_empty() {
            head
        } else {
            format!("{} {}", head, args.join(", "))
        };
        match (&op.kind, &op.name) {
            (OpKind::Store { .. } | OpKind::Branch { .. } | OpKind::Return { .. }, _) => body,
            (_, Some(name)) => format!("{name} = {body}"),
            (_, None) => format!("{id} = {body}"),
        }
    }

    /// Check arena ids, operand ordering, and terminator placement.
    pub fn validate(&mut self) -> Result<(), IrError> {
        self.seal_order();
        for (slot, op) in self.ops.iter().enumerate() {
            if op.id.index() != slot {
                return Err(IrError::IdMismatch {
                    block: self.name.clone(),
                    slot,
                    found: op.id,
                });
            }
        }
        if let Some(&op) = self.order.iter().find(|id| id.index() >= self.ops.len()) {
            return Err(IrError::UnknownOp {
                block: self.name.clone(),
                op,
            });
        }
        if self.order.len() != self.ops.len() {
            return Err(IrError::IncompleteOrder {
                block: self.name.clone(),
                count: self.order.len(),
                total: self.ops.len(),
            });
        }
        let position: HashMap<OpId, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        if position.len() != self.ops.len() {
            return Err(IrError::IncompleteOrder {
                block: self.name.clone(),
                count: position.len(),
                total: self.ops.len(),
            });
        }
        for (pos, &id) in self.order.iter().enumerate() {
            let op = self.op(id);
            if op.kind.is_terminator() && pos + 1 != self.order.len() {
                return Err(IrError::MisplacedTerminator {
                    block: self.name.clone(),
                    op: id,
                });
            }
            // Phi operands are loop-carried and may name later values.
            if matches!(op.kind, OpKind::Phi { .. }) {
                continue;
            }
            for operand in op.kind.operands() {
                if let Operand::Op(dep) = operand {
                    match position.get(dep) {
                        Some(&dep_pos) if dep_pos < pos => {}
                        _ => {
                            return Err(IrError::ForwardReference {
                                block: self.name.clone(),
                                op: id,
                                operand: *dep,
                            })
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for id in self.program_order() {
            let marker = if self.op(id).wire_only { " [wire]" } else { "" };
            writeln!(f, "  {}{}", self.render_op(id), marker)?;
        }
        Ok(())
    }
}

// ── Function ────────────────────────────────────────────────────────────────

/// Type of a function parameter as seen by the synthesized module interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamType {
    Int { width: u32 },
    Array { elem_width: u32, len: u32 },
    Pointer { elem_width: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
}

/// Declared global value; pointer globals are memory-backed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: ParamType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub globals: Vec<GlobalDecl>,
    /// Value names of recognized canonical loop counters.
    #[serde(default)]
    pub induction_vars: Vec<String>,
    pub blocks: Vec<Block>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            params: Vec::new(),
            globals: Vec::new(),
            induction_vars: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn validate(&mut self) -> Result<(), IrError> {
        let mut seen = std::collections::HashSet::new();
        for block in &mut self.blocks {
            if !seen.insert(block.name.clone()) {
                return Err(IrError::DuplicateBlock(block.name.clone()));
            }
            block.validate()?;
        }
        Ok(())
    }

    /// Memory ports reachable from the signature: array and pointer
    /// parameters plus pointer/array globals, keyed by name.
    pub fn memory_ports(&self) -> MemportMap {
        let params = self.params.iter().map(|p| (&p.name, p.ty));
        let globals = self.globals.iter().map(|g| (&g.name, g.ty));
        params
            .chain(globals)
            .filter_map(|(name, ty)| match ty {
                ParamType::Array { elem_width, .. } | ParamType::Pointer { elem_width } => {
                    Some((name.clone(), elem_width))
                }
                ParamType::Int { .. } => None,
            })
            .collect()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn add(lhs: Operand, rhs: Operand) -> OpKind {
        OpKind::Binary {
            bin: BinOp::Add,
            lhs,
            rhs,
        }
    }

    #[test]
    fn wrap_truncates_and_sign_extends() {
        assert_eq!(wrap_to_width(255, 8), -1);
        assert_eq!(wrap_to_width(127, 8), 127);
        assert_eq!(wrap_to_width(3, 1), 1);
        assert_eq!(wrap_to_width(i64::MAX, 64), i64::MAX);
    }

    #[test]
    fn push_and_render() {
        let mut bb = Block::new("entry");
        let t1 = bb.push("t1", 32, add(Operand::input("a"), Operand::input("b")));
        bb.push(
            "t2",
            32,
            OpKind::Binary {
                bin: BinOp::Mul,
                lhs: Operand::Op(t1),
                rhs: Operand::input("c"),
            },
        );
        assert_eq!(bb.render_op(t1), "t1 = add a, b");
        assert_eq!(bb.render_op(OpId(1)), "t2 = mul t1, c");
        assert!(bb.validate().is_ok());
    }

    #[test]
    fn insert_before_keeps_arena_handles() {
        let mut bb = Block::new("b");
        let a = bb.push("a", 32, add(Operand::constant(1, 32), Operand::constant(2, 32)));
        let b = bb.push("b", 32, add(Operand::Op(a), Operand::constant(2, 32)));
        let c = bb.alloc(Some("c".into()), 32, true, OpKind::Alloca);
        bb.insert_before(b, c);
        assert_eq!(bb.program_order(), vec![a, c, b]);
        assert_eq!(bb.op(b).id, b);
    }

    #[test]
    fn forward_reference_rejected() {
        let mut bb = Block::new("b");
        bb.push("x", 32, add(Operand::Op(OpId(1)), Operand::constant(1, 32)));
        bb.push("y", 32, OpKind::Alloca);
        let err = bb.validate().unwrap_err();
        assert!(matches!(err, IrError::ForwardReference { .. }));
    }

    #[test]
    fn terminator_must_be_last() {
        let mut bb = Block::new("b");
        bb.push(
            "",
            1,
            OpKind::Branch {
                cond: None,
                targets: vec!["exit".into()],
            },
        );
        bb.push("x", 32, OpKind::Alloca);
        assert!(matches!(
            bb.validate(),
            Err(IrError::MisplacedTerminator { .. })
        ));
    }

    #[test]
    fn memory_port_follows_index_chain() {
        let mut bb = Block::new("b");
        let gep = bb.push_wire(
            "p",
            32,
            OpKind::Index {
                base: Operand::input("A"),
                index: Operand::input("i"),
            },
        );
        let mut ports = MemportMap::new();
        ports.insert("A".into(), 16);
        assert_eq!(bb.memory_port(&Operand::Op(gep), &ports), Some("A"));
        assert_eq!(bb.memory_port(&Operand::input("B"), &ports), None);
    }

    #[test]
    fn memory_ports_from_signature() {
        let mut func = Function::new("f");
        func.params.push(Param {
            name: "A".into(),
            ty: ParamType::Array {
                elem_width: 8,
                len: 16,
            },
        });
        func.params.push(Param {
            name: "n".into(),
            ty: ParamType::Int { width: 32 },
        });
        func.globals.push(GlobalDecl {
            name: "buf".into(),
            ty: ParamType::Pointer { elem_width: 32 },
        });
        let ports = func.memory_ports();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports["A"], 8);
        assert_eq!(ports["buf"], 32);
    }

    #[test]
    fn json_roundtrip_of_block() {
        let mut bb = Block::new("body");
        bb.push("t", 32, add(Operand::input("a"), Operand::constant(4, 32)));
        let json = serde_json::to_string(&bb).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ops, bb.ops);
    }

    #[test]
    fn order_naming_missing_op_rejected() {
        let json = r#"{
            "name": "b",
            "ops": [
                { "id": 0, "kind": { "op": "alloca" } },
                { "id": 1, "kind": { "op": "alloca" } }
            ],
            "order": [0, 5]
        }"#;
        let mut bb: Block = serde_json::from_str(json).unwrap();
        assert_eq!(
            bb.validate(),
            Err(IrError::UnknownOp {
                block: "b".to_string(),
                op: OpId(5)
            })
        );
    }

    #[test]
    fn duplicate_block_names_rejected() {
        let mut func = Function::new("f");
        func.blocks.push(Block::new("a"));
        func.blocks.push(Block::new("a"));
        assert_eq!(
            func.validate(),
            Err(IrError::DuplicateBlock("a".to_string()))
        );
    }
}
