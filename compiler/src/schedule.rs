// schedule.rs — Resource-constrained list scheduling of one basic block
//
// Assigns every schedulable operation of a block to a clock cycle and a
// concrete hardware unit instance. Operations are visited in program order;
// each goes to the earliest cycle after its dependencies on the least busy
// matching instance. Induction-indexed loads additionally get a prefetch copy
// addressing the next iteration, issued on a follow-on stream.
//
// Preconditions: `block` passes `Block::validate`; `ctx.config` lists a unit
//                for every hardware opcode the block uses.
// Postconditions: returns a frozen `BlockSchedule` in which every dependency
//                 of an operation sits in a strictly earlier cycle and no
//                 (instance, cycle, stream) cell is booked twice.
// Failure modes: missing unit type → `SchedError::NoResourceForOpcode`;
//                unpipelinable subscripts produce W0100 warnings.
// Side effects: events reported to the caller's `EventSink`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use thiserror::Error;

use crate::config::{SynthConfig, MEM_OPCODE};
use crate::diag::{codes, Diagnostic};
use crate::events::{Event, EventSink};
use crate::id::{OpId, ResourceId, TypeId};
use crate::ir::{Block, MemportMap, OpKind, Operand};
use crate::resource::{least_busy_resource, IssueClass, PlaceError, ResourceUnit};
use crate::subscript::{IndexError, IndexShape, InductionSet, SubscriptAnalyzer};

// ── Hardware opcodes ────────────────────────────────────────────────────────

/// Resource type name an operation executes on. `None` for phi merges,
/// which the control emitter resolves without a unit.
pub fn hw_opcode(block: &Block, op: OpId, ports: &MemportMap) -> Option<String> {
    let opcode = match &block.op(op).kind {
        OpKind::Binary { bin, .. } => bin.mnemonic().to_string(),
        OpKind::Cmp { .. } => "cmp".to_string(),
        OpKind::Select { .. } => "select".to_string(),
        OpKind::Cast { .. } => "cast".to_string(),
        OpKind::Index { .. } => "gep".to_string(),
        OpKind::Call { .. } => "call".to_string(),
        OpKind::Alloca => "alloca".to_string(),
        OpKind::Branch { .. } | OpKind::Return { .. } => "control".to_string(),
        OpKind::Load { addr } | OpKind::Store { addr, .. } => match block.memory_port(addr, ports) {
            Some(port) => format!("{MEM_OPCODE}_{port}"),
            None => MEM_OPCODE.to_string(),
        },
        OpKind::Phi { .. } => return None,
    };
    Some(opcode)
}

/// Scheduled operands of `id`: wire-only producers are looked through
/// transitively, phi merges are not dependencies.
fn data_deps(block: &Block, id: OpId) -> BTreeSet<OpId> {
    let mut deps = BTreeSet::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<OpId> = block
        .op(id)
        .kind
        .operands()
        .into_iter()
        .filter_map(Operand::as_op)
        .collect();
    while let Some(dep) = stack.pop() {
        if !seen.insert(dep) {
            continue;
        }
        let Some(producer) = block.get(dep) else {
            continue;
        };
        match &producer.kind {
            OpKind::Phi { .. } => {}
            kind if producer.wire_only => {
                stack.extend(kind.operands().into_iter().filter_map(Operand::as_op));
            }
            _ => {
                deps.insert(dep);
            }
        }
    }
    deps
}

// ── Public types ────────────────────────────────────────────────────────────

/// Shared read-only inputs for scheduling every block of a function.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleContext<'a> {
    pub induction: &'a InductionSet,
    pub ports: &'a MemportMap,
    pub config: &'a SynthConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedState {
    Unscheduled,
    ReadyQueueBuilt,
    Scheduling,
    Finalized,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedError {
    #[error("block '{block}': no hardware unit configured for opcode '{opcode}' (needed by {op})")]
    NoResourceForOpcode {
        block: String,
        op: OpId,
        opcode: String,
    },
    #[error(transparent)]
    SlotOccupied(#[from] PlaceError),
    #[error("block '{block}': address rewrite failed: {source}")]
    Rewrite { block: String, source: IndexError },
    #[error("scheduler is {found:?}; expected {expected:?}")]
    InvalidState {
        expected: SchedState,
        found: SchedState,
    },
}

impl SchedError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            SchedError::NoResourceForOpcode { block, op, opcode } => {
                Diagnostic::error(codes::E0200, self.to_string())
                    .at(block.clone(), Some(*op))
                    .with_hint(format!("add \"{opcode}\" to the `units` table"))
            }
            SchedError::SlotOccupied(_) => Diagnostic::error(codes::E0201, self.to_string()),
            SchedError::Rewrite { block, .. } => {
                Diagnostic::error(codes::E0300, self.to_string()).at(block.clone(), None)
            }
            SchedError::InvalidState { .. } => Diagnostic::error(codes::E0300, self.to_string()),
        }
    }
}

/// Where one operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub cycle: usize,
    pub resource: ResourceId,
    pub stream: usize,
}

/// A subscript load together with the prefetch copy issued for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinedAccess {
    pub original: OpId,
    pub prefetch: OpId,
    pub offset: i64,
}

/// Result of scheduling one block.
#[derive(Debug)]
pub struct ScheduleResult {
    pub schedule: BlockSchedule,
    pub diagnostics: Vec<Diagnostic>,
}

/// Frozen schedule of one block, queried by renderers.
#[derive(Debug, Clone)]
pub struct BlockSchedule {
    block: Block,
    units: Vec<ResourceUnit>,
    type_names: Vec<String>,
    placements: BTreeMap<OpId, Placement>,
    /// Operations in the order they were placed.
    issue_order: Vec<OpId>,
    deps: BTreeMap<OpId, Vec<OpId>>,
    pipelined: Vec<PipelinedAccess>,
    inlined: Vec<OpId>,
    terminator: Option<OpId>,
}

// ── Scheduler ───────────────────────────────────────────────────────────────

pub struct ListScheduler<'a> {
    ctx: ScheduleContext<'a>,
    block: Block,
    state: SchedState,
    units: Vec<ResourceUnit>,
    type_names: Vec<String>,
    queue: Vec<OpId>,
    terminator: Option<OpId>,
    deps: BTreeMap<OpId, Vec<OpId>>,
    placements: BTreeMap<OpId, Placement>,
    issue_order: Vec<OpId>,
    /// Hardware opcode of each memory port → its last store in program order.
    last_store: HashMap<String, OpId>,
    pipelined: Vec<PipelinedAccess>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ListScheduler<'a> {
    pub fn new(block: Block, ctx: ScheduleContext<'a>) -> Self {
        ListScheduler {
            ctx,
            block,
            state: SchedState::Unscheduled,
            units: Vec::new(),
            type_names: Vec::new(),
            queue: Vec::new(),
            terminator: None,
            deps: BTreeMap::new(),
            placements: BTreeMap::new(),
            issue_order: Vec::new(),
            last_store: HashMap::new(),
            pipelined: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn state(&self) -> SchedState {
        self.state
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    fn expect_state(&self, expected: SchedState) -> Result<(), SchedError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SchedError::InvalidState {
                expected,
                found: self.state,
            })
        }
    }

    /// Instantiate the configured units for `opcode` on first use.
    fn ensure_units(&mut self, opcode: &str, op: OpId) -> Result<(), SchedError> {
        if self.type_names.iter().any(|name| name == opcode) {
            return Ok(());
        }
        let count = self.ctx.config.instances_for(opcode).ok_or_else(|| {
            SchedError::NoResourceForOpcode {
                block: self.block.name.clone(),
                op,
                opcode: opcode.to_string(),
            }
        })?;
        let type_id = TypeId(self.type_names.len() as u32);
        self.type_names.push(opcode.to_string());
        for instance in 0..count {
            self.units.push(ResourceUnit::new(
                opcode,
                ResourceId { type_id, instance },
                self.ctx.config.streams,
            ));
        }
        Ok(())
    }

    /// Build the dependency graph in program order and set up the inventory.
    pub fn build_ready_queue(&mut self, sink: &mut dyn EventSink) -> Result<(), SchedError> {
        self.expect_state(SchedState::Unscheduled)?;
        let mut loads_since_store: HashMap<String, Vec<OpId>> = HashMap::new();

        for id in self.block.program_order() {
            let op = self.block.op(id);
            if op.wire_only {
                continue;
            }
            let Some(opcode) = hw_opcode(&self.block, id, self.ctx.ports) else {
                continue;
            };
            let mut deps = data_deps(&self.block, id);
            match &op.kind {
                OpKind::Load { .. } => {
                    deps.extend(self.last_store.get(&opcode));
                    loads_since_store.entry(opcode.clone()).or_default().push(id);
                }
                OpKind::Store { .. } => {
                    deps.extend(self.last_store.get(&opcode));
                    deps.extend(loads_since_store.remove(&opcode).unwrap_or_default());
                    self.last_store.insert(opcode.clone(), id);
                }
                _ => {}
            }
            if op.kind.is_terminator() {
                self.terminator = Some(id);
            } else {
                self.queue.push(id);
            }
            self.deps.insert(id, deps.into_iter().collect());
            self.ensure_units(&opcode, id)?;
        }

        sink.emit(Event::InventoryBuilt {
            block: self.block.name.clone(),
            unit_types: self.type_names.len(),
            instances: self.units.len(),
        });
        self.state = SchedState::ReadyQueueBuilt;
        Ok(())
    }

    fn ready_cycle(&self, id: OpId) -> usize {
        self.deps
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|dep| self.placements.get(dep))
            .map(|p| p.cycle + 1)
            .max()
            .unwrap_or(0)
    }

    /// Place `id` at the earliest feasible cycle no earlier than `floor`.
    fn place_op(
        &mut self,
        id: OpId,
        class: IssueClass,
        floor: usize,
        sink: &mut dyn EventSink,
    ) -> Result<Placement, SchedError> {
        let opcode = hw_opcode(&self.block, id, self.ctx.ports).unwrap_or_default();
        self.ensure_units(&opcode, id)?;
        let ready = self.ready_cycle(id).max(floor);

        let candidates: Vec<usize> = (0..self.units.len())
            .filter(|&i| self.units[i].capability_matches(&opcode))
            .collect();
        let best = candidates
            .iter()
            .map(|&i| self.units[i].best_scheduling_cycle(ready, class))
            .min()
            .ok_or_else(|| SchedError::NoResourceForOpcode {
                block: self.block.name.clone(),
                op: id,
                opcode: opcode.clone(),
            })?;
        let tied = candidates
            .iter()
            .map(|&i| &self.units[i])
            .filter(|u| u.best_scheduling_cycle(ready, class) == best);
        let chosen = least_busy_resource(tied)
            .map(ResourceUnit::id)
            .ok_or_else(|| SchedError::NoResourceForOpcode {
                block: self.block.name.clone(),
                op: id,
                opcode: opcode.clone(),
            })?;
        let unit = self
            .units
            .iter_mut()
            .find(|u| u.id() == chosen)
            .ok_or_else(|| SchedError::NoResourceForOpcode {
                block: self.block.name.clone(),
                op: id,
                opcode,
            })?;
        let stream = unit.place(id, best, class)?;

        let placement = Placement {
            cycle: best,
            resource: chosen,
            stream,
        };
        self.placements.insert(id, placement);
        self.issue_order.push(id);
        sink.emit(Event::Placed {
            block: self.block.name.clone(),
            op: id,
            cycle: best,
            resource: chosen,
            stream,
        });
        Ok(placement)
    }

    /// Greedy placement in program order, then address pipelining, then the
    /// terminator.
    pub fn run(&mut self, sink: &mut dyn EventSink) -> Result<(), SchedError> {
        self.expect_state(SchedState::ReadyQueueBuilt)?;
        self.state = SchedState::Scheduling;

        for id in self.queue.clone() {
            self.place_op(id, IssueClass::Primary, 0, sink)?;
        }
        if self.ctx.config.pipelining.enabled {
            self.pipeline_accesses(sink)?;
        }
        if let Some(term) = self.terminator {
            let floor = self.placements.values().map(|p| p.cycle).max().unwrap_or(0);
            self.place_op(term, IssueClass::Primary, floor, sink)?;
        }
        Ok(())
    }

    /// Copy an operation into the arena, right after `anchor` in program order.
    fn duplicate(&mut self, src: OpId, anchor: OpId, kind: OpKind) -> OpId {
        let op = self.block.op(src);
        let name = Some(format!("{}.next", self.block.label(src)));
        let (width, wire_only) = (op.width, op.wire_only);
        let copy = self.block.alloc(name, width, wire_only, kind);
        self.block.insert_after(anchor, copy);
        copy
    }

    fn pipeline_accesses(&mut self, sink: &mut dyn EventSink) -> Result<(), SchedError> {
        let analyzer = SubscriptAnalyzer::new(self.ctx.induction);
        let offset = self.ctx.config.pipelining.offset;
        let summary = analyzer.detect(&self.block, sink);

        // Only loads are read ahead. A store copy would write this
        // iteration's value to the next iteration's address.
        for (op, addr) in summary.loads {
            if !self.placements.contains_key(&op) {
                continue;
            }
            let index_src = match analyzer.index_shape(&self.block, &addr) {
                IndexShape::Unsupported(shape) => {
                    let reason = format!("'{shape}' index cannot absorb an offset");
                    self.diagnostics.push(
                        Diagnostic::warning(
                            codes::W0100,
                            format!("{} left unpipelined: {reason}", self.block.label(op)),
                        )
                        .at(self.block.name.clone(), Some(op)),
                    );
                    sink.emit(Event::PipeliningSkipped {
                        block: self.block.name.clone(),
                        op,
                        reason,
                    });
                    continue;
                }
                IndexShape::AddConst { op: bin, .. }
                | IndexShape::SubConstRight { op: bin }
                | IndexShape::SubConstLeft { op: bin } => Some(bin),
                IndexShape::Wrap => None,
            };

            let first_new = self.block.len();
            let mut anchor = op;
            let index = match index_src {
                Some(bin) => {
                    let kind = self.block.op(bin).kind.clone();
                    let copy = self.duplicate(bin, anchor, kind);
                    anchor = copy;
                    Operand::Op(copy)
                }
                None => addr.index.clone(),
            };
            let gep = self.duplicate(
                addr.index_op,
                anchor,
                OpKind::Index {
                    base: addr.base.clone(),
                    index,
                },
            );
            let prefetch = self.duplicate(
                op,
                gep,
                OpKind::Load {
                    addr: Operand::Op(gep),
                },
            );
            analyzer
                .increment_index_offset(&mut self.block, prefetch, offset, sink)
                .map_err(|source| SchedError::Rewrite {
                    block: self.block.name.clone(),
                    source,
                })?;

            let created: Vec<OpId> = (first_new..self.block.len())
                .map(|i| OpId(i as u32))
                .filter(|&id| !self.block.op(id).wire_only)
                .collect();
            for id in created {
                let mut deps = data_deps(&self.block, id);
                let class = if id == prefetch {
                    if let Some(opcode) = hw_opcode(&self.block, id, self.ctx.ports) {
                        deps.extend(self.last_store.get(&opcode));
                    }
                    IssueClass::FollowOn
                } else {
                    IssueClass::Primary
                };
                self.deps.insert(id, deps.into_iter().collect());
                self.place_op(id, class, 0, sink)?;
            }
            self.pipelined.push(PipelinedAccess {
                original: op,
                prefetch,
                offset,
            });
        }
        Ok(())
    }

    /// Freeze the schedule. The scheduler is left empty.
    pub fn finalize(&mut self) -> Result<ScheduleResult, SchedError> {
        self.expect_state(SchedState::Scheduling)?;
        self.state = SchedState::Finalized;

        let block = std::mem::replace(&mut self.block, Block::new(String::new()));
        let inlined = block
            .program_order()
            .into_iter()
            .filter(|id| {
                let op = block.op(*id);
                op.wire_only || matches!(op.kind, OpKind::Phi { .. })
            })
            .collect();
        let schedule = BlockSchedule {
            block,
            units: std::mem::take(&mut self.units),
            type_names: std::mem::take(&mut self.type_names),
            placements: std::mem::take(&mut self.placements),
            issue_order: std::mem::take(&mut self.issue_order),
            deps: std::mem::take(&mut self.deps),
            pipelined: std::mem::take(&mut self.pipelined),
            inlined,
            terminator: self.terminator,
        };
        Ok(ScheduleResult {
            schedule,
            diagnostics: std::mem::take(&mut self.diagnostics),
        })
    }
}

/// Schedule one block from start to finish.
pub fn schedule_block(
    block: Block,
    ctx: ScheduleContext<'_>,
    sink: &mut dyn EventSink,
) -> Result<ScheduleResult, SchedError> {
    let mut scheduler = ListScheduler::new(block, ctx);
    scheduler.build_ready_queue(sink)?;
    scheduler.run(sink)?;
    scheduler.finalize()
}

// ── Queries ─────────────────────────────────────────────────────────────────

impl BlockSchedule {
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn name(&self) -> &str {
        &self.block.name
    }

    /// Number of cycles (FSM states) the block occupies.
    pub fn length(&self) -> usize {
        self.placements
            .values()
            .map(|p| p.cycle + 1)
            .max()
            .unwrap_or(0)
    }

    /// Operations issued in `cycle`, in placement order.
    pub fn operations_at(&self, cycle: usize) -> Vec<OpId> {
        self.issue_order
            .iter()
            .copied()
            .filter(|id| self.cycle_of(*id) == Some(cycle))
            .collect()
    }

    pub fn placement_of(&self, op: OpId) -> Option<Placement> {
        self.placements.get(&op).copied()
    }

    pub fn resource_of(&self, op: OpId) -> Option<ResourceId> {
        self.placement_of(op).map(|p| p.resource)
    }

    pub fn cycle_of(&self, op: OpId) -> Option<usize> {
        self.placement_of(op).map(|p| p.cycle)
    }

    pub fn dependencies(&self, op: OpId) -> &[OpId] {
        self.deps.get(&op).map_or(&[], Vec::as_slice)
    }

    pub fn placements(&self) -> impl Iterator<Item = (OpId, Placement)> + '_ {
        self.placements.iter().map(|(id, p)| (*id, *p))
    }

    pub fn pipelined_accesses(&self) -> &[PipelinedAccess] {
        &self.pipelined
    }

    /// Wire-only and phi operations, which never receive a cycle.
    pub fn inlined(&self) -> &[OpId] {
        &self.inlined
    }

    pub fn terminator(&self) -> Option<OpId> {
        self.terminator
    }

    pub fn units(&self) -> &[ResourceUnit] {
        &self.units
    }

    pub fn unit_name(&self, type_id: TypeId) -> Option<&str> {
        self.type_names.get(type_id.0 as usize).map(String::as_str)
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.type_names
            .iter()
            .position(|n| n == name)
            .map(|i| TypeId(i as u32))
    }

    /// Human-readable instance name, e.g. `mul#0`.
    pub fn resource_label(&self, resource: ResourceId) -> String {
        format!(
            "{}#{}",
            self.unit_name(resource.type_id).unwrap_or("?"),
            resource.instance
        )
    }

    /// Most instances of unit type `name` busy in any single cycle.
    pub fn max_resource_usage(&self, name: &str) -> usize {
        let units: Vec<&ResourceUnit> = self
            .units
            .iter()
            .filter(|u| u.capability_matches(name))
            .collect();
        (0..self.length())
            .map(|cycle| {
                units
                    .iter()
                    .filter(|u| !u.operations_at(cycle).is_empty())
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    /// `(cycle, op)` pairs booked on one instance; the fan-in of its input mux.
    pub fn assignments(&self, resource: ResourceId) -> Vec<(usize, OpId)> {
        self.units
            .iter()
            .find(|u| u.id() == resource)
            .map(ResourceUnit::assignments)
            .unwrap_or_default()
    }
}

// ── Verification ─────────────────────────────────────────────────────────────

/// Machine-checkable evidence for block schedule postconditions.
#[derive(Debug, Clone)]
pub struct ScheduleCert {
    /// Every non-inlined operation has a placement.
    pub all_placed: bool,
    /// Every dependency sits in a strictly earlier cycle.
    pub deps_ordered: bool,
    /// No (instance, cycle, stream) cell holds two operations.
    pub no_double_booking: bool,
    /// The terminator is in the last occupied cycle.
    pub terminator_last: bool,
}

impl crate::pass::StageCert for ScheduleCert {
    fn all_pass(&self) -> bool {
        self.all_placed && self.deps_ordered && self.no_double_booking && self.terminator_last
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("all_placed", self.all_placed),
            ("deps_ordered", self.deps_ordered),
            ("no_double_booking", self.no_double_booking),
            ("terminator_last", self.terminator_last),
        ]
    }
}

pub fn verify_schedule(schedule: &BlockSchedule) -> ScheduleCert {
    ScheduleCert {
        all_placed: verify_all_placed(schedule),
        deps_ordered: verify_deps_ordered(schedule),
        no_double_booking: verify_no_double_booking(schedule),
        terminator_last: verify_terminator_last(schedule),
    }
}

fn verify_all_placed(schedule: &BlockSchedule) -> bool {
    schedule.block.ops.iter().all(|op| {
        op.wire_only
            || matches!(op.kind, OpKind::Phi { .. })
            || schedule.placements.contains_key(&op.id)
    })
}

fn verify_deps_ordered(schedule: &BlockSchedule) -> bool {
    schedule.placements.iter().all(|(id, p)| {
        schedule
            .dependencies(*id)
            .iter()
            .all(|dep| schedule.cycle_of(*dep).is_some_and(|c| c < p.cycle))
    })
}

fn verify_no_double_booking(schedule: &BlockSchedule) -> bool {
    let streams: HashMap<ResourceId, usize> = schedule
        .units
        .iter()
        .map(|u| (u.id(), u.streams()))
        .collect();
    let mut cells = HashSet::new();
    schedule.placements.values().all(|p| {
        streams.get(&p.resource).is_some_and(|&n| p.stream < n)
            && cells.insert((p.resource, p.cycle, p.stream))
    })
}

fn verify_terminator_last(schedule: &BlockSchedule) -> bool {
    match schedule.terminator.and_then(|t| schedule.cycle_of(t)) {
        Some(cycle) => cycle + 1 == schedule.length(),
        None => schedule.terminator.is_none(),
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for BlockSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "block '{}' ({} cycles)", self.block.name, self.length())?;
        for cycle in 0..self.length() {
            writeln!(f, "  cycle {cycle}:")?;
            for id in self.operations_at(cycle) {
                let Some(p) = self.placement_of(id) else {
                    continue;
                };
                writeln!(
                    f,
                    "    {:<10} s{}  {}",
                    self.resource_label(p.resource),
                    p.stream,
                    self.block.render_op(id)
                )?;
            }
        }
        if !self.inlined.is_empty() {
            let names: Vec<String> = self.inlined.iter().map(|id| self.block.label(*id)).collect();
            writeln!(f, "  inlined: {}", names.join(", "))?;
        }
        for access in &self.pipelined {
            writeln!(
                f,
                "  pipelined: {} -> {} ({:+})",
                self.block.label(access.original),
                self.block.label(access.prefetch),
                access.offset
            )?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::ir::BinOp;
    use crate::pass::StageCert;

    fn bin(bin: BinOp, lhs: Operand, rhs: Operand) -> OpKind {
        OpKind::Binary { bin, lhs, rhs }
    }

    fn input(name: &str) -> Operand {
        Operand::input(name)
    }

    fn run(block: Block, config: &SynthConfig, ivs: &[&str], ports: &MemportMap) -> ScheduleResult {
        let induction: InductionSet = ivs.iter().copied().collect();
        let ctx = ScheduleContext {
            induction: &induction,
            ports,
            config,
        };
        schedule_block(block, ctx, &mut NullSink).expect("scheduling failed")
    }

    fn one_each() -> SynthConfig {
        SynthConfig::empty()
            .with_unit("add", 1)
            .with_unit("mul", 1)
            .with_unit("mem", 1)
            .with_unit("control", 1)
    }

    #[test]
    fn dependent_chain_takes_one_cycle_per_step() {
        let mut bb = Block::new("entry");
        let t1 = bb.push("t1", 32, bin(BinOp::Add, input("a"), input("b")));
        let t2 = bb.push("t2", 32, bin(BinOp::Mul, Operand::Op(t1), input("c")));
        let st = bb.push(
            "",
            32,
            OpKind::Store {
                value: Operand::Op(t2),
                addr: input("ptr"),
            },
        );
        let result = run(bb, &one_each(), &[], &MemportMap::new());
        let s = &result.schedule;
        assert_eq!(s.length(), 3);
        assert_eq!(s.operations_at(0), vec![t1]);
        assert_eq!(s.operations_at(1), vec![t2]);
        assert_eq!(s.operations_at(2), vec![st]);
        assert_eq!(s.resource_label(s.resource_of(t2).unwrap()), "mul#0");
        assert!(verify_schedule(s).all_pass());
    }

    #[test]
    fn wire_only_producers_are_looked_through() {
        let mut bb = Block::new("b");
        let t1 = bb.push("t1", 32, bin(BinOp::Add, input("a"), input("b")));
        let w = bb.push_wire("w", 32, bin(BinOp::Shl, Operand::Op(t1), Operand::constant(1, 32)));
        let t2 = bb.push("t2", 32, bin(BinOp::Add, Operand::Op(w), input("c")));
        let result = run(bb, &one_each(), &[], &MemportMap::new());
        let s = &result.schedule;
        assert_eq!(s.dependencies(t2), &[t1]);
        assert_eq!(s.cycle_of(t2), Some(1));
        assert_eq!(s.inlined(), &[w]);
        assert_eq!(s.cycle_of(w), None);
    }

    #[test]
    fn phi_is_neither_placed_nor_a_dependency() {
        let mut bb = Block::new("loop");
        let i = bb.push(
            "i",
            32,
            OpKind::Phi {
                incoming: vec![crate::ir::PhiIncoming {
                    block: "entry".into(),
                    value: Operand::constant(0, 32),
                }],
            },
        );
        let t = bb.push("t", 32, bin(BinOp::Add, Operand::Op(i), Operand::constant(1, 32)));
        let result = run(bb, &one_each(), &[], &MemportMap::new());
        assert_eq!(result.schedule.cycle_of(t), Some(0));
        assert_eq!(result.schedule.inlined(), &[i]);
    }

    #[test]
    fn missing_unit_is_fatal() {
        let mut bb = Block::new("b");
        bb.push("t", 32, bin(BinOp::SRem, input("a"), input("b")));
        let config = one_each();
        let induction = InductionSet::new();
        let ports = MemportMap::new();
        let ctx = ScheduleContext {
            induction: &induction,
            ports: &ports,
            config: &config,
        };
        let err = schedule_block(bb, ctx, &mut NullSink).unwrap_err();
        assert_eq!(
            err,
            SchedError::NoResourceForOpcode {
                block: "b".into(),
                op: OpId(0),
                opcode: "rem".into()
            }
        );
        assert_eq!(err.to_diagnostic().code, Some(codes::E0200));
    }

    #[test]
    fn state_machine_rejects_out_of_order_calls() {
        let config = one_each();
        let induction = InductionSet::new();
        let ports = MemportMap::new();
        let ctx = ScheduleContext {
            induction: &induction,
            ports: &ports,
            config: &config,
        };
        let mut sched = ListScheduler::new(Block::new("b"), ctx);
        assert_eq!(sched.state(), SchedState::Unscheduled);
        assert!(matches!(
            sched.run(&mut NullSink),
            Err(SchedError::InvalidState { .. })
        ));
        sched.build_ready_queue(&mut NullSink).unwrap();
        assert_eq!(sched.state(), SchedState::ReadyQueueBuilt);
        assert!(sched.finalize().is_err());
        sched.run(&mut NullSink).unwrap();
        assert_eq!(sched.state(), SchedState::Scheduling);
        let result = sched.finalize().unwrap();
        assert_eq!(sched.state(), SchedState::Finalized);
        assert_eq!(result.schedule.length(), 0);
    }

    #[test]
    fn terminator_goes_last() {
        let mut bb = Block::new("b");
        let t1 = bb.push("t1", 32, bin(BinOp::Add, input("a"), input("b")));
        let t2 = bb.push("t2", 32, bin(BinOp::Mul, Operand::Op(t1), input("c")));
        let br = bb.push(
            "",
            1,
            OpKind::Branch {
                cond: None,
                targets: vec!["exit".into()],
            },
        );
        let result = run(bb, &one_each(), &[], &MemportMap::new());
        let s = &result.schedule;
        assert_eq!(s.cycle_of(br), s.cycle_of(t2));
        assert_eq!(s.terminator(), Some(br));
        assert!(verify_schedule(s).terminator_last);
    }

    #[test]
    fn load_after_store_on_same_port_waits() {
        let mut ports = MemportMap::new();
        ports.insert("A".into(), 32);
        let mut bb = Block::new("b");
        let st = bb.push(
            "",
            32,
            OpKind::Store {
                value: input("x"),
                addr: input("A"),
            },
        );
        let ld = bb.push("v", 32, OpKind::Load { addr: input("A") });
        let config = SynthConfig::empty().with_unit("mem", 2);
        let result = run(bb, &config, &[], &ports);
        let s = &result.schedule;
        assert_eq!(s.dependencies(ld), &[st]);
        assert_eq!(s.cycle_of(ld), Some(1));
        assert_eq!(s.unit_name(s.resource_of(ld).unwrap().type_id), Some("mem_A"));
    }

    fn subscript_loop(index_bin: Option<BinOp>) -> (Block, OpId) {
        let mut bb = Block::new("body");
        let index = match index_bin {
            Some(b) => Operand::Op(bb.push_wire("idx", 32, bin(b, input("i"), Operand::constant(2, 32)))),
            None => input("i"),
        };
        let p = bb.push_wire(
            "p",
            32,
            OpKind::Index {
                base: input("A"),
                index,
            },
        );
        let v = bb.push("v", 32, OpKind::Load { addr: Operand::Op(p) });
        bb.push("s", 32, bin(BinOp::Add, Operand::Op(v), input("acc")));
        (bb, v)
    }

    #[test]
    fn induction_load_gets_prefetch_on_follow_on_stream() {
        let mut ports = MemportMap::new();
        ports.insert("A".into(), 32);
        let (bb, v) = subscript_loop(Some(BinOp::Add));
        let config = SynthConfig::empty().with_unit("mem", 1).with_unit("add", 1);
        let result = run(bb, &config, &["i"], &ports);
        let s = &result.schedule;

        assert_eq!(s.pipelined_accesses().len(), 1);
        let access = &s.pipelined_accesses()[0];
        assert_eq!(access.original, v);
        let prefetch = s.placement_of(access.prefetch).unwrap();
        assert_eq!(prefetch.cycle, 0);
        assert_eq!(prefetch.stream, 1);
        assert_eq!(s.block().label(access.prefetch), "v.next");

        let analyzer_set: InductionSet = ["i"].into_iter().collect();
        let analyzer = SubscriptAnalyzer::new(&analyzer_set);
        let env = BTreeMap::from([("i".to_string(), 5)]);
        assert_eq!(analyzer.effective_index(s.block(), v, &env), Some(7));
        assert_eq!(analyzer.effective_index(s.block(), access.prefetch, &env), Some(8));
        assert!(verify_schedule(s).all_pass());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn bare_counter_prefetch_splices_offset_add() {
        let (bb, _) = subscript_loop(None);
        let config = SynthConfig::empty().with_unit("mem", 1).with_unit("add", 1);
        let result = run(bb, &config, &["i"], &MemportMap::new());
        let s = &result.schedule;
        let access = &s.pipelined_accesses()[0];
        assert_eq!(s.block().render_op(access.prefetch), "v.next = load p.next");
        assert!(s.block().clone().validate().is_ok());
    }

    #[test]
    fn unsupported_index_is_left_unpipelined() {
        let (bb, v) = subscript_loop(Some(BinOp::Mul));
        let config = SynthConfig::empty().with_unit("mem", 1).with_unit("add", 1);
        let mut events = Vec::new();
        let induction: InductionSet = ["i"].into_iter().collect();
        let ports = MemportMap::new();
        let ctx = ScheduleContext {
            induction: &induction,
            ports: &ports,
            config: &config,
        };
        let result = schedule_block(bb, ctx, &mut events).unwrap();
        assert!(result.schedule.pipelined_accesses().is_empty());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, Some(codes::W0100));
        assert_eq!(result.schedule.cycle_of(v), Some(0));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::PipeliningSkipped { op, .. } if *op == v)));
    }

    #[test]
    fn pipelining_can_be_disabled() {
        let (bb, _) = subscript_loop(Some(BinOp::Add));
        let config = SynthConfig::empty()
            .with_unit("mem", 1)
            .with_unit("add", 1)
            .without_pipelining();
        let result = run(bb, &config, &["i"], &MemportMap::new());
        assert!(result.schedule.pipelined_accesses().is_empty());
        assert_eq!(result.schedule.block().len(), 4);
    }

    #[test]
    fn usage_and_assignments() {
        let mut bb = Block::new("b");
        let t1 = bb.push("t1", 32, bin(BinOp::Add, input("a"), input("b")));
        let t2 = bb.push("t2", 32, bin(BinOp::Add, input("c"), input("d")));
        let t3 = bb.push("t3", 32, bin(BinOp::Add, Operand::Op(t1), Operand::Op(t2)));
        let config = SynthConfig::empty().with_unit("add", 2);
        let result = run(bb, &config, &[], &MemportMap::new());
        let s = &result.schedule;
        assert_eq!(s.max_resource_usage("add"), 2);
        assert_eq!(s.max_resource_usage("mul"), 0);
        let add0 = s.resource_of(t1).unwrap();
        assert_eq!(add0.instance, 0);
        // Both adders hold one op when t3 is placed; the first instance wins.
        assert_eq!(s.resource_of(t3), Some(add0));
        assert_eq!(s.assignments(add0), vec![(0, t1), (1, t3)]);
        assert_eq!(s.resource_of(t2).map(|r| r.instance), Some(1));
    }

    #[test]
    fn display_table() {
        let mut bb = Block::new("entry");
        let t1 = bb.push("t1", 32, bin(BinOp::Add, input("a"), input("b")));
        bb.push("t2", 32, bin(BinOp::Mul, Operand::Op(t1), input("c")));
        let result = run(bb, &one_each(), &[], &MemportMap::new());
        insta::assert_snapshot!(result.schedule.to_string(), @r"
        block 'entry' (2 cycles)
          cycle 0:
            add#0      s0  t1 = add a, b
          cycle 1:
            mul#0      s0  t2 = mul t1, c
        ");
    }
}
