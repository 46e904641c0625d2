// resource.rs — Hardware execution unit instances and their occupancy tables
//
// A `ResourceUnit` is one instance of a hardware unit type (an adder, a memory
// port). Its table is indexed by stream × cycle; stream 0 is the primary
// issue slot, higher streams carry pipelined follow-on accesses. Cells are
// never overwritten and the table only grows.
//
// Preconditions: callers check `best_scheduling_cycle` before `place`.
// Postconditions: every occupied cell holds exactly one operation.
// Failure modes: `PlaceError::SlotOccupied` on a contract violation.
// Side effects: none.

use std::fmt;
use std::ops::Range;

use thiserror::Error;

use crate::id::{OpId, ResourceId};

/// Issue streams per instance: one primary, one follow-on.
pub const DEFAULT_STREAMS: usize = 2;

/// Which streams an operation may occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueClass {
    /// Ordinary operation: stream 0 only.
    Primary,
    /// Pipelined prefetch: any stream.
    FollowOn,
}

impl IssueClass {
    fn streams(self, available: usize) -> Range<usize> {
        match self {
            IssueClass::Primary => 0..available.min(1),
            IssueClass::FollowOn => 0..available,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaceError {
    #[error("{unit} ({id}) has no free {class:?} stream at cycle {cycle}")]
    SlotOccupied {
        unit: String,
        id: ResourceId,
        cycle: usize,
        class: IssueClass,
    },
}

#[derive(Debug, Clone)]
pub struct ResourceUnit {
    name: String,
    id: ResourceId,
    /// `table[stream][cycle]`; all streams have equal length.
    table: Vec<Vec<Option<OpId>>>,
}

impl ResourceUnit {
    pub fn new(name: impl Into<String>, id: ResourceId, streams: usize) -> Self {
        ResourceUnit {
            name: name.into(),
            id,
            table: vec![Vec::new(); streams.max(1)],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn streams(&self) -> usize {
        self.table.len()
    }

    /// True if operations of hardware opcode `opcode` execute on this unit.
    pub fn capability_matches(&self, opcode: &str) -> bool {
        self.name == opcode
    }

    fn empty_at(&self, stream: usize, cycle: usize) -> bool {
        self.table[stream].get(cycle).map_or(true, Option::is_none)
    }

    fn free_stream(&self, cycle: usize, class: IssueClass) -> Option<usize> {
        class
            .streams(self.streams())
            .find(|&s| self.empty_at(s, cycle))
    }

    /// Earliest cycle at or after `ready` with a stream usable by `class`.
    pub fn best_scheduling_cycle(&self, ready: usize, class: IssueClass) -> usize {
        (ready..)
            .find(|&cycle| self.free_stream(cycle, class).is_some())
            .unwrap_or(ready)
    }

    fn enlarge(&mut self, len: usize) {
        for stream in &mut self.table {
            if stream.len() < len {
                stream.resize(len, None);
            }
        }
    }

    /// Book `op` at `cycle` on the first free stream usable by `class`.
    /// Returns the stream index.
    pub fn place(&mut self, op: OpId, cycle: usize, class: IssueClass) -> Result<usize, PlaceError> {
        let stream = self
            .free_stream(cycle, class)
            .ok_or_else(|| PlaceError::SlotOccupied {
                unit: self.name.clone(),
                id: self.id,
                cycle,
                class,
            })?;
        self.enlarge(cycle + 1);
        self.table[stream][cycle] = Some(op);
        Ok(stream)
    }

    /// Number of cycles covered by the table.
    pub fn length(&self) -> usize {
        self.table.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn taken_slots(&self) -> usize {
        self.table
            .iter()
            .map(|s| s.iter().filter(|c| c.is_some()).count())
            .sum()
    }

    pub fn has_operation(&self, op: OpId) -> bool {
        self.placement_of(op).is_some()
    }

    /// `(cycle, stream)` of `op` on this unit.
    pub fn placement_of(&self, op: OpId) -> Option<(usize, usize)> {
        self.table.iter().enumerate().find_map(|(stream, cells)| {
            cells
                .iter()
                .position(|c| *c == Some(op))
                .map(|cycle| (cycle, stream))
        })
    }

    /// Operations occupying `cycle`, in stream order.
    pub fn operations_at(&self, cycle: usize) -> Vec<OpId> {
        self.table
            .iter()
            .filter_map(|cells| cells.get(cycle).copied().flatten())
            .collect()
    }

    /// Every `(cycle, op)` booked on this unit, in cycle then stream order.
    pub fn assignments(&self) -> Vec<(usize, OpId)> {
        (0..self.length())
            .flat_map(|cycle| {
                self.operations_at(cycle)
                    .into_iter()
                    .map(move |op| (cycle, op))
            })
            .collect()
    }
}

/// The candidate with the fewest booked slots; first wins ties.
pub fn least_busy_resource<'u, I>(candidates: I) -> Option<&'u ResourceUnit>
where
    I: IntoIterator<Item = &'u ResourceUnit>,
{
    candidates.into_iter().min_by_key(|u| u.taken_slots())
}

/// ASCII occupancy image, one row per stream.
impl fmt::Display for ResourceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} ({} cycles)", self.name, self.id, self.length())?;
        for (stream, cells) in self.table.iter().enumerate() {
            write!(f, "  s{stream}:")?;
            for cycle in 0..self.length() {
                match cells.get(cycle).copied().flatten() {
                    Some(op) => write!(f, " {:>4}", op.to_string())?,
                    None => write!(f, " {:>4}", ".")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TypeId;

    fn unit(name: &str, instance: u32) -> ResourceUnit {
        ResourceUnit::new(
            name,
            ResourceId {
                type_id: TypeId(0),
                instance,
            },
            DEFAULT_STREAMS,
        )
    }

    #[test]
    fn capability_is_name_equality() {
        let u = unit("add", 0);
        assert!(u.capability_matches("add"));
        assert!(!u.capability_matches("mul"));
    }

    #[test]
    fn primary_ops_serialize_on_stream_zero() {
        let mut u = unit("add", 0);
        assert_eq!(u.best_scheduling_cycle(0, IssueClass::Primary), 0);
        assert_eq!(u.place(OpId(0), 0, IssueClass::Primary), Ok(0));
        assert_eq!(u.best_scheduling_cycle(0, IssueClass::Primary), 1);
        assert_eq!(u.place(OpId(1), 1, IssueClass::Primary), Ok(0));
        assert_eq!(u.length(), 2);
    }

    #[test]
    fn follow_on_uses_second_stream() {
        let mut u = unit("mem", 0);
        u.place(OpId(0), 0, IssueClass::Primary).unwrap();
        assert_eq!(u.best_scheduling_cycle(0, IssueClass::FollowOn), 0);
        assert_eq!(u.place(OpId(1), 0, IssueClass::FollowOn), Ok(1));
        assert_eq!(u.best_scheduling_cycle(0, IssueClass::FollowOn), 1);
        assert_eq!(u.operations_at(0), vec![OpId(0), OpId(1)]);
    }

    #[test]
    fn occupied_slot_is_rejected() {
        let mut u = unit("add", 0);
        u.place(OpId(0), 3, IssueClass::Primary).unwrap();
        let err = u.place(OpId(1), 3, IssueClass::Primary).unwrap_err();
        assert!(matches!(err, PlaceError::SlotOccupied { cycle: 3, .. }));
        assert_eq!(u.taken_slots(), 1);
    }

    #[test]
    fn table_grows_on_demand() {
        let mut u = unit("add", 0);
        assert_eq!(u.length(), 0);
        u.place(OpId(7), 5, IssueClass::Primary).unwrap();
        assert_eq!(u.length(), 6);
        assert!(u.has_operation(OpId(7)));
        assert_eq!(u.placement_of(OpId(7)), Some((5, 0)));
        assert_eq!(u.best_scheduling_cycle(2, IssueClass::Primary), 2);
        assert_eq!(u.assignments(), vec![(5, OpId(7))]);
    }

    #[test]
    fn least_busy_prefers_first_on_tie() {
        let mut a = unit("add", 0);
        let b = unit("add", 1);
        let c = unit("add", 2);
        assert_eq!(least_busy_resource([&a, &b, &c]).map(|u| u.id().instance), Some(0));
        a.place(OpId(0), 0, IssueClass::Primary).unwrap();
        assert_eq!(least_busy_resource([&a, &b, &c]).map(|u| u.id().instance), Some(1));
        assert!(least_busy_resource(std::iter::empty()).is_none());
    }

    #[test]
    fn ascii_image() {
        let mut u = unit("mul", 1);
        u.place(OpId(2), 1, IssueClass::Primary).unwrap();
        let text = u.to_string();
        assert_eq!(text, "mul t0#1 (2 cycles)\n  s0:    .   %2\n  s1:    .    .\n");
    }
}
