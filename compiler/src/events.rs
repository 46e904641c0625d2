// events.rs — Structured analysis and scheduling events
//
// The subscript analyzer and the list scheduler report what they find and do
// through an `EventSink` supplied by the caller instead of printing. Sinks can
// collect (`Vec<Event>`), forward to the `log` facade (`LogSink`), or drop
// everything (`NullSink`).

use std::fmt;

use crate::id::{OpId, ResourceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A load or store addressed through an induction-derived index.
    SubscriptFound {
        block: String,
        op: OpId,
        store: bool,
    },
    /// An address computation was moved by `delta`. `created` names the
    /// operation spliced in when the offset could not be folded in place.
    IndexRewritten {
        block: String,
        index_op: OpId,
        delta: i64,
        created: Option<OpId>,
    },
    /// A subscript access was left unpipelined.
    PipeliningSkipped {
        block: String,
        op: OpId,
        reason: String,
    },
    InventoryBuilt {
        block: String,
        unit_types: usize,
        instances: usize,
    },
    Placed {
        block: String,
        op: OpId,
        cycle: usize,
        resource: ResourceId,
        stream: usize,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::SubscriptFound { block, op, store } => {
                let kind = if *store { "store" } else { "load" };
                write!(f, "[{block}] {kind} subscript at {op}")
            }
            Event::IndexRewritten {
                block,
                index_op,
                delta,
                created: None,
            } => write!(f, "[{block}] index of {index_op} offset by {delta} in place"),
            Event::IndexRewritten {
                block,
                index_op,
                delta,
                created: Some(new),
            } => write!(f, "[{block}] index of {index_op} offset by {delta} via {new}"),
            Event::PipeliningSkipped { block, op, reason } => {
                write!(f, "[{block}] {op} not pipelined: {reason}")
            }
            Event::InventoryBuilt {
                block,
                unit_types,
                instances,
            } => write!(
                f,
                "[{block}] inventory: {unit_types} unit type(s), {instances} instance(s)"
            ),
            Event::Placed {
                block,
                op,
                cycle,
                resource,
                stream,
            } => write!(f, "[{block}] {op} -> cycle {cycle} on {resource}/s{stream}"),
        }
    }
}

/// Receiver for structured events.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: Event) {
        (**self).emit(event);
    }
}

/// Forwards events to the `log` facade. Placements go out at trace level and
/// skipped pipelining at warn; the rest at debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: Event) {
        match event {
            Event::Placed { .. } => log::trace!("{event}"),
            Event::PipeliningSkipped { .. } => log::warn!("{event}"),
            _ => log::debug!("{event}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: Event) {}
}
