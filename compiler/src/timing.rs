// timing.rs — Mermaid Gantt timing chart output for block schedules
//
// Transforms a FunctionSchedule into a Mermaid Gantt chart with one section
// per (block, resource instance). The time axis counts FSM states, so blocks
// follow one another in block order.
//
// Preconditions: `schedule` is a finished FunctionSchedule.
// Postconditions: returns a valid Mermaid Gantt chart string.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::{self, Write};

use crate::pipeline::FunctionSchedule;
use crate::schedule::BlockSchedule;

/// Emit the function schedule as a Mermaid Gantt chart string.
pub fn emit_timing_chart(schedule: &FunctionSchedule) -> String {
    let mut buf = String::new();
    let _ = write_chart(&mut buf, schedule);
    buf
}

fn write_chart(buf: &mut String, schedule: &FunctionSchedule) -> fmt::Result {
    writeln!(buf, "gantt")?;
    writeln!(buf, "    title {} Schedule", schedule.function)?;
    writeln!(buf, "    dateFormat x")?;
    writeln!(buf, "    axisFormat %Q")?;

    let mut offset = 0;
    for block in &schedule.blocks {
        write_block_sections(buf, block, offset)?;
        offset += block.length().max(1);
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// One section per resource instance that holds at least one operation.
/// Each operation spans one state starting at `offset + cycle`.
fn write_block_sections(buf: &mut String, block: &BlockSchedule, offset: usize) -> fmt::Result {
    let prefix = sanitize(block.name());
    let mut task_index = 0usize;
    for unit in block.units() {
        let assignments = unit.assignments();
        if assignments.is_empty() {
            continue;
        }
        writeln!(buf)?;
        writeln!(
            buf,
            "    section {} {}",
            block.name(),
            block.resource_label(unit.id())
        )?;
        for (cycle, op) in assignments {
            let stream = block.placement_of(op).map_or(0, |p| p.stream);
            let mut label = task_label(&block.block().label(op));
            if stream > 0 {
                label.push_str(&format!(" (s{stream})"));
            }
            let start = offset + cycle;
            writeln!(
                buf,
                "    {} :{}_{}, {}, {}",
                label,
                prefix,
                task_index,
                start,
                start + 1
            )?;
            task_index += 1;
        }
    }
    Ok(())
}

/// Mermaid Gantt uses `:` as the task/metadata separator.
fn task_label(label: &str) -> String {
    label.replace(':', "_")
}

/// Sanitize a name to valid identifier characters.
pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────────────
