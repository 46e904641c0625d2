// pass.rs — Pass descriptor module: metadata, dependency resolution, certificates
//
// Declares the scheduler's passes, their dependency edges, and the artifacts
// they produce. Used by the pipeline runner to compute minimal pass subsets
// for each --emit target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Validate,
    DetectSubscripts,
    Schedule,
    Verify,
}

/// Machine-readable artifact identifiers. Each maps to a field of the
/// compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Globals,    // GlobalRegistry entries
    Ports,      // MemportMap
    Subscripts, // Vec<BlockSubscripts>
    Schedule,   // FunctionSchedule
    Certs,      // Vec<ScheduleCert>
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/log output.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Validate => PassDescriptor {
            name: "validate",
            inputs: &[],
            outputs: &[ArtifactId::Globals, ArtifactId::Ports],
            invariants: "ids match arena slots, operands defined before use, terminator last",
        },
        PassId::DetectSubscripts => PassDescriptor {
            name: "detect_subscripts",
            inputs: &[PassId::Validate],
            outputs: &[ArtifactId::Subscripts],
            invariants: "every access listed is induction-indexed",
        },
        PassId::Schedule => PassDescriptor {
            name: "schedule",
            inputs: &[PassId::Validate],
            outputs: &[ArtifactId::Schedule],
            invariants: "every non-inlined operation placed",
        },
        PassId::Verify => PassDescriptor {
            name: "verify",
            inputs: &[PassId::Schedule],
            outputs: &[ArtifactId::Certs],
            invariants: "dependency order, no double booking, terminator last",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 4] = [
    PassId::Validate,
    PassId::DetectSubscripts,
    PassId::Schedule,
    PassId::Verify,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Certificates ───────────────────────────────────────────────────────────

/// Machine-checkable evidence that a stage met its postconditions.
pub trait StageCert {
    fn all_pass(&self) -> bool;

    /// Named obligations and whether each holds.
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    /// Names of the obligations that do not hold.
    fn failed(&self) -> Vec<&'static str> {
        self.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
