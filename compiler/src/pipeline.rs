// pipeline.rs — Compilation state, function driver, and pass orchestration
//
// Holds all pass artifacts for one function and runs the minimal set of
// passes for a given terminal PassId. Blocks are scheduled independently,
// optionally on a worker pool; output always follows block order.
//
// Preconditions: the function and configuration are set before run_pipeline.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting error-level diagnostics.
// Side effects: calls on_pass_complete after each pass; events go to the sink.

use std::time::Instant;

use rayon::prelude::*;
use thiserror::Error;

use crate::config::SynthConfig;
use crate::diag::{codes, Diagnostic};
use crate::events::{Event, EventSink};
use crate::ir::{Block, Function, MemportMap};
use crate::pass::{descriptor, required_passes, PassId, StageCert};
use crate::registry::{GlobalRegistry, RegistryError};
use crate::schedule::{schedule_block, verify_schedule, BlockSchedule, SchedError, ScheduleCert, ScheduleContext};
use crate::subscript::{InductionSet, SubscriptAnalyzer, SubscriptSummary};
use crate::timing::sanitize;

// ── Function schedule ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Worker threads for block scheduling; 1 schedules inline.
    pub jobs: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { jobs: 1 }
    }
}

/// One FSM state: a cycle of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDef {
    pub index: usize,
    pub label: String,
    pub block: String,
    pub cycle: usize,
}

/// Schedules of every block of a function, in block order.
#[derive(Debug, Clone)]
pub struct FunctionSchedule {
    pub function: String,
    pub ports: MemportMap,
    pub blocks: Vec<BlockSchedule>,
}

impl FunctionSchedule {
    pub fn block(&self, name: &str) -> Option<&BlockSchedule> {
        self.blocks.iter().find(|b| b.name() == name)
    }

    /// Every block owns at least one state so branches always have a target.
    fn states_of(block: &BlockSchedule) -> usize {
        block.length().max(1)
    }

    pub fn state_count(&self) -> usize {
        self.blocks.iter().map(Self::states_of).sum()
    }

    /// Width of the state register: `ceil(log2(states + 1))`.
    pub fn state_bits(&self) -> u32 {
        let states = self.state_count() as u64 + 1;
        (u64::BITS - (states - 1).leading_zeros()).max(1)
    }

    pub fn state_table(&self) -> Vec<StateDef> {
        let mut table = Vec::with_capacity(self.state_count());
        for block in &self.blocks {
            for cycle in 0..Self::states_of(block) {
                table.push(StateDef {
                    index: table.len(),
                    label: format!("{}{}", sanitize(block.name()), cycle),
                    block: block.name().to_string(),
                    cycle,
                });
            }
        }
        table
    }

    /// Text rendering of the state table, one parameter per line.
    pub fn render_state_table(&self) -> String {
        use std::fmt::Write;
        let bits = self.state_bits();
        let mut out = String::new();
        let _ = writeln!(out, "// states: {}, state bits: {}", self.state_count(), bits);
        for state in self.state_table() {
            let _ = writeln!(out, "parameter {} = {}'d{};", state.label, bits, state.index);
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Schedule(#[from] SchedError),
    #[error("cannot start scheduling workers: {0}")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

/// Schedule every block of `func`. Events are buffered per block and
/// replayed into `sink` in block order, so output does not depend on `jobs`.
pub fn schedule_function(
    func: &Function,
    config: &SynthConfig,
    options: &CompileOptions,
    sink: &mut dyn EventSink,
) -> Result<(FunctionSchedule, Vec<Diagnostic>), DriverError> {
    let induction: InductionSet = func.induction_vars.iter().cloned().collect();
    let ports = func.memory_ports();
    let ctx = ScheduleContext {
        induction: &induction,
        ports: &ports,
        config,
    };
    let run_block = move |block: &Block| {
        let mut events: Vec<Event> = Vec::new();
        let result = schedule_block(block.clone(), ctx, &mut events);
        (result, events)
    };

    let outcomes: Vec<_> = if options.jobs > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs)
            .build()?;
        pool.install(|| func.blocks.par_iter().map(run_block).collect())
    } else {
        func.blocks.iter().map(run_block).collect()
    };

    let mut blocks = Vec::with_capacity(outcomes.len());
    let mut diagnostics = Vec::new();
    for (result, events) in outcomes {
        for event in events {
            sink.emit(event);
        }
        let result = result?;
        diagnostics.extend(result.diagnostics);
        blocks.push(result.schedule);
    }
    log::debug!(
        "scheduled {} block(s) of '{}' with {} job(s)",
        blocks.len(),
        func.name,
        options.jobs
    );

    Ok((
        FunctionSchedule {
            function: func.name.clone(),
            ports,
            blocks,
        },
        diagnostics,
    ))
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible builds and cache-key use.
///
/// `source_hash`: SHA-256 of the raw input text.
/// `config_fingerprint`: SHA-256 of the canonical compact JSON configuration.
/// `schedule_hash`: SHA-256 of the rendered schedule, once it exists.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub config_fingerprint: [u8; 32],
    pub schedule_hash: Option<[u8; 32]>,
    pub compiler_version: &'static str,
}

impl Provenance {
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    pub fn config_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.config_fingerprint)
    }

    /// Record the hash of a rendered schedule.
    pub fn with_schedule(mut self, rendered: &str) -> Self {
        self.schedule_hash = Some(sha256(rendered));
        self
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        let schedule = match &self.schedule_hash {
            Some(hash) => format!("\"{}\"", bytes_to_hex(hash)),
            None => "null".to_string(),
        };
        format!(
            "{{\n  \"source_hash\": \"{}\",\n  \"config_fingerprint\": \"{}\",\n  \"schedule_hash\": {},\n  \"compiler_version\": \"{}\"\n}}\n",
            self.source_hash_hex(),
            self.config_fingerprint_hex(),
            schedule,
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from the input text and configuration.
pub fn compute_provenance(source: &str, config: &SynthConfig) -> Provenance {
    Provenance {
        source_hash: sha256(source),
        config_fingerprint: sha256(&config.to_canonical_json()),
        schedule_hash: None,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

/// Render every block schedule in order; the basis of `schedule_hash`.
pub fn render_schedule(schedule: &FunctionSchedule) -> String {
    schedule
        .blocks
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Compilation state ──────────────────────────────────────────────────────

/// Subscript accesses of one block.
#[derive(Debug, Clone)]
pub struct BlockSubscripts {
    pub block: String,
    pub summary: SubscriptSummary,
}

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub function: Function,
    pub config: SynthConfig,
    pub registry: GlobalRegistry,
    pub ports: Option<MemportMap>,
    pub subscripts: Option<Vec<BlockSubscripts>>,
    pub schedule: Option<FunctionSchedule>,
    pub certs: Option<Vec<ScheduleCert>>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn new(function: Function, config: SynthConfig) -> Self {
        Self {
            function,
            config,
            registry: GlobalRegistry::new(),
            ports: None,
            subscripts: None,
            schedule: None,
            certs: None,
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }

    /// Two-phase teardown of the global registry: every use of a global in
    /// the function is rewired to zero, then the entries are released.
    pub fn shutdown(&mut self) -> Result<usize, RegistryError> {
        let detached = self.registry.detach_users(&mut self.function.blocks)?;
        self.registry.release()?;
        Ok(detached)
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug, Error)]
#[error("pass {failing_pass:?} failed")]
pub struct PipelineError {
    pub failing_pass: PassId,
}

fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    started: Instant,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = diags.iter().any(Diagnostic::is_error);
    state.diagnostics.extend(diags);
    log::debug!(
        "{} complete, {:.1}ms",
        descriptor(pass_id).name,
        started.elapsed().as_secs_f64() * 1000.0
    );
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → log → error check.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &CompileOptions,
    sink: &mut dyn EventSink,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let started = Instant::now();
        let diags = match pass_id {
            PassId::Validate => run_validate(state),
            PassId::DetectSubscripts => {
                let induction: InductionSet =
                    state.function.induction_vars.iter().cloned().collect();
                let analyzer = SubscriptAnalyzer::new(&induction);
                let found = state
                    .function
                    .blocks
                    .iter()
                    .map(|block| BlockSubscripts {
                        block: block.name.clone(),
                        summary: analyzer.detect(block, sink),
                    })
                    .collect();
                state.subscripts = Some(found);
                Vec::new()
            }
            PassId::Schedule => {
                match schedule_function(&state.function, &state.config, options, sink) {
                    Ok((schedule, diags)) => {
                        state.schedule = Some(schedule);
                        diags
                    }
                    Err(DriverError::Schedule(err)) => vec![err.to_diagnostic()],
                    Err(err @ DriverError::Workers(_)) => {
                        vec![Diagnostic::error(codes::E0300, err.to_string())]
                    }
                }
            }
            PassId::Verify => {
                let certs: Vec<ScheduleCert> = state
                    .schedule
                    .iter()
                    .flat_map(|s| s.blocks.iter())
                    .map(verify_schedule)
                    .collect();
                let diags = state
                    .schedule
                    .iter()
                    .flat_map(|s| s.blocks.iter())
                    .zip(&certs)
                    .filter(|(_, cert)| !cert.all_pass())
                    .map(|(block, cert)| {
                        Diagnostic::error(
                            codes::E0301,
                            format!("schedule verification failed: {}", cert.failed().join(", ")),
                        )
                        .at(block.name(), None)
                    })
                    .collect();
                state.certs = Some(certs);
                diags
            }
        };
        finish_pass(state, pass_id, diags, started, &mut on_pass_complete)?;
    }
    Ok(())
}

fn run_validate(state: &mut CompilationState) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    if let Err(err) = state.function.validate() {
        diags.push(Diagnostic::error(codes::E0300, err.to_string()));
        return diags;
    }
    for global in &state.function.globals {
        if let Err(err) = state.registry.get_or_create(&global.name, global.ty) {
            diags.push(Diagnostic::error(codes::E0400, err.to_string()));
        }
    }
    state.ports = Some(state.function.memory_ports());
    diags
}

// ── Tests ──────────────────────────────────────────────────────────────────
