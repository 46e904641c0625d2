use clap::Parser;
use std::path::PathBuf;

use hlsc::config::SynthConfig;
use hlsc::events::LogSink;
use hlsc::ir::Function;
use hlsc::pass::PassId;
use hlsc::pipeline::{
    compute_provenance, render_schedule, run_pipeline, CompilationState, CompileOptions,
};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    /// Per-block cycle tables
    Schedule,
    /// Induction-indexed loads and stores per block
    Subscripts,
    /// Mermaid Gantt chart of resource occupancy
    Gantt,
    /// FSM state encoding
    States,
    /// Source, configuration and schedule hashes as JSON
    BuildInfo,
}

impl EmitStage {
    fn terminal_pass(self) -> PassId {
        match self {
            EmitStage::Subscripts => PassId::DetectSubscripts,
            EmitStage::Schedule | EmitStage::Gantt | EmitStage::States | EmitStage::BuildInfo => {
                PassId::Verify
            }
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "hlsc",
    version,
    about = "HLS basic-block scheduler: places SSA operations on hardware units cycle by cycle"
)]
struct Cli {
    /// Input function (JSON)
    source: PathBuf,

    /// Synthesis configuration (JSON); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file path; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Schedule)]
    emit: EmitStage,

    /// Worker threads for block scheduling
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Disable read-ahead pipelining of subscript loads
    #[arg(long)]
    no_pipelining: bool,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: log::LevelFilter,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(cli.log_level)
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("source = {}", cli.source.display());
    log::info!("emit   = {:?}", cli.emit);

    // ── Load configuration ──
    let mut config = match &cli.config {
        Some(path) => match SynthConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("hlsc: error: {}", e);
                std::process::exit(2);
            }
        },
        None => SynthConfig::default(),
    };
    if cli.no_pipelining {
        config = config.without_pipelining();
    }

    // ── Read and decode the function ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("hlsc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };
    let function: Function = match serde_json::from_str(&source) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("hlsc: error: {}: {}", cli.source.display(), e);
            std::process::exit(1);
        }
    };

    let provenance = compute_provenance(&source, &config);
    let options = CompileOptions { jobs: cli.jobs.max(1) };
    let mut state = CompilationState::new(function, config);

    let result = run_pipeline(
        &mut state,
        cli.emit.terminal_pass(),
        &options,
        &mut LogSink,
        |pass, diags| {
            log::debug!("{:?}: {} diagnostic(s)", pass, diags.len());
        },
    );

    for diag in &state.diagnostics {
        eprintln!("hlsc: {}", diag);
    }
    if let Err(e) = result {
        eprintln!("hlsc: error: {}", e);
        std::process::exit(1);
    }

    let text = match cli.emit {
        EmitStage::Subscripts => render_subscripts(&state),
        EmitStage::Schedule => state
            .schedule
            .as_ref()
            .map(render_schedule)
            .unwrap_or_default(),
        EmitStage::Gantt => state
            .schedule
            .as_ref()
            .map(hlsc::timing::emit_timing_chart)
            .unwrap_or_default(),
        EmitStage::States => state
            .schedule
            .as_ref()
            .map(|s| s.render_state_table())
            .unwrap_or_default(),
        EmitStage::BuildInfo => {
            let provenance = match &state.schedule {
                Some(s) => provenance.with_schedule(&render_schedule(s)),
                None => provenance,
            };
            provenance.to_json()
        }
    };

    match state.shutdown() {
        Ok(detached) => log::debug!("released globals, {} use(s) detached", detached),
        Err(e) => {
            eprintln!("hlsc: error: {}", e);
            std::process::exit(1);
        }
    }

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &text) {
                eprintln!("hlsc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        }
        None => print!("{}", text),
    }
}

fn render_subscripts(state: &CompilationState) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for entry in state.subscripts.iter().flatten() {
        let _ = writeln!(
            out,
            "{}: {} load(s), {} store(s)",
            entry.block,
            entry.summary.loads.len(),
            entry.summary.stores.len()
        );
        let Some(block) = state.function.blocks.iter().find(|b| b.name == entry.block) else {
            continue;
        };
        for (op, addr) in &entry.summary.loads {
            let _ = writeln!(out, "  load  {} [index {}]", block.render_op(*op), addr.index_op);
        }
        for (op, addr) in &entry.summary.stores {
            let _ = writeln!(out, "  store {} [index {}]", block.render_op(*op), addr.index_op);
        }
    }
    out
}
