//! Stratsim - strategy document simulation CLI
//!
//! The `stratsim` command drafts a strategy document from local materials
//! with the deterministic heuristic engine and writes every run artifact to
//! disk.
//!
//! ## Commands
//!
//! - `run`: chunk materials, run the simulation, print the ranking
//! - `replay`: print a recorded run's event log in order

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use stratsim_core::agent::profiles::{knowledge_base_scopes, KNOWLEDGE_BASE_FOLDERS};
use stratsim_core::evidence::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use stratsim_core::{
    chunk_text, EngineConfig, FsRunStore, HeuristicGenerator, JsonlEventSink, KnowledgeBatch,
    Orchestrator, OutputType, ProjectBrief, RunInputs, RunState, RunStatus, SimulationConfig,
};

#[derive(Parser)]
#[command(name = "stratsim")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-agent strategy document simulation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation over local materials
    Run(RunArgs),

    /// Print a recorded run's events in event-id order
    Replay {
        /// Output directory the run was written to
        #[arg(long, default_value = "stratsim-out")]
        out: PathBuf,

        /// Run ID to replay
        #[arg(long)]
        run: String,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Directory of internal reference materials (.md / .txt)
    #[arg(long)]
    materials: Option<PathBuf>,

    /// Knowledge-base root; each known subfolder (public, government,
    /// gov_mof, cd, ren, ...) is ingested with its own scopes
    #[arg(long)]
    knowledge_base: Option<PathBuf>,

    /// Directory of project uploads (.md / .txt)
    #[arg(long)]
    uploads: Option<PathBuf>,

    /// TOML file with [simulation], [engine] and [brief] tables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project identifier recorded on the run
    #[arg(long, env = "STRATSIM_PROJECT_ID", default_value = "local")]
    project_id: String,

    #[arg(long, env = "STRATSIM_NUM_SIMULATIONS")]
    num_simulations: Option<u32>,

    #[arg(long, env = "STRATSIM_MAX_ROUNDS")]
    max_rounds: Option<u32>,

    #[arg(long, env = "STRATSIM_TOP_CANDIDATES")]
    top_candidates: Option<u32>,

    /// cosop, pcn or pdr
    #[arg(long, env = "STRATSIM_OUTPUT_TYPE")]
    output_type: Option<OutputType>,

    /// Maximum candidates in flight at once
    #[arg(long, env = "STRATSIM_WORKERS")]
    workers: Option<usize>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    country: Option<String>,

    /// Free-text notes passed to every agent turn
    #[arg(long)]
    notes: Option<String>,

    /// Reviewer word threshold for the heuristic engine
    #[arg(long)]
    min_words: Option<usize>,

    /// Output directory for run files
    #[arg(long, env = "STRATSIM_OUT", default_value = "stratsim-out")]
    out: PathBuf,

    /// Print the final run state as JSON instead of a ranking table
    #[arg(long)]
    print_state: bool,
}

/// On-disk configuration file. Every table is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    simulation: SimulationConfig,
    engine: EngineConfig,
    brief: ProjectBrief,
}

impl FileConfig {
    fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Flags and environment take precedence over the file.
    fn apply(&mut self, args: &RunArgs) {
        if let Some(n) = args.num_simulations {
            self.simulation.num_simulations = n;
        }
        if let Some(n) = args.max_rounds {
            self.simulation.max_rounds = n;
        }
        if let Some(n) = args.top_candidates {
            self.simulation.top_candidates = n;
        }
        if let Some(t) = args.output_type {
            self.simulation.output_type = t;
        }
        if let Some(w) = args.workers {
            self.engine.worker_capacity = w;
        }
        if args.title.is_some() {
            self.brief.title = args.title.clone();
        }
        if args.country.is_some() {
            self.brief.country = args.country.clone();
        }
        if let Some(notes) = &args.notes {
            self.brief.user_notes = notes.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    stratsim_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Replay { out, run } => cmd_replay(&out, &run),
    }
}

/// Read every `.md` / `.txt` file under `dir` (sorted by name) and chunk it.
///
/// Chunks are named `<file>#<n>`.
fn load_chunks(dir: &Path) -> Result<Vec<(String, String)>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("md") | Some("txt")
                )
        })
        .collect();
    files.sort();

    let mut chunks = Vec::new();
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let pieces = chunk_text(&text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP);
        if pieces.is_empty() {
            warn!(file = %path.display(), "skipping empty file");
            continue;
        }
        chunks.extend(
            pieces
                .into_iter()
                .enumerate()
                .map(|(i, piece)| (format!("{name}#{}", i + 1), piece)),
        );
    }
    Ok(chunks)
}

/// One batch per known subfolder of `root`, in folder-table order. Sources are
/// named `agent_kb:<folder>/<file>#<n>`.
fn load_knowledge_base(root: &Path) -> Result<Vec<KnowledgeBatch>> {
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("Failed to read knowledge base {}", root.display()))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.path().is_dir() && knowledge_base_scopes(&name).is_none() {
            warn!(folder = %name, "ignoring unknown knowledge-base folder");
        }
    }

    let mut batches = Vec::new();
    for (folder, scopes) in KNOWLEDGE_BASE_FOLDERS {
        let dir = root.join(folder);
        if !dir.is_dir() {
            continue;
        }
        let mut batch = KnowledgeBatch::new(scopes.iter().copied());
        batch.chunks = load_chunks(&dir)?
            .into_iter()
            .map(|(name, text)| (format!("agent_kb:{folder}/{name}"), text))
            .collect();
        if !batch.chunks.is_empty() {
            batches.push(batch);
        }
    }
    Ok(batches)
}

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let mut file = FileConfig::load(args.config.as_deref())?;
    file.apply(args);

    let mut inputs = RunInputs::new(args.project_id.clone());
    inputs.config = file.simulation.clone();
    inputs.brief = file.brief.clone();
    if let Some(dir) = &args.materials {
        inputs.internal_materials = load_chunks(dir)?;
    }
    if let Some(dir) = &args.knowledge_base {
        inputs.knowledge_base = load_knowledge_base(dir)?;
    }
    if let Some(dir) = &args.uploads {
        inputs.uploads = load_chunks(dir)?;
    }
    info!(
        internal = inputs.internal_materials.len(),
        knowledge_base = inputs.knowledge_base.iter().map(|b| b.chunks.len()).sum::<usize>(),
        uploads = inputs.uploads.len(),
        "materials chunked"
    );

    let store = Arc::new(
        FsRunStore::new(&args.out)
            .with_context(|| format!("Failed to open output directory {}", args.out.display()))?,
    );
    let sink = Arc::new(JsonlEventSink::new(&args.out));
    let generator = match args.min_words {
        Some(n) => HeuristicGenerator::new().with_min_words(n),
        None => HeuristicGenerator::new(),
    };
    let orch = Orchestrator::new(file.engine.clone(), Arc::new(generator), store).with_sink(sink);

    let run_id = orch.start(inputs).await.context("Failed to start run")?;
    let state = orch.wait(&run_id).await.context("Failed to await run")?;

    if args.print_state {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print_ranking(&state, &args.out);
    }

    if state.status == RunStatus::Failed {
        bail!(
            "Run {} failed: {}",
            run_id,
            state.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_ranking(state: &RunState, out: &Path) {
    println!("Run {} ({})", state.run_id, state.status);
    println!(
        "  {} candidates, {} selected",
        state.candidates.len(),
        state.selected_candidates.len()
    );
    println!();
    for (rank, id) in state.selected_candidates.iter().enumerate() {
        let Some(c) = state.candidates.get(id) else {
            continue;
        };
        let phase = c
            .forecast
            .as_ref()
            .map(|f| f.phase.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  #{} {}  score={:.3}  state={}  rounds={}  forecast={}",
            rank + 1,
            c.candidate_id,
            c.score,
            c.terminal_state,
            c.rounds_used(),
            phase
        );
    }
    if let Some(top) = state.top_candidate() {
        println!();
        println!(
            "Top draft: {}",
            out.join("runs")
                .join(&state.run_id)
                .join("candidates")
                .join(&top.candidate_id)
                .join(format!("draft_round_{}.md", top.rounds_used()))
                .display()
        );
    }
}

fn cmd_replay(out: &Path, run_id: &str) -> Result<()> {
    let events = JsonlEventSink::new(out)
        .read(run_id)
        .with_context(|| format!("Failed to read events for run {run_id}"))?;
    for event in events {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}
