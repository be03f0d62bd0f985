mod shell;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kpilens_contracts::events::EventLog;
use kpilens_contracts::report::write_report;
use kpilens_engine::config::load_dotenv;
use kpilens_engine::imaging::load_image;
use kpilens_engine::{Analyzer, BackendKind, DashboardUpload, InferenceGateway, Settings};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kpilens", version, about = "KPI dashboard analysis with vision-language models")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Inference backend: gemini (remote) or ollama (local).
    #[arg(long, global = true, default_value = "gemini")]
    backend: BackendKind,
    #[arg(long, global = true)]
    ollama_model: Option<String>,
    #[arg(long, global = true)]
    ollama_url: Option<String>,
    /// Defaults to `.env` in the working directory.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    /// Append action events as JSON lines to this file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    Validate(ValidateArgs),
    Analyze(AnalyzeArgs),
    Compare(CompareArgs),
    Similarity(SimilarityArgs),
    Chat(ChatArgs),
}

#[derive(Debug, Parser)]
struct ValidateArgs {
    #[arg(long = "image", required = true, num_args = 1..)]
    images: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    objective: String,
    #[arg(long)]
    report: Option<PathBuf>,
    /// Continue with an interactive chat about the result.
    #[arg(long)]
    chat: bool,
}

#[derive(Debug, Parser)]
struct CompareArgs {
    #[arg(long)]
    first: PathBuf,
    #[arg(long)]
    second: PathBuf,
    #[arg(long)]
    objective: String,
    /// Objective for the second dashboard; defaults to --objective.
    #[arg(long)]
    second_objective: Option<String>,
    #[arg(long)]
    report: Option<PathBuf>,
    #[arg(long)]
    chat: bool,
}

#[derive(Debug, Parser)]
struct SimilarityArgs {
    #[arg(long)]
    first: PathBuf,
    #[arg(long)]
    second: PathBuf,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    objective: Option<String>,
}

const EXIT_REJECTED: i32 = 2;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("kpilens error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging();

    let env_file = cli
        .global
        .env_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(".env"));
    let applied = load_dotenv(&env_file)?;
    debug!(path = %env_file.display(), applied, "environment file loaded");

    let settings = cli.global.settings();
    let mut analyzer = build_analyzer(&cli.global, &settings)?;

    match cli.command {
        Command::Validate(args) => run_validate(&mut analyzer, args),
        Command::Analyze(args) => run_analyze(&mut analyzer, &settings, args),
        Command::Compare(args) => run_compare(&mut analyzer, &settings, args),
        Command::Similarity(args) => run_similarity(&mut analyzer, args),
        Command::Chat(args) => {
            shell::run_shell(&mut analyzer, &settings, args.objective)?;
            Ok(0)
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("KPILENS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

impl GlobalArgs {
    fn settings(&self) -> Settings {
        let mut settings = Settings::from_env();
        if let Some(model) = self.ollama_model.as_deref().filter(|value| !value.trim().is_empty()) {
            settings.ollama_model = model.trim().to_string();
        }
        if let Some(url) = self.ollama_url.as_deref().filter(|value| !value.trim().is_empty()) {
            settings.ollama_url = url.trim().trim_end_matches('/').to_string();
        }
        settings
    }
}

fn build_analyzer(global: &GlobalArgs, settings: &Settings) -> Result<Analyzer> {
    let gateway = InferenceGateway::from_settings(global.backend, settings)
        .with_context(|| format!("failed to initialize {} backend", global.backend))?;
    let analyzer = Analyzer::new(gateway);
    Ok(match &global.events {
        Some(path) => analyzer.with_events(EventLog::new(path)),
        None => analyzer,
    })
}

fn run_validate(analyzer: &mut Analyzer, args: ValidateArgs) -> Result<i32> {
    let mut all_valid = true;
    for path in &args.images {
        let image = load_image(path)?;
        let label = display_name(path);
        let valid = analyzer.validate(&image, &label);
        all_valid &= valid;
        println!("{label}: {}", if valid { "dashboard" } else { "not a dashboard" });
    }
    Ok(if all_valid { 0 } else { EXIT_REJECTED })
}

fn run_analyze(analyzer: &mut Analyzer, settings: &Settings, args: AnalyzeArgs) -> Result<i32> {
    let upload = DashboardUpload::from_path(&args.image, args.objective.clone())?;
    let analysis = match analyzer.analyze(upload) {
        Ok(analysis) => analysis,
        Err(rejection) => {
            println!("{rejection}");
            return Ok(EXIT_REJECTED);
        }
    };
    println!("{analysis}\n");
    println!("{}", analyzer.backend_label());
    if let Some(path) = &args.report {
        export_report(analyzer, Some(path))?;
    }
    if args.chat {
        shell::run_shell(analyzer, settings, Some(args.objective))?;
    }
    Ok(0)
}

fn run_compare(analyzer: &mut Analyzer, settings: &Settings, args: CompareArgs) -> Result<i32> {
    let second_objective = args
        .second_objective
        .clone()
        .unwrap_or_else(|| args.objective.clone());
    let first = DashboardUpload::from_path(&args.first, args.objective.clone())?;
    let second = DashboardUpload::from_path(&args.second, second_objective)?;
    let outcome = match analyzer.compare(first, second) {
        Ok(outcome) => outcome,
        Err(rejection) => {
            println!("{rejection}");
            return Ok(EXIT_REJECTED);
        }
    };
    println!("{}\n", outcome.similarity_message);
    println!("{}\n", outcome.narrative);
    println!("{}", analyzer.backend_label());
    if let Some(path) = &args.report {
        export_report(analyzer, Some(path))?;
    }
    if args.chat {
        shell::run_shell(analyzer, settings, Some(args.objective))?;
    }
    Ok(0)
}

fn run_similarity(analyzer: &mut Analyzer, args: SimilarityArgs) -> Result<i32> {
    let first = load_image(&args.first)?;
    let second = load_image(&args.second)?;
    let verdict = analyzer.check_similarity(&first, &second);
    println!("{}\n", verdict.message());
    if verdict.should_proceed() {
        println!("Comparison would proceed.");
        Ok(0)
    } else {
        println!("Comparison would be blocked.");
        Ok(EXIT_REJECTED)
    }
}

/// Writes the current report to `path`, or to the default name in the
/// working directory. Returns `None` when there is nothing to report.
pub(crate) fn export_report(analyzer: &Analyzer, path: Option<&Path>) -> Result<Option<PathBuf>> {
    let Some(report) = analyzer.report() else {
        return Ok(None);
    };
    let target = match path {
        Some(path) => path.to_path_buf(),
        None => report.default_path(Path::new(".")),
    };
    write_report(&target, &report)?;
    println!("Report written to {}", target.display());
    Ok(Some(target))
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
