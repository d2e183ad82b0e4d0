//! Staged agent pipeline CLI.
//!
//! Runs a request through the eleven-stage pipeline and inspects the memory
//! store (`.taskline/memory/`) that completed runs leave behind. Promotions
//! and improvement notes carry over between invocations through
//! `.taskline/session.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use taskline::exit_codes;
use taskline::io::config::{TasklineConfig, load_config};
use taskline::io::init::{InitOptions, TasklinePaths, init_workspace};
use taskline::io::memory::{FileMemoryStore, MemoryStore};
use taskline::io::provider::provider_from_config;
use taskline::io::session_store::{SessionRecord, load_session, write_session};
use taskline::logging;
use taskline::pipeline::Orchestrator;

#[derive(Parser)]
#[command(
    name = "taskline",
    version,
    about = "Staged agent pipeline with permission gating and run memory"
)]
struct Cli {
    /// Workspace root (defaults to the current directory).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.taskline/` with a default config and an empty memory store.
    Init {
        /// Overwrite the existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run a request through every stage and persist the artifact.
    ///
    /// Starts from the levels and notes the previous run left in
    /// `.taskline/session.json`.
    Run {
        /// The task request.
        request: String,
        /// Print the full artifact as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Print a persisted run artifact.
    Show {
        /// Run id, as printed by `taskline run`.
        run_id: String,
    },
    /// List approved lessons.
    Lessons,
    /// List portfolio entries of completed runs.
    Portfolio,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(exit_codes::INVALID);
        }
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    let root = fs::canonicalize(&cli.root)
        .with_context(|| format!("resolve workspace root {}", cli.root.display()))?;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Run { request, json } => cmd_run(&root, &request, json),
        Command::Show { run_id } => cmd_show(&root, &run_id),
        Command::Lessons => cmd_lessons(&root),
        Command::Portfolio => cmd_portfolio(&root),
    }
}

fn load(root: &Path) -> Result<(TasklineConfig, FileMemoryStore)> {
    let config = load_config(&TasklinePaths::new(root).config_path)?;
    let store = FileMemoryStore::new(config.memory_root(root));
    Ok((config, store))
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_workspace(root, &InitOptions { force })?;
    println!("initialized {}", paths.taskline_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, request: &str, json: bool) -> Result<i32> {
    let (config, store) = load(root)?;
    store.ensure_layout()?;
    let provider = provider_from_config(&config);
    let orchestrator = Orchestrator::new(provider, Box::new(store), config, root)?;
    let session_path = TasklinePaths::new(root).session_path;
    if let Some(record) = load_session(&session_path)? {
        orchestrator.session().restore(
            record.policy_level,
            record.learner_level,
            record.carried_improvements,
        );
    }

    let artifact = match orchestrator.run(request) {
        Ok(artifact) => artifact,
        Err(err) => {
            eprintln!("{err:#}");
            return Ok(exit_codes::RUN_FAILED);
        }
    };
    write_session(
        &session_path,
        &SessionRecord::from(&orchestrator.session().snapshot()),
    )?;
    if json {
        println!("{}", serde_json::to_string_pretty(&artifact)?);
        return Ok(exit_codes::OK);
    }

    println!("run: {}", artifact.run_id);
    if let Some(evaluation) = artifact.evaluation() {
        println!("score: {}/25 ({:?})", evaluation.total_score, evaluation.scored_by);
        println!("feedback: {}", evaluation.feedback);
        for title in &evaluation.approved_lessons {
            println!("approved lesson: {title}");
        }
        for title in &evaluation.rejected_lessons {
            println!("rejected lesson: {title}");
        }
        if let Some(level) = evaluation.decision.new_level {
            println!("promoted to permission level {level}");
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_show(root: &Path, run_id: &str) -> Result<i32> {
    let (_, store) = load(root)?;
    match store.load_run_artifact(run_id)? {
        Some(artifact) => {
            println!("{}", serde_json::to_string_pretty(&artifact)?);
            Ok(exit_codes::OK)
        }
        None => {
            eprintln!("no artifact for run `{run_id}`");
            Ok(exit_codes::NOT_FOUND)
        }
    }
}

fn cmd_lessons(root: &Path) -> Result<i32> {
    let (_, store) = load(root)?;
    for lesson in store.list_lessons()? {
        println!(
            "{}\t[{}]\t{}",
            lesson.title,
            lesson.tags.join(", "),
            lesson.source_run
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_portfolio(root: &Path) -> Result<i32> {
    let (_, store) = load(root)?;
    for entry in store.list_portfolio()? {
        println!("{}\t{}/25\t{}", entry.run_id, entry.total_score, entry.request);
    }
    Ok(exit_codes::OK)
}
