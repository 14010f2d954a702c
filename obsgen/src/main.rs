//! Observability artifact planner and extractor.
//!
//! `plan` persists a task graph as task-state records; `extract` and
//! `extract-dir` split finished task outputs into per-service artifact files
//! under the configured output directory.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};

use obsgen::core::types::PlanMode;
use obsgen::exit_codes;
use obsgen::extract::{
    complete_epics, dir_exit_code, extract_dir, extract_task, render_report, report_exit_code,
};
use obsgen::io::config::{ObsgenConfig, load_config, write_config};
use obsgen::logging;
use obsgen::plan::{PlanOutcome, PlanRequest, build_graph, render_task_list, run_plan};

#[derive(Parser)]
#[command(
    name = "obsgen",
    version,
    about = "Plan observability artifact tasks and extract their outputs"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "obsgen.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// One task per (tier, artifact code).
    Batched,
    /// One task per (service, artifact code).
    Decomposed,
}

impl From<ModeArg> for PlanMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Batched => PlanMode::Batched,
            ModeArg::Decomposed => PlanMode::Decomposed,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Build the task graph and write one task-state record per task.
    Plan {
        #[arg(long, value_enum, default_value_t = ModeArg::Batched)]
        mode: ModeArg,
        /// Only create tasks for these phases (the epic is always kept).
        #[arg(long = "phase")]
        phases: Vec<u32>,
        /// Print what would be created without writing anything.
        #[arg(long)]
        dry_run: bool,
        /// Remove existing task states first.
        #[arg(long)]
        clean: bool,
        /// List every task and exit.
        #[arg(long)]
        list: bool,
    },
    /// Split one task's output file into artifact files.
    Extract {
        #[arg(long)]
        task_id: String,
        #[arg(long)]
        input: PathBuf,
        /// Expected services; defaults to the task's tier or service.
        #[arg(long = "service")]
        services: Vec<String>,
    },
    /// Extract every `<TASK_ID>.txt` / `<TASK_ID>.json` file in a directory.
    ExtractDir { dir: PathBuf },
    /// Mark epic task states as done.
    CompleteEpics,
    /// Write a default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = cli.config;
    match cli.command {
        Command::InitConfig { force } => cmd_init_config(&config_path, force),
        Command::Plan {
            mode,
            phases,
            dry_run,
            clean,
            list,
        } => {
            let cfg = load_config(&config_path)?;
            let request = PlanRequest {
                mode: mode.into(),
                phases,
                dry_run,
                clean,
            };
            cmd_plan(&cfg, &request, list)
        }
        Command::Extract {
            task_id,
            input,
            services,
        } => {
            let cfg = load_config(&config_path)?;
            let report = extract_task(&cfg, &task_id, &input, &services)?;
            print!("{}", render_report(&report));
            Ok(report_exit_code(&report))
        }
        Command::ExtractDir { dir } => {
            let cfg = load_config(&config_path)?;
            let summary = extract_dir(&cfg, &dir)?;
            for report in &summary.reports {
                print!("{}", render_report(report));
            }
            for error in &summary.errors {
                println!("{}: error: {}", error.task_id, error.message);
            }
            println!("Total: {} artifacts saved", summary.saved_count());
            Ok(dir_exit_code(&summary))
        }
        Command::CompleteEpics => {
            let cfg = load_config(&config_path)?;
            for id in complete_epics(&cfg, Utc::now())? {
                println!("completed {id}");
            }
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_plan(cfg: &ObsgenConfig, request: &PlanRequest, list: bool) -> Result<i32> {
    if list {
        print!("{}", render_task_list(&build_graph(cfg, request.mode)?));
        return Ok(exit_codes::OK);
    }
    match run_plan(cfg, request, Utc::now())? {
        PlanOutcome::Planned(tasks) => {
            print!("{}", render_task_list(&tasks));
        }
        PlanOutcome::Written { tasks, summary } => {
            println!("Tasks planned: {}", tasks.len());
            println!("Tasks created: {}", summary.created.len());
            println!("Tasks skipped: {}", summary.skipped.len());
            println!("State directory: {}", cfg.state_dir.display());
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("{} exists; use --force to overwrite", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &ObsgenConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}
