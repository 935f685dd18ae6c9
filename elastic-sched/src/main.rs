/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! CLI entry point: parse a task-menu file, run one optimization pass, print
//! the chosen mode per task.
//!
//! Diagnostics go to stderr (via `tracing`); results go to stdout. Exit code
//! 0 on success, 1 on any error, including an infeasible task set.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use elastic_sched::config::SystemConfig;
use elastic_sched::parser;
use elastic_sched::scheduler::{ModeSelection, Scheduler};

#[derive(Debug, Parser)]
#[command(
    name = "elastic-sched",
    about = "Mode-selection scheduler for elastic CPU/GPU real-time tasks"
)]
struct Args {
    /// Task-menu file to schedule
    taskfile: PathBuf,

    /// YAML system configuration (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the CPU pool from the configuration
    #[arg(long)]
    max_cpus: Option<usize>,

    /// Override the SM-partition pool from the configuration
    #[arg(long)]
    max_sms: Option<usize>,

    /// Dump the parsed menus before optimizing
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    // Diagnostics on stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => SystemConfig::load_from_file(path)?,
        None => {
            warn!("no configuration file supplied, using defaults");
            SystemConfig::default()
        }
    };
    let max_cpus = args.max_cpus.unwrap_or(config.total_cpus);
    let max_sms = args.max_sms.unwrap_or(config.total_sms);

    let tasks = parser::parse_file(&args.taskfile)?;
    if tasks.is_empty() {
        warn!("task file contains no tasks");
    }
    if args.verbose {
        print_menus(&tasks);
    }

    let mut scheduler = Scheduler::from_config(&config);
    for task in &tasks {
        let (cpu_menu, gpu_menu) = parser::timed_menu(task);
        scheduler
            .add_task(task.elasticity, &cpu_menu, &gpu_menu)
            .context("rejected task menu")?;
    }

    let selection = scheduler
        .optimize(max_cpus, max_sms)
        .context("mode selection failed")?;
    scheduler.apply_selection(&selection);

    print_selection(&scheduler, &selection, max_cpus, max_sms);
    Ok(())
}

/// Echo the parsed menus for verification, one task per block.
fn print_menus(tasks: &[parser::RawTask]) {
    for (i, task) in tasks.iter().enumerate() {
        println!("Task {} Modes:", i + 1);
        println!("----------------------------------------");
        let (cpu_menu, gpu_menu) = parser::timed_menu(task);
        for (j, (cpu, gpu)) in cpu_menu.iter().zip(&gpu_menu).enumerate() {
            println!("Mode {}:", j + 1);
            println!("  Period: {}", cpu.period);
            println!("  CPU Work: {}", cpu.work);
            println!("  CPU Span: {}", cpu.span);
            println!("  GPU Work: {}", gpu.work);
            println!("  GPU Span: {}", gpu.span);
        }
        println!("----------------------------------------");
        println!();
    }
}

fn print_selection(
    scheduler: &Scheduler,
    selection: &ModeSelection,
    max_cpus: usize,
    max_sms: usize,
) {
    for (id, &mode) in selection.selections.iter().enumerate() {
        let chosen = scheduler.task(id).mode(mode);
        println!(
            "Task {}: mode {} (cpus={}, sms={})",
            id + 1,
            mode,
            chosen.cpus,
            chosen.sms
        );
    }
    println!("----------------------------------------");
    println!("Total loss: {:.6}", selection.total_loss);
    println!(
        "Cores used: {}/{} | SMs used: {}/{}",
        selection.cores_used, max_cpus, selection.sms_used, max_sms
    );
}
