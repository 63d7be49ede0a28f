//! chaintask CLI — inspect registered tasks and queues, normalize raw
//! transactions offline.
//!
//! Usage:
//! ```bash
//! chaintask info --config chaintask.json
//! chaintask tasks
//! chaintask normalize block.json --height 100 --version 1
//! ```

mod logging;

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use chaintask_core::config::{ChainNotifyConfig, LogConfig, TaskConfig};
use chaintask_core::normalize::{normalize_all, NormalizeContext};
use chaintask_core::{mq, task, MqRegistry, TaskRegistry};
use chaintask_evm::lotus::transactions_from_block;
use chaintask_evm::transaction::raw_records;

/// Contents of the optional `--config` JSON file.
#[derive(Debug, Default, Deserialize)]
struct AppConfig {
    #[serde(default)]
    task: TaskConfig,
    #[serde(default)]
    notify: ChainNotifyConfig,
    #[serde(default)]
    log: LogConfig,
}

fn main() {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        process::exit(1);
    }

    let config = match take_option(&mut args, "--config").map(load_config) {
        None => AppConfig::default(),
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    };
    if args.is_empty() {
        print_usage();
        process::exit(1);
    }
    logging::init_tracing(&config.log);
    install_registries();

    let result = match args[0].as_str() {
        "info" => {
            cmd_info(&config);
            Ok(())
        }
        "tasks" => {
            cmd_tasks();
            Ok(())
        }
        "queues" => {
            cmd_queues();
            Ok(())
        }
        "normalize" => cmd_normalize(&config, &mut args),
        "version" | "--version" | "-V" => {
            println!("chaintask {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chaintask {}", env!("CARGO_PKG_VERSION"));
    println!("Extract EVM transactions from Filecoin tipsets into storage\n");
    println!("USAGE:");
    println!("    chaintask [--config <file>] <COMMAND>\n");
    println!("COMMANDS:");
    println!("    info                 Show effective configuration");
    println!("    tasks                List registered tasks");
    println!("    queues               List registered notification queues");
    println!("    normalize <file>     Normalize a block or transaction list (JSON) and print the records");
    println!("        --height <n>     Tipset height stamped on records (default 0)");
    println!("        --version <v>    Record version (default: task.version from config)");
    println!("    version              Print version");
    println!("    help                 Print this help");
}

/// Remove `flag <value>` from `args`, returning the value.
fn take_option(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    if pos + 1 >= args.len() {
        args.remove(pos);
        return None;
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Some(value)
}

fn load_config(path: String) -> Result<AppConfig> {
    let text = fs::read_to_string(&path).with_context(|| format!("reading config {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))
}

fn install_registries() {
    let mut tasks = TaskRegistry::new();
    tasks.register(chaintask_evm::default_tasks());
    if task::install(tasks).is_err() {
        tracing::warn!("task registry already installed");
    }

    let mut queues = MqRegistry::new();
    queues.register(chaintask_mq::default_queues());
    if mq::install(queues).is_err() {
        tracing::warn!("queue registry already installed");
    }
}

fn cmd_info(config: &AppConfig) {
    let task = &config.task;
    println!("ChainTask v{}", env!("CARGO_PKG_VERSION"));
    println!("  Task: {}", task.task);
    println!("  Lotus address: {}", redact_token(&task.lotus_addr));
    println!("  Record version: {}", task.version);
    match task.timeout() {
        Some(timeout) => println!("  Run timeout: {}ms", timeout.as_millis()),
        None => println!("  Run timeout: none"),
    }
    println!("  Queue: {} ({})", task.queue, config.notify.mq);
    println!("  Queue capacity: {}", config.notify.capacity);
    println!("  Log filter: {}", config.log.directives());
    println!("  Storage backends: memory, SQLite (feature: sqlite)");
}

/// Hide the `TOKEN:` part of a Lotus API info string.
fn redact_token(addr: &str) -> String {
    match addr.split_once(':') {
        Some((token, rest)) if !token.contains('/') && !rest.starts_with("//") => {
            format!("***:{rest}")
        }
        _ => addr.to_string(),
    }
}

fn cmd_tasks() {
    let Some(registry) = task::global() else {
        return;
    };
    for name in registry.names() {
        if let Some(t) = registry.get(name) {
            let model = t.model();
            println!(
                "{name}\tmodel={} table={} version={}",
                model.name, model.table, model.version
            );
        }
    }
}

fn cmd_queues() {
    let Some(registry) = mq::global() else {
        return;
    };
    for name in registry.names() {
        let commit = registry
            .get(name)
            .map(|q| q.as_committable().is_some())
            .unwrap_or(false);
        println!("{name}\tcommittable={commit}");
    }
}

fn cmd_normalize(config: &AppConfig, args: &mut Vec<String>) -> Result<()> {
    let height = match take_option(args, "--height") {
        Some(h) => h.parse().with_context(|| format!("invalid height {h:?}"))?,
        None => 0,
    };
    let version = match take_option(args, "--version") {
        Some(v) => v.parse().with_context(|| format!("invalid version {v:?}"))?,
        None => config.task.version,
    };
    let Some(path) = args.get(1) else {
        bail!("normalize requires a file argument");
    };

    let records = normalize_file(Path::new(path), NormalizeContext { height, version })?;
    tracing::info!(count = records.len(), height, "normalized transactions");
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// Accepts either an `eth_getBlockByHash` result or a bare transaction list.
fn normalize_file(
    path: &Path,
    ctx: NormalizeContext,
) -> Result<Vec<chaintask_core::EvmTransaction>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    let txs = match value {
        Value::Array(txs) => txs,
        block => transactions_from_block(block)?.unwrap_or_default(),
    };
    let raws = raw_records(txs)?;
    Ok(normalize_all(&raws, &ctx)?)
}
