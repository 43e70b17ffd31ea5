//! lru-replay - run command scripts against an lrudict cache

mod runner;
mod script;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use crate::runner::Runner;
use crate::script::{parse_script, ScriptLine};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cache capacity (number of items)
    #[arg(short, long, default_value_t = 1024)]
    capacity: usize,

    /// Script file to replay (reads stdin when omitted)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    /// Print every evicted pair as it is reported
    #[arg(long)]
    log_evictions: bool,

    /// Only print the final report
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    let source = read_source(args.script.as_deref())?;
    let script = load_script(&source)?;

    info!(
        capacity = args.capacity,
        commands = script.len(),
        "replaying script"
    );

    let mut runner = Runner::new(args.capacity, args.log_evictions)
        .context("failed to create cache")?;

    for line in &script {
        let reply = runner.execute(&line.command);
        if reply.is_error() {
            warn!(line = line.line, "command failed: {}", reply);
        }
        if !args.quiet {
            println!("{}", reply);
        }
        for (key, value) in runner.drain_evictions() {
            if !args.quiet {
                println!("{}", eviction_line(&key, &value));
            }
        }
    }

    let report = runner.report();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    Ok(())
}

fn read_source(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display())),
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("failed to read script from stdin")?;
            Ok(source)
        }
    }
}

fn load_script(source: &str) -> Result<Vec<ScriptLine>> {
    parse_script(source).context("failed to parse script")
}

fn eviction_line(key: &str, value: &str) -> String {
    format!("evicted {}={}", key, value)
}
