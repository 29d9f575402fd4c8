//! `purc-node`: loads one HVML source file, schedules it as a root
//! coroutine with no curator, and drives the instance's scheduler to
//! completion (`SPEC_FULL.md` §9.4).

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use purc_config::RuntimeConfig;
use purc_dom::{vdom, InMemoryDom, LoopbackRenderer};
use purc_runtime::Scheduler;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs an HVML program on a single PurC-RS instance.
#[derive(Parser, Debug)]
#[command(name = "purc-node", version, about = "Run an HVML program")]
struct Args {
    /// Path to the HVML source file to run.
    source: PathBuf,

    /// Optional TOML file of scheduler/heap tunables (`purc_config::RuntimeConfig`).
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Endpoint name used to build the root coroutine's full name
    /// (`spec.md` §6: `"<endpoint-name>/COROUTINE-<unique-id>"`).
    #[arg(long = "endpoint", default_value = "main")]
    endpoint: String,

    /// Upper bound on scheduler ticks before giving up (a misbehaving
    /// program that never quiesces would otherwise run forever).
    #[arg(long = "max-ticks", default_value_t = 100_000)]
    max_ticks: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RuntimeConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    let source = fs::read_to_string(&args.source)
        .with_context(|| format!("reading {}", args.source.display()))?;
    let root = vdom::parse(&source).with_context(|| format!("parsing {}", args.source.display()))?;

    let dom = Arc::new(InMemoryDom::new());
    let transport = Arc::new(LoopbackRenderer::new());
    let mut scheduler = Scheduler::new(config, dom.clone(), transport);

    let coroutine_id = scheduler.spawn(&args.endpoint, Arc::new(root), None);
    info!(coroutine = %coroutine_id, source = %args.source.display(), "scheduled root coroutine");

    scheduler.run_to_completion(args.max_ticks)?;

    let document = dom.serialize(dom.root())?;
    println!("{document}");
    Ok(())
}
