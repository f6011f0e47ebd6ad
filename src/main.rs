// src/main.rs
//! Dining Engine
//!
//! Runs a dining philosophers table in the terminal, printing every state
//! change alongside a one-line view of the whole table.

use anyhow::Result;
use clap::Parser;
use dining_engine::observability::init_tracing;
use dining_engine::observer::{ChannelObserver, Fanout, LogObserver, StateBoard, StateEvent};
use dining_engine::{BuildInfo, EngineConfig, EngineError, Table, TableReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dining-engine")]
#[command(about = "Dining philosophers simulation with ordered fork acquisition", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file layered over defaults and ./dining.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of philosophers
    #[arg(short = 'n', long)]
    agents: Option<usize>,

    /// Length of one thinking/eating slot in milliseconds
    #[arg(short, long)]
    timescale_ms: Option<u64>,

    /// Seed base for the philosophers' timing
    #[arg(long, conflicts_with = "random_seed")]
    seed: Option<u64>,

    /// Use a fresh random seed base
    #[arg(long)]
    random_seed: bool,

    /// Stop after each philosopher completes this many cycles
    #[arg(short, long)]
    cycles: Option<u64>,

    /// Print events and the final report as JSON
    #[arg(long)]
    json: bool,

    /// Log filter, e.g. `debug` or `dining_engine=trace`
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(agents) = self.agents {
            config.table.agents = agents;
        }
        if let Some(timescale_ms) = self.timescale_ms {
            config.table.timescale_ms = timescale_ms;
        }
        if let Some(seed) = self.seed {
            config.table.seed = seed;
        }
        if self.random_seed {
            config.table.seed = rand::random();
        }
        if self.cycles.is_some() {
            config.table.max_cycles = self.cycles;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration, then let flags override it
    let mut config = EngineConfig::load_from(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging)?;

    let build = BuildInfo::current();
    info!("Starting Dining Engine v{} ({})", build.version, build.git_hash);
    info!("Configuration loaded: {:?}", config);

    let board = Arc::new(StateBoard::new(config.table.agents));
    let (channel, events) = ChannelObserver::bounded(4096);
    let channel = Arc::new(channel);
    let observer = Fanout::new()
        .with(board.clone())
        .with(channel.clone())
        .with(Arc::new(LogObserver));

    let printer = {
        let board = Arc::clone(&board);
        let json = cli.json;
        std::thread::spawn(move || {
            for event in events.iter() {
                print_event(&event, &board, json);
            }
        })
    };

    let table = Table::start(config.table.clone(), Arc::new(observer))?;
    let cancel = table.cancellation_token();
    let shutdown_timeout = config.table.shutdown_timeout();
    let mut running = tokio::spawn(table.join());

    let report = tokio::select! {
        joined = &mut running => joined??,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for CTRL+C: {}", e);
            }
            info!("Received shutdown signal, clearing the table...");
            cancel.cancel();
            tokio::time::timeout(shutdown_timeout, running)
                .await
                .map_err(|_| EngineError::ShutdownTimeout(shutdown_timeout))???
        }
    };

    let channel_stats = channel.stats();
    if channel_stats.dropped > 0 {
        warn!(
            "{} state events dropped ({:.1}%)",
            channel_stats.dropped,
            channel_stats.drop_rate()
        );
    }

    // the last sender goes away here, which ends the printer
    drop(channel);
    if printer.join().is_err() {
        warn!("Event printer panicked");
    }

    print_report(&report, cli.json)?;
    Ok(())
}

fn print_event(event: &StateEvent, board: &StateBoard, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to encode event: {}", e),
        }
    } else {
        println!(
            "{}  P{:<3} {:<8} | {}",
            event.timestamp.format("%H:%M:%S%.3f"),
            event.agent,
            event.state,
            board.render()
        );
    }
}

fn print_report(report: &TableReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!(
        "{} meals across {} philosophers in {:.2?}",
        report.total_meals(),
        report.agents.len(),
        report.elapsed
    );
    for agent in &report.agents {
        println!(
            "  P{:<3} meals {:>5}  cycles {:>5}  waited {:>10.2?}  longest {:>10.2?}",
            agent.index, agent.meals, agent.cycles, agent.total_wait, agent.longest_wait
        );
    }
    for fork in &report.forks {
        println!(
            "  fork {:<3} taken {:>5} times, released {:>5}",
            fork.id, fork.acquisitions, fork.releases
        );
    }
    Ok(())
}
