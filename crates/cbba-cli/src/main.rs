use anyhow::{bail, Context, Result};
use cbba_core::{
    decode, encode, AgentId, BidRecord, CbbaConfig, ConfigManager, Message, SystemClock, TaskId,
    LOCAL_CONFIG_FILE,
};
use cbba_engine::{Fleet, FleetSpec};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "cbba")]
#[command(about = "CBBA fleet allocator - decentralized task allocation for vehicle fleets", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty, table)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Configuration file (defaults to .cbba.toml in the current directory)
    #[arg(short, long, global = true, env = "CBBA_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a fleet scenario in-process until it settles
    Simulate {
        /// Scenario file with [[tasks]] and [[agents]]
        scenario: PathBuf,

        /// Probability that a single delivery is lost
        #[arg(long)]
        loss: Option<f64>,

        /// Seed for the loss generator
        #[arg(long)]
        seed: Option<u64>,

        /// Round limit for the synchronous driver
        #[arg(long)]
        max_rounds: Option<usize>,

        /// Maximum tasks per agent
        #[arg(long)]
        capacity: Option<usize>,

        /// Run agents as concurrent tokio tasks instead of lock-step rounds
        #[arg(long = "async")]
        run_async: bool,

        /// Wall-clock budget for --async runs
        #[arg(long, default_value = "1000")]
        duration_ms: u64,
    },

    /// Encode a message into a wire frame
    Encode {
        #[arg(long)]
        sender: u32,

        #[arg(long)]
        task: usize,

        #[arg(long)]
        bid_time: i64,

        #[arg(long)]
        bid: f64,

        /// Winning agent; omit for an unassigned record
        #[arg(long)]
        winner: Option<u32>,
    },

    /// Decode a 125-character wire frame
    Decode {
        frame: String,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination (defaults to .cbba.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct FrameResult {
    frame: String,
    length: usize,
}

#[derive(Serialize)]
struct InitResult {
    path: String,
    status: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from(Some(path)),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(manager.config(), cli.verbose);

    match execute_command(&cli, manager.config()).await {
        Ok(output) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(config: &CbbaConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let fmt = match config.logging.format.as_str() {
        "json" => fmt.json().boxed(),
        "compact" => fmt.compact().boxed(),
        _ => fmt.pretty().boxed(),
    };

    tracing_subscriber::registry().with(filter).with(fmt).init();
}

async fn execute_command(cli: &Cli, config: &CbbaConfig) -> Result<serde_json::Value> {
    match &cli.command {
        Commands::Simulate {
            scenario,
            loss,
            seed,
            max_rounds,
            capacity,
            run_async,
            duration_ms,
        } => {
            let mut config = config.clone();
            if let Some(loss) = loss {
                config.simulation.loss = *loss;
            }
            if let Some(seed) = seed {
                config.simulation.seed = *seed;
            }
            if let Some(rounds) = max_rounds {
                config.simulation.max_rounds = *rounds;
            }
            if let Some(capacity) = capacity {
                config.allocation.max_assignments = *capacity;
            }
            let config = ConfigManager::from_config(config)
                .context("Invalid simulation settings")?
                .config()
                .clone();

            let spec = FleetSpec::load(scenario)
                .with_context(|| format!("Failed to load scenario {}", scenario.display()))?;

            let report = if *run_async {
                let fleet = Fleet::with_clock(&spec, &config, Arc::new(SystemClock::new()))?;
                fleet.run_async(Duration::from_millis(*duration_ms)).await
            } else {
                let mut fleet = Fleet::new(&spec, &config)?;
                fleet.run_until_quiescent(config.simulation.max_rounds)
            };

            let mut value = serde_json::to_value(&report)?;
            if let serde_json::Value::Object(map) = &mut value {
                map.insert("total_score".to_string(), report.total_score().into());
            }
            Ok(value)
        }

        Commands::Encode {
            sender,
            task,
            bid_time,
            bid,
            winner,
        } => {
            let record = match winner {
                Some(w) => BidRecord::claimed(AgentId(*w), *bid, *bid_time),
                None => {
                    if *bid != 0.0 {
                        bail!("an unassigned record must carry a zero bid");
                    }
                    BidRecord::unassigned(*bid_time)
                }
            };
            let frame = encode(&Message::new(AgentId(*sender), TaskId(*task), &record));
            let frame = String::from_utf8(frame.to_vec()).context("Frame is not ASCII")?;
            Ok(serde_json::to_value(FrameResult {
                length: frame.len(),
                frame,
            })?)
        }

        Commands::Decode { frame } => {
            let msg = decode(frame.as_bytes()).context("Failed to decode frame")?;
            Ok(serde_json::to_value(msg)?)
        }

        Commands::InitConfig { path, force } => {
            let path = path
                .clone()
                .unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE));
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            ConfigManager::create_default_config(&path)?;
            Ok(serde_json::to_value(InitResult {
                path: path.display().to_string(),
                status: "created".to_string(),
            })?)
        }
    }
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
        OutputFormat::Table => {
            print_table(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    let serde_json::Value::Object(fields) = value else {
        println!("{}", serde_json::to_string_pretty(value)?);
        return Ok(());
    };
    for (key, val) in fields {
        let key = key.cyan().bold();
        match val {
            serde_json::Value::String(s) => println!("{}: {}", key, s.green()),
            serde_json::Value::Number(n) => println!("{}: {}", key, n.to_string().yellow()),
            serde_json::Value::Bool(true) => println!("{}: {}", key, "true".green()),
            serde_json::Value::Bool(false) => println!("{}: {}", key, "false".red()),
            // agent and conflict rows of a fleet report
            serde_json::Value::Array(rows) if !rows.is_empty() => {
                println!("{}:", key);
                for row in rows {
                    println!("  {}", inline(row));
                }
            }
            _ => println!("{}: {}", key, val),
        }
    }
    Ok(())
}

/// One report row as `field=value` pairs.
fn inline(row: &serde_json::Value) -> String {
    match row {
        serde_json::Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| format!("{}={}", k.dimmed(), v))
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

#[derive(Tabled)]
struct FieldRow {
    field: String,
    value: String,
}

#[derive(Tabled)]
struct AgentRow {
    agent: String,
    bundle: String,
    path: String,
    score: String,
    cycles: String,
}

/// Scalars as a field/value table; per-agent results get their own table.
fn print_table(value: &serde_json::Value) -> Result<()> {
    let serde_json::Value::Object(map) = value else {
        return print_pretty(value);
    };

    let mut fields = Vec::new();
    let mut agents = Vec::new();
    for (key, val) in map {
        match val {
            serde_json::Value::Array(items) if key == "agents" => {
                agents.extend(items.iter().map(|a| AgentRow {
                    agent: cell(&a["agent"]),
                    bundle: cell(&a["bundle"]),
                    path: cell(&a["path"]),
                    score: cell(&a["score"]),
                    cycles: cell(&a["cycles"]),
                }));
            }
            serde_json::Value::Object(inner) => {
                fields.extend(inner.iter().map(|(k, v)| FieldRow {
                    field: format!("{key}.{k}"),
                    value: cell(v),
                }));
            }
            other => fields.push(FieldRow {
                field: key.clone(),
                value: cell(other),
            }),
        }
    }

    println!("{}", Table::new(fields));
    if !agents.is_empty() {
        println!("\n{}", "agents".cyan().bold());
        println!("{}", Table::new(agents));
    }
    Ok(())
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.3}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
