use clap::{Parser, ValueEnum};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use keeper_scheduler::config::{DashboardConfig, SchedulerConfig};
use keeper_scheduler::dashboard::ErrorResponse;
use keeper_scheduler::network::{
    Dispatcher, FilePeerDirectory, NetworkDispatcher, SimulatedDispatcher,
};
use keeper_scheduler::node::ManagerNode;
use keeper_scheduler::resources::SystemResources;
use keeper_scheduler::scheduler::{
    JobDetails, KeeperSelector, LeastLoadedSelector, QueueStatus, RandomSelector,
    RoundRobinSelector, SchedulerDeps,
};
use keeper_scheduler::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "keeper-scheduler")]
#[command(version)]
#[command(about = "Recurring job scheduler with resource-aware admission for keeper quorums")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the scheduler
    Serve(ServeArgs),

    /// Job inspection commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },

    /// Queue inspection commands
    Queue {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Show host utilization and admission thresholds
    Metrics {
        #[command(flatten)]
        client: ClientArgs,
    },
}

// =============================================================================
// Serve Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Number of concurrent workers
    #[arg(long, default_value = "5")]
    workers: usize,

    /// CPU usage (percent) at or above which new jobs wait
    #[arg(long, default_value = "10")]
    max_cpu: f64,

    /// Memory usage (percent) at or above which new jobs wait
    #[arg(long, default_value = "80")]
    max_memory: f64,

    /// Keepers of the default quorum (comma-separated)
    #[arg(long, default_value = "node1,node2,node3")]
    keepers: String,

    /// Keeper selection policy
    #[arg(long, default_value = "random")]
    selector: SelectorKind,

    /// Port for the HTTP API (disabled when omitted)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// JSON file mapping keeper names to addresses
    #[arg(long, conflicts_with = "simulate")]
    peers_file: Option<PathBuf>,

    /// Skip the network and succeed with this probability (0.0-1.0)
    #[arg(long, value_parser = parse_success_rate)]
    simulate: Option<f64>,

    /// Seconds to wait for a keeper to acknowledge a job
    #[arg(long, default_value = "30")]
    dispatch_timeout: u64,

    /// Submit the sample workload on startup
    #[arg(long)]
    demo_jobs: bool,
}

fn parse_success_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("success rate must be between 0.0 and 1.0, got {}", s))
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum SelectorKind {
    Random,
    RoundRobin,
    LeastLoaded,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Scheduler HTTP API address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Get status of a specific job
    Status {
        /// The job ID
        job_id: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum QueueCommands {
    /// Counts of admitted, waiting and ready jobs
    Status,
}

// =============================================================================
// Server
// =============================================================================

fn parse_keepers(keepers: &str) -> Vec<String> {
    keepers
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

async fn run_server(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dispatcher: Arc<dyn Dispatcher> = match (args.simulate, args.peers_file) {
        (Some(rate), _) => {
            tracing::warn!(success_rate = rate, "Using simulated dispatch, no keeper is contacted");
            Arc::new(SimulatedDispatcher::new(rate))
        }
        (None, Some(path)) => Arc::new(
            NetworkDispatcher::new(Arc::new(FilePeerDirectory::new(path)))
                .with_timeout(Duration::from_secs(args.dispatch_timeout)),
        ),
        (None, None) => {
            return Err("either --peers-file or --simulate <success-rate> is required".into());
        }
    };

    let selector: Arc<dyn KeeperSelector> = match args.selector {
        SelectorKind::Random => Arc::new(RandomSelector),
        SelectorKind::RoundRobin => Arc::new(RoundRobinSelector::new()),
        SelectorKind::LeastLoaded => Arc::new(LeastLoadedSelector::new()),
    };

    let config = SchedulerConfig::new(args.workers)
        .with_limits(args.max_cpu, args.max_memory)
        .with_keepers(parse_keepers(&args.keepers));

    let dashboard = match args.dashboard_port {
        Some(port) => {
            let listen_addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
            Some(DashboardConfig { listen_addr })
        }
        None => None,
    };

    tracing::info!(
        workers = config.workers_count,
        keepers = ?config.default_quorum.keepers,
        dashboard_addr = ?dashboard.as_ref().map(|d| d.listen_addr),
        "Starting keeper scheduler"
    );

    let shutdown = install_shutdown_handler();
    let deps = SchedulerDeps::new(dispatcher).with_selector(selector);
    let node = ManagerNode::start(config, deps, dashboard).await;

    if args.demo_jobs {
        node.submit_demo_jobs().await;
    }

    node.run(shutdown).await?;
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn fetch<T: DeserializeOwned>(
    client: &ClientArgs,
    path: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    let url = format!("{}{}", client.addr.trim_end_matches('/'), path);
    let response = reqwest::get(&url).await?;

    if !response.status().is_success() {
        let status = response.status();
        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => format!("HTTP {}", status),
        };
        return Err(message.into());
    }
    Ok(response.json::<T>().await?)
}

async fn handle_job_status(
    client: &ClientArgs,
    job_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let details: JobDetails = fetch(client, &format!("/job/{}", job_id)).await?;

    match client.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        OutputFormat::Table => {
            println!("Job ID:        {}", details.job_id);
            println!("Status:        {}", details.status);
            println!("Created:       {}", details.created_at);
            if let Some(at) = details.last_executed {
                println!("Last Executed: {}", at);
            }
            println!(
                "Retries:       {}/{}",
                details.current_retries, details.max_retries
            );
            println!(
                "Schedule:      every {}s for {}s",
                details.time_interval, details.time_frame
            );
            if let Some(error) = &details.error {
                println!("Error:");
                for line in error.lines() {
                    println!("  {}", line);
                }
            }
        }
    }
    Ok(())
}

async fn handle_queue_status(client: &ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let status: QueueStatus = fetch(client, "/queue/status").await?;

    match client.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Table => {
            println!("Queue Status");
            println!("{}", "=".repeat(30));
            println!("Active:  {}", status.active_jobs);
            println!("Waiting: {}", status.waiting_jobs);
            println!("Ready:   {}", status.ready_jobs);
            println!("CPU:     {:.1}%", status.cpu_usage);
            println!("Memory:  {:.1}%", status.memory_usage);
        }
    }
    Ok(())
}

async fn handle_metrics(client: &ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let metrics: SystemResources = fetch(client, "/system/metrics").await?;

    match client.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        OutputFormat::Table => {
            println!("{:<8} {:>8} {:>8}", "", "USAGE", "LIMIT");
            println!("{}", "-".repeat(26));
            println!(
                "{:<8} {:>7.1}% {:>7.1}%",
                "CPU", metrics.cpu_usage, metrics.max_cpu
            );
            println!(
                "{:<8} {:>7.1}% {:>7.1}%",
                "Memory", metrics.memory_usage, metrics.max_memory
            );
            let admitting = if metrics.has_capacity() { "yes" } else { "no" };
            println!();
            println!("Admitting new jobs: {}", admitting);
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Serve(serve_args) => {
            run_server(serve_args).await?;
        }
        Commands::Job { client, command } => match command {
            JobCommands::Status { job_id } => {
                handle_job_status(&client, &job_id).await?;
            }
        },
        Commands::Queue { client, command } => match command {
            QueueCommands::Status => {
                handle_queue_status(&client).await?;
            }
        },
        Commands::Metrics { client } => {
            handle_metrics(&client).await?;
        }
    }

    Ok(())
}
