use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, info};

use domain_monitor::config::Config;
use domain_monitor::database::models::{EndpointChanges, NewEndpoint};
use domain_monitor::database::{DatabaseImpl, EndpointRepository, open_database};
use domain_monitor::monitoring::stats::{EndpointSummary, detail, summarize};
use domain_monitor::monitoring::validation::parse_method;
use domain_monitor::monitoring::{MonitoringExecutor, MonitoringScheduler};
use domain_monitor::notify::{LogNotifier, NotificationSink, WebhookNotifier};
use domain_monitor::orchestrator::{
    CheckPipeline, CheckRunner, DispatchMode, InlineRunner, Orchestrator, OutcomeStatus, QueuedRunner,
};
use domain_monitor::pool::open_pool;

#[derive(Parser, Debug)]
#[command(author, version, about = "Periodic HTTP(S) reachability monitor", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check due domains on every scheduler tick until Ctrl-C
    Run,

    /// Run a single dispatch pass
    Check {
        /// Only this domain, active or not
        #[arg(long, conflicts_with = "all")]
        domain: Option<i64>,

        /// Every active domain, due or not
        #[arg(long)]
        all: bool,

        /// Wait for the results and print them
        #[arg(long)]
        sync: bool,
    },

    /// Register a domain and probe it once
    Add {
        hostname: String,

        #[arg(long, default_value = "GET")]
        method: String,

        #[arg(long, default_value_t = NewEndpoint::DEFAULT_INTERVAL_SECONDS)]
        interval: u64,

        #[arg(long, default_value_t = NewEndpoint::DEFAULT_TIMEOUT_SECONDS)]
        timeout: u64,

        #[arg(long)]
        owner: Option<i64>,

        /// Register without monitoring it
        #[arg(long)]
        inactive: bool,
    },

    /// Change a domain's settings, leaving owner and activity alone
    Edit {
        id: i64,

        #[arg(long)]
        hostname: Option<String>,

        #[arg(long)]
        method: Option<String>,

        #[arg(long)]
        interval: Option<u64>,

        #[arg(long)]
        timeout: Option<u64>,

        /// Request body to store with the domain
        #[arg(long, conflicts_with = "clear_body")]
        body: Option<String>,

        #[arg(long)]
        clear_body: bool,
    },

    /// Settings, uptime and the most recent checks of one domain
    Show {
        id: i64,

        #[arg(long)]
        json: bool,
    },

    /// Delete a domain and its history
    Remove { id: i64 },

    /// Pause or resume monitoring of a domain
    Toggle { id: i64 },

    /// Uptime and latest result per domain
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

/// Shared services for one CLI invocation
struct Services {
    config: Config,
    database: Arc<DatabaseImpl>,
    pipeline: Arc<CheckPipeline>,
}

impl Services {
    async fn open(config: Config) -> Result<Self> {
        let pool = open_pool(&config.database.path, config.database.pool_size)
            .await
            .with_context(|| format!("failed to open database at {}", config.database.path.display()))?;
        let database = Arc::new(open_database(pool).await?);

        let notifier: Arc<dyn NotificationSink> = if config.notifications.webhooks.is_empty() {
            Arc::new(LogNotifier)
        } else {
            let webhooks = config.notifications.webhooks_by_owner()?;
            let timeout = Duration::from_secs(config.notifications.webhook_timeout_seconds);
            Arc::new(WebhookNotifier::new(webhooks, timeout)?)
        };

        let pipeline = Arc::new(CheckPipeline::new(
            MonitoringExecutor::http(config.probe.use_system_proxy),
            database.clone(),
            database.clone(),
            notifier,
        ));

        Ok(Self { config, database, pipeline })
    }

    fn orchestrator(&self, runner: Arc<dyn CheckRunner>) -> Orchestrator {
        Orchestrator::new(self.database.clone(), Arc::clone(&self.pipeline), runner)
    }

    fn inline(&self) -> Orchestrator {
        let runner = InlineRunner::new(Arc::clone(&self.pipeline), self.config.scheduler.max_concurrent_probes);
        self.orchestrator(Arc::new(runner))
    }

    fn queued(&self) -> (Orchestrator, tokio::task::JoinHandle<()>) {
        let (runner, worker) = QueuedRunner::start(
            Arc::clone(&self.pipeline),
            self.config.scheduler.max_concurrent_probes,
            self.config.scheduler.queue_capacity,
        );
        (self.orchestrator(Arc::new(runner)), worker)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logger::init_with_level(if args.verbose { logger::LevelFilter::DEBUG } else { logger::LevelFilter::INFO });

    let config = Config::from_config(args.config.as_ref()).context("failed to load configuration")?;
    debug!("Loaded configuration\n{config}");

    if let Command::Config = args.command {
        print!("{config}");
        return Ok(());
    }

    let services = Services::open(config).await?;

    match args.command {
        Command::Run => run(&services).await,
        Command::Check { domain, all, sync } => {
            let mode = match (domain, all) {
                (Some(id), _) => DispatchMode::One(id),
                (None, true) => DispatchMode::All,
                (None, false) => DispatchMode::Due,
            };
            check(&services, mode, sync).await
        }
        Command::Add { hostname, method, interval, timeout, owner, inactive } => {
            let new = NewEndpoint {
                hostname,
                method: parse_method(&method)?,
                interval_seconds: interval,
                timeout_seconds: timeout,
                body: None,
                is_active: !inactive,
                owner_id: owner,
            };
            let registered = services.inline().register_endpoint(new).await?;
            println!("Added domain {} (ID {})", registered.endpoint.hostname, registered.endpoint.id);
            if let Some(first) = registered.first_check {
                println!("  Initial check: {}", first.check.kind.label());
            }
            Ok(())
        }
        Command::Edit { id, hostname, method, interval, timeout, body, clear_body } => {
            let changes = EndpointChanges {
                hostname,
                method: method.as_deref().map(parse_method).transpose()?,
                interval_seconds: interval,
                timeout_seconds: timeout,
                body: if clear_body { Some(None) } else { body.map(Some) },
            };
            let updated = services.inline().update_endpoint(id, &changes).await?;
            println!("Updated domain {} (ID {})", updated.hostname, updated.id);
            Ok(())
        }
        Command::Show { id, json } => show(&services, id, json).await,
        Command::Remove { id } => {
            services.inline().remove_endpoint(id).await?;
            println!("Removed domain {id}");
            Ok(())
        }
        Command::Toggle { id } => {
            let is_active = services.inline().toggle_endpoint(id).await?;
            println!("Domain {id} is now {}", if is_active { "active" } else { "paused" });
            Ok(())
        }
        Command::Status { json } => status(&services, json).await,
        Command::Config => Ok(()),
    }
}

async fn run(services: &Services) -> Result<()> {
    let (orchestrator, worker) = services.queued();
    let cadence = Duration::from_secs(services.config.scheduler.cadence_seconds.max(1));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = MonitoringScheduler::new(Arc::new(orchestrator), cadence).start(shutdown_rx);

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("Shutdown requested, waiting for in-flight checks");
    let _ = shutdown_tx.send(true);

    // The scheduler owns the last orchestrator handle, once it is gone the queue closes
    scheduler.await?;
    worker.await?;
    Ok(())
}

async fn check(services: &Services, mode: DispatchMode, sync: bool) -> Result<()> {
    if !sync {
        let (orchestrator, worker) = services.queued();
        let report = orchestrator.dispatch(mode).await?;
        println!("Queued {} checks ({} skipped)", report.queued(), report.skipped());
        drop(orchestrator);
        worker.await?;
        return Ok(());
    }

    let report = services.inline().dispatch(mode).await?;
    if report.is_empty() {
        println!("No domains need checking");
        return Ok(());
    }

    for outcome in &report.outcomes {
        match &outcome.status {
            OutcomeStatus::Checked(checked) => {
                let time = checked
                    .check
                    .response_time_ms
                    .map_or_else(|| "-".to_string(), |ms| format!("{ms} ms"));
                println!("{}: {} ({time})", outcome.hostname, checked.check.kind.label());
            }
            OutcomeStatus::Skipped => println!("{}: skipped, already being checked", outcome.hostname),
            OutcomeStatus::Queued => println!("{}: queued", outcome.hostname),
            OutcomeStatus::Failed(e) => println!("{}: error: {e}", outcome.hostname),
        }
    }
    Ok(())
}

async fn status(services: &Services, json: bool) -> Result<()> {
    let now = Utc::now();
    let endpoints = services.database.list_endpoints().await?;

    let mut summaries = Vec::with_capacity(endpoints.len());
    for endpoint in &endpoints {
        summaries.push(summarize(services.database.as_ref(), endpoint, now).await?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No domains registered");
        return Ok(());
    }

    for summary in &summaries {
        println!("{}", summary_line(summary));
    }
    Ok(())
}

fn summary_line(summary: &EndpointSummary) -> String {
    let percent = |value: Option<f64>| value.map_or_else(|| "n/a".to_string(), |p| format!("{p:.2}%"));
    let state = match (&summary.latest_check, summary.is_active) {
        (_, false) => "paused".to_string(),
        (None, true) => "pending".to_string(),
        (Some(check), true) => check.kind.label().to_string(),
    };
    format!(
        "[{}] {} {} every {}s: {state}, uptime 24h {} / 30d {}, avg {}",
        summary.id,
        summary.method,
        summary.hostname,
        summary.interval,
        percent(summary.uptime_24h),
        percent(summary.uptime_30d),
        summary.avg_response_24h.map_or_else(|| "n/a".to_string(), |ms| format!("{ms} ms")),
    )
}

async fn show(services: &Services, id: i64, json: bool) -> Result<()> {
    let endpoint = services
        .database
        .get_endpoint(id)
        .await?
        .with_context(|| format!("Domain with ID {id} not found"))?;
    let view = detail(services.database.as_ref(), &endpoint, Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{}", summary_line(&view.summary));
    println!("  Timeout: {}s", view.summary.timeout);
    if let Some(owner_id) = view.owner_id {
        println!("  Owner: {owner_id}");
    }
    if let Some(body) = &view.body {
        println!("  Body: {body}");
    }
    println!("  Created: {}, updated: {}", view.created_at.to_rfc3339(), view.updated_at.to_rfc3339());
    println!("  Checks: {} stored, showing {}", view.checks_count, view.recent_checks.len());
    for check in &view.recent_checks {
        let code = check.response_code.map_or_else(|| "-".to_string(), |c| c.to_string());
        let time = check.response_time_ms.map_or_else(|| "-".to_string(), |ms| format!("{ms} ms"));
        let error = check.error_message.as_deref().map(|e| format!(" {e}")).unwrap_or_default();
        println!("    {} {} {code} {time}{error}", check.checked_at.to_rfc3339(), check.kind.label());
    }
    Ok(())
}
