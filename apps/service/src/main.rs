use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod config;
mod database;
mod monitoring;
mod pool;

use config::Config;
use database::{DatabaseImpl, initialize_database};
use monitoring::{Dispatcher, HttpProber, Scheduler, SchedulerSettings, SiteSource};

/// Background liveness monitor for registered sites
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file (defaults to $XDG_CONFIG_HOME/allyouruptime/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the database file from the config
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Print the effective configuration before running
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sweep all sites on the configured interval until interrupted
    Run,
    /// Sweep all sites once and exit
    Sweep,
    /// Register a site to monitor
    AddSite {
        /// Owning user id
        #[arg(long)]
        user: i64,
        #[arg(long)]
        name: Option<String>,
        url: String,
    },
    /// List every monitored site
    ListSites,
    /// Delete a site together with its ping history
    RemoveSite { site_id: i64 },
    /// Show the latest pings of a site
    History {
        site_id: i64,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_config(args.config.as_deref())?;
    if let Some(path) = args.database {
        config.database.path = path;
    }
    config.validate()?;

    logger::init(
        config.logging.level.parse::<logger::LevelFilter>()?,
        config.logging.format.parse().map_err(|e: String| anyhow!(e))?,
    );

    if args.print_config {
        println!("{config}");
    }

    let pool = pool::open(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("opening database {}", config.database.path.display()))?;
    initialize_database(&*pool.get().await?).await?;
    let database = Arc::new(DatabaseImpl::new_from_pool(pool));

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, database).await,
        Command::Sweep => sweep(&config, database).await,
        Command::AddSite { user, name, url } => {
            monitoring::validation::validate_site_url(&url)?;
            let site = database.create_site(user, name.as_deref(), &url).await?;
            println!("Added site {} ({})", site.id, site.label());
            Ok(())
        }
        Command::ListSites => {
            for site in database.list_all_sites().await? {
                println!("{:>6}  user {:<6}  {}  {}", site.id, site.user_id, site.label(), site.url);
            }
            Ok(())
        }
        Command::RemoveSite { site_id } => {
            if database.delete_site(site_id).await? {
                println!("Removed site {site_id}");
                Ok(())
            } else {
                Err(anyhow!("no site with id {site_id}"))
            }
        }
        Command::History { site_id, limit } => {
            let total = database.count_pings(site_id).await?;
            println!("Site {site_id}: {total} pings");

            for ping in database.recent_pings(site_id, limit).await? {
                let at = database::models::timestamp_to_i64(ping.created_at);
                let latency = ping.latency_ms.map(|ms| format!("{ms}ms")).unwrap_or_default();
                match (ping.up, ping.failure) {
                    (true, _) => println!("{at}  up    {}  {latency}", ping.status_code),
                    (false, Some(failure)) => {
                        println!("{at}  down  {} ({failure})  {latency}", ping.status_code)
                    }
                    (false, None) => println!("{at}  down  {}  {latency}", ping.status_code),
                }
            }
            Ok(())
        }
    }
}

fn build_scheduler(config: &Config, database: Arc<DatabaseImpl>) -> Result<Scheduler> {
    let monitoring = &config.monitoring;

    let prober = Arc::new(HttpProber::new(monitoring.timeout(), &monitoring.user_agent)?);
    let dispatcher = Dispatcher::new(prober, database.clone(), monitoring.max_concurrency);
    let settings = SchedulerSettings { interval: monitoring.interval(), cadence: monitoring.cadence };

    Ok(Scheduler::new(database, dispatcher, settings))
}

async fn run(config: &Config, database: Arc<DatabaseImpl>) -> Result<()> {
    let handle = build_scheduler(config, database)?.spawn();

    signal::ctrl_c().await?;
    info!("Shutdown requested, waiting for the current sweep");

    handle.shutdown(config.monitoring.shutdown_grace()).await?;
    Ok(())
}

async fn sweep(config: &Config, database: Arc<DatabaseImpl>) -> Result<()> {
    let scheduler = build_scheduler(config, database)?;
    let abort = CancellationToken::new();

    let sweep = scheduler.sweep_once(&abort);
    tokio::pin!(sweep);

    let finished = tokio::select! {
        summary = &mut sweep => Some(summary),
        _ = signal::ctrl_c() => None,
    };

    let summary = match finished {
        Some(summary) => summary?,
        None => {
            warn!("Interrupted, abandoning in-flight probes");
            abort.cancel();
            sweep.await?
        }
    };

    println!(
        "{} sites: {} up, {} down, {} recorded in {:?}",
        summary.sites,
        summary.up,
        summary.down,
        summary.recorded,
        summary.duration()
    );
    Ok(())
}
