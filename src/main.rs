use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use store_uptime::store::sqlite::{SqliteConnector, SqliteStore};
use store_uptime::{api, config, ingest, report, runner, state};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "store-uptime", version, about = "Store uptime/downtime report service")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Load store_status.csv, menu_hours.csv and timezones.csv into the database
    Ingest {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Generate one report synchronously and print its path
    Generate,
    /// Print an overview of the loaded dataset
    Inspect,
}

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = config::load_from_path(&cli.config)?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = %cli.config.display(),
        app = %config.app.name,
        "store-uptime starting"
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::Ingest { data_dir } => run_ingest(&config, &data_dir),
        Command::Generate => run_generate(&config).await,
        Command::Inspect => run_inspect(&config),
    }
}

async fn serve(config: &config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(RwLock::new(state::AppState::new()));
    let connector = Arc::new(SqliteConnector::new(config.database_path()));
    let settings = config.report_settings();
    tracing::info!(
        database = %config.database_path().display(),
        output_dir = %settings.output_dir.display(),
        batch_size = settings.batch_size,
        max_concurrent_runs = config.max_concurrent_runs(),
        "Report runner configured"
    );
    let runner = Arc::new(runner::ReportRunner::new(
        state,
        connector,
        settings,
        config.max_concurrent_runs(),
    ));

    let app = api::router(runner);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port()));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn run_ingest(
    config: &config::Config,
    data_dir: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open(config.database_path())?;
    let summary = ingest::ingest_directory(&mut store, data_dir)?;
    println!(
        "timezones: {} loaded, {} skipped",
        summary.timezones.loaded, summary.timezones.skipped
    );
    println!(
        "business hours: {} loaded, {} skipped",
        summary.business_hours.loaded, summary.business_hours.skipped
    );
    println!(
        "status: {} loaded, {} skipped",
        summary.status.loaded, summary.status.skipped
    );
    Ok(())
}

async fn run_generate(config: &config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let connector = SqliteConnector::new(config.database_path());
    let settings = config.report_settings();
    let path =
        tokio::task::spawn_blocking(move || report::generate_report(&connector, &settings))
            .await??;
    println!("{}", path.display());
    Ok(())
}

fn run_inspect(config: &config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open_read_only(config.database_path())?;
    let overview = store.overview()?;
    println!("store_status rows:    {}", overview.counts.status_rows);
    println!("business_hours rows:  {}", overview.counts.business_hours_rows);
    println!("store_timezone rows:  {}", overview.counts.timezone_rows);
    println!("stores with status:   {}", overview.status_stores);
    println!("stores with hours:    {}", overview.business_hours_stores);
    println!("stores with timezone: {}", overview.timezone_stores);
    println!("eligible stores:      {}", overview.eligible_stores);
    match (overview.earliest_observation, overview.latest_observation) {
        (Some(earliest), Some(latest)) => {
            println!("observations:         {earliest} .. {latest}");
        }
        _ => println!("observations:         none"),
    }
    Ok(())
}
