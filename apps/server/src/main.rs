#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{App, HttpServer};
use clap::Parser;
use hostwatch_service::Config;
use hostwatch_service::database::open_database;
use hostwatch_service::monitoring::{MonitorCoordinator, MonitoringScheduler, prober_for_platform};

mod error;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use error::AppError;
use logger::init_tracing;
use state::AppState;

/// Registry of network hosts with periodic reachability checks
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the config file, defaults to $XDG_CONFIG_HOME/hostwatch/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Database file
    #[arg(long)]
    db: Option<String>,

    /// Seconds between automatic probe passes
    #[arg(long)]
    interval_seconds: Option<u64>,
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = load_config(&args)?;
    tracing::info!("{}", config);

    run_server(config).await
}

fn load_config(args: &Args) -> Result<Config, AppError> {
    let mut config = Config::from_config(args.config.as_ref())?;
    config.apply_env_overrides();

    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(db) = &args.db {
        config.database.path.clone_from(db);
    }
    if let Some(interval) = args.interval_seconds {
        config.monitor.interval_seconds = interval;
    }

    config.validate()?;
    Ok(config)
}

async fn run_server(config: Config) -> Result<(), AppError> {
    let database = Arc::new(open_database(&config.database).await?);

    let prober = prober_for_platform(config.monitor.probe_timeout());
    let coordinator = Arc::new(MonitorCoordinator::new(
        database.clone(),
        prober,
        config.monitor.max_concurrent_probes,
    ));
    let scheduler = MonitoringScheduler::new(coordinator, config.monitor.interval()).start();

    let state = Data::new(AppState::new(database, scheduler.trigger()));
    let bind = (config.http.bind.as_str(), config.http.port);
    tracing::info!("Listening on {}:{}", bind.0, bind.1);

    let served = match HttpServer::new(move || App::new().app_data(state.clone()).configure(routes::routes)).bind(bind)
    {
        Ok(server) => server.run().await,
        Err(e) => Err(e),
    };

    scheduler.shutdown().await;
    served?;
    Ok(())
}
