use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use log::info;
use tokio::sync::watch;

use taskping::core::Config;
use taskping::database::Database;
use taskping::features::dispatch::{Dispatcher, HttpGateway};
use taskping::features::scheduler::ReminderScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting taskping reminder engine...");

    let database = Database::new(&config.database_path).await?;
    info!("💾 Database ready at {}", config.database_path);

    let gateway = Arc::new(HttpGateway::new(&config)?);
    let dispatcher = Dispatcher::new(database.clone(), gateway, config.clone());
    info!("📨 Gateway endpoint: {}", config.send_url());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = ReminderScheduler::new(database, dispatcher, &config, shutdown_rx);
    let scheduler_task = tokio::spawn(scheduler.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    scheduler_task.await?;

    info!("Bye 👋");
    Ok(())
}
