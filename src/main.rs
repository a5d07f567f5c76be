use chrono::Utc;
use dotenvy::dotenv;
use kitcoin_ledger::{
    api::AppState,
    config::{database, settings},
    core::{allowance::AllowancePolicy, ledger::Ledger, user},
    errors::Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Ledger settings
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Critical error loading ledger settings: {}", e))?;
    info!(
        weekly_allowance = settings.ledger.weekly_allowance,
        week_start = %settings.ledger.week_start,
        "Loaded ledger settings."
    );

    // 4. Database and tables
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Seed configured administrators
    user::seed_admins(&db, &settings, Utc::now())
        .await
        .inspect(|created| info!(created, "Administrators seeded."))
        .inspect_err(|e| error!("Failed to seed administrators: {}", e))?;

    // 6. Assemble the handler state
    let ledger = Ledger::new(db, AllowancePolicy::from(&settings.ledger));
    let _state = AppState::new(ledger, settings);
    info!("Kitcoin ledger ready.");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down.");

    Ok(())
}
