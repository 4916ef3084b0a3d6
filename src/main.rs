use std::sync::Arc;

use tracing::{error, info, warn};

use payoutdesk::api::auth::OperatorDirectory;
use payoutdesk::api::{build_router, AppState};
use payoutdesk::config::Config;
use payoutdesk::database::{self, PoolConfig, WithdrawalRepository};
use payoutdesk::gateways::bappa_venture::{BappaVentureClient, BappaVentureConfig};
use payoutdesk::gateways::wellness::{WellnessClient, WellnessConfig};
use payoutdesk::gateways::GatewayRouter;
use payoutdesk::logging;
use payoutdesk::services::bank_directory::{BankDirectoryConfig, IfscClient};
use payoutdesk::services::console_download::{ConsoleConfig, ConsoleDownloader};
use payoutdesk::workers::payout_batch::BatchConfig;
use payoutdesk::workers::RunRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_tracing();

    let config = Config::from_env().map_err(|e| {
        error!("failed to load configuration: {e}");
        e
    })?;
    info!(
        environment = %config.server.environment,
        "starting payout desk"
    );

    let pool = database::init_pool(
        &config.database.url,
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        }),
    )
    .await?;
    database::ensure_schema(&pool).await?;

    let operators = Arc::new(OperatorDirectory::parse(&config.operator_tokens)?);
    info!(tokens = operators.len(), "operator directory loaded");

    // A gateway without credentials stays unregistered; routes that need it
    // answer 503 instead of blocking startup.
    let mut gateways = GatewayRouter::new();
    match BappaVentureConfig::from_env().and_then(BappaVentureClient::new) {
        Ok(client) => gateways.register(Arc::new(client)),
        Err(e) => warn!("bappa venture gateway disabled: {e}"),
    }
    match WellnessConfig::from_env().and_then(WellnessClient::new) {
        Ok(client) => gateways.register(Arc::new(client)),
        Err(e) => warn!("wellness gateway disabled: {e}"),
    }

    let bank_directory = IfscClient::new(BankDirectoryConfig::from_env())?;
    let csv_source = ConsoleDownloader::new(ConsoleConfig::from_env()?)?;

    let state = AppState {
        store: Arc::new(WithdrawalRepository::new(pool.clone())),
        gateways: Arc::new(gateways),
        bank_directory: Arc::new(bank_directory),
        csv_source: Arc::new(csv_source),
        registry: Arc::new(RunRegistry::new()),
        operators,
        batch_config: BatchConfig::from_env(),
        pool,
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
