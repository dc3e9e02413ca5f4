use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use kamipay::alert::AlertMonitor;
use kamipay::config::AppConfig;
use kamipay::fulfillment::{KamiIssuer, PoolIssuer};
use kamipay::ledger::BalanceLedger;
use kamipay::normalize::NormalizerRegistry;
use kamipay::reconcile::OrderReconciler;
use kamipay::webhook::{self, AppState};
use kamipay::{db, logging};

const SWEEP_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::args().nth(1).unwrap_or_else(|| "dev".to_string());
    let config = AppConfig::load(&env);
    let _guard = logging::init_logging(&config);
    info!(env = %env, "kamipay starting");

    let pool = db::connect(&config.postgres_url).await?;
    db::ensure_schema(&pool).await?;

    let monitor = Arc::new(AlertMonitor::new(pool.clone(), &config.alerts));
    let ledger = Arc::new(BalanceLedger::new(pool.clone(), monitor.clone()));
    let issuer: Arc<dyn KamiIssuer> = Arc::new(PoolIssuer::new(load_kami_stock(&config)?));
    let reconciler = Arc::new(OrderReconciler::new(
        pool.clone(),
        ledger,
        monitor,
        issuer,
        config.recharge_expire_minutes,
    ));

    let sweeper = reconciler.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.sweep_expired_recharges().await {
                error!(error = %e, "Recharge expiry sweep failed");
            }
        }
    });

    let registry = Arc::new(NormalizerRegistry::from_config(&config.providers));
    let app = webhook::router(AppState {
        registry,
        reconciler,
    });

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Webhook server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn load_kami_stock(config: &AppConfig) -> anyhow::Result<Vec<String>> {
    let Some(path) = &config.kami_codes_file else {
        warn!("No kami_codes_file configured, pool issuer starts empty");
        return Ok(Vec::new());
    };
    let content = std::fs::read_to_string(path)?;
    let codes: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    info!(path = %path, count = codes.len(), "Kami stock loaded");
    Ok(codes)
}
