use repforge_api::{config::Config, routes::create_router, state::AppState};
use repforge_shared::db;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repforge_api=info,repforge_shared=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, config);

    // Sweep expired MFA login challenges so abandoned logins do not
    // accumulate in memory
    let challenges = state.challenges.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            challenges.purge_expired().await;
        }
    });

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "Repforge API listening");

    axum::serve(listener, app).await?;
    Ok(())
}
