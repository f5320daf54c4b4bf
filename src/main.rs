use relief_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{InMemoryRepository, PostgresRepository, RepositoryState},
    sms,
    storage::{MockStorageService, S3StorageClient, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, persistence, storage, SMS, then the
/// HTTP server. Startup failures are fatal by intent: the process should not
/// serve traffic half-initialized.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets).
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise crate-level debug.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "relief_portal=debug,tower_http=info,axum=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for log aggregation.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);
    for warning in &config.warnings {
        tracing::warn!("{}", warning);
    }

    // 3. Persistence and storage. Without DATABASE_URL (local only) everything
    // runs in process: in-memory repository and mock storage.
    let (repo, storage): (RepositoryState, StorageState) = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            let postgres = PostgresRepository::new(pool);
            postgres
                .migrate()
                .await
                .expect("FATAL: Database migrations failed.");
            tracing::info!("Postgres connected and migrated");

            let s3_client = S3StorageClient::new(
                &config.s3.endpoint,
                &config.s3.region,
                &config.s3.access_key,
                &config.s3.secret_key,
                &config.s3.bucket,
            )
            .await;
            if config.env == Env::Local {
                // Provision the MinIO bucket of the docker-compose setup.
                s3_client.ensure_bucket_exists().await;
            }
            let repo: RepositoryState = Arc::new(postgres);
            let storage: StorageState = Arc::new(s3_client);
            (repo, storage)
        }
        None => {
            tracing::warn!("DATABASE_URL not set: using the in-memory repository, data is lost on exit");
            let repo: RepositoryState = Arc::new(InMemoryRepository::new());
            let storage: StorageState = Arc::new(MockStorageService::new());
            (repo, storage)
        }
    };

    // 4. SMS gateway (mock when no gateway URL is configured, local only).
    let sms = sms::sms_from_config(&config.sms);

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        storage,
        sms,
        config,
    };
    let app = create_router(app_state);

    // 5. Server.
    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: cannot bind {}: {}", bind_addr, e));

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
