use applicant_portal::{
    AppState, MemoryRepository, PostgresRepository, RepositoryState, SystemClock,
    config::{AppConfig, BootstrapAdmin, Env},
    create_router,
    models::{CreateUserRequest, Role},
    users::UserStore,
};
use sqlx::postgres::PgPoolOptions;
use std::{backtrace::Backtrace, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, picks the repository, seeds the
/// bootstrap administrator, starts the token sweeper and serves HTTP.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    // 2. Logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "applicant_portal=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!(panic = %info, %backtrace, "panic");
    }));

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Repository
    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(config.repo_timeout)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("FATAL: Failed to run database migrations.");

            Arc::new(PostgresRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory repository; data is lost on exit");
            Arc::new(MemoryRepository::new())
        }
    };

    // 4. Application state
    let state = AppState::new(repo, config.clone(), Arc::new(SystemClock))
        .expect("FATAL: Invalid application configuration.");

    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(&state.users, admin).await;
    }

    state
        .sessions
        .tokens()
        .clone()
        .spawn_sweeper(state.clock.clone(), config.token_sweep_interval);

    // 5. Router and server
    let app = create_router(state);
    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}

/// Creates the configured administrator unless the email is already registered.
async fn ensure_bootstrap_admin(users: &UserStore, admin: &BootstrapAdmin) {
    match users.by_email(&admin.email).await {
        Ok(Some(existing)) => {
            tracing::debug!(user_id = existing.id, "bootstrap administrator already present");
        }
        Ok(None) => {
            let request = CreateUserRequest {
                email: admin.email.clone(),
                password: admin.password.clone(),
                first_name: "Admin".to_string(),
                last_name: String::new(),
            };
            match users.register(request, Role::Admin).await {
                Ok(user) => tracing::info!(user_id = user.id, "bootstrap administrator created"),
                Err(e) => tracing::error!(error = %e, "failed to create bootstrap administrator"),
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to look up bootstrap administrator"),
    }
}
