use std::{process, sync::Arc};

use restfront::{
    application::{
        access::AccessRuleMatcher, dispatcher::RestDispatcher, documents::DocumentRepository,
        error::AppError, repos::DocumentBackend, resolver::PathResolver,
    },
    cache::{CacheConfig, MemoryCacheStore, ResponseCache},
    config,
    infra::{
        db::{InMemoryDocuments, PostgresDocuments},
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) =
        config::load_with_cli().map_err(|err| AppError::from(InfraError::from(err)))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (backend, database) = init_documents(&settings).await?;
    let state = AppState {
        dispatcher: Arc::new(build_dispatcher(&settings, backend)?),
        database,
    };
    serve_http(&settings, state).await
}

async fn init_documents(
    settings: &config::Settings,
) -> Result<(Arc<dyn DocumentBackend>, Option<PostgresDocuments>), AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!(
            target = "restfront::bootstrap",
            "database url is not configured; documents are kept in memory"
        );
        return Ok((Arc::new(InMemoryDocuments::new()), None));
    };

    let pool = PostgresDocuments::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    PostgresDocuments::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let documents = PostgresDocuments::new(pool);
    Ok((Arc::new(documents.clone()), Some(documents)))
}

fn build_dispatcher(
    settings: &config::Settings,
    backend: Arc<dyn DocumentBackend>,
) -> Result<RestDispatcher, AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = Arc::new(MemoryCacheStore::new(&cache_config));
    let cache = ResponseCache::new(cache_config, store);

    let access = AccessRuleMatcher::new(settings.access.rules.iter().cloned())
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;
    if access.is_empty() {
        warn!(
            target = "restfront::bootstrap",
            "no access rules configured; every request will fail authorization"
        );
    }

    let resolver = PathResolver::new(
        settings
            .routing
            .aliases
            .iter()
            .map(|(alias, target)| (alias.as_str(), target.as_str())),
        settings.routing.abs_ref_prefix.as_deref(),
    );

    let documents = DocumentRepository::with_default(backend, settings.database.default.clone());

    Ok(RestDispatcher::new(resolver, access, cache, documents))
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "restfront::bootstrap",
        addr = %settings.server.addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "restfront::bootstrap", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "restfront::bootstrap", "shutting down");
}
