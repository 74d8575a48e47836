use actix::prelude::*;
use actix_web::middleware::{Logger, NormalizePath, TrailingSlash};
use actix_web::{web::Data, App, HttpServer};
use anyhow::Context as AnyhowContext;
use log_error::LogError;
use std::env;
use std::sync::Arc;
use subscription_types::subscription::repository::SubscriptionRepository;
use subscription_types::subscription::service::SubscriptionService;
use subscriptions::config::Config;
use subscriptions::subscription::{controllers, repository::PostgresSubscriptionRepository};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[actix_web::main]
async fn main() -> Result<(), anyhow::Error> {
    if let Err(env::VarError::NotPresent) = env::var("RUST_LOG") {
        env::set_var("RUST_LOG", "INFO");
    }
    pretty_env_logger::formatted_timed_builder()
        .parse_default_env()
        .init();

    match std::fs::File::open(".env") {
        Ok(_) => envmnt::load_file(".env")?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::File::create(".env")?;
            envmnt::load_file(".env")?;
        }
        Err(err) => {
            return Err(anyhow::anyhow!("Unable to open .env file: {err}"));
        }
    }

    let config = Config::from_env().context("Invalid configuration")?;
    log::info!(
        "Connecting to postgres host={} port={} user={} db={}",
        config.db.host,
        config.db.port,
        config.db.user,
        config.db.name
    );
    let (mut client, connection) =
        tokio_postgres::connect(&config.db.connection_string(), tokio_postgres::NoTls)
            .await
            .context("Unable to connect to postgres db")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("connection error: {}", e);
        }
    });

    subscriptions::migrations::runner()
        .run_async(&mut client)
        .await
        .context("Unable to apply migrations")?;

    let client = Arc::new(client);
    let subscription_repository: Arc<dyn SubscriptionRepository> =
        Arc::new(PostgresSubscriptionRepository::new(client));
    log::info!("Validation policy: {:?}", config.validation);
    let subscription_service =
        SubscriptionService::new(subscription_repository, config.validation).start();

    let token = CancellationToken::new();
    let t = token.clone();
    tokio::spawn(async {
        let token = t;
        if signal::ctrl_c()
            .await
            .log_error("Unable to listen to shutdown")
            .is_some()
        {
            log::info!("Shutting down, cancelling in-flight requests");
            token.cancel();
        }
    });

    let address = (config.server_address.clone(), config.server_port);
    log::info!("Listening on {}:{}", address.0, address.1);
    HttpServer::new(move || {
        App::new()
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .wrap(Logger::default())
            .app_data(Data::new(subscription_service.clone()))
            .app_data(Data::new(token.clone()))
            .configure(controllers::configure)
    })
    .bind(address.clone())
    .with_context(|| {
        format!(
            "Failed to bind server to {}:{}. Is the port already in use?",
            address.0, address.1
        )
    })?
    .run()
    .await?;
    Ok(())
}
