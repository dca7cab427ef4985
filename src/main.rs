use std::sync::Arc;

use actix_web::{App, HttpServer};
use chatledger::api::middleware::BearerAuth;
use chatledger::cli::{
    commands::{Cli, Commands},
    run_cli,
};
use chatledger::config::AppConfig;
use chatledger::crypto::KeyCipher;
use chatledger::db;
use chatledger::llm::{registry::ModelRegistry, HttpProviderFactory};
use chatledger::state::Services;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, &cli.config) {
            error!("{}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting chatledger server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let cipher = if config.security.encryption_key.trim().is_empty() {
        warn!("security.encryption_key is not set; stored API keys will not survive a restart");
        KeyCipher::ephemeral()
    } else {
        match KeyCipher::from_hex(&config.security.encryption_key) {
            Ok(cipher) => cipher,
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    };

    let db_pool = match db::get_connection(&config.database) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let registry = Arc::new(ModelRegistry::builtin());
    let factory = Arc::new(HttpProviderFactory::new(config.llm.clone()));
    let services = Services::build(&config, db_pool, cipher, registry, factory);

    let host = config.server.host.clone();
    let port = config.server.port;

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        let services = services.clone();
        App::new()
            .wrap(BearerAuth)
            .configure(move |cfg| services.configure(cfg))
    })
    .bind((host, port))?
    .run()
    .await
}
