pub mod commands;

use crate::accounts::{AccountService, ApiKeyUpdate};
use crate::cli::commands::{Commands, UserAction};
use crate::config::AppConfig;
use crate::context::tokenizer::count_tokens;
use crate::crypto::KeyCipher;
use crate::db::get_connection;
use crate::error::{AppError, Result};
use crate::llm::models::Provider;
use crate::llm::registry::ModelRegistry;

pub fn run_cli(command: Commands, config_path: &str) -> Result<()> {
    let config = AppConfig::load(config_path).map_err(|e| AppError::Internal(format!("Failed to load config: {e}")))?;

    match command {
        Commands::Serve => Err(AppError::Internal(
            "serve is handled by the server entrypoint".to_string(),
        )),
        Commands::Models => {
            let registry = ModelRegistry::builtin();
            println!("{:<28} | {:<9} | {:>10} | {:>8} | {:>8}", "Model", "Provider", "Window", "$/1k in", "$/1k out");
            println!("{:-<28}-+-{:-<9}-+-{:->10}-+-{:->8}-+-{:->8}", "", "", "", "", "");
            for m in registry.models() {
                println!(
                    "{:<28} | {:<9} | {:>10} | {:>8.5} | {:>8.5}",
                    m.name,
                    m.provider.as_str(),
                    m.context_window,
                    m.cost_per_1k_input,
                    m.cost_per_1k_output
                );
            }
            Ok(())
        }
        Commands::Tokens { model, text } => {
            println!("{}", count_tokens(&text, &model));
            Ok(())
        }
        Commands::User { action } => {
            // A process-local key would make stored credentials unreadable later.
            if config.security.encryption_key.trim().is_empty() {
                return Err(AppError::Crypto(
                    "security.encryption_key must be set to manage users from the CLI".to_string(),
                ));
            }
            let cipher = KeyCipher::from_hex(&config.security.encryption_key)?;
            let pool = get_connection(&config.database)?;
            let accounts = AccountService::new(pool, cipher);

            match action {
                UserAction::Create {
                    email,
                    first_name,
                    last_name,
                } => {
                    let (user, token) = accounts.register(&email, &first_name, &last_name)?;
                    println!("Created user {} ({})", user.email, user.id);
                    println!("Access token: {token}");
                }
                UserAction::SetKey { email, provider, key } => {
                    let user = accounts.find_by_email(&email)?;
                    let masked = accounts.set_api_keys(user.id, &key_update(provider, key))?;
                    let shown = match provider {
                        Provider::OpenAi => masked.openai_api_key,
                        Provider::Anthropic => masked.anthropic_api_key,
                        Provider::Google => masked.google_api_key,
                    };
                    match shown {
                        Some(mask) => println!("Stored {provider} key {mask} for {}", user.email),
                        None => println!("Cleared {provider} key for {}", user.email),
                    }
                }
            }
            Ok(())
        }
    }
}

fn key_update(provider: Provider, key: String) -> ApiKeyUpdate {
    let mut update = ApiKeyUpdate::default();
    match provider {
        Provider::OpenAi => update.openai_api_key = Some(key),
        Provider::Anthropic => update.anthropic_api_key = Some(key),
        Provider::Google => update.google_api_key = Some(key),
    }
    update
}
