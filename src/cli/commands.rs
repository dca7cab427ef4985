use clap::{Parser, Subcommand};

use crate::llm::models::Provider;

#[derive(Parser)]
#[command(name = "chatledger", version, about = "Multi-provider LLM chat backend with token accounting", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve,

    /// List the models the registry knows about
    Models,

    /// Estimate the token count of a piece of text
    Tokens {
        /// Model whose tokenizer family to use
        #[arg(short, long, default_value = "gpt-4o-mini")]
        model: String,

        text: String,
    },

    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Register a user and print its access token
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },

    /// Store (or clear, with an empty key) a provider API key for a user
    SetKey {
        #[arg(long)]
        email: String,
        #[arg(long)]
        provider: Provider,
        #[arg(long)]
        key: String,
    },
}
