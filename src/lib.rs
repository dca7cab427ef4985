pub mod accounts;
pub mod api;
pub mod chat;
pub mod cli;
pub mod config;
pub mod context;
pub mod crypto;
pub mod db;
pub mod error;
pub mod folders;
pub mod ledger;
pub mod llm;
pub mod state;
