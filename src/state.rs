use std::sync::Arc;

use actix_web::web;

use crate::accounts::{AccountService, CredentialStore};
use crate::api::routes;
use crate::chat::ChatDispatcher;
use crate::config::AppConfig;
use crate::crypto::KeyCipher;
use crate::db::DbPool;
use crate::folders::FolderService;
use crate::ledger::ConversationLedger;
use crate::llm::registry::ModelRegistry;
use crate::llm::ProviderFactory;

/// Everything a request handler can reach, built once per process.
#[derive(Clone)]
pub struct Services {
    pub accounts: Arc<AccountService>,
    pub folders: Arc<FolderService>,
    pub ledger: Arc<ConversationLedger>,
}

impl Services {
    pub fn build(
        config: &AppConfig,
        pool: DbPool,
        cipher: KeyCipher,
        registry: Arc<ModelRegistry>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        let accounts = Arc::new(AccountService::new(pool.clone(), cipher));
        let credentials: Arc<dyn CredentialStore> = accounts.clone();
        let dispatcher = Arc::new(ChatDispatcher::new(
            credentials,
            factory,
            config.chat.system_prompt.clone(),
        ));

        let ledger = Arc::new(ConversationLedger::new(
            pool.clone(),
            registry,
            dispatcher,
            config.chat.clone(),
            config.llm.title_model.clone(),
        ));

        Self {
            accounts,
            folders: Arc::new(FolderService::new(pool)),
            ledger,
        }
    }

    /// Registers shared state and every route.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::from(self.accounts.clone()))
            .app_data(web::Data::from(self.folders.clone()))
            .app_data(web::Data::from(self.ledger.clone()))
            .configure(routes::configure);
    }
}
