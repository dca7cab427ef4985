use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::crypto::{generate_access_token, mask_api_key, token_digest, KeyCipher};
use crate::db::{lock, with_transaction, DbPool, DbService, User};
use crate::error::{AppError, Result};
use crate::llm::models::Provider;

/// Resolves the plaintext credential a user has stored for a provider.
pub trait CredentialStore: Send + Sync {
    fn resolve(&self, user_id: Uuid, provider: Provider) -> Result<String>;
}

/// Per-provider key changes. `None` leaves a key untouched, an empty string
/// clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeyUpdate {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

impl ApiKeyUpdate {
    fn entries(&self) -> [(Provider, Option<&str>); 3] {
        [
            (Provider::OpenAi, self.openai_api_key.as_deref()),
            (Provider::Anthropic, self.anthropic_api_key.as_deref()),
            (Provider::Google, self.google_api_key.as_deref()),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MaskedApiKeys {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

#[derive(Clone)]
pub struct AccountService {
    pool: DbPool,
    cipher: KeyCipher,
}

impl AccountService {
    pub fn new(pool: DbPool, cipher: KeyCipher) -> Self {
        Self { pool, cipher }
    }

    /// Creates a user and returns it with its bearer token. The token is not
    /// recoverable afterwards.
    pub fn register(&self, email: &str, first_name: &str, last_name: &str) -> Result<(User, String)> {
        let email = email.trim();
        if !email.contains('@') || email.len() < 3 {
            return Err(AppError::Validation("A valid email address is required".to_string()));
        }
        if first_name.trim().is_empty() || last_name.trim().is_empty() {
            return Err(AppError::Validation("First and last name are required".to_string()));
        }

        let token = generate_access_token();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            created_at: Utc::now(),
        };

        let conn = lock(&self.pool)?;
        if DbService::find_user_by_email(&conn, &user.email)?.is_some() {
            return Err(AppError::Validation("User with this email already exists".to_string()));
        }
        DbService::insert_user(&conn, &user, &token_digest(&token))?;

        info!("Registered user {}", user.id);
        Ok((user, token))
    }

    pub fn authenticate(&self, token: &str) -> Result<User> {
        let conn = lock(&self.pool)?;
        DbService::find_user_by_token(&conn, &token_digest(token))?.ok_or(AppError::Unauthorized)
    }

    pub fn profile(&self, user_id: Uuid) -> Result<User> {
        let conn = lock(&self.pool)?;
        DbService::get_user(&conn, user_id)?.ok_or_else(|| AppError::not_found("User"))
    }

    pub fn find_by_email(&self, email: &str) -> Result<User> {
        let conn = lock(&self.pool)?;
        DbService::find_user_by_email(&conn, email.trim())?.ok_or_else(|| AppError::not_found("User"))
    }

    pub fn set_api_keys(&self, user_id: Uuid, update: &ApiKeyUpdate) -> Result<MaskedApiKeys> {
        // Encrypt before taking the lock.
        let mut changes = Vec::new();
        for (provider, value) in update.entries() {
            let Some(value) = value else { continue };
            let value = value.trim();
            let stored = if value.is_empty() {
                None
            } else {
                Some(self.cipher.encrypt(value)?)
            };
            changes.push((provider, stored));
        }

        {
            let conn = lock(&self.pool)?;
            if DbService::get_user(&conn, user_id)?.is_none() {
                return Err(AppError::not_found("User"));
            }
            with_transaction(&conn, |tx| -> Result<()> {
                for (provider, stored) in &changes {
                    DbService::set_api_key(tx, user_id, *provider, stored.as_deref())?;
                }
                Ok(())
            })?;
        }
        for (provider, stored) in &changes {
            info!(
                "User {} {} {} API key",
                user_id,
                if stored.is_some() { "set" } else { "cleared" },
                provider
            );
        }

        self.masked_api_keys(user_id)
    }

    pub fn masked_api_keys(&self, user_id: Uuid) -> Result<MaskedApiKeys> {
        let stored = {
            let conn = lock(&self.pool)?;
            DbService::get_api_keys(&conn, user_id)?.ok_or_else(|| AppError::not_found("User"))?
        };

        let mask = |provider: Provider| -> Result<Option<String>> {
            match stored.get(provider) {
                Some(encrypted) => Ok(mask_api_key(&self.cipher.decrypt(encrypted)?)),
                None => Ok(None),
            }
        };

        Ok(MaskedApiKeys {
            openai_api_key: mask(Provider::OpenAi)?,
            anthropic_api_key: mask(Provider::Anthropic)?,
            google_api_key: mask(Provider::Google)?,
        })
    }
}

impl CredentialStore for AccountService {
    fn resolve(&self, user_id: Uuid, provider: Provider) -> Result<String> {
        let stored = {
            let conn = lock(&self.pool)?;
            DbService::get_api_keys(&conn, user_id)?.ok_or_else(|| AppError::not_found("User"))?
        };
        let encrypted = stored.get(provider).ok_or(AppError::CredentialMissing(provider))?;
        self.cipher.decrypt(encrypted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::get_connection;

    fn service() -> AccountService {
        let pool = get_connection(&DatabaseConfig {
            path: ":memory:".to_string(),
        })
        .unwrap();
        AccountService::new(pool, KeyCipher::ephemeral())
    }

    #[test]
    fn register_then_authenticate_by_token() {
        let accounts = service();
        let (user, token) = accounts.register("Ada@Example.com", "Ada", "Lovelace").unwrap();
        assert_eq!(user.email, "ada@example.com");

        let found = accounts.authenticate(&token).unwrap();
        assert_eq!(found.id, user.id);
        assert!(matches!(accounts.authenticate("bogus"), Err(AppError::Unauthorized)));
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let accounts = service();
        accounts.register("a@b.io", "A", "B").unwrap();
        let err = accounts.register("A@B.io", "C", "D").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn keys_are_masked_and_resolvable_until_cleared() {
        let accounts = service();
        let (user, _) = accounts.register("k@b.io", "K", "B").unwrap();

        let missing = accounts.resolve(user.id, Provider::OpenAi).unwrap_err();
        assert!(matches!(missing, AppError::CredentialMissing(Provider::OpenAi)));

        let masked = accounts
            .set_api_keys(
                user.id,
                &ApiKeyUpdate {
                    openai_api_key: Some("sk-abcdefghijkl".to_string()),
                    google_api_key: Some("short".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(masked.openai_api_key.as_deref(), Some("sk-a...ijkl"));
        assert_eq!(masked.google_api_key.as_deref(), Some("****"));
        assert_eq!(masked.anthropic_api_key, None);
        assert_eq!(accounts.resolve(user.id, Provider::OpenAi).unwrap(), "sk-abcdefghijkl");

        accounts
            .set_api_keys(
                user.id,
                &ApiKeyUpdate {
                    openai_api_key: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(accounts.resolve(user.id, Provider::OpenAi).is_err());
        assert_eq!(accounts.resolve(user.id, Provider::Google).unwrap(), "short");
    }

    #[test]
    fn unknown_user_keeps_no_key_changes() {
        let accounts = service();
        let err = accounts
            .set_api_keys(
                Uuid::new_v4(),
                &ApiKeyUpdate {
                    anthropic_api_key: Some("sk-ant-abcdefgh".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
