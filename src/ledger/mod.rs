//! Conversation and message bookkeeping.
//!
//! Every mutation that touches token counts keeps the conversation aggregate
//! (`message_count`, `total_tokens_used`, context metrics) in step with the
//! message rows. Provider calls happen before anything is written, so a failed
//! call leaves no trace. Aggregate writes are compare-and-swap on the
//! conversation's `version`.

use std::sync::Arc;

use chrono::Utc;
use duckdb::Connection;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chat::ChatDispatcher;
use crate::config::ChatConfig;
use crate::context::{compute_metrics, select_within_budget};
use crate::db::{lock, with_transaction, Conversation, DbPool, DbService, FolderFilter, Message, SortOrder};
use crate::error::{AppError, Result};
use crate::folders::owned_folder;
use crate::llm::models::{Message as LlmMessage, Provider, Role};
use crate::llm::registry::ModelRegistry;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Offset pagination shared by every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(skip: Option<i64>, limit: Option<i64>) -> Result<Self> {
        let skip = skip.unwrap_or(0);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if skip < 0 {
            return Err(AppError::Validation("skip must be >= 0".to_string()));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        Ok(Self { skip, limit })
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewConversation {
    pub provider: Provider,
    pub model_name: Option<String>,
    pub first_message: String,
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedConversation {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentMessage {
    pub message: Message,
    pub conversation: Conversation,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
    pub messages: Vec<Message>,
}

pub struct ConversationLedger {
    pool: DbPool,
    registry: Arc<ModelRegistry>,
    dispatcher: Arc<ChatDispatcher>,
    chat: ChatConfig,
    title_model: String,
}

fn owned_conversation(conn: &Connection, user_id: Uuid, id: Uuid) -> Result<Conversation> {
    let conversation =
        DbService::get_conversation(conn, id)?.ok_or_else(|| AppError::not_found("Conversation"))?;
    if conversation.user_id != user_id {
        return Err(AppError::Forbidden(
            "You don't have permission to access this conversation".to_string(),
        ));
    }
    Ok(conversation)
}

fn owned_message(conn: &Connection, user_id: Uuid, id: Uuid) -> Result<Message> {
    let message = DbService::get_message(conn, id)?.ok_or_else(|| AppError::not_found("Message"))?;
    if message.user_id != user_id {
        return Err(AppError::Forbidden(
            "You don't have permission to access this message".to_string(),
        ));
    }
    Ok(message)
}

fn store_aggregate(conn: &Connection, conversation: &Conversation) -> Result<()> {
    if !DbService::update_conversation(conn, conversation)? {
        return Err(AppError::Conflict(
            "Conversation was modified concurrently, please retry".to_string(),
        ));
    }
    Ok(())
}

impl ConversationLedger {
    pub fn new(
        pool: DbPool,
        registry: Arc<ModelRegistry>,
        dispatcher: Arc<ChatDispatcher>,
        chat: ChatConfig,
        title_model: String,
    ) -> Self {
        Self {
            pool,
            registry,
            dispatcher,
            chat,
            title_model,
        }
    }

    /// The configured title model when it belongs to `provider`, otherwise
    /// that provider's default model.
    fn title_model_for(&self, provider: Provider) -> &str {
        match self.registry.lookup(&self.title_model) {
            Some(descriptor) if descriptor.provider == provider => &self.title_model,
            _ => provider.default_model(),
        }
    }

    fn check_model(&self, provider: Provider, model_name: &str) -> Result<()> {
        match self.registry.lookup(model_name) {
            Some(descriptor) if descriptor.provider != provider => Err(AppError::Validation(format!(
                "Model {model_name} is not served by {provider}"
            ))),
            Some(_) => Ok(()),
            None => {
                warn!(
                    "Model {} is not in the registry, assuming a {} token window",
                    model_name,
                    self.registry.context_limit(model_name)
                );
                Ok(())
            }
        }
    }

    /// Titles the conversation, dispatches the first message and persists the
    /// conversation with both turns in one transaction.
    pub async fn create_conversation(&self, user_id: Uuid, request: NewConversation) -> Result<CreatedConversation> {
        let content = request.first_message.trim();
        if content.is_empty() {
            return Err(AppError::Validation("first_message must not be empty".to_string()));
        }
        let provider = request.provider;
        let model_name = request
            .model_name
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());
        self.check_model(provider, &model_name)?;

        if let Some(folder_id) = request.folder_id {
            let conn = lock(&self.pool)?;
            owned_folder(&conn, user_id, folder_id)?;
        }

        let title = self
            .dispatcher
            .generate_title(user_id, provider, self.title_model_for(provider), content)
            .await;

        let completion = self
            .dispatcher
            .dispatch(user_id, provider, vec![LlmMessage::user(content)], &model_name)
            .await?;

        let created_at = Utc::now();
        let conversation_id = Uuid::new_v4();
        let user_message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            user_id,
            role: Role::User,
            content: content.to_string(),
            tokens_used: completion.input_tokens,
            sequence_number: 0,
            created_at,
        };
        let replied_at = Utc::now();
        let assistant_message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            user_id,
            role: Role::Assistant,
            content: completion.content,
            tokens_used: completion.output_tokens,
            sequence_number: 1,
            created_at: replied_at,
        };

        let total_tokens_used = completion.input_tokens + completion.output_tokens;
        let conversation = Conversation {
            id: conversation_id,
            user_id,
            title,
            provider,
            model_name: model_name.clone(),
            message_count: 2,
            total_tokens_used,
            metrics: compute_metrics(&self.registry, total_tokens_used, &model_name),
            folder_id: request.folder_id,
            version: 0,
            created_at,
            updated_at: replied_at,
        };

        {
            let conn = lock(&self.pool)?;
            with_transaction(&conn, |tx| -> Result<()> {
                // The folder may have gone away while the provider was working.
                if let Some(folder_id) = conversation.folder_id {
                    owned_folder(tx, user_id, folder_id)?;
                }
                DbService::insert_conversation(tx, &conversation)?;
                DbService::insert_message(tx, &user_message)?;
                DbService::insert_message(tx, &assistant_message)?;
                Ok(())
            })?;
        }

        info!(
            "Created conversation {} for user {} ({}/{}, {} tokens)",
            conversation.id, user_id, provider, model_name, total_tokens_used
        );

        Ok(CreatedConversation {
            conversation,
            messages: vec![user_message, assistant_message],
        })
    }

    pub fn list_conversations(&self, user_id: Uuid, folder: FolderFilter, page: Page) -> Result<Vec<Conversation>> {
        let conn = lock(&self.pool)?;
        if let FolderFilter::In(folder_id) = folder {
            owned_folder(&conn, user_id, folder_id)?;
        }
        Ok(DbService::list_conversations(&conn, user_id, folder, page.skip, page.limit)?)
    }

    pub fn get_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Conversation> {
        let conn = lock(&self.pool)?;
        owned_conversation(&conn, user_id, conversation_id)
    }

    /// Sends `content` with as much recent history as fits the budget, then
    /// appends the user turn and the reply.
    pub async fn send_message(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        content: &str,
        context_limit_tokens: Option<i64>,
    ) -> Result<SentMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("content must not be empty".to_string()));
        }
        let context_limit = context_limit_tokens.unwrap_or(self.chat.default_context_limit_tokens);
        if !(self.chat.min_context_limit_tokens..=self.chat.max_context_limit_tokens).contains(&context_limit) {
            return Err(AppError::Validation(format!(
                "context_limit_tokens must be between {} and {}",
                self.chat.min_context_limit_tokens, self.chat.max_context_limit_tokens
            )));
        }

        let (snapshot, history) = {
            let conn = lock(&self.pool)?;
            let conversation = owned_conversation(&conn, user_id, conversation_id)?;
            let history = DbService::conversation_history(&conn, conversation_id)?;
            (conversation, history)
        };

        let mut turns: Vec<LlmMessage> = history
            .into_iter()
            .map(|m| LlmMessage::new(m.role, m.content))
            .collect();
        turns.push(LlmMessage::user(content));

        let budget = (context_limit - self.chat.system_prompt_token_reserve).max(0);
        let selected = select_within_budget(&turns, budget, &snapshot.model_name);
        info!(
            "Conversation {}: sending {} of {} message(s) within a {} token budget",
            conversation_id,
            selected.len(),
            turns.len(),
            budget
        );

        let completion = self
            .dispatcher
            .dispatch(user_id, snapshot.provider, selected, &snapshot.model_name)
            .await?;

        let sent_at = Utc::now();
        let user_message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            user_id,
            role: Role::User,
            content: content.to_string(),
            tokens_used: completion.input_tokens,
            sequence_number: snapshot.message_count,
            created_at: sent_at,
        };
        let replied_at = Utc::now();
        let assistant_message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            user_id,
            role: Role::Assistant,
            content: completion.content,
            tokens_used: completion.output_tokens,
            sequence_number: snapshot.message_count + 1,
            created_at: replied_at,
        };

        let mut conversation = snapshot;
        conversation.message_count += 2;
        conversation.total_tokens_used += completion.input_tokens + completion.output_tokens;
        conversation.metrics =
            compute_metrics(&self.registry, conversation.total_tokens_used, &conversation.model_name);
        conversation.updated_at = replied_at;

        {
            let conn = lock(&self.pool)?;
            with_transaction(&conn, |tx| -> Result<()> {
                DbService::insert_message(tx, &user_message)?;
                DbService::insert_message(tx, &assistant_message)?;
                store_aggregate(tx, &conversation)
            })?;
        }
        conversation.version += 1;

        info!(
            "Conversation {}: +{} input, +{} output tokens, total {}",
            conversation_id, completion.input_tokens, completion.output_tokens, conversation.total_tokens_used
        );

        Ok(SentMessage {
            message: assistant_message,
            conversation,
        })
    }

    pub fn list_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        order: SortOrder,
        page: Page,
    ) -> Result<MessagePage> {
        let conn = lock(&self.pool)?;
        owned_conversation(&conn, user_id, conversation_id)?;

        let total = DbService::count_messages(&conn, conversation_id)?;
        let messages = DbService::list_messages(&conn, conversation_id, order, page.skip, page.limit)?;

        Ok(MessagePage {
            total,
            skip: page.skip,
            limit: page.limit,
            messages,
        })
    }

    pub fn get_message(&self, user_id: Uuid, message_id: Uuid) -> Result<Message> {
        let conn = lock(&self.pool)?;
        owned_message(&conn, user_id, message_id)
    }

    /// Replaces the content of a user message. Token counts, sequence numbers
    /// and the conversation aggregate are left as they were.
    pub fn edit_message(&self, user_id: Uuid, message_id: Uuid, content: &str) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("content must not be empty".to_string()));
        }

        let conn = lock(&self.pool)?;
        let mut message = owned_message(&conn, user_id, message_id)?;
        if message.role != Role::User {
            return Err(AppError::Validation("Only user messages can be edited".to_string()));
        }

        DbService::update_message_content(&conn, message_id, content)?;
        message.content = content.to_string();

        info!("Edited message {} in conversation {}", message_id, message.conversation_id);
        Ok(message)
    }

    /// Removes one message and closes the gap in the sequence. The token total
    /// is not recomputed.
    pub fn delete_message(&self, user_id: Uuid, message_id: Uuid) -> Result<()> {
        let conn = lock(&self.pool)?;
        let message = owned_message(&conn, user_id, message_id)?;

        with_transaction(&conn, |tx| -> Result<()> {
            let mut conversation = DbService::get_conversation(tx, message.conversation_id)?
                .ok_or_else(|| AppError::not_found("Conversation"))?;

            DbService::delete_message(tx, message_id)?;
            DbService::close_sequence_gap(tx, message.conversation_id, message.sequence_number)?;

            if conversation.message_count > 0 {
                conversation.message_count -= 1;
                store_aggregate(tx, &conversation)?;
            }
            Ok(())
        })?;

        info!(
            "Deleted message {} (sequence {}) from conversation {}",
            message_id, message.sequence_number, message.conversation_id
        );
        Ok(())
    }

    /// Points the conversation at another model of the same provider and
    /// re-derives its metrics from the unchanged token total.
    pub fn switch_model(&self, user_id: Uuid, conversation_id: Uuid, model_name: &str) -> Result<Conversation> {
        let descriptor = self
            .registry
            .lookup(model_name)
            .ok_or_else(|| AppError::Validation(format!("Invalid model name: {model_name}")))?;

        let conn = lock(&self.pool)?;
        let mut conversation = owned_conversation(&conn, user_id, conversation_id)?;
        if descriptor.provider != conversation.provider {
            return Err(AppError::Validation(format!(
                "Model {model_name} is not served by {}",
                conversation.provider
            )));
        }

        let previous = std::mem::replace(&mut conversation.model_name, model_name.to_string());
        conversation.metrics = compute_metrics(&self.registry, conversation.total_tokens_used, model_name);
        conversation.updated_at = Utc::now();
        store_aggregate(&conn, &conversation)?;
        conversation.version += 1;

        info!(
            "Conversation {} switched from {} to {} ({} of {} tokens used)",
            conversation_id,
            previous,
            model_name,
            conversation.total_tokens_used,
            conversation.metrics.total_context_size
        );
        Ok(conversation)
    }

    /// Files the conversation under `folder_id`, or unfiles it with `None`.
    pub fn move_to_folder(&self, user_id: Uuid, conversation_id: Uuid, folder_id: Option<Uuid>) -> Result<Conversation> {
        let conn = lock(&self.pool)?;
        let mut conversation = owned_conversation(&conn, user_id, conversation_id)?;
        if let Some(folder_id) = folder_id {
            owned_folder(&conn, user_id, folder_id)?;
        }

        conversation.folder_id = folder_id;
        conversation.updated_at = Utc::now();
        store_aggregate(&conn, &conversation)?;
        conversation.version += 1;
        Ok(conversation)
    }

    /// Deletes the conversation and all of its messages. Its folder is left
    /// alone.
    pub fn delete_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> Result<()> {
        let conn = lock(&self.pool)?;
        owned_conversation(&conn, user_id, conversation_id)?;

        let removed = with_transaction(&conn, |tx| -> Result<usize> {
            let removed = DbService::delete_messages_for_conversation(tx, conversation_id)?;
            DbService::delete_conversation(tx, conversation_id)?;
            Ok(removed)
        })?;

        info!("Deleted conversation {} with {} message(s)", conversation_id, removed);
        Ok(())
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }
}
