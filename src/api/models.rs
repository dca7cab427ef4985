use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::db::{FolderFilter, SortOrder, User};
use crate::llm::models::Provider;
use crate::llm::registry::ModelDescriptor;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct FolderRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub provider: Provider,
    pub model_name: Option<String>,
    pub first_message: String,
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    pub context_limit_tokens: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SwitchModelRequest {
    pub model: String,
}

/// `{"folder_id": null}` unfiles the conversation.
#[derive(Debug, Deserialize)]
pub struct MoveFolderRequest {
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default, deserialize_with = "folder_filter")]
    pub folder_id: Option<FolderFilter>,
}

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub order: SortOrder,
}

/// `null` selects unfiled conversations, anything else must be a folder id.
fn folder_filter<'de, D>(deserializer: D) -> Result<Option<FolderFilter>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if raw.eq_ignore_ascii_case("null") {
        return Ok(Some(FolderFilter::Unfiled));
    }
    raw.parse::<Uuid>()
        .map(|id| Some(FolderFilter::In(id)))
        .map_err(|_| serde::de::Error::custom("Invalid folder_id format"))
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub context_window: i64,
    pub cost_per_1k_input: f64,
    pub cost_per_1k_output: f64,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub models: Vec<ModelInfo>,
}

impl From<&ModelDescriptor> for ModelInfo {
    fn from(descriptor: &ModelDescriptor) -> Self {
        Self {
            id: descriptor.name.clone(),
            name: descriptor.name.clone(),
            provider: descriptor.provider,
            context_window: descriptor.context_window,
            cost_per_1k_input: descriptor.cost_per_1k_input,
            cost_per_1k_output: descriptor.cost_per_1k_output,
        }
    }
}
