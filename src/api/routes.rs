use actix_web::{delete, get, patch, post, put, web, HttpResponse};
use uuid::Uuid;

use crate::accounts::{AccountService, ApiKeyUpdate};
use crate::api::middleware::AuthenticatedUser;
use crate::api::models::{
    ConversationListQuery, CreateConversationRequest, EditMessageRequest, FolderRequest, MessageListQuery,
    ModelInfo, ModelList, MoveFolderRequest, PaginationQuery, RegisterRequest, RegisterResponse, SendMessageRequest,
    SwitchModelRequest,
};
use crate::db::FolderFilter;
use crate::error::{AppError, Result};
use crate::folders::FolderService;
use crate::ledger::{ConversationLedger, NewConversation, Page};

/// Malformed ids read as missing entities.
fn parse_id(raw: &str, entity: &str) -> Result<Uuid> {
    raw.parse().map_err(|_| AppError::not_found(entity))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

// --- Users ---

#[post("")]
pub async fn register(
    accounts: web::Data<AccountService>,
    req: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let (user, access_token) = accounts.register(&req.email, &req.first_name, &req.last_name)?;
    Ok(HttpResponse::Created().json(RegisterResponse {
        user,
        access_token,
        token_type: "bearer",
    }))
}

#[get("/me")]
pub async fn me(accounts: web::Data<AccountService>, user: AuthenticatedUser) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(accounts.profile(user.id)?))
}

#[get("/api-keys")]
pub async fn get_api_keys(accounts: web::Data<AccountService>, user: AuthenticatedUser) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(accounts.masked_api_keys(user.id)?))
}

#[put("/api-keys")]
pub async fn set_api_keys(
    accounts: web::Data<AccountService>,
    user: AuthenticatedUser,
    req: web::Json<ApiKeyUpdate>,
) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(accounts.set_api_keys(user.id, &req)?))
}

// --- Models ---

#[get("")]
pub async fn list_models(ledger: web::Data<ConversationLedger>) -> Result<HttpResponse> {
    let models = ledger.registry().models().iter().map(ModelInfo::from).collect();
    Ok(HttpResponse::Ok().json(ModelList { models }))
}

// --- Folders ---

#[post("")]
pub async fn create_folder(
    folders: web::Data<FolderService>,
    user: AuthenticatedUser,
    req: web::Json<FolderRequest>,
) -> Result<HttpResponse> {
    Ok(HttpResponse::Created().json(folders.create(user.id, &req.name)?))
}

#[get("")]
pub async fn list_folders(
    folders: web::Data<FolderService>,
    user: AuthenticatedUser,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse> {
    let page = Page::new(query.skip, query.limit)?;
    Ok(HttpResponse::Ok().json(folders.list(user.id, page.skip, page.limit)?))
}

#[get("/{id}")]
pub async fn get_folder(
    folders: web::Data<FolderService>,
    user: AuthenticatedUser,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Folder")?;
    Ok(HttpResponse::Ok().json(folders.get(user.id, id)?))
}

#[patch("/{id}")]
pub async fn rename_folder(
    folders: web::Data<FolderService>,
    user: AuthenticatedUser,
    id: web::Path<String>,
    req: web::Json<FolderRequest>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Folder")?;
    Ok(HttpResponse::Ok().json(folders.rename(user.id, id, &req.name)?))
}

#[delete("/{id}")]
pub async fn delete_folder(
    folders: web::Data<FolderService>,
    user: AuthenticatedUser,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Folder")?;
    folders.delete(user.id, id)?;
    Ok(HttpResponse::NoContent().finish())
}

// --- Conversations ---

#[post("")]
pub async fn create_conversation(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    req: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let created = ledger
        .create_conversation(
            user.id,
            NewConversation {
                provider: req.provider,
                model_name: req.model_name,
                first_message: req.first_message,
                folder_id: req.folder_id,
            },
        )
        .await?;
    Ok(HttpResponse::Created().json(created))
}

#[get("")]
pub async fn list_conversations(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    query: web::Query<ConversationListQuery>,
) -> Result<HttpResponse> {
    let page = Page::new(query.skip, query.limit)?;
    let folder = query.folder_id.unwrap_or(FolderFilter::Any);
    Ok(HttpResponse::Ok().json(ledger.list_conversations(user.id, folder, page)?))
}

#[get("/{id}")]
pub async fn get_conversation(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Conversation")?;
    Ok(HttpResponse::Ok().json(ledger.get_conversation(user.id, id)?))
}

#[delete("/{id}")]
pub async fn delete_conversation(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Conversation")?;
    ledger.delete_conversation(user.id, id)?;
    Ok(HttpResponse::NoContent().finish())
}

#[patch("/{id}/model")]
pub async fn switch_model(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    id: web::Path<String>,
    req: web::Json<SwitchModelRequest>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Conversation")?;
    Ok(HttpResponse::Ok().json(ledger.switch_model(user.id, id, &req.model)?))
}

#[patch("/{id}/folder")]
pub async fn move_conversation(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    id: web::Path<String>,
    req: web::Json<MoveFolderRequest>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Conversation")?;
    Ok(HttpResponse::Ok().json(ledger.move_to_folder(user.id, id, req.folder_id)?))
}

#[post("/{id}/messages")]
pub async fn send_message(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    id: web::Path<String>,
    req: web::Json<SendMessageRequest>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Conversation")?;
    let sent = ledger
        .send_message(user.id, id, &req.content, req.context_limit_tokens)
        .await?;
    Ok(HttpResponse::Ok().json(sent))
}

#[get("/{id}/messages")]
pub async fn list_messages(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    id: web::Path<String>,
    query: web::Query<MessageListQuery>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Conversation")?;
    let page = Page::new(query.skip, query.limit)?;
    Ok(HttpResponse::Ok().json(ledger.list_messages(user.id, id, query.order, page)?))
}

// --- Messages ---

#[get("/{id}")]
pub async fn get_message(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Message")?;
    Ok(HttpResponse::Ok().json(ledger.get_message(user.id, id)?))
}

#[patch("/{id}")]
pub async fn edit_message(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    id: web::Path<String>,
    req: web::Json<EditMessageRequest>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Message")?;
    Ok(HttpResponse::Ok().json(ledger.edit_message(user.id, id, &req.content)?))
}

#[delete("/{id}")]
pub async fn delete_message(
    ledger: web::Data<ConversationLedger>,
    user: AuthenticatedUser,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&id, "Message")?;
    ledger.delete_message(user.id, id)?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .service(
            web::scope("/users")
                .service(register)
                .service(me)
                .service(get_api_keys)
                .service(set_api_keys),
        )
        .service(web::scope("/models").service(list_models))
        .service(
            web::scope("/folders")
                .service(create_folder)
                .service(list_folders)
                .service(get_folder)
                .service(rename_folder)
                .service(delete_folder),
        )
        .service(
            web::scope("/conversations")
                .service(create_conversation)
                .service(list_conversations)
                .service(get_conversation)
                .service(delete_conversation)
                .service(switch_model)
                .service(move_conversation)
                .service(send_message)
                .service(list_messages),
        )
        .service(
            web::scope("/messages")
                .service(get_message)
                .service(edit_message)
                .service(delete_message),
        );
}
