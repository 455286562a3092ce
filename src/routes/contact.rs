/**
 * Contact Routes
 * Public contact form plus the admin inbox
 */
use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use crate::auth::AdminUser;
use crate::db::models::{Contact, ContactStatus, NewContact};
use crate::error::{AppError, Result};
use crate::response::{ApiResponse, Pagination};
use crate::services::mailer::{contact_confirmation, contact_notification};
use crate::state::AppState;
use crate::store::ContactFilter;
use crate::validation::{
    contact_status, parse_checked, ListQuery, ObjectId, Payload, ValidatedJson, ValidatedQuery,
};

const DEFAULT_LIMIT: u32 = 10;

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[serde(default)]
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: String,

    #[serde(default)]
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(min = 5, max = 200, message = "Subject must be 5-200 characters"))]
    pub subject: String,

    #[serde(default)]
    #[validate(length(min = 10, max = 2000, message = "Message must be 10-2000 characters"))]
    pub message: String,
}

impl Payload for ContactRequest {}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    #[serde(default)]
    #[validate(custom(function = "contact_status"))]
    pub status: String,
}

impl Payload for StatusRequest {}

/// POST /contact - Store the message, then mail the admin and the sender
pub async fn submit(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ContactRequest>,
) -> Result<ApiResponse<Contact>> {
    let contact = state
        .store
        .insert_contact(NewContact {
            name: body.name,
            email: body.email.to_lowercase(),
            subject: body.subject,
            message: body.message,
        })
        .await?;
    tracing::info!(contact_id = %contact.id, "contact message received");

    state.send_in_background(contact_notification(&contact, &state.config.mail.admin_email));
    state.send_in_background(contact_confirmation(&contact));

    Ok(ApiResponse::created(
        "Message sent successfully! We will get back to you soon.",
        contact,
    ))
}

/// GET /contact - Inbox, optionally narrowed by status
pub async fn list_contacts(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<ApiResponse<Vec<Contact>>> {
    let filter = ContactFilter {
        status: query
            .status
            .as_deref()
            .map(parse_checked::<ContactStatus>)
            .transpose()?,
    };
    let page = query.page_request(DEFAULT_LIMIT);

    let (contacts, total) = state.store.list_contacts(&filter, page).await?;
    Ok(ApiResponse::paginated(
        "Contacts retrieved successfully",
        contacts,
        Pagination::new(page.page, page.limit, total),
    ))
}

/// GET /contact/{id} - Opening a new message marks it read
pub async fn get_contact(
    State(state): State<AppState>,
    _admin: AdminUser,
    ObjectId(id): ObjectId,
) -> Result<ApiResponse<Contact>> {
    let contact = state
        .store
        .open_contact(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Contact"))?;
    Ok(ApiResponse::ok("Contact retrieved successfully", contact))
}

/// PATCH /contact/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    ObjectId(id): ObjectId,
    ValidatedJson(body): ValidatedJson<StatusRequest>,
) -> Result<ApiResponse<Contact>> {
    let contact = state
        .store
        .set_contact_status(&id, parse_checked(&body.status)?)
        .await?
        .ok_or_else(|| AppError::not_found("Contact"))?;
    Ok(ApiResponse::ok("Contact status updated successfully", contact))
}

/// DELETE /contact/{id}
pub async fn delete_contact(
    State(state): State<AppState>,
    _admin: AdminUser,
    ObjectId(id): ObjectId,
) -> Result<ApiResponse<()>> {
    if !state.store.delete_contact(&id).await? {
        return Err(AppError::not_found("Contact"));
    }
    Ok(ApiResponse::message_only("Contact deleted successfully"))
}
