use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        multipart::MultipartRejection,
        rejection::FormRejection,
        DefaultBodyLimit, FromRequestParts, Multipart, Query, Request, State,
    },
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};

use crate::auth::{bearer_token, normalize_filename};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::*;

/// Multipart file field names accepted for document uploads
const DOCUMENT_FIELDS: &[&str] = &["document", "pdf", "file"];

pub fn create_router(state: Arc<AppState>) -> Router {
    // Multipart framing on top of the document itself
    let body_limit = state.config.max_document_bytes.saturating_add(64 * 1024);

    Router::new()
        .route("/health", get(health))
        // Identity & sessions
        .route("/register", post(register))
        .route("/token", post(issue_token))
        // Verification
        .route("/verify-text", post(verify_text))
        .route("/verify-document", post(verify_document))
        .route("/verify-pdf", post(verify_document))
        // Relay
        .route("/relay-text", post(relay_text))
        .route("/relay-document", post(relay_document))
        .route("/relay-pdf", post(relay_document))
        .route("/inbox", get(inbox))
        // Audit trail
        .route("/audit", get(my_audit_trail))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            audit_requests,
        ))
        .with_state(state)
}

// ============ Audit Middleware ============

/// Record exactly one audit entry per request once its status is known
async fn audit_requests(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let actor = state.resolve_actor(
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    );

    let res = next.run(req).await;

    let status = res.status().as_u16();
    if let Err(e) = state.audit.record(&method, &path, actor.clone(), status).await {
        tracing::error!(
            "Failed to record audit entry for {} {} by {} ({}): {}",
            method,
            path,
            actor,
            status,
            e
        );
    }

    res
}

// ============ Auth Helpers ============

fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .filter(|t| !t.is_empty())
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<Username> {
    let token = extract_token(headers).ok_or(ApiError::Unauthorized)?;
    state.authenticate(token)
}

/// Subject of a validated bearer session
///
/// Resolved from the headers alone, before any body extractor runs.
pub struct AuthUser(pub Username);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(state, &parts.headers).map(AuthUser)
    }
}

// ============ Body Helpers ============

fn form_body<T>(form: Result<Form<T>, FormRejection>) -> ApiResult<T> {
    form.map(|Form(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn multipart_body(multipart: Result<Multipart, MultipartRejection>) -> ApiResult<Multipart> {
    multipart.map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

// ============ Multipart Helpers ============

struct UploadedFile {
    filename: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let filename = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read field {}: {}", name, e)))?;

            if filename.is_some() {
                form.files.insert(
                    name,
                    UploadedFile {
                        filename,
                        bytes: bytes.to_vec(),
                    },
                );
            } else {
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|_| ApiError::bad_request(format!("Field {} must be text", name)))?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    fn field(&self, name: &str) -> ApiResult<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ApiError::bad_request(format!("Missing form field: {}", name)))
    }

    /// A file part, also accepting a plain text part under the same name
    fn take_file(&mut self, names: &[&str]) -> ApiResult<UploadedFile> {
        for name in names {
            if let Some(file) = self.files.remove(*name) {
                return Ok(file);
            }
            if let Some(text) = self.fields.remove(*name) {
                return Ok(UploadedFile {
                    filename: None,
                    bytes: text.into_bytes(),
                });
            }
        }
        Err(ApiError::bad_request(format!(
            "Missing file field: {}",
            names.join(" or ")
        )))
    }
}

// ============ Health ============

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.health().await))
}

// ============ Identity Endpoints ============

async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = MultipartForm::read(multipart_body(multipart)?).await?;
    let username = form.field("username")?.to_string();
    let pubkey = form.take_file(&["pubkey"])?;

    let identity = state.register(&username, &pubkey.bytes).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(RegisterResponse {
            message: "Registered".into(),
            identity,
        })),
    ))
}

async fn issue_token(
    State(state): State<Arc<AppState>>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = form_body(form)?;
    let token = state.issue_session(&req.username).await?;
    Ok(Json(ApiResponse::success(token)))
}

// ============ Verification Endpoints ============

async fn verify_text(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    form: Result<Form<VerifyTextRequest>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = form_body(form)?;
    let resp = state
        .verify_payload(&user, &req.sender, req.message.as_bytes(), &req.signature_hex)
        .await?;
    Ok(Json(ApiResponse::success(resp)))
}

async fn verify_document(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = MultipartForm::read(multipart_body(multipart)?).await?;
    let document = form.take_file(DOCUMENT_FIELDS)?;
    let sender = form.field("sender")?;
    let signature_hex = form.field("signature_hex")?;

    let resp = state
        .verify_payload(&user, sender, &document.bytes, signature_hex)
        .await?;
    Ok(Json(ApiResponse::success(resp)))
}

// ============ Relay Endpoints ============

async fn relay_text(
    State(state): State<Arc<AppState>>,
    AuthUser(sender): AuthUser,
    form: Result<Form<RelayTextRequest>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = form_body(form)?;
    let receipt = state
        .relay(
            &sender,
            &req.to,
            MailboxBody::Text {
                message: req.message,
            },
            &req.signature_hex,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(receipt))))
}

async fn relay_document(
    State(state): State<Arc<AppState>>,
    AuthUser(sender): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = MultipartForm::read(multipart_body(multipart)?).await?;
    let document = form.take_file(DOCUMENT_FIELDS)?;
    let to = form.field("to")?;
    let signature_hex = form.field("signature_hex")?;

    let body = MailboxBody::Document {
        filename: normalize_filename(document.filename.as_deref()),
        content: document.bytes,
    };
    let receipt = state.relay(&sender, to, body, signature_hex).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(receipt))))
}

async fn inbox(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.inbox(&owner).await;
    Ok(Json(ApiResponse::success(entries)))
}

// ============ Audit Trail ============

async fn my_audit_trail(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(50).min(500);
    let offset = query.offset.unwrap_or(0);
    let entries = state.audit.by_actor(&user, limit, offset).await;
    Ok(Json(ApiResponse::success(entries)))
}
