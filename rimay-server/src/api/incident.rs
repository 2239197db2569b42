//! Incident reporting, listing and the map view for the mobile app.

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use rimay_core::error::RimayError;
use rimay_services::incident::{UploadedImage, DATA_REQUIRED};

use crate::error::{ApiError, ApiResult};
use crate::extract::TokenUser;
use crate::state::AppState;

pub const REPORTED: &str = "Incidente registrado exitosamente";
pub const MARKED_READ: &str = "Notificación marcada como leída";

fn report_failed(cause: impl std::fmt::Display) -> ApiError {
    error!("Error al registrar incidente: {cause}");
    ApiError::error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Error al registrar incidente: {cause}"),
    )
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("multipart/form-data"))
}

/// The `data` field and optional image of a report, from a multipart form
/// or a JSON body.
async fn read_report(request: Request) -> ApiResult<(Option<String>, Option<UploadedImage>)> {
    if is_multipart(&request) {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::error(StatusCode::BAD_REQUEST, e.to_string()))?;
        let mut data = None;
        let mut image = None;
        while let Some(field) = multipart.next_field().await.map_err(report_failed)? {
            match field.name() {
                Some("data") => data = Some(field.text().await.map_err(report_failed)?),
                Some("image") => {
                    let file_name = field.file_name().unwrap_or("image").to_string();
                    let bytes = field.bytes().await.map_err(report_failed)?;
                    if bytes.is_empty() {
                        debug!("empty image part ignored");
                    } else {
                        info!("image received: {file_name} - {} bytes", bytes.len());
                        image = Some(UploadedImage { file_name, bytes: bytes.to_vec() });
                    }
                }
                _ => {}
            }
        }
        return Ok((data, image));
    }

    let bytes = Bytes::from_request(request, &())
        .await
        .map_err(|e| ApiError::error(StatusCode::BAD_REQUEST, e.to_string()))?;
    if bytes.is_empty() {
        return Ok((None, None));
    }
    let body: Value = serde_json::from_slice(&bytes).map_err(report_failed)?;
    let data = match body.get("data") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };
    Ok((data, None))
}

/// `POST /api/incident/create`
pub async fn create(
    State(state): State<AppState>,
    user: TokenUser,
    request: Request,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id()?;
    let (data, image) = read_report(request).await?;

    match state.registry.incident.create_from_json(user_id, data.as_deref(), image) {
        Ok(incident) => Ok((
            StatusCode::CREATED,
            Json(json!({ "message": REPORTED, "incident_id": incident.id })),
        )),
        Err(RimayError::Validation(errors)) if errors.contains("data") => {
            tracing::warn!("report from user {user_id} without data");
            Err(ApiError::error(StatusCode::BAD_REQUEST, DATA_REQUIRED))
        }
        Err(e) => Err(report_failed(e)),
    }
}

/// `GET /api/incident/list`
pub async fn list(State(state): State<AppState>, user: TokenUser) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.registry.incident.list_recent(user.id()?)?))
}

/// `GET /api/incident/map`
pub async fn map(State(state): State<AppState>, user: TokenUser) -> ApiResult<impl IntoResponse> {
    match state.registry.incident.map_incidents(user.id()?) {
        Ok(view) => Ok(Json(view)),
        Err(RimayError::Validation(errors)) => Err(ApiError::error(
            StatusCode::BAD_REQUEST,
            errors.first_message().unwrap_or_default(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// `POST /api/incident/{id}/read`
pub async fn mark_read(
    State(state): State<AppState>,
    user: TokenUser,
    Path(incident_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    match state.registry.incident.mark_read(user.id()?, incident_id) {
        Ok(()) => Ok(Json(json!({ "message": MARKED_READ }))),
        Err(RimayError::NotFound(msg)) => Err(ApiError::error(StatusCode::NOT_FOUND, msg)),
        Err(e) => Err(e.into()),
    }
}
