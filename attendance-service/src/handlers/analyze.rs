use crate::services::metrics;
use crate::startup::AppState;
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use service_core::error::AppError;

pub const IMAGE_FIELD: &str = "image";
pub const NO_IMAGE_MESSAGE: &str = "No image file provided";
pub const NO_SELECTED_FILE_MESSAGE: &str = "No selected file";
pub const METHOD_NOT_ALLOWED_MESSAGE: &str =
    "Method Not Allowed. Ensure you are sending a POST request.";

/// The `image` file part of an analyze request.
struct Upload {
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
}

/// `POST /api/analyze`
///
/// Checks, in order: provider configured, `image` file part present,
/// filename non-empty. Only then is the image decoded and sent to the model.
/// The cleaned model answer is returned as-is with a JSON content type.
pub async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    if let Err(err) = state.analyzer.ensure_configured() {
        metrics::record_analyze_outcome(err.outcome());
        tracing::error!("Rejecting analysis request: GEMINI_API_KEY is not configured");
        return Err(err.into());
    }

    let upload = read_image_field(multipart).await.map_err(|err| {
        metrics::record_analyze_outcome("bad_request");
        tracing::warn!(error = %err, "Rejected analysis upload");
        err
    })?;

    tracing::info!(
        filename = %upload.file_name,
        content_type = ?upload.content_type,
        size = upload.data.len(),
        "Analyzing uploaded screenshot"
    );

    match state.analyzer.analyze(&upload.data).await {
        Ok(body) => {
            metrics::record_analyze_outcome("success");
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response())
        }
        Err(err) => {
            metrics::record_analyze_outcome(err.outcome());
            tracing::error!(
                error = ?err,
                filename = %upload.file_name,
                "Error processing image"
            );
            Err(err.into())
        }
    }
}

/// Any method other than POST (preflights are answered by the CORS layer).
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed(METHOD_NOT_ALLOWED_MESSAGE.to_string())
}

/// Find the first `image` part that carries a filename.
///
/// A non-multipart body, or an `image` part sent as a plain form value, is
/// treated the same as no image at all.
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Upload, AppError> {
    let Ok(mut multipart) = multipart else {
        return Err(AppError::BadRequest(NO_IMAGE_MESSAGE.to_string()));
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        if file_name.is_empty() {
            return Err(AppError::BadRequest(NO_SELECTED_FILE_MESSAGE.to_string()));
        }

        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;

        return Ok(Upload {
            file_name,
            content_type,
            data,
        });
    }

    Err(AppError::BadRequest(NO_IMAGE_MESSAGE.to_string()))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}
