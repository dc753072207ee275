use crate::startup::AppState;
use askama::Template;
use axum::{extract::State, response::IntoResponse};

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub model: String,
}

/// `GET /`, served whether or not the API key is configured.
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    IndexTemplate {
        model: state.config.gemini.model.clone(),
    }
}
