use crate::config::AppConfig;
use crate::{error::AppError, state::AppState};
use actix_web::{http::header::ContentType, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct ConfigQuery {
    /// `json` (default) or `toml`
    #[serde(default)]
    pub format: Option<String>,
}

/// Current configuration with secrets masked.
fn redacted(mut config: AppConfig) -> AppConfig {
    if !config.recognizer.api_key.is_empty() {
        config.recognizer.api_key = "***".to_string();
    }
    config
}

pub async fn get_config(
    state: web::Data<AppState>,
    query: web::Query<ConfigQuery>,
) -> Result<HttpResponse, AppError> {
    let config = redacted(state.get_config());

    match query.format.as_deref() {
        None | Some("json") => Ok(HttpResponse::Ok().json(json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "config": config
        }))),
        Some("toml") => {
            let rendered = toml::to_string_pretty(&config)?;
            Ok(HttpResponse::Ok()
                .content_type(ContentType::plaintext())
                .body(rendered))
        }
        Some(other) => Err(AppError::BadRequest(format!(
            "Unsupported format '{}', expected json or toml",
            other
        ))),
    }
}

/// Partial update, e.g. `{"streaming": {"restart_pause_ms": 250}}`.
///
/// Streams already running keep the settings they started with.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut updated = state.get_config();
    updated
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(updated.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": redacted(updated)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::scripted::ScriptedRecognizer;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn state_with_key() -> web::Data<AppState> {
        let mut config = AppConfig::default();
        config.recognizer.api_key = "secret-key".to_string();
        web::Data::new(AppState::new(config, Arc::new(ScriptedRecognizer::default())))
    }

    #[actix_web::test]
    async fn test_get_config_masks_api_key() {
        let app = test::init_service(
            App::new()
                .app_data(state_with_key())
                .route("/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["config"]["recognizer"]["api_key"], "***");
        assert_eq!(body["config"]["streaming"]["session_time_limit_ms"], 240_000);

        let req = test::TestRequest::get().uri("/config?format=toml").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("[performance]"));
        assert!(!text.contains("secret-key"));

        let req = test::TestRequest::get().uri("/config?format=yaml").to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 400);
    }

    #[actix_web::test]
    async fn test_update_config() {
        let state = state_with_key();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"streaming": {"restart_pause_ms": 250}}))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert!(response.status().is_success());
        assert_eq!(state.get_config().streaming.restart_pause_ms, 250);
        // Recognizer credentials survive the round trip unmasked
        assert_eq!(state.get_config().recognizer.api_key, "secret-key");

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"performance": {"max_concurrent_streams": 0}}))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 400);
        assert_eq!(state.get_config().performance.max_concurrent_streams, 10);
    }
}
