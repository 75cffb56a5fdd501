use crate::config::AppConfig;
use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let recognizer = state.recognizer();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "recognizer": {
            "provider": recognizer.name(),
            "endpoint": config.recognizer.endpoint,
            "session_time_limit_ms": config.streaming.session_time_limit_ms
        },
        "streams": stream_load(&config, &metrics)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();
    let config = state.get_config();

    let mut endpoints: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
            })
        })
        .collect();
    endpoints.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "http": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "streaming": {
            "active_streams": metrics.active_streams,
            "total_streams": metrics.total_streams,
            "total_restarts": metrics.total_restarts,
            "stream_errors": metrics.stream_errors,
            "max_concurrent_streams": config.performance.max_concurrent_streams
        },
        "endpoints": endpoints
    }))
}

fn stream_load(config: &AppConfig, metrics: &AppMetrics) -> serde_json::Value {
    let max = config.performance.max_concurrent_streams;
    let usage = if max > 0 {
        metrics.active_streams as f64 / max as f64
    } else {
        0.0
    };

    let status = if usage >= 1.0 {
        "at_capacity"
    } else if usage > 0.7 {
        "high_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "active": metrics.active_streams,
        "max": max,
        "usage_percent": (usage * 100.0).round(),
        "total_restarts": metrics.total_restarts,
        "stream_errors": metrics.stream_errors
    })
}
