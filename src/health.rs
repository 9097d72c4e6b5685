use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let metrics = state.get_metrics_snapshot();
    let config = &state.config;
    let job_counts = state.db.job_counts()?;
    let queued = job_counts.get("pending").copied().unwrap_or(0);
    let running = job_counts.get("running").copied().unwrap_or(0);

    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate()
        },
        "memory": get_memory_info(),
        "jobs": job_counts,
        "models": {
            "engines": state.engines.names(),
            "loaded": state.lifecycle.loaded_names()
        },
        "system": get_system_status(state.scheduler.worker_count(), queued, running)
    })))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info(),
        "pipeline": {
            "worker_count": state.scheduler.worker_count(),
            "transcription_timeout_secs": state.config.scheduler.transcription_timeout_secs,
            "jobs_total": state.store().list_jobs()?.len(),
            "results_total": state.store().list_results()?.len()
        }
    })))
}

#[cfg(target_os = "linux")]
fn get_memory_info() -> serde_json::Value {
    let status = match std::fs::read_to_string(format!("/proc/{}/status", std::process::id())) {
        Ok(status) => status,
        Err(_) => return json!({ "available": false }),
    };

    let read_kb = |key: &str| {
        status
            .lines()
            .find(|line| line.starts_with(key))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .unwrap_or(0)
            * 1024
    };

    json!({
        "resident_memory_bytes": read_kb("VmRSS:"),
        "virtual_memory_bytes": read_kb("VmSize:"),
        "available": true
    })
}

#[cfg(not(target_os = "linux"))]
fn get_memory_info() -> serde_json::Value {
    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

/// Load is judged by how far the queue has grown past the worker pool.
fn get_system_status(worker_count: usize, queued: usize, running: usize) -> serde_json::Value {
    let backlog = queued as f64 / worker_count.max(1) as f64;

    let status = if backlog > 10.0 {
        "high_load"
    } else if backlog > 3.0 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "workers": worker_count,
        "running_jobs": running,
        "queued_jobs": queued,
        "load_warnings": if backlog > 10.0 {
            vec!["Job backlog is large - consider raising scheduler.worker_count"]
        } else {
            vec![]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_status_thresholds() {
        assert_eq!(get_system_status(2, 0, 2)["status"], "normal");
        assert_eq!(get_system_status(2, 8, 2)["status"], "moderate_load");
        assert_eq!(get_system_status(2, 30, 2)["status"], "high_load");
    }
}
