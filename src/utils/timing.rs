use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::info;

/// Wall-clock record for one whole capture run, emitted on the
/// `booth.timing` target alongside the per-provider timings.
#[derive(Debug)]
pub struct RunTimer {
    profession: String,
    age: i64,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    completed: bool,
}

impl RunTimer {
    pub fn start(profession: &str, age: i64) -> Self {
        let timer = RunTimer {
            profession: profession.to_string(),
            age,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            completed: false,
        };
        info!(
            target: "booth.timing",
            "event=capture_started profession={:?} age={} started_at={}",
            timer.profession,
            timer.age,
            timer.started_at.to_rfc3339()
        );
        timer
    }

    pub fn complete(&mut self, status: &str, detail: Option<String>) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "booth.timing",
            "event=capture_completed profession={:?} age={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.profession,
            self.age,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            status,
            detail.unwrap_or_default()
        );
    }
}

pub async fn log_provider_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    call: F,
) -> Result<T, crate::error::CaptureError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, crate::error::CaptureError>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    info!(
        target: "booth.timing",
        "event=provider_request provider={} model={} operation={} started_at={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339()
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "booth.timing",
        "event=provider_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status
    );

    result
}
