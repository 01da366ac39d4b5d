use chrono::{DateTime, Utc};

use crate::config::Env;

/// Per-run context threaded into every selector and applier.
#[derive(Clone, Debug)]
pub struct JobContext {
    pub job_id: &'static str,
    pub env: Env,
    pub run_id: String,
    pub job_start_at: DateTime<Utc>,
    pub dry_run: bool,
}

pub fn build_context(
    job_id: &'static str,
    env: Env,
    run_id: Option<String>,
    dry_run: bool,
) -> JobContext {
    JobContext {
        job_id,
        env,
        run_id: run_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
        job_start_at: Utc::now(),
        dry_run,
    }
}

/// `t` truncated to 00:00:00.000 UTC.
pub fn today_start_utc(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight always exists")
        .and_utc()
}
