use chrono::{DateTime, Utc};

/// Wall-clock "now", isolated behind a function so tests can hold a fixed
/// instant (the teacher's scheduler threads `now_ms` through call sites for
/// the same reason, see `backend/src/scheduler/scheduler.rs::on_tick`).
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn now_ms() -> u64 {
    now().timestamp_millis().max(0) as u64
}
