// ABOUTME: Metric helpers for discussion turns, streaming and actions
// ABOUTME: Thin wrappers over the metrics facade; no-ops unless a recorder is installed

use metrics::{counter, gauge, histogram};
use std::time::Duration;

pub fn record_turn_completed(agent_id: &str) {
    counter!("discussion_turns_total", "agent" => agent_id.to_string()).increment(1);
}

pub fn record_chunk() {
    counter!("discussion_stream_chunks_total").increment(1);
}

pub fn record_stream_duration(duration: Duration) {
    histogram!("discussion_stream_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_stream_cancelled() {
    counter!("discussion_streams_cancelled_total").increment(1);
}

pub fn set_active_streams(count: usize) {
    gauge!("discussion_streams_active").set(count as f64);
}

pub fn record_action(capability: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        "discussion_actions_total",
        "capability" => capability.to_string(),
        "status" => status
    )
    .increment(1);
}

pub fn record_round_limit() {
    counter!("discussion_round_limits_total").increment(1);
}

pub fn record_error(kind: &str) {
    counter!("discussion_errors_total", "kind" => kind.to_string()).increment(1);
}
