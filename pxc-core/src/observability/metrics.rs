//! Core metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register all core metrics with descriptions.
pub fn register_core_metrics() {
    // Build metrics
    describe_histogram!("pxc_build_duration_seconds", "Template build duration (by outcome)");
    describe_counter!("pxc_build_failures_total", "Total number of build failures (by phase)");
    describe_counter!("pxc_build_steps_total", "Total number of build steps executed (by kind)");

    // Deployment metrics
    describe_histogram!("pxc_deploy_duration_seconds", "Stack deployment duration");
    describe_counter!("pxc_services_started_total", "Total number of service containers started");
    describe_counter!(
        "pxc_service_failures_total",
        "Total number of service deployment failures"
    );
    describe_counter!(
        "pxc_teardown_warnings_total",
        "Total number of non-fatal teardown failures"
    );

    // Container tool metrics
    describe_counter!("pxc_pct_commands_total", "Total pct invocations (by subcommand, status)");
}

pub fn record_build(duration_secs: f64, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    histogram!("pxc_build_duration_seconds", "outcome" => outcome).record(duration_secs);
}

pub fn record_build_failure(phase: &str) {
    counter!("pxc_build_failures_total", "phase" => phase.to_string()).increment(1);
}

pub fn record_step(kind: &str) {
    counter!("pxc_build_steps_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_deploy(duration_secs: f64) {
    histogram!("pxc_deploy_duration_seconds").record(duration_secs);
}

pub fn record_service_started() {
    counter!("pxc_services_started_total").increment(1);
}

pub fn record_service_failure(service: &str) {
    counter!("pxc_service_failures_total", "service" => service.to_string()).increment(1);
}

pub fn record_teardown_warning() {
    counter!("pxc_teardown_warnings_total").increment(1);
}

pub fn record_pct_command(subcommand: &str, success: bool) {
    let status = if success { "ok" } else { "error" };
    counter!(
        "pxc_pct_commands_total",
        "subcommand" => subcommand.to_string(),
        "status" => status
    )
    .increment(1);
}
