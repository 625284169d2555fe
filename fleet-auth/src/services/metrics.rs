//! Authentication counters, exported through the process-wide Prometheus recorder.

pub fn record_login(outcome: &'static str) {
    metrics::counter!("auth_login_total", "outcome" => outcome).increment(1);
}

pub fn record_token_validation(outcome: &'static str) {
    metrics::counter!("auth_token_validation_total", "outcome" => outcome).increment(1);
}

pub fn record_sso_callback(outcome: &'static str) {
    metrics::counter!("auth_sso_callback_total", "outcome" => outcome).increment(1);
}
