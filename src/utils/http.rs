use std::time::Duration;

use reqwest::Client;

/// Each provider client owns a `Client` built with its own request timeout,
/// so a hung remote call cannot block a run past the configured deadline.
pub fn build_http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("Failed to build HTTP client")
}
