use std::sync::OnceLock;

use tracing::debug;

use crate::config::ClientConfig;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the `reqwest::Client` shared by every request of a session.
///
/// The client-wide timeout applies to each request unless the request carries
/// its own override.
pub fn build_http_client(config: &ClientConfig) -> reqwest::Result<reqwest::Client> {
    install_rustls_provider();

    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .user_agent(config.user_agent.as_str())
        .build()
}
