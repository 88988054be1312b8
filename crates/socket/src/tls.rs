//! TLS client configuration for `wss://` endpoints.

use std::sync::Arc;

use assurance_core::{Error, Result};

/// Creates a rustls configuration trusting the webpki root set.
///
/// The ring provider is selected explicitly so the result does not depend on
/// which provider features other crates enable.
pub fn create_tls_config() -> Result<Arc<rustls::ClientConfig>> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::transport(format!("tls configuration: {e}")))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(Arc::new(config))
}
