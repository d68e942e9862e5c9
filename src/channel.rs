use crate::error::{ClientError, Result};

use std::path::Path;

use tonic::codegen::http::Uri;
use tonic::transport::channel::ClientTlsConfig;
use tonic::transport::{Certificate, Channel, Endpoint};
use tracing::debug;

/// Largest inbound message accepted on any stub built on the channel.
pub const HUNDRED_MEBIBYTE: usize = 100 * 1024 * 1024;

/// Turns `host:port`, `dns:///host:port` or a full URL into a URL whose
/// scheme matches `use_tls`.
pub fn normalize_address(address: &str, use_tls: bool) -> String {
    let address = address.trim();
    let without_scheme = address
        .strip_prefix("dns:///")
        .or_else(|| address.strip_prefix("http://"))
        .or_else(|| address.strip_prefix("https://"));

    let explicit_https = address.starts_with("https://");
    match without_scheme {
        Some(rest) if use_tls || explicit_https => format!("https://{}", rest),
        Some(rest) => format!("http://{}", rest),
        None if use_tls => format!("https://{}", address),
        None => format!("http://{}", address),
    }
}

/// Opens a channel to `address`. Plaintext unless `use_tls` is set; with
/// TLS, `root_certificates` is an optional PEM bundle to trust.
pub async fn create_channel(
    address: &str,
    use_tls: bool,
    root_certificates: Option<&Path>,
) -> Result<Channel> {
    let target = normalize_address(address, use_tls);
    let uri: Uri = target.parse().map_err(|e| ClientError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{}", e),
    })?;
    if uri.host().is_none() {
        return Err(ClientError::InvalidAddress {
            address: address.to_string(),
            reason: "missing host".to_string(),
        });
    }

    let mut endpoint = Endpoint::from(uri);
    if use_tls {
        let mut tls_config = ClientTlsConfig::new();
        if let Some(root_certificates) = root_certificates {
            let pem = tokio::fs::read(root_certificates).await?;
            tls_config = tls_config.ca_certificate(Certificate::from_pem(pem));
        }
        endpoint = endpoint.tls_config(tls_config)?;
    }

    debug!(address = %target, tls = use_tls, "connecting channel");
    let channel = endpoint.connect().await?;
    Ok(channel)
}
