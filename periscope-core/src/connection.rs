//! # Connection Factory
//!
//! Builds `tonic` channels from a server address plus [`ConnectOptions`].
//!
//! Three transport modes are supported:
//!
//! * **Plaintext** (`use_tls = false`): HTTP/2 over cleartext TCP.
//! * **TLS** (`use_tls = true`): rustls with the system trust store.
//! * **TLS without verification** (`use_tls = true, insecure_skip_verify =
//!   true`): rustls with a certificate verifier that accepts any chain.
//!   `tonic`'s built-in [`ClientTlsConfig`] cannot express this, so the
//!   channel is built over a custom connector.
//!
//! Channels are created lazily: the factory never waits for readiness, and
//! connection errors surface on first use.

use crate::BoxError;
use http::Uri;
use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

const DEFAULT_TLS_PORT: u16 = 443;

/// Transport options attached to every stored server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    pub use_tls: bool,
    pub insecure_skip_verify: bool,
}

impl ConnectOptions {
    pub fn new(use_tls: bool, insecure_skip_verify: bool) -> Self {
        Self {
            use_tls,
            insecure_skip_verify,
        }
    }

    /// Skipping certificate verification only makes sense under TLS.
    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.insecure_skip_verify && !self.use_tls {
            return Err(ConnectError::InvalidOptions);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("'insecure_skip_verify' requires 'use_tls' to be enabled")]
    InvalidOptions,

    #[error("Invalid server address '{0}': {1}")]
    InvalidAddress(String, #[source] tonic::transport::Error),

    #[error("Failed to configure TLS: {0}")]
    TlsConfig(#[source] BoxError),
}

/// Builds a lazy [`Channel`] for `address` according to `options`.
///
/// The address may be a bare `host:port` pair; a scheme matching the TLS mode
/// is prepended when missing. Must be called from within a tokio runtime.
pub fn open_channel(address: &str, options: &ConnectOptions) -> Result<Channel, ConnectError> {
    options.validate()?;

    if !options.use_tls {
        let endpoint = make_endpoint(address, endpoint_uri(address, false))?;
        return Ok(endpoint.connect_lazy());
    }

    if !options.insecure_skip_verify {
        let endpoint = make_endpoint(address, endpoint_uri(address, true))?;
        let tls = ClientTlsConfig::new().with_native_roots();
        let endpoint = endpoint
            .tls_config(tls)
            .map_err(|e| ConnectError::TlsConfig(e.into()))?;
        return Ok(endpoint.connect_lazy());
    }

    // The handshake happens inside the custom connector, so the endpoint
    // itself stays on the cleartext scheme.
    let endpoint = make_endpoint(address, endpoint_uri(address, false))?;
    insecure_channel(endpoint)
}

fn make_endpoint(address: &str, uri: String) -> Result<Endpoint, ConnectError> {
    Endpoint::from_shared(uri).map_err(|e| ConnectError::InvalidAddress(address.to_string(), e))
}

/// Prepends a scheme matching the transport mode when the address has none.
fn endpoint_uri(address: &str, use_tls: bool) -> String {
    if address.contains("://") {
        address.to_string()
    } else if use_tls {
        format!("https://{address}")
    } else {
        format!("http://{address}")
    }
}

/// TLS channel with certificate verification disabled.
///
/// The TLS handshake is performed by hand against a rustls config whose
/// verifier accepts any certificate chain, and the resulting stream is handed
/// to tonic through a custom connector.
fn insecure_channel(endpoint: Endpoint) -> Result<Channel, ConnectError> {
    let provider = rustls::crypto::ring::default_provider();

    let mut tls = rustls::ClientConfig::builder_with_provider(Arc::new(provider.clone()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ConnectError::TlsConfig(e.into()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
        .with_no_client_auth();
    tls.alpn_protocols = vec![b"h2".to_vec()];

    let tls = Arc::new(tls);
    let connector = tower::service_fn(move |uri: Uri| {
        let tls = TlsConnector::from(tls.clone());
        async move {
            let host = uri
                .host()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address has no host"))?
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string();
            let port = uri.port_u16().unwrap_or(DEFAULT_TLS_PORT);

            let stream = TcpStream::connect((host.as_str(), port)).await?;

            let server_name = ServerName::try_from(host)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let stream = tls.connect(server_name, stream).await?;

            Ok::<_, io::Error>(TokioIo::new(stream))
        }
    });

    Ok(endpoint.connect_with_connector_lazy(connector))
}

/// Certificate verifier that accepts any server certificate.
///
/// Signature verification still runs against the provider's algorithms; only
/// chain and hostname validation are skipped.
#[derive(Debug)]
struct AcceptAnyServerCert(CryptoProvider);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
