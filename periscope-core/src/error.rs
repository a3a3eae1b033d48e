//! # Error Classification & Formatting
//!
//! Maps transport and gRPC status failures onto the user-facing message kinds
//! the shell displays. All human-readable text lives in [`ErrorStrings`], a
//! table keyed by message kind with English defaults, so the classifier
//! itself stays language-independent: a localized shell swaps the table, not
//! the code.
//!
//! gRPC statuses are recovered from arbitrary error values by walking the
//! `std::error::Error::source` chain and downcasting to [`tonic::Status`].

use crate::connection::ConnectOptions;
use std::error::Error as StdError;
use tonic::{Code, Status};

/// Error-text fragments that indicate a connectivity problem rather than an
/// application-level failure.
const CONNECTION_ERROR_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "no connection",
    "unavailable",
    "deadline exceeded",
    "context canceled",
    "dial tcp",
    "connectex",
    "connection",
];

/// User-visible message table. One field per message kind; `Default` is the
/// built-in English set.
#[derive(Debug, Clone)]
pub struct ErrorStrings {
    pub unknown_connection: String,
    pub connect_failed: String,
    pub mode_tls_verify: String,
    pub mode_tls_insecure: String,
    pub mode_plaintext: String,
    pub tls_mismatch: String,
    pub tls_handshake: String,
    pub unavailable: String,
    pub timed_out: String,
    pub canceled: String,
    pub permission_denied: String,
    pub tls_generic: String,
    pub refused: String,
    pub tcp_failed: String,
    pub host_not_found: String,
    pub unknown_reflection: String,
    pub reflection_unsupported: String,
    pub reflection_denied: String,
    pub reflection_not_found: String,
    pub reflection_failed: String,
    pub reflection_fetch_failed: String,
    pub no_services: String,
}

impl Default for ErrorStrings {
    fn default() -> Self {
        Self {
            unknown_connection: "Unknown connection error".into(),
            connect_failed: "Failed to connect to the server".into(),
            mode_tls_verify: "TLS with verification".into(),
            mode_tls_insecure: "TLS without verification".into(),
            mode_plaintext: "no TLS".into(),
            tls_mismatch: "the server does not use TLS, but the connection was attempted with \
                           TLS. Disable the TLS option or use a TLS-enabled server"
                .into(),
            tls_handshake: "TLS handshake error. The server may not be using TLS.".into(),
            unavailable: "the server is unavailable.".into(),
            timed_out: "connection timed out".into(),
            canceled: "connection canceled".into(),
            permission_denied: "access denied.".into(),
            tls_generic: "TLS/certificate error -".into(),
            refused: "connection refused. Check that the server is running on".into(),
            tcp_failed: "could not establish a TCP connection to".into(),
            host_not_found: "host not found -".into(),
            unknown_reflection: "Unknown reflection error".into(),
            reflection_unsupported: "The server does not support gRPC reflection (method not \
                                     implemented)"
                .into(),
            reflection_denied: "Reflection access denied:".into(),
            reflection_not_found: "Reflection service not found:".into(),
            reflection_failed: "Reflection error:".into(),
            reflection_fetch_failed: "Failed to fetch reflection:".into(),
            no_services: "The server is reachable but exposes no services via reflection".into(),
        }
    }
}

/// Finds the first [`Status`] in the error's source chain, if any.
pub fn status_in_chain<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a Status> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(status) = e.downcast_ref::<Status>() {
            return Some(status);
        }
        current = e.source();
    }
    None
}

/// Whether `err` describes a connectivity failure (as opposed to a
/// remote application error).
pub fn is_connection_error(err: &(dyn StdError + 'static)) -> bool {
    if let Some(status) = status_in_chain(err) {
        return matches!(
            status.code(),
            Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled
        );
    }

    let text = full_error_text(err).to_lowercase();
    CONNECTION_ERROR_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
}

/// Renders a connection failure as a human-readable explanation: a base
/// phrase, the bracketed transport mode, and a suffix chosen from the most
/// specific match available.
pub fn format_connection_error(
    strings: &ErrorStrings,
    err: &(dyn StdError + 'static),
    address: &str,
    options: &ConnectOptions,
) -> String {
    let mode = if options.use_tls {
        if options.insecure_skip_verify {
            &strings.mode_tls_insecure
        } else {
            &strings.mode_tls_verify
        }
    } else {
        &strings.mode_plaintext
    };
    let base = format!("{} ({})", strings.connect_failed, mode);

    let text = full_error_text(err);
    let lower = text.to_lowercase();

    if lower.contains("first record does not look like a tls handshake") {
        return format!("{}: {}", base, strings.tls_mismatch);
    }

    if let Some(status) = status_in_chain(err) {
        match status.code() {
            Code::Unavailable => {
                let msg = extract_main_error(status.message());
                let msg_lower = msg.to_lowercase();
                if options.use_tls && (msg_lower.contains("tls") || msg_lower.contains("handshake"))
                {
                    return format!("{}: {} {}", base, strings.tls_handshake, msg);
                }
                return format!("{}: {} {}", base, strings.unavailable, msg);
            }
            Code::DeadlineExceeded => return format!("{}: {}", base, strings.timed_out),
            Code::Cancelled => return format!("{}: {}", base, strings.canceled),
            Code::PermissionDenied => {
                return format!(
                    "{}: {} {}",
                    base,
                    strings.permission_denied,
                    extract_main_error(status.message())
                );
            }
            _ => {}
        }
    }

    if lower.contains("tls") || lower.contains("certificate") {
        return format!("{}: {} {}", base, strings.tls_generic, extract_main_error(&text));
    }
    if lower.contains("connection refused") {
        return format!("{}: {} {}", base, strings.refused, address);
    }
    if lower.contains("dial tcp") || lower.contains("connectex") {
        return format!(
            "{}: {} {} - {}",
            base,
            strings.tcp_failed,
            address,
            extract_main_error(&text)
        );
    }
    if lower.contains("no such host") || lower.contains("failed to lookup") {
        return format!("{}: {} {}", base, strings.host_not_found, address);
    }

    format!("{}: {}", base, extract_main_error(&text))
}

/// Renders a reflection failure. `UNIMPLEMENTED` means the peer simply does
/// not expose the reflection service.
pub fn format_reflection_error(strings: &ErrorStrings, err: &(dyn StdError + 'static)) -> String {
    if let Some(status) = status_in_chain(err) {
        return match status.code() {
            Code::Unimplemented => strings.reflection_unsupported.clone(),
            Code::PermissionDenied => {
                format!("{} {}", strings.reflection_denied, status.message())
            }
            Code::NotFound => format!("{} {}", strings.reflection_not_found, status.message()),
            _ => format!("{} {}", strings.reflection_failed, status.message()),
        };
    }

    format!("{} {}", strings.reflection_fetch_failed, full_error_text(err))
}

/// Pulls the innermost meaningful message out of wrapped
/// `rpc error: ... desc = "..."` chains: the last non-empty `desc =` segment
/// that is not itself another wrapper, else the last `rpc error:` tail.
pub fn extract_main_error(text: &str) -> String {
    let text = text.trim();

    if text.contains("desc =") {
        for part in text.rsplit("desc =") {
            let part = part.trim().trim_matches('"');
            if !part.is_empty() && !part.contains("rpc error:") {
                return part.to_string();
            }
        }
    }

    if let Some(tail) = text.rsplit("rpc error:").next()
        && text.contains("rpc error:")
    {
        return tail.trim().trim_matches('"').to_string();
    }

    text.to_string()
}

/// Joins the messages along the source chain so substring matching sees the
/// transport details hidden behind wrapper errors.
fn full_error_text(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(e) = current {
        parts.push(e.to_string());
        current = e.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn strings() -> ErrorStrings {
        ErrorStrings::default()
    }

    #[test]
    fn test_is_connection_error_by_status_code() {
        assert!(is_connection_error(&Status::unavailable("boom")));
        assert!(is_connection_error(&Status::deadline_exceeded("slow")));
        assert!(is_connection_error(&Status::cancelled("stop")));
        assert!(!is_connection_error(&Status::not_found("missing")));
        assert!(!is_connection_error(&Status::invalid_argument("bad")));
    }

    #[test]
    fn test_is_connection_error_by_text() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        assert!(is_connection_error(&err));

        let err = io::Error::other("dial tcp 127.0.0.1:1: refused");
        assert!(is_connection_error(&err));

        let err = io::Error::other("parse failure");
        assert!(!is_connection_error(&err));
    }

    #[test]
    fn test_extract_main_error_desc_chain() {
        let text = r#"rpc error: code = Unavailable desc = "connection refused""#;
        assert_eq!(extract_main_error(text), "connection refused");

        let text = r#"wrapped: rpc error: code = Unknown desc = rpc error: code = Internal desc = inner detail"#;
        assert_eq!(extract_main_error(text), "inner detail");
    }

    #[test]
    fn test_extract_main_error_plain_text() {
        assert_eq!(extract_main_error("  plain failure  "), "plain failure");
    }

    #[test]
    fn test_format_connection_error_modes() {
        let err = Status::unavailable("connect refused");
        let plain = format_connection_error(
            &strings(),
            &err,
            "localhost:1",
            &ConnectOptions::new(false, false),
        );
        assert!(plain.contains("(no TLS)"));

        let tls = format_connection_error(
            &strings(),
            &err,
            "localhost:1",
            &ConnectOptions::new(true, false),
        );
        assert!(tls.contains("(TLS with verification)"));

        let insecure = format_connection_error(
            &strings(),
            &err,
            "localhost:1",
            &ConnectOptions::new(true, true),
        );
        assert!(insecure.contains("(TLS without verification)"));
    }

    #[test]
    fn test_format_connection_error_refused_mentions_address() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let msg = format_connection_error(
            &strings(),
            &err,
            "localhost:50051",
            &ConnectOptions::default(),
        );
        assert!(msg.contains("localhost:50051"), "{msg}");
    }

    #[test]
    fn test_format_connection_error_tls_mismatch() {
        let err = io::Error::other("first record does not look like a TLS handshake");
        let msg =
            format_connection_error(&strings(), &err, "h:1", &ConnectOptions::new(true, false));
        assert!(msg.contains(&strings().tls_mismatch), "{msg}");
    }

    #[test]
    fn test_format_reflection_error_unimplemented() {
        let msg = format_reflection_error(&strings(), &Status::unimplemented("nope"));
        assert_eq!(msg, strings().reflection_unsupported);

        let msg = format_reflection_error(&strings(), &Status::internal("broken pipe"));
        assert!(msg.contains("broken pipe"));
    }

    #[test]
    fn test_status_recovered_through_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer wrapper")]
        struct Wrapper(#[source] Status);

        let err = Wrapper(Status::unimplemented("x"));
        assert_eq!(status_in_chain(&err).unwrap().code(), Code::Unimplemented);
        let msg = format_reflection_error(&strings(), &err);
        assert_eq!(msg, strings().reflection_unsupported);
    }
}
