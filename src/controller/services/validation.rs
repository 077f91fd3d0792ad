//! DNS and request-path validation for rendered templates

use regex::Regex;
use std::sync::LazyLock;

const DNS1123_LABEL_MAX_LENGTH: usize = 63;
const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

#[allow(clippy::expect_used)]
static DNS1123_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("label regex should compile")
});

/// A single DNS-1123 label such as `my-model`
pub fn is_dns1123_label(value: &str) -> bool {
    value.len() <= DNS1123_LABEL_MAX_LENGTH && DNS1123_LABEL.is_match(value)
}

/// A dot-separated DNS-1123 subdomain such as `m.u.example.com`
pub fn is_dns1123_subdomain(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= DNS1123_SUBDOMAIN_MAX_LENGTH
        && value.split('.').all(is_dns1123_label)
}

/// A DNS-1123 subdomain with at least two labels
pub fn is_fully_qualified_domain_name(value: &str) -> bool {
    let trimmed = value.strip_suffix('.').unwrap_or(value);
    is_dns1123_subdomain(trimmed) && trimmed.split('.').count() >= 2
}

/// Why a rendered path is not a usable request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPathProblem {
    SchemeOrHost,
    Invalid,
}

/// Check that `value` is an origin-form request target.
///
/// Anything starting with `/` is a path, including `//host/x`. Other values
/// are rejected; absolute URIs are reported separately so the error names
/// the scheme or host.
pub fn check_request_path(value: &str) -> Result<(), RequestPathProblem> {
    if value.starts_with('/') {
        if value.chars().any(|c| c.is_ascii_control()) {
            return Err(RequestPathProblem::Invalid);
        }
        return Ok(());
    }

    match value.parse::<http::Uri>() {
        Ok(uri) if uri.scheme().is_some() => Err(RequestPathProblem::SchemeOrHost),
        _ => Err(RequestPathProblem::Invalid),
    }
}
