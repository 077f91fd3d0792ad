//! Derived names, hostnames and routing constants shared by every strategy

use std::collections::BTreeMap;

/// Request header carrying the InferenceService name
pub const ISVC_NAME_HEADER: &str = "OMe-Isvc-Name";

/// Request header carrying the InferenceService namespace
pub const ISVC_NAMESPACE_HEADER: &str = "OME-Isvc-Namespace";

/// Port every component service listens on
pub const COMMON_ISVC_PORT: i32 = 8080;

pub const COMMON_DEFAULT_HTTP_PORT: i32 = 80;

/// Istio's implicit gateway for in-mesh traffic
pub const MESH_GATEWAY: &str = "mesh";

pub const VISIBILITY_LABEL: &str = "networking.knative.dev/visibility";
pub const CLUSTER_LOCAL_VISIBILITY: &str = "cluster-local";

pub const CLUSTER_DOMAIN: &str = "cluster.local";
pub const CLUSTER_LOCAL_DOMAIN: &str = "svc.cluster.local";

/// Matches every path
pub const FALLBACK_PREFIX: &str = "^/.*$";

/// Matches OpenAI-style API paths served by the decoder
pub const DECODER_PREFIX: &str = "^/v1/.*$";

/// Appended to a path prefix to capture the decoder API path
pub const PATH_BASED_DECODER_SUFFIX: &str = "(/v1/.*)$";

/// Annotations never copied onto child resources
pub const DISALLOWED_ANNOTATIONS: &[&str] = &[
    "autoscaling.knative.dev/min-scale",
    "autoscaling.knative.dev/max-scale",
    "internal.ome.io/storage-initializer-sourceuri",
    "kubectl.kubernetes.io/last-applied-configuration",
];

/// Labels never copied onto child resources
pub const DISALLOWED_LABELS: &[&str] = &[VISIBILITY_LABEL];

const DNS_LABEL_MAX_LENGTH: usize = 63;

pub fn engine_service_name(name: &str) -> String {
    format!("{}-engine", name)
}

pub fn router_service_name(name: &str) -> String {
    format!("{}-router", name)
}

pub fn decoder_service_name(name: &str) -> String {
    format!("{}-decoder", name)
}

pub fn predictor_service_name(name: &str) -> String {
    format!("{}-predictor", name)
}

/// Name of the `-default` revision service for a component
pub fn default_service_name(name: &str, component: &str) -> String {
    format!("{}-{}-default", name, component)
}

/// In-cluster DNS name of a service
pub fn service_hostname(name: &str, namespace: &str) -> String {
    format!("{}.{}.{}", name, namespace, CLUSTER_LOCAL_DOMAIN)
}

pub fn is_cluster_local(labels: &BTreeMap<String, String>) -> bool {
    labels
        .get(VISIBILITY_LABEL)
        .is_some_and(|v| v == CLUSTER_LOCAL_VISIBILITY)
}

/// Anchored regex matching `host` with an optional port.
///
/// In-cluster hosts also match their short `.svc` and bare forms.
pub fn host_regexp(host: &str) -> String {
    const PORT_MATCH: &str = r"(?::\d{1,5})?";
    let local_suffix = format!(".svc.{}", CLUSTER_DOMAIN);

    match host.strip_suffix(&local_suffix) {
        None => format!("^{}{}$", regex::escape(host), PORT_MATCH),
        Some(prefix) => format!(
            "^{}({}({})?)?{}$",
            regex::escape(prefix),
            regex::escape(".svc"),
            regex::escape(&format!(".{}", CLUSTER_DOMAIN)),
            PORT_MATCH
        ),
    }
}

/// 64-bit FNV-1a hash
fn fnv1a(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Shorten `name` to at most `max_len` bytes, stable across calls.
///
/// Long names become `<8 hex chars>-<tail>`. The hash prefix never starts
/// with a digit so the result is still a valid DNS label.
pub fn truncate_name(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }

    let mut prefix = format!("{:016x}", fnv1a(name));
    prefix.truncate(8);
    if prefix.starts_with(|c: char| c.is_ascii_digit()) {
        prefix.replace_range(0..1, "a");
    }

    let keep = max_len.saturating_sub(prefix.len() + 1);
    let mut start = name.len() - keep;
    while !name.is_char_boundary(start) {
        start += 1;
    }
    let suffix = name[start..].trim_start_matches('-');
    format!("{}-{}", prefix, suffix)
}

/// Truncate to the DNS label limit
pub fn truncate_dns_label(name: &str) -> String {
    truncate_name(name, DNS_LABEL_MAX_LENGTH)
}
