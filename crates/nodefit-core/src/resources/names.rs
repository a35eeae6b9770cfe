//! Resource name constants and classification helpers

/// CPU, in millicores
pub const CPU: &str = "cpu";
/// Memory, in bytes
pub const MEMORY: &str = "memory";
/// Local ephemeral storage, in bytes
pub const EPHEMERAL_STORAGE: &str = "ephemeral-storage";
/// Number of pods a node accepts
pub const PODS: &str = "pods";

/// Namespace prefix reserved for resources defined by the orchestrator itself
pub const DEFAULT_NAMESPACE_PREFIX: &str = "kubernetes.io/";
/// Prefix used by quota for request-scoped resource names
pub const REQUESTS_PREFIX: &str = "requests.";
/// Prefix of huge page resources (e.g. "hugepages-2Mi")
pub const HUGEPAGES_PREFIX: &str = "hugepages-";
/// Prefix of attachable volume limits
pub const ATTACHABLE_VOLUMES_PREFIX: &str = "attachable-volumes-";

/// A resource in the default namespace, like "kubernetes.io/foo"
pub fn is_prefixed_native_resource(name: &str) -> bool {
    name.contains(DEFAULT_NAMESPACE_PREFIX)
}

/// Native resources are either unqualified or in the default namespace
pub fn is_native_resource(name: &str) -> bool {
    !name.contains('/') || is_prefixed_native_resource(name)
}

/// Extended resources are qualified names outside the default namespace
pub fn is_extended_resource_name(name: &str) -> bool {
    if is_native_resource(name) || name.starts_with(REQUESTS_PREFIX) {
        return false;
    }
    // Must still be a qualified name once quota prepends its prefix
    is_qualified_name(&format!("{}{}", REQUESTS_PREFIX, name))
}

pub fn is_hugepage_resource_name(name: &str) -> bool {
    name.starts_with(HUGEPAGES_PREFIX)
}

pub fn is_attachable_volume_resource_name(name: &str) -> bool {
    name.starts_with(ATTACHABLE_VOLUMES_PREFIX)
}

/// Scalar resources are everything tracked by name rather than by a fixed
/// field: extended, huge pages, prefixed native and attachable volumes.
pub fn is_scalar_resource_name(name: &str) -> bool {
    is_extended_resource_name(name)
        || is_hugepage_resource_name(name)
        || is_prefixed_native_resource(name)
        || is_attachable_volume_resource_name(name)
}

/// Validate a qualified name: an optional DNS subdomain prefix and a slash,
/// followed by a name of at most 63 characters.
pub fn is_qualified_name(value: &str) -> bool {
    let name = match value.split_once('/') {
        Some((prefix, name)) => {
            if !is_valid_name(prefix) {
                return false;
            }
            name
        }
        None => value,
    };

    if name.is_empty() || name.len() > 63 {
        return false;
    }

    let bytes = name.as_bytes();
    if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
        return false;
    }

    bytes
        .iter()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'-' | b'_' | b'.'))
}

/// Validate a DNS-1123 subdomain
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    // Must contain only lowercase alphanumeric, '-', or '.'
    // Must start and end with alphanumeric
    let chars: Vec<char> = name.chars().collect();

    if !chars[0].is_ascii_lowercase() && !chars[0].is_ascii_digit() {
        return false;
    }

    if !chars[chars.len() - 1].is_ascii_lowercase() && !chars[chars.len() - 1].is_ascii_digit() {
        return false;
    }

    chars
        .iter()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.')
}
