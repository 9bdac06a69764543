//! Destination addresses: opaque ids and `scheme://` URIs.

/// Reserved destination of the default route.
pub const DEFAULT_DST: &str = "*";

/// A destination parsed as a URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriDestination {
    /// Lowercased scheme.
    pub scheme: String,
    /// Canonical form without fragment, used for comparison and registration.
    pub canonical: String,
    /// Fragment without the leading `#`, empty if absent.
    pub fragment: String,
}

/// Parse `dst` as a URI. Returns `None` for plain ids.
pub fn parse_uri(dst: &str) -> Option<UriDestination> {
    let (scheme, rest) = dst.split_once("://")?;
    if !is_valid_scheme(scheme) {
        return None;
    }
    let scheme = scheme.to_ascii_lowercase();

    let (rest, fragment) = match rest.split_once('#') {
        Some((rest, fragment)) => (rest, fragment),
        None => (rest, ""),
    };
    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (rest, None),
    };
    let (authority, path) = match rest.find('/') {
        Some(pos) => rest.split_at(pos),
        None => (rest, ""),
    };

    let authority = canonical_authority(authority);
    let mut path = normalize_path(path);
    if path.is_empty() && !authority.is_empty() {
        path.push('/');
    }

    let mut canonical = format!("{scheme}://{authority}{path}");
    if let Some(query) = query {
        canonical.push('?');
        canonical.push_str(query);
    }

    Some(UriDestination {
        scheme,
        canonical,
        fragment: fragment.to_string(),
    })
}

/// True if `dst` has the `scheme://` form.
pub fn is_uri(dst: &str) -> bool {
    parse_uri(dst).is_some()
}

/// Compare two destinations.
///
/// Two URIs are equal when their canonical forms are; two plain ids when they
/// are byte-equal. A URI never equals a plain id.
pub fn dst_eq(a: &str, b: &str) -> bool {
    match (parse_uri(a), parse_uri(b)) {
        (None, None) => a == b,
        (Some(a), Some(b)) => a.canonical == b.canonical,
        _ => false,
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn canonical_authority(authority: &str) -> String {
    let (user_info, host_port) = match authority.rsplit_once('@') {
        Some((user_info, host_port)) => (Some(user_info), host_port),
        None => (None, authority),
    };

    let mut out = String::with_capacity(authority.len());
    if let Some(user_info) = user_info {
        out.push_str(user_info);
        out.push('@');
    }
    out.push_str(&host_port.to_ascii_lowercase());
    out
}

/// Resolve `.` and `..` segments.
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/').skip(1) {
        match segment {
            "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut out = String::with_capacity(path.len());
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() || path.ends_with("/.") || path.ends_with("/..") {
        out.push('/');
    }
    out
}
