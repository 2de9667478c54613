//! Host pattern matching.
//!
//! Rule patterns come from user input and may contain several
//! `;`-separated sub-patterns. A sub-pattern is one of:
//!
//! - `*.domain.tld` — matches the domain itself and any subdomain,
//!   at any depth
//! - an exact hostname
//! - a glob, where `*` matches any run of characters and everything
//!   else is literal
//!
//! Matching is case-insensitive and tolerates callers passing a full
//! URL instead of a bare hostname. A pattern never causes a panic;
//! anything unparseable simply fails to match.

use regex::Regex;

/// Reduces a host-or-URL string to a bare lowercase hostname.
///
/// Strips the scheme, path, query, fragment, port, and any trailing
/// dot (some stacks hand over FQDNs like `example.com.`).
pub fn normalize_host(input: &str) -> String {
    let mut host = input.trim();

    if let Some(idx) = host.find("://") {
        host = &host[idx + 3..];
    }

    // Cut at the first path/query/fragment delimiter
    if let Some(idx) = host.find(['/', '?', '#']) {
        host = &host[..idx];
    }

    // Drop userinfo and port
    if let Some(idx) = host.rfind('@') {
        host = &host[idx + 1..];
    }
    host = host.split(':').next().unwrap_or(host);

    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Checks whether `host` matches `pattern`.
///
/// The pattern is split on `;`; the host matches if any non-empty
/// segment matches. An empty or invalid pattern matches nothing.
pub fn matches(host: &str, pattern: &str) -> bool {
    let host = normalize_host(host);
    if host.is_empty() {
        return false;
    }

    pattern
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .any(|segment| segment_matches(&host, segment))
}

/// Matches a normalized host against a single pattern segment.
pub(crate) fn segment_matches(host: &str, segment: &str) -> bool {
    let segment = segment.to_ascii_lowercase();

    if let Some(base) = segment.strip_prefix("*.") {
        return suffix_matches(host, base);
    }

    if host == segment {
        return true;
    }

    if segment.contains('*') {
        return glob_matches(host, &segment);
    }

    false
}

/// `*.base` semantics: the base domain itself, or any subdomain of it.
pub(crate) fn suffix_matches(host: &str, base: &str) -> bool {
    if base.is_empty() {
        return false;
    }
    host == base || host.ends_with(&format!(".{base}"))
}

/// Glob semantics: `.` is literal, `*` is any sequence, anchored.
fn glob_matches(host: &str, segment: &str) -> bool {
    match Regex::new(&glob_to_regex(segment)) {
        Ok(re) => re.is_match(host),
        Err(_) => false,
    }
}

/// Translates a glob segment into an anchored regex source string.
pub(crate) fn glob_to_regex(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() + 8);
    out.push('^');
    for ch in segment.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '\\' | '.' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out.push('$');
    out
}
