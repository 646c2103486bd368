//! Wildcard hostname matching.
//!
//! A pattern is either `*` (anything), `*suffix` (wildcard DNS, e.g. `*.example.com`),
//! `prefix*`, or a literal hostname. Comparison is ASCII case-insensitive.
//!
//! Virtual host names can themselves be globs, so route admission asks whether two patterns
//! [`overlap`], i.e. whether some hostname matches both.

/// Does `pattern` match `hostname`?
pub fn matches(pattern: &str, hostname: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let pattern = pattern.to_ascii_lowercase();
    let hostname = hostname.to_ascii_lowercase();

    if let Some(suffix) = pattern.strip_prefix('*') {
        return hostname.ends_with(suffix);
    }

    if let Some(prefix) = pattern.strip_suffix('*') {
        return hostname.starts_with(prefix);
    }

    pattern == hostname
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Glob<'a> {
    Any,
    Suffix(&'a str),
    Prefix(&'a str),
    Literal(&'a str),
}

impl<'a> Glob<'a> {
    fn parse(pattern: &'a str) -> Self {
        if pattern == "*" {
            Glob::Any
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            Glob::Suffix(suffix)
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            Glob::Prefix(prefix)
        } else {
            Glob::Literal(pattern)
        }
    }
}

/// Is there a hostname matched by both `a` and `b`? Either side may be a glob.
pub fn overlap(a: &str, b: &str) -> bool {
    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();

    match (Glob::parse(&a), Glob::parse(&b)) {
        (Glob::Any, _) | (_, Glob::Any) => true,
        (Glob::Literal(_), _) => matches(&b, &a),
        (_, Glob::Literal(_)) => matches(&a, &b),
        (Glob::Suffix(x), Glob::Suffix(y)) => x.ends_with(y) || y.ends_with(x),
        (Glob::Prefix(x), Glob::Prefix(y)) => x.starts_with(y) || y.starts_with(x),
        // `prefix` followed by `suffix` satisfies both
        (Glob::Suffix(_), Glob::Prefix(_)) | (Glob::Prefix(_), Glob::Suffix(_)) => true,
    }
}

/// Does any of `patterns` overlap `hostname`?
pub fn overlaps_any<'a, I>(patterns: I, hostname: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    patterns.into_iter().any(|pattern| overlap(pattern, hostname))
}
