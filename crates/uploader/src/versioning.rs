//! Description version markers and tag naming.
//!
//! A description carries its version as a `(vN)` marker, e.g.
//! `"Fluffy capybara (v3)"`. Bumping rewrites the last marker in place or
//! appends `(v1)` when there is none.

use avatar_batch_progress::{AvatarRef, PlatformId, TagRequest};

/// Locates the last `(vN)` marker: `(start, end, N)` with `end` exclusive.
fn find_marker(description: &str) -> Option<(usize, usize, u32)> {
    let mut search_end = description.len();
    while let Some(start) = description[..search_end].rfind("(v") {
        let digits_start = start + 2;
        let rest = &description[digits_start..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0
            && rest[digits..].starts_with(')')
            && let Ok(n) = rest[..digits].parse::<u32>()
        {
            return Some((start, digits_start + digits + 1, n));
        }
        search_end = start;
    }
    None
}

/// Returns the version in the description marker, if any.
pub fn description_version(description: &str) -> Option<u32> {
    find_marker(description).map(|(_, _, n)| n)
}

/// Increments the version marker in `description`.
///
/// Returns the rewritten description and the new version.
pub fn bump_description_version(description: &str) -> (String, u32) {
    match find_marker(description) {
        Some((start, end, n)) => {
            let next = n.saturating_add(1);
            let bumped = format!("{}(v{next}){}", &description[..start], &description[end..]);
            (bumped, next)
        }
        None => {
            let base = description.trim_end();
            let bumped = if base.is_empty() {
                "(v1)".to_string()
            } else {
                format!("{base} (v1)")
            };
            (bumped, 1)
        }
    }
}

/// Builds a git-safe tag name: `{prefix}{avatar}-{platform}[-vN]{suffix}`.
pub fn tag_name(
    request: &TagRequest,
    avatar: &AvatarRef,
    platform: PlatformId,
    version: Option<u32>,
) -> String {
    let mut raw = format!("{}{}-{}", request.prefix, avatar.name, platform);
    if let Some(v) = version {
        raw.push_str(&format!("-v{v}"));
    }
    raw.push_str(&request.suffix);
    sanitize_ref(&raw)
}

/// Replaces characters git refuses in ref names and collapses the result.
fn sanitize_ref(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let bad = c.is_whitespace()
            || c.is_control()
            || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | ']' | '\\' | '@' | '{' | '}');
        let c = if bad { '-' } else { c };
        let prev = out.chars().last();
        if (c == '-' && prev == Some('-'))
            || (c == '.' && prev == Some('.'))
            || (c == '/' && prev == Some('/'))
        {
            continue;
        }
        out.push(c);
    }
    out.trim_matches(|c| c == '-' || c == '.' || c == '/')
        .to_string()
}
