//! Filename derivation and sanitizing for downloaded files.

/// Returns the last path segment of a URL path, ignoring trailing slashes.
///
/// Mirrors the usual basename rules: `"/a/b"` and `"/a/b/"` both yield `"b"`,
/// while `""` and `"/"` yield markers that [`sanitize_filename`] replaces
/// with the literal `"file"`.
pub(crate) fn basename(path: &str) -> &str {
    if path.is_empty() {
        return ".";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Reduces an arbitrary string to a safe filename leaf.
///
/// Strips everything from `?` onward (URL query), maps path separators and
/// `:` to `-`, removes shell/filesystem metacharacters, and falls back to
/// the literal `"file"` whenever the result would be empty or degenerate.
/// Idempotent: sanitizing an already-sanitized name is a no-op.
pub fn sanitize_filename(name: &str) -> String {
    let name = match name.find('?') {
        Some(i) => &name[..i],
        None => name,
    };
    if name.is_empty() || name == "." || name == "/" {
        return "file".to_string();
    }
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            ':' | '/' | '\\' => out.push('-'),
            '*' | '?' | '"' | '<' | '>' | '|' | '\n' | '\r' => {}
            _ => out.push(c),
        }
    }
    if out.is_empty() || out == "." {
        return "file".to_string();
    }
    out
}
