/// Derive a URL-safe slug from a human-readable name.
///
/// Lowercases ASCII alphanumerics, folds whitespace, `-` and `_` runs into a
/// single `-`, and drops everything else. The result never starts or ends
/// with a dash. Pure: the same name always yields the same slug.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else if ch == '-' || ch == '_' || ch.is_whitespace() {
            pending_dash = true;
        }
    }

    out
}
