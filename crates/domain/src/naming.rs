/// Canonicalizes a name so it is valid in the relationship schema.
///
/// Lowercases the input, maps `-`, `.`, `:` and spaces to `_`, and `*` to `all`.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    let mut canonical = String::with_capacity(name.len());
    for character in name.chars() {
        match character {
            '-' | '.' | ':' | ' ' => canonical.push('_'),
            '*' => canonical.push_str("all"),
            other => canonical.extend(other.to_lowercase()),
        }
    }

    canonical
}

/// Returns the application prefix of a canonical v2 permission.
#[must_use]
pub fn permission_application(permission: &str) -> &str {
    permission
        .split_once('_')
        .map_or(permission, |(application, _)| application)
}
