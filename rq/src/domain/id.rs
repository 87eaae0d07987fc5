//! Task ID generation and resolution
//!
//! Primary IDs use the format: `{6-char-hex}-task-{slug}`
//! Example: `a1f93c-task-chapter-3`

/// Generate a task ID from the input file stem
///
/// The hex prefix comes from the random tail of a v7 UUID so that two tasks
/// submitted for the same file in quick succession still get distinct IDs.
pub fn generate_id(domain_type: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    let hex_prefix = &uuid[uuid.len() - 6..];
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{}-{}", hex_prefix, domain_type)
    } else {
        format!("{}-{}-{}", hex_prefix, domain_type, slug)
    }
}

/// Generate a storage ID (names the per-task directory)
pub fn generate_storage_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Slugify a title for use in IDs
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        // Strip apostrophes entirely, replace other non-alphanumeric with hyphens
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Resolve a partial reference against a set of task IDs
///
/// Returns:
/// - Ok(Some(id)) if exactly one match
/// - Ok(None) if no matches
/// - Err with candidates if ambiguous
pub fn resolve<'a, I>(ids: I, reference: &str) -> Result<Option<String>, Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let ids: Vec<&str> = ids.into_iter().collect();

    // An exact match always wins, even if it is also a prefix of another ID
    if ids.contains(&reference) {
        return Ok(Some(reference.to_string()));
    }

    let matches: Vec<String> = ids
        .into_iter()
        .filter(|id| matches(id, reference))
        .map(str::to_string)
        .collect();

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.into_iter().next()),
        _ => Err(matches),
    }
}

/// Check if an ID matches a reference
fn matches(id: &str, reference: &str) -> bool {
    if reference.is_empty() {
        return false;
    }

    // Hex prefix match
    if id.starts_with(reference) {
        return true;
    }

    // Slug contains match
    if let Some(slug_start) = id.find('-') {
        let slug_part = &id[slug_start + 1..];
        if slug_part.contains(reference) {
            return true;
        }
    }

    false
}
