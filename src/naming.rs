//! Identifier sanitization and header normalization.
//!
//! Every table and column name that reaches SQL text passes through
//! [`sanitize_identifier`], so the schema builder can quote names without
//! escaping anything.

use std::{collections::HashSet, path::Path};

pub const FOREIGN_KEY_SUFFIX: &str = "_id";

/// Replaces every character outside `[A-Za-z0-9_]` with `_` and prefixes a
/// leading digit with `_`. The result is never empty.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut sanitized: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        sanitized.push('_');
    } else if sanitized.starts_with(|ch: char| ch.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let trimmed = header.trim();
            if trimmed.is_empty() {
                format!("col_{}", idx + 1)
            } else {
                trimmed.to_string()
            }
        })
        .collect()
}

pub fn column_identifiers(headers: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(headers.len());
    let mut identifiers = Vec::with_capacity(headers.len());
    for header in headers {
        let base = sanitize_identifier(header);
        let mut candidate = base.clone();
        let mut counter = 1usize;
        // SQLite compares identifiers case-insensitively.
        while !seen.insert(candidate.to_ascii_lowercase()) {
            counter += 1;
            candidate = format!("{base}_{counter}");
        }
        identifiers.push(candidate);
    }
    identifiers
}

pub fn table_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    sanitize_identifier(&stem)
}

pub fn is_foreign_key_column(name: &str) -> bool {
    foreign_key_base(name).is_some()
}

pub fn foreign_key_base(name: &str) -> Option<&str> {
    let split = name.len().checked_sub(FOREIGN_KEY_SUFFIX.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (base, suffix) = name.split_at(split);
    if suffix.eq_ignore_ascii_case(FOREIGN_KEY_SUFFIX) && !base.is_empty() {
        Some(base)
    } else {
        None
    }
}
