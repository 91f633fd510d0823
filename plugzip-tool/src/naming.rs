use anyhow::{Result, bail};
use chrono::{DateTime, Utc};

/// Expands an archive file name template such as `%name%-%version%.zip`.
///
/// Supported placeholders (case-insensitive): `%name%`, `%version%`,
/// `%date%`, `%datetime%` and `%unix%`. Time values are UTC.
pub fn archive_file_name(template: &str, name: &str, version: &str) -> Result<String> {
    expand_at(template, name, version, Utc::now())
}

fn expand_at(template: &str, name: &str, version: &str, now: DateTime<Utc>) -> Result<String> {
    // %datetime% is listed before %date% so the longer placeholder wins.
    let placeholders = [
        ("%name%", name.to_string()),
        ("%version%", version.to_string()),
        ("%datetime%", now.format("%Y-%m-%d_%H-%M-%S").to_string()),
        ("%date%", now.format("%Y-%m-%d").to_string()),
        ("%unix%", now.timestamp().to_string()),
    ];

    let file_name = expand_once(template, &placeholders);

    if file_name.is_empty() || file_name.contains(['/', '\\']) {
        bail!("archive name {file_name:?} must be a plain file name");
    }

    Ok(file_name)
}

/// Replaces placeholders case-insensitively in a single left-to-right scan,
/// so substituted values are never expanded again.
fn expand_once(template: &str, placeholders: &[(&str, String)]) -> String {
    let lower = template.to_ascii_lowercase();
    let mut result = String::with_capacity(template.len());
    let mut pos = 0;

    'scan: while pos < template.len() {
        let rest = &lower[pos..];
        for (pattern, value) in placeholders {
            if rest.starts_with(pattern) {
                result.push_str(value);
                pos += pattern.len();
                continue 'scan;
            }
        }
        let Some(ch) = template[pos..].chars().next() else {
            break;
        };
        result.push(ch);
        pos += ch.len_utf8();
    }

    result
}
