//! Output file names derived from group keys.
//!
//! `sanitize_key` is injective: characters that are unsafe in a file name,
//! including a leading `.` and a trailing `.` or space, are written as `%XX`
//! per UTF-8 byte, and `%` itself is always escaped, so two different keys
//! never produce the same name. `plan_file_names` additionally
//! separates keys that differ only in letter case.

use std::collections::HashMap;
use std::fmt::Write;

// Windows drops a trailing '.' or ' ', so those are escaped too
fn is_safe(c: char, leading: bool, trailing: bool) -> bool {
    match c {
        '.' => !leading && !trailing,
        ' ' => !trailing,
        '-' | '_' => true,
        c => c.is_alphanumeric(),
    }
}

pub fn sanitize_key(key: &str) -> String {
    if key.is_empty() {
        return "%".to_string();
    }

    let last = key.chars().count() - 1;
    let mut out = String::with_capacity(key.len());
    for (i, c) in key.chars().enumerate() {
        if is_safe(c, i == 0, i == last) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{:02X}", b);
            }
        }
    }
    out
}

/// File names for `keys` in the same order, each with `extension` appended.
pub fn plan_file_names<'a>(keys: impl IntoIterator<Item = &'a str>, extension: &str) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    keys.into_iter()
        .map(|key| {
            let mut stem = sanitize_key(key);
            let count = seen.entry(stem.to_lowercase()).or_insert(0);
            *count += 1;
            if *count > 1 {
                // '~' never survives sanitize_key, so the suffix can't clash
                let _ = write!(stem, "~{}", count);
            }
            if extension.is_empty() {
                stem
            } else {
                format!("{}.{}", stem, extension)
            }
        })
        .collect()
}
