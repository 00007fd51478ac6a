use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use walkdir::WalkDir;

/// True when a log source path is a file-name pattern rather than a
/// literal path. Patterns use glob syntax in the final component only.
pub fn is_pattern(path: &str) -> bool {
    Path::new(path)
        .file_name()
        .map(|name| {
            let name = name.to_string_lossy();
            name.contains('*') || name.contains('?') || name.contains('[')
        })
        .unwrap_or(false)
}

/// Expand a file-name pattern into the matching regular files, sorted
/// by name so collection order is stable.
pub fn expand(pattern: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(pattern);
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| anyhow!("pattern has no parent directory: {}", pattern))?;
    let name_pattern = path
        .file_name()
        .ok_or_else(|| anyhow!("pattern has no file name: {}", pattern))?
        .to_string_lossy();

    let re = glob_to_regex(&name_pattern)
        .context(format!("Invalid file pattern: {}", name_pattern))?;

    let mut files: Vec<PathBuf> = WalkDir::new(parent)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| re.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    Ok(files)
}

/// Translate a glob on a single file name into an anchored regex.
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut re = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                re.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    re.push('^');
                }
                for inner in chars.by_ref() {
                    re.push(inner);
                    if inner == ']' {
                        break;
                    }
                }
            }
            c if "\\.+()|^${}".contains(c) => {
                re.push('\\');
                re.push(c);
            }
            c => re.push(c),
        }
    }

    re.push('$');
    Regex::new(&re).map_err(Into::into)
}
