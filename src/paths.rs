use crate::error::{Error, Result};

/// Normalize a staging path: strip leading/trailing slashes, reject `..`
/// segments and NUL bytes, and collapse repeated slashes and `.` segments.
///
/// An empty input returns an empty string (root).
///
/// # Errors
/// Returns [`Error::InvalidPath`] if the path contains `..` segments or a
/// NUL byte, or consists only of `.` segments.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.is_empty() {
        return Ok(String::new());
    }
    if path.contains('\0') {
        return Err(Error::invalid_path(format!("{:?} contains a NUL byte", path)));
    }

    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        if seg.is_empty() || seg == "." {
            continue;
        }
        if seg == ".." {
            return Err(Error::invalid_path(format!(
                "path segment '{}' is not allowed",
                seg,
            )));
        }
        segments.push(seg);
    }

    if segments.is_empty() {
        // Only-slash paths like "///" mean root; "." alone is an error.
        if path.bytes().all(|b| b == b'/') {
            return Ok(String::new());
        }
        return Err(Error::invalid_path("path must not be empty"));
    }

    Ok(segments.join("/"))
}

/// Validate a git reference name.
///
/// Rejects spaces, control characters, `..`, `@{`, trailing `.`, and the
/// `.lock` suffix per git's `check-ref-format` rules.
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_ref_name("ref name must not be empty"));
    }

    for ch in name.chars() {
        match ch {
            ':' | ' ' | '\t' | '\n' | '\r' | '\\' | '^' | '~' | '?' | '*' | '[' => {
                return Err(Error::invalid_ref_name(format!(
                    "ref name contains invalid character: {:?}",
                    ch,
                )));
            }
            c if c.is_control() => {
                return Err(Error::invalid_ref_name(format!(
                    "ref name contains control character: {:?}",
                    c,
                )));
            }
            _ => {}
        }
    }

    if name.contains("..") {
        return Err(Error::invalid_ref_name("ref name must not contain '..'"));
    }

    if name.contains("@{") {
        return Err(Error::invalid_ref_name("ref name must not contain '@{'"));
    }

    if name.ends_with('.') || name.ends_with('/') || name.starts_with('/') {
        return Err(Error::invalid_ref_name(
            "ref name must not start with '/' or end with '.' or '/'",
        ));
    }

    if name.ends_with(".lock") {
        return Err(Error::invalid_ref_name("ref name must not end with '.lock'"));
    }

    Ok(())
}

/// Join a normalized directory path and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Strict ancestors of a normalized path, root first.
///
/// `"a/b/c"` yields `""`, `"a"`, `"a/b"`. The root has no ancestors.
pub fn ancestors(path: &str) -> Vec<&str> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut out = vec![""];
    out.extend(path.match_indices('/').map(|(i, _)| &path[..i]));
    out
}

/// Expand a branch name to its full ref name (`main` -> `refs/heads/main`).
pub fn branch_ref(name: &str) -> String {
    if name.starts_with("refs/") {
        name.to_string()
    } else {
        format!("refs/heads/{}", name)
    }
}

/// Shorten a full ref name for display (`refs/heads/main` -> `main`).
pub fn shorten_ref_name(name: &str) -> &str {
    for prefix in ["refs/heads/", "refs/tags/", "refs/remotes/", "refs/"] {
        if let Some(short) = name.strip_prefix(prefix) {
            return short;
        }
    }
    name
}

/// Abbreviate an object id to its first `len` hex digits.
pub fn abbreviate(id: git2::Oid, len: usize) -> String {
    let hex = id.to_string();
    hex[..len.min(hex.len())].to_string()
}
