//! POSIX-style path segment manipulation shared by the SSH, S3, and
//! archive backends, whose locations are always `/`-separated strings
//! regardless of the host OS running `tfm`.

/// Normalize a POSIX path: collapse `//`, drop trailing slash (except
/// root), leave `.`/`..` alone (backends resolve those, not this helper).
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let leading = path.starts_with('/');
    let mut parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        parts.push("");
        return if leading { "/".to_string() } else { "".to_string() };
    }
    let joined = parts.join("/");
    if leading {
        format!("/{joined}")
    } else {
        joined
    }
}

pub fn join(base: &str, child: &str) -> String {
    if child.starts_with('/') {
        return normalize(child);
    }
    if base.ends_with('/') {
        normalize(&format!("{base}{child}"))
    } else {
        normalize(&format!("{base}/{child}"))
    }
}

/// Final path segment, or "" for root.
pub fn name(path: &str) -> String {
    let normalized = normalize(path);
    normalized.rsplit('/').next().unwrap_or("").to_string()
}

/// Parent path, or the root itself if `path` is already root.
pub fn parent(path: &str) -> String {
    let normalized = normalize(path);
    match normalized.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => normalized[..idx].to_string(),
        None => "/".to_string(),
    }
}

/// Lowercased extension including the leading dot, or "" if none.
pub fn suffix(path: &str) -> String {
    let n = name(path);
    match n.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => n[idx..].to_lowercase(),
    }
}

pub fn with_name(path: &str, new_name: &str) -> String {
    join(&parent(path), new_name)
}

pub fn with_suffix(path: &str, new_suffix: &str) -> String {
    let n = name(path);
    let stem = match n.rfind('.') {
        Some(0) | None => n.as_str(),
        Some(idx) => &n[..idx],
    };
    let suffix = if new_suffix.is_empty() || new_suffix.starts_with('.') {
        new_suffix.to_string()
    } else {
        format!(".{new_suffix}")
    };
    with_name(path, &format!("{stem}{suffix}"))
}

pub fn parts(path: &str) -> Vec<String> {
    normalize(path).split('/').filter(|s| !s.is_empty()).map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_absolute_child() {
        assert_eq!(join("/a/b", "/c"), "/c");
    }

    #[test]
    fn join_handles_relative_child() {
        assert_eq!(join("/a/b", "c"), "/a/b/c");
        assert_eq!(join("/a/b/", "c"), "/a/b/c");
    }

    #[test]
    fn name_of_root_is_empty() {
        assert_eq!(name("/"), "");
    }

    #[test]
    fn parent_of_top_level_is_root() {
        assert_eq!(parent("/a"), "/");
    }

    #[test]
    fn parent_join_name_round_trips() {
        let p = "/a/b/c.txt";
        assert_eq!(join(&parent(p), &name(p)), p);
    }

    #[test]
    fn suffix_is_lowercased() {
        assert_eq!(suffix("/a/B.TXT"), ".txt");
        assert_eq!(suffix("/a/noext"), "");
    }

    #[test]
    fn with_suffix_replaces_extension() {
        assert_eq!(with_suffix("/a/b.tar.gz", ".zip"), "/a/b.tar.zip");
    }
}
