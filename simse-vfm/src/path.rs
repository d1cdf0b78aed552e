// ── Constants ───────────────────────────────────────────────────────────────

pub const ROOT_PATH: &str = "/";
pub const ROOT_NAME: &str = "root";
pub const HOME_PATH: &str = "/home";
pub const SHARED_PATH: &str = "/home/shared";
pub const SYSTEM_PATH: &str = "/system";

pub const MAX_NAME_LENGTH: usize = 255;

/// Word used by auto-rename unless configured otherwise.
pub const DEFAULT_COPY_SUFFIX: &str = "copy";

// ── Path functions ──────────────────────────────────────────────────────────

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Normalize a path: replace backslash, collapse repeated slashes, resolve
/// `.` and `..`, and always return an absolute path without a trailing slash.
pub fn normalize_path(input: &str) -> String {
    let p = input.replace('\\', "/");
    let mut resolved: Vec<&str> = Vec::new();
    for seg in p.split('/') {
        if seg.is_empty() || seg == "." {
            continue;
        }
        if seg == ".." {
            resolved.pop();
        } else {
            resolved.push(seg);
        }
    }
    if resolved.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("/{}", resolved.join("/"))
    }
}

/// Join a child name onto a normalized parent path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Return the parent path of a normalized path.
/// Returns `None` for the root path.
pub fn parent_path(normalized_path: &str) -> Option<String> {
    if normalized_path == ROOT_PATH {
        return None;
    }
    match normalized_path.rfind('/') {
        Some(0) | None => Some(ROOT_PATH.to_string()),
        Some(pos) => Some(normalized_path[..pos].to_string()),
    }
}

/// Return the base name (final segment) of a normalized path.
/// Returns an empty string for the root path.
pub fn base_name(normalized_path: &str) -> &str {
    if normalized_path == ROOT_PATH {
        return "";
    }
    match normalized_path.rfind('/') {
        Some(pos) => &normalized_path[pos + 1..],
        None => normalized_path,
    }
}

/// Split a normalized path into `(parent, name)`. The root splits into
/// `("/", "")`.
pub fn split_parent(normalized_path: &str) -> (String, &str) {
    let parent = parent_path(normalized_path).unwrap_or_else(|| ROOT_PATH.to_string());
    (parent, base_name(normalized_path))
}

/// True if `path` equals `ancestor` or is nested below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT_PATH {
        return true;
    }
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

// ── Names ───────────────────────────────────────────────────────────────────

/// Split a file name into stem and extension (the extension keeps its dot).
/// Leading dots do not start an extension, so `.profile` has none.
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(pos) => name.split_at(leading + pos),
        None => (name, ""),
    }
}

/// Build the `attempt`-th collision name: `stem - copy.ext` for the first
/// attempt, `stem - copy2.ext`, `stem - copy3.ext`, … afterwards.
pub fn copy_name(name: &str, attempt: usize, suffix: &str, keep_extension: bool) -> String {
    let (stem, ext) = if keep_extension {
        split_extension(name)
    } else {
        (name, "")
    };
    if attempt <= 1 {
        format!("{} - {}{}", stem, suffix, ext)
    } else {
        format!("{} - {}{}{}", stem, suffix, attempt, ext)
    }
}

/// Check if a name contains forbidden characters (separators or control chars).
fn has_forbidden_chars(name: &str) -> bool {
    name.bytes().any(|b| b <= 0x1f || b == b'/' || b == b'\\')
}

/// Validate a single node name. Returns `Some(error_message)` if invalid.
pub fn validate_name(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("Name cannot be empty".to_string());
    }
    if name == "." || name == ".." {
        return Some(format!("Name is reserved: {}", name));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Some(format!("Name exceeds max length ({})", MAX_NAME_LENGTH));
    }
    if has_forbidden_chars(name) {
        return Some("Name contains forbidden characters".to_string());
    }
    None
}

/// The home directory path of a user.
pub fn home_of(username: &str) -> String {
    join(HOME_PATH, username)
}

// ── Tests ───────────────────────────────────────────────────────────────────
