//! File resolution for module requests.

use std::path::{Component, Path, PathBuf};

/// Extensions tried after the exact path, in order.
pub const EXTENSIONS: &[&str] = &["js", "cjs", "mjs", "json"];

/// Whether a `require` specifier points at a file rather than a package.
#[must_use]
pub fn is_path_request(request: &str) -> bool {
    request == "."
        || request == ".."
        || request.starts_with("./")
        || request.starts_with("../")
        || Path::new(request).is_absolute()
}

/// Resolve `request` against `from_dir`.
///
/// Tries the exact file, then each of [`EXTENSIONS`] appended, then an
/// `index` file with the same extensions if the path is a directory.
#[must_use]
pub fn resolve_file(request: &str, from_dir: &Path) -> Option<PathBuf> {
    let base = normalize(&from_dir.join(request));

    if base.is_file() {
        return Some(base);
    }
    for ext in EXTENSIONS {
        let mut candidate = base.clone().into_os_string();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    if base.is_dir() {
        for ext in EXTENSIONS {
            let candidate = base.join(format!("index.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Lexically remove `.` and `..` components.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolution_order() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("lib/util")).unwrap();
        std::fs::write(root.join("lib/a.js"), "").unwrap();
        std::fs::write(root.join("lib/a.json"), "{}").unwrap();
        std::fs::write(root.join("lib/b.mjs"), "").unwrap();
        std::fs::write(root.join("lib/util/index.cjs"), "").unwrap();
        std::fs::write(root.join("data"), "").unwrap();

        assert_eq!(resolve_file("./lib/a", root), Some(root.join("lib/a.js")));
        assert_eq!(resolve_file("./lib/a.json", root), Some(root.join("lib/a.json")));
        assert_eq!(resolve_file("./lib/b", root), Some(root.join("lib/b.mjs")));
        assert_eq!(resolve_file("./lib/util", root), Some(root.join("lib/util/index.cjs")));
        assert_eq!(resolve_file("./data", root), Some(root.join("data")));
        assert_eq!(resolve_file("./nope", root), None);
        assert_eq!(
            resolve_file("../a", &root.join("lib/util")),
            Some(root.join("lib/a.js"))
        );
    }

    #[test]
    fn test_is_path_request() {
        assert!(is_path_request("./a"));
        assert!(is_path_request("../a"));
        assert!(is_path_request("/abs/a"));
        assert!(!is_path_request("react"));
        assert!(!is_path_request("@scope/pkg/sub"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/p/./a/../b.js")), PathBuf::from("/p/b.js"));
    }
}
