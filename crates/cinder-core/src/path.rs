use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a path: drops `.` components and resolves `..`
/// against preceding normal components.
///
/// This does not hit the filesystem and does not resolve symlinks.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut prefix: Option<OsString> = None;
    let mut has_root = false;
    let mut stack: Vec<OsString> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix_component) => {
                prefix = Some(prefix_component.as_os_str().to_owned());
            }
            Component::RootDir => has_root = true,
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(last) = stack.last() {
                    if last != ".." {
                        stack.pop();
                        continue;
                    }
                }

                if !has_root {
                    stack.push(OsString::from(".."));
                }
            }
            Component::Normal(segment) => stack.push(segment.to_owned()),
        }
    }

    let mut out = PathBuf::new();
    match (prefix, has_root) {
        (Some(mut prefix), true) => {
            prefix.push(std::path::MAIN_SEPARATOR.to_string());
            out.push(prefix);
        }
        (Some(prefix), false) => out.push(prefix),
        (None, true) => out.push(std::path::MAIN_SEPARATOR.to_string()),
        (None, false) => {}
    }
    out.extend(stack);
    out
}

/// Normalizes a directory path for use as a search root.
///
/// Header search roots are concatenated with include spellings, so the
/// result is guaranteed to end with a separator.
pub fn clean_dir_path(path: &Path) -> PathBuf {
    let mut out = normalize_path(path).into_os_string();
    let bytes = out.to_string_lossy();
    if !bytes.ends_with(std::path::MAIN_SEPARATOR) && !bytes.ends_with('/') {
        out.push(std::path::MAIN_SEPARATOR.to_string());
    }
    PathBuf::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_removes_dot_and_dotdot() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn normalize_keeps_root_when_dotdot_underflows() {
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[test]
    fn clean_dir_path_appends_separator() {
        let cleaned = clean_dir_path(Path::new("/usr/include"));
        assert!(cleaned.to_string_lossy().ends_with(std::path::MAIN_SEPARATOR));
    }
}
