use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Atomically replace the contents of `path`.
///
/// The bytes go to a sibling temp file which is synced and then persisted over
/// the target, so readers observe either the old or the new contents.
///
/// # Errors
/// Returns an error if the temp file cannot be created, written or persisted.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;

    temp.persist(path).map(|_| ()).map_err(|e| e.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_to_string_lossy_replaces_invalid_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("package.json");
        fs::write(&path, [b'{', b'}', 0xff]).unwrap();

        let content = read_to_string_lossy(&path).unwrap();
        assert!(content.starts_with("{}"));
        assert!(content.contains('\u{FFFD}'));
    }

    #[test]
    fn test_read_to_string_lossy_missing_file() {
        let dir = tempdir().unwrap();
        assert!(read_to_string_lossy(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flight.lock");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_atomic_write_leaves_single_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flight.lock");

        atomic_write(&path, b"{}").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("flight.lock")]);
    }
}
