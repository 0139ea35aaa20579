//! File system access used by the tree builder.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use compact_str::CompactString;

use ddff_core::ScanError;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// Entry name (not full path).
    pub name: CompactString,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Symbolic link, junction or other reparse point.
    pub is_link: bool,
    /// Neither a regular file, a directory nor a link (pipe, socket, device).
    pub is_special: bool,
}

impl DirEntryInfo {
    pub fn file(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            is_link: false,
            is_special: false,
        }
    }

    pub fn dir(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            is_link: false,
            is_special: false,
        }
    }

    pub fn link(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            is_link: true,
            is_special: false,
        }
    }

    pub fn special(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            is_link: false,
            is_special: true,
        }
    }

    /// `.` and `..` pseudo-entries.
    pub fn is_pseudo(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Directory listing and size queries. All paths are fully qualified.
pub trait FileSystemProvider {
    /// List the entries of a directory.
    fn list_entries(&self, dir: &Path) -> Result<Vec<DirEntryInfo>, ScanError>;

    /// Size of a regular file in bytes.
    fn file_size(&self, path: &Path) -> Result<u64, ScanError>;

    /// Turn a user-supplied root into the fully-qualified directory path
    /// used for the rest of the scan.
    fn resolve_root(&self, path: &Path) -> Result<PathBuf, ScanError> {
        Ok(path.to_path_buf())
    }
}

impl<P: FileSystemProvider + ?Sized> FileSystemProvider for &P {
    fn list_entries(&self, dir: &Path) -> Result<Vec<DirEntryInfo>, ScanError> {
        (**self).list_entries(dir)
    }

    fn file_size(&self, path: &Path) -> Result<u64, ScanError> {
        (**self).file_size(path)
    }

    fn resolve_root(&self, path: &Path) -> Result<PathBuf, ScanError> {
        (**self).resolve_root(path)
    }
}

/// [`FileSystemProvider`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystemProvider for LocalFileSystem {
    fn list_entries(&self, dir: &Path) -> Result<Vec<DirEntryInfo>, ScanError> {
        let read_dir = fs::read_dir(dir).map_err(|e| ScanError::io(dir, e))?;
        let mut entries = Vec::new();

        for entry in read_dir {
            let entry = entry.map_err(|e| ScanError::io(dir, e))?;
            let name = CompactString::new(entry.file_name().to_string_lossy());
            // file_type() does not follow links
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(err) => {
                    return Err(ScanError::io(entry.path(), err));
                }
            };

            let is_link = file_type.is_symlink() || is_reparse_point(&entry);
            entries.push(DirEntryInfo {
                name,
                is_dir: file_type.is_dir(),
                is_link,
                is_special: !is_link && !file_type.is_dir() && !file_type.is_file(),
            });
        }

        Ok(entries)
    }

    fn file_size(&self, path: &Path) -> Result<u64, ScanError> {
        // Opening a pipe would block, so only regular files get that far
        let metadata = fs::symlink_metadata(path).map_err(|e| ScanError::io(path, e))?;
        if !metadata.is_file() {
            return Err(ScanError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        // Opening the file proves it is readable, not just listed
        let file = fs::File::open(path).map_err(|e| ScanError::io(path, e))?;
        let metadata = file.metadata().map_err(|e| ScanError::io(path, e))?;
        Ok(metadata.len())
    }

    fn resolve_root(&self, path: &Path) -> Result<PathBuf, ScanError> {
        let resolved = path.canonicalize().map_err(|e| ScanError::io(path, e))?;
        if !resolved.is_dir() {
            return Err(ScanError::NotADirectory { path: resolved });
        }
        Ok(resolved)
    }
}

#[cfg(windows)]
fn is_reparse_point(entry: &fs::DirEntry) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;
    entry
        .metadata()
        .map(|m| m.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
fn is_reparse_point(_entry: &fs::DirEntry) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_entries() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "abc").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();

        let mut entries = LocalFileSystem.list_entries(temp.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries, vec![DirEntryInfo::file("a.txt"), DirEntryInfo::dir("sub")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_flagged() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("alias")).unwrap();

        let entries = LocalFileSystem.list_entries(temp.path()).unwrap();
        let alias = entries.iter().find(|e| e.name == "alias").unwrap();
        assert!(alias.is_link);
        assert!(!alias.is_dir);
    }

    #[cfg(unix)]
    #[test]
    fn test_fifo_is_special_and_never_opened() {
        let temp = TempDir::new().unwrap();
        let fifo = temp.path().join("pipe");
        let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(status.success());

        let entries = LocalFileSystem.list_entries(temp.path()).unwrap();
        assert_eq!(entries, vec![DirEntryInfo::special("pipe")]);
        assert!(LocalFileSystem.file_size(&fifo).is_err());
    }

    #[test]
    fn test_file_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, vec![0u8; 1500]).unwrap();
        assert_eq!(LocalFileSystem.file_size(&path).unwrap(), 1500);
    }

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        let err = LocalFileSystem
            .list_entries(&temp.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_pseudo_entries() {
        assert!(DirEntryInfo::dir(".").is_pseudo());
        assert!(DirEntryInfo::dir("..").is_pseudo());
        assert!(!DirEntryInfo::dir(".git").is_pseudo());
    }
}
