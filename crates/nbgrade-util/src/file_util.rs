//! Utility functions wrapping the standard library's IO and filesystem functions
//! so that errors carry the path of the file that caused them.

use crate::error::FileError;
use std::{
    fs::{self, File, ReadDir},
    io::Read,
    path::Path,
};

pub fn open_file(path: impl AsRef<Path>) -> Result<File, FileError> {
    let path = path.as_ref();
    File::open(path).map_err(|e| FileError::FileOpen(path.to_path_buf(), e))
}

pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>, FileError> {
    let path = path.as_ref();
    let mut file = open_file(path)?;
    let mut bytes = vec![];
    file.read_to_end(&mut bytes)
        .map_err(|e| FileError::FileRead(path.to_path_buf(), e))?;
    Ok(bytes)
}

pub fn read_file_to_string(path: impl AsRef<Path>) -> Result<String, FileError> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|e| FileError::FileRead(path.to_path_buf(), e))
}

/// Note: creates all intermediary directories if needed.
pub fn write_to_file(source: impl AsRef<[u8]>, target: impl AsRef<Path>) -> Result<(), FileError> {
    let target = target.as_ref();
    if let Some(parent) = target.parent() {
        if !parent.exists() {
            create_dir_all(parent)?;
        }
    }
    fs::write(target, source.as_ref()).map_err(|e| FileError::FileWrite(target.to_path_buf(), e))
}

/// Writes the file and restricts its permissions to the given unix mode.
#[cfg(unix)]
pub fn write_to_file_with_mode(
    source: impl AsRef<[u8]>,
    target: impl AsRef<Path>,
    mode: u32,
) -> Result<(), FileError> {
    use std::os::unix::fs::PermissionsExt;

    let target = target.as_ref();
    write_to_file(source, target)?;
    fs::set_permissions(target, fs::Permissions::from_mode(mode))
        .map_err(|e| FileError::Permissions(target.to_path_buf(), e))
}

pub fn read_dir(path: impl AsRef<Path>) -> Result<ReadDir, FileError> {
    fs::read_dir(&path).map_err(|e| FileError::DirRead(path.as_ref().to_path_buf(), e))
}

pub fn create_dir_all(path: impl AsRef<Path>) -> Result<(), FileError> {
    fs::create_dir_all(&path).map_err(|e| FileError::DirCreate(path.as_ref().to_path_buf(), e))
}

pub fn remove_file(path: impl AsRef<Path>) -> Result<(), FileError> {
    let path = path.as_ref();
    fs::remove_file(path).map_err(|e| FileError::FileRemove(path.to_path_buf(), e))
}

pub fn remove_dir_all(path: impl AsRef<Path>) -> Result<(), FileError> {
    fs::remove_dir_all(&path).map_err(|e| FileError::DirRemove(path.as_ref().to_path_buf(), e))
}

pub fn copy_file(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<(), FileError> {
    let from = from.as_ref();
    let to = to.as_ref();
    fs::copy(from, to).map_err(|e| FileError::FileCopy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Copies the files of a directory into the target directory (one level).
/// Subdirectories are symlinked rather than copied, so that a scratch
/// workspace can see nested data without duplicating it.
#[cfg(unix)]
pub fn copy_dir_shallow(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<(), FileError> {
    let source = source.as_ref();
    let target = target.as_ref();
    create_dir_all(target)?;
    for entry in read_dir(source)? {
        let entry = entry.map_err(|e| FileError::DirRead(source.to_path_buf(), e))?;
        let entry_path = entry.path();
        let file_name = entry_path
            .file_name()
            .ok_or_else(|| FileError::NoFileName(entry_path.clone()))?;
        let target_path = target.join(file_name);
        if entry_path.is_dir() {
            std::os::unix::fs::symlink(&entry_path, &target_path).map_err(|e| {
                FileError::Symlink {
                    from: entry_path.clone(),
                    to: target_path.clone(),
                    source: e,
                }
            })?;
        } else {
            copy_file(&entry_path, &target_path)?;
        }
        log::trace!(
            "copied {} from {} to {}",
            file_name.to_string_lossy(),
            source.display(),
            target.display()
        );
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use std::path::PathBuf;

    fn file_to(
        target_dir: impl AsRef<Path>,
        target_relative: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
    ) -> PathBuf {
        let target = target_dir.as_ref().join(target_relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&target, contents.as_ref()).unwrap();
        target
    }

    #[test]
    fn writes_and_reads() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("deep/nested/file");
        write_to_file("hello", &target).unwrap();
        assert_eq!(read_file_to_string(&target).unwrap(), "hello");
    }

    #[test]
    fn copies_shallow_and_symlinks_dirs() {
        let source = tempfile::tempdir().unwrap();
        file_to(&source, "a.py", "a");
        file_to(&source, "sub/b.py", "b");

        let target = tempfile::tempdir().unwrap();
        copy_dir_shallow(source.path(), target.path()).unwrap();

        assert_eq!(
            read_file_to_string(target.path().join("a.py")).unwrap(),
            "a"
        );
        let sub = target.path().join("sub");
        assert!(sub.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(read_file_to_string(sub.join("b.py")).unwrap(), "b");
    }

    #[test]
    fn error_carries_path() {
        let err = read_file("/nonexistent/nbgrade-test").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/nbgrade-test"));
    }
}
