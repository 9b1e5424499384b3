use std::fs::{self, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::{Error, Result};

/// Contents written next to their destination but not yet visible there.
///
/// Dropping a staged file without committing it removes the temporary file
/// and leaves the destination as it was.
pub struct StagedFile {
    file: NamedTempFile,
    dest: PathBuf,
}

impl StagedFile {
    pub fn stage(dest: impl AsRef<Path>, contents: &[u8], mode: u32) -> Result<Self> {
        let dest = dest.as_ref().to_path_buf();
        let dir = match dest.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            return Err(Error::NotFound(format!(
                "destination directory {} does not exist",
                dir.display()
            )));
        }

        // same directory so the rename never crosses a filesystem
        let mut file = NamedTempFile::new_in(&dir)?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        fs::set_permissions(file.path(), Permissions::from_mode(mode))?;
        debug!(tmp = %file.path().display(), dest = %dest.display(), "staged file");
        Ok(Self { file, dest })
    }

    /// Atomically replaces the destination with the staged contents.
    pub fn commit(self) -> Result<PathBuf> {
        let Self { file, dest } = self;
        file.persist(&dest)?;
        Ok(dest)
    }
}

pub fn write_atomic(dest: impl AsRef<Path>, contents: &[u8], mode: u32) -> Result<PathBuf> {
    StagedFile::stage(dest, contents, mode)?.commit()
}
