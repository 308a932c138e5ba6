use anyhow::Context as _;
use fs2::FileExt as _;
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

pub const LOCK_FILE_NAME: &str = "blockcast-rx.lock";

/// Exclusive advisory lock on a data directory, so two receivers never write the same cache.
/// Released when dropped or when the process dies.
#[derive(Debug)]
pub struct DataDirLock {
    _file: std::fs::File,
    path: PathBuf,
}

impl DataDirLock {
    pub fn acquire(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        let path = data_dir.join(LOCK_FILE_NAME);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: file, path }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(anyhow::anyhow!(
                "data dir {} is in use by another receiver (lock held at {})",
                data_dir.display(),
                path.display()
            )),
            Err(e) => Err(anyhow::anyhow!(e))
                .with_context(|| format!("failed to lock {}", path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
