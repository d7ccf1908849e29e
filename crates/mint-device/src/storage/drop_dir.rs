//! Drop-directory storage for running the device on a host
//!
//! A plain directory stands in for the removable disk. Any regular file
//! written into it is delivered once, after its size and modification time
//! have held still for the settle period. The device's display text is kept
//! in `README.TXT`, and the presence of a `BREAK` file simulates an open
//! tamper circuit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::virtual_disk::{BLOCK_COUNT, BLOCK_SIZE};
use super::{FileDropHandler, VirtualStorage, BOOT_README};
use crate::error::{DeviceError, Result};
use crate::hal::{Clock, TamperPin};

/// File the display text is written to
pub const README_NAME: &str = "README.TXT";

/// Sentinel whose presence means the circuit is broken
pub const BREAK_NAME: &str = "BREAK";

/// Files larger than the simulated disk are never delivered
const MAX_FILE_BYTES: u64 = (BLOCK_SIZE * BLOCK_COUNT) as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(metadata: &std::fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        }
    }
}

/// Storage backed by a host directory
pub struct DropDirStorage {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    settle_ms: u64,
    handler: Option<FileDropHandler>,
    /// Last stamp handed to the handler, per file
    delivered: HashMap<PathBuf, FileStamp>,
    /// Stamp awaiting settle and when it was first seen
    pending: HashMap<PathBuf, (FileStamp, u64)>,
}

impl DropDirStorage {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>, settle_ms: u64) -> Self {
        Self {
            dir: dir.into(),
            clock,
            settle_ms,
            handler: None,
            delivered: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn readme_path(&self) -> PathBuf {
        self.dir.join(README_NAME)
    }

    /// Candidate drop files currently in the directory
    fn scan(&self) -> Result<Vec<(PathBuf, FileStamp)>> {
        let pattern = format!(
            "{}/*",
            glob::Pattern::escape(&self.dir.to_string_lossy())
        );

        let paths = glob::glob(&pattern)
            .map_err(|e| DeviceError::Config(e.to_string()))?
            .filter_map(|r| r.ok());

        let mut files = Vec::new();
        for path in paths {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if name == README_NAME || name == BREAK_NAME || name.starts_with('.') {
                continue;
            }
            let metadata = match std::fs::metadata(&path) {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            files.push((path, FileStamp::of(&metadata)));
        }
        Ok(files)
    }

    fn deliver(&mut self, path: &Path) -> Result<()> {
        let contents = zeroize::Zeroizing::new(std::fs::read(path)?);
        match self.handler.as_mut() {
            Some(handler) => {
                info!("File drop: {:?} ({} bytes)", path.file_name(), contents.len());
                handler(contents.as_slice());
            }
            None => warn!("File drop discarded: no handler registered"),
        }
        Ok(())
    }
}

impl VirtualStorage for DropDirStorage {
    fn begin(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| DeviceError::init("storage", e))?;
        self.update_display_text(BOOT_README)
            .map_err(|e| DeviceError::init("storage", e))?;

        // Whatever is already there was dropped on a previous run
        self.delivered = self.scan()?.into_iter().collect();
        self.pending.clear();

        info!(
            "Drop directory ready at {:?} ({} existing files ignored)",
            self.dir,
            self.delivered.len()
        );
        Ok(())
    }

    fn register_file_changed_callback(&mut self, handler: FileDropHandler) {
        self.handler = Some(handler);
    }

    fn update_display_text(&mut self, text: &str) -> Result<()> {
        let path = self.readme_path();
        let temp_path = self.dir.join(format!(".{}.tmp", README_NAME));
        std::fs::write(&temp_path, text)?;
        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn task(&mut self) -> Result<()> {
        let now = self.clock.now_ms();
        let files = self.scan()?;

        let present: Vec<PathBuf> = files.iter().map(|(path, _)| path.clone()).collect();
        self.pending.retain(|path, _| present.contains(path));
        self.delivered.retain(|path, _| present.contains(path));

        let mut ready = Vec::new();
        for (path, stamp) in files {
            if self.delivered.get(&path) == Some(&stamp) {
                continue;
            }
            match self.pending.get(&path) {
                Some((seen, since)) if *seen == stamp => {
                    if now.saturating_sub(*since) >= self.settle_ms {
                        ready.push((path, stamp));
                    }
                }
                _ => {
                    debug!("Drop file {:?} changed; waiting to settle", path.file_name());
                    self.pending.insert(path, (stamp, now));
                }
            }
        }

        for (path, stamp) in ready {
            self.pending.remove(&path);
            self.delivered.insert(path.clone(), stamp);
            if stamp.len > MAX_FILE_BYTES {
                warn!(
                    "Ignoring {:?}: {} bytes exceeds the disk size",
                    path.file_name(),
                    stamp.len
                );
                continue;
            }
            self.deliver(&path)?;
        }
        Ok(())
    }
}

/// Tamper line read from a `BREAK` sentinel in the drop directory
#[derive(Debug, Clone)]
pub struct BreakSentinel {
    path: PathBuf,
}

impl BreakSentinel {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(BREAK_NAME),
        }
    }
}

impl TamperPin for BreakSentinel {
    fn configure(&self) -> Result<()> {
        match self.path.parent() {
            Some(dir) if dir.is_dir() => Ok(()),
            _ => Err(DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("drop directory for {:?} does not exist", self.path),
            ))),
        }
    }

    fn is_high(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::ManualClock;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn storage(dir: &Path) -> (Arc<ManualClock>, DropDirStorage, Arc<Mutex<Vec<Vec<u8>>>>) {
        let clock = Arc::new(ManualClock::new(0));
        let mut storage = DropDirStorage::new(dir, clock.clone(), 1_000);
        let drops = Arc::new(Mutex::new(Vec::new()));
        let sink = drops.clone();
        storage.register_file_changed_callback(Box::new(move |bytes: &[u8]| {
            sink.lock().unwrap().push(bytes.to_vec());
        }));
        storage.begin().unwrap();
        (clock, storage, drops)
    }

    #[test]
    fn test_begin_writes_readme() {
        let dir = TempDir::new().unwrap();
        let (_, storage, _) = storage(dir.path());
        let readme = std::fs::read_to_string(storage.readme_path()).unwrap();
        assert_eq!(readme, BOOT_README);
    }

    #[test]
    fn test_file_delivered_once_after_settle() {
        let dir = TempDir::new().unwrap();
        let (clock, mut storage, drops) = storage(dir.path());

        std::fs::write(dir.path().join("entropy.bin"), b"coin flips HTHHT").unwrap();
        storage.task().unwrap();
        clock.advance(500);
        storage.task().unwrap();
        assert!(drops.lock().unwrap().is_empty());

        clock.advance(500);
        storage.task().unwrap();
        clock.advance(5_000);
        storage.task().unwrap();

        let drops = drops.lock().unwrap();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0], b"coin flips HTHHT");
    }

    #[test]
    fn test_readme_and_sentinel_are_not_drops() {
        let dir = TempDir::new().unwrap();
        let (clock, mut storage, drops) = storage(dir.path());

        std::fs::write(dir.path().join(BREAK_NAME), b"").unwrap();
        storage.update_display_text("MINT DEVICE - SEALED STATE").unwrap();
        storage.task().unwrap();
        clock.advance(2_000);
        storage.task().unwrap();
        assert!(drops.lock().unwrap().is_empty());
    }

    #[test]
    fn test_existing_files_ignored_at_boot() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.bin"), b"left over").unwrap();
        let (clock, mut storage, drops) = storage(dir.path());
        storage.task().unwrap();
        clock.advance(2_000);
        storage.task().unwrap();
        assert!(drops.lock().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_file_skipped() {
        let dir = TempDir::new().unwrap();
        let (clock, mut storage, drops) = storage(dir.path());
        std::fs::write(dir.path().join("big.bin"), vec![0x5A; MAX_FILE_BYTES as usize + 1]).unwrap();
        storage.task().unwrap();
        clock.advance(1_000);
        storage.task().unwrap();
        assert!(drops.lock().unwrap().is_empty());
    }

    #[test]
    fn test_break_sentinel() {
        let dir = TempDir::new().unwrap();
        let pin = BreakSentinel::new(dir.path());
        pin.configure().unwrap();
        assert!(pin.reads_intact());

        std::fs::write(dir.path().join(BREAK_NAME), b"").unwrap();
        assert!(pin.is_high());

        let missing = BreakSentinel::new(&dir.path().join("absent"));
        assert!(missing.configure().is_err());
    }
}
