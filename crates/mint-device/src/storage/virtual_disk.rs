//! In-memory FAT12 disk presented over mass storage
//!
//! Sixteen 512-byte blocks. Block 0 holds the boot sector, the README lives
//! in block 1, and a file dropped by the host lands in block 3. Host writes
//! arrive in bursts; once the host has been quiet for the settle period and
//! the burst touched block 3, the block's contents (trailing zeros trimmed)
//! are handed to the file-drop handler exactly once.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use super::{FileDropHandler, VirtualStorage, BOOT_README};
use crate::error::{DeviceError, Result};
use crate::hal::Clock;

pub const BLOCK_SIZE: usize = 512;
pub const BLOCK_COUNT: usize = 16;

/// Block holding the README
pub const README_BLOCK: usize = 1;

/// Block where a dropped file's data lands
pub const DATA_BLOCK: usize = 3;

pub const VOLUME_LABEL: &[u8; 11] = b"MINT DEVICE";

/// Boot sector of the 16-block FAT12 volume
fn boot_sector() -> [u8; BLOCK_SIZE] {
    let mut sector = [0u8; BLOCK_SIZE];
    sector[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
    sector[3..11].copy_from_slice(b"MSDOS5.0");
    sector[11..13].copy_from_slice(&(BLOCK_SIZE as u16).to_le_bytes());
    sector[13] = 1; // sectors per cluster
    sector[14..16].copy_from_slice(&1u16.to_le_bytes()); // reserved sectors
    sector[16] = 1; // FATs
    sector[17..19].copy_from_slice(&16u16.to_le_bytes()); // root entries
    sector[19..21].copy_from_slice(&(BLOCK_COUNT as u16).to_le_bytes());
    sector[21] = 0xF8; // fixed disk
    sector[22..24].copy_from_slice(&1u16.to_le_bytes()); // sectors per FAT
    sector[24..26].copy_from_slice(&1u16.to_le_bytes()); // sectors per track
    sector[26..28].copy_from_slice(&1u16.to_le_bytes()); // heads
    sector[36] = 0x80; // drive number
    sector[38] = 0x29; // extended boot signature
    sector[43..54].copy_from_slice(VOLUME_LABEL);
    sector[54..62].copy_from_slice(b"FAT12   ");
    sector[510] = 0x55;
    sector[511] = 0xAA;
    sector
}

/// Host writes since the last delivery
#[derive(Debug, Clone, Copy)]
struct WriteBurst {
    last_write_ms: u64,
    touched_data: bool,
}

struct DiskImage {
    blocks: Vec<[u8; BLOCK_SIZE]>,
    burst: Option<WriteBurst>,
    attached: bool,
}

impl DiskImage {
    fn blank() -> Self {
        Self {
            blocks: vec![[0u8; BLOCK_SIZE]; BLOCK_COUNT],
            burst: None,
            attached: false,
        }
    }
}

fn lock(image: &Mutex<DiskImage>) -> Result<MutexGuard<'_, DiskImage>> {
    image.lock().map_err(|_| {
        DeviceError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk image lock poisoned",
        ))
    })
}

fn check_range(lba: usize, blocks: usize) -> Result<()> {
    if blocks == 0 || lba.checked_add(blocks).map_or(true, |end| end > BLOCK_COUNT) {
        return Err(DeviceError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("blocks {}..{} outside 0..{}", lba, lba.saturating_add(blocks), BLOCK_COUNT),
        )));
    }
    Ok(())
}

/// Device side of the disk
pub struct VirtualDisk {
    image: Arc<Mutex<DiskImage>>,
    clock: Arc<dyn Clock>,
    settle_ms: u64,
    handler: Option<FileDropHandler>,
}

impl VirtualDisk {
    pub fn new(clock: Arc<dyn Clock>, settle_ms: u64) -> Self {
        Self {
            image: Arc::new(Mutex::new(DiskImage::blank())),
            clock,
            settle_ms,
            handler: None,
        }
    }

    /// Handle through which a host reads and writes blocks
    pub fn host(&self) -> HostPort {
        HostPort {
            image: self.image.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl VirtualStorage for VirtualDisk {
    fn begin(&mut self) -> Result<()> {
        let mut image = lock(&self.image)?;
        image.blocks.iter_mut().for_each(|block| block.fill(0));
        image.blocks[0] = boot_sector();
        write_readme(&mut image, BOOT_README);
        image.burst = None;
        image.attached = true;
        info!(
            "Virtual disk attached ({} x {} bytes)",
            BLOCK_COUNT, BLOCK_SIZE
        );
        Ok(())
    }

    fn register_file_changed_callback(&mut self, handler: FileDropHandler) {
        self.handler = Some(handler);
    }

    fn update_display_text(&mut self, text: &str) -> Result<()> {
        let mut image = lock(&self.image)?;
        write_readme(&mut image, text);
        Ok(())
    }

    fn task(&mut self) -> Result<()> {
        let contents = {
            let mut image = lock(&self.image)?;
            let burst = match image.burst {
                Some(burst) => burst,
                None => return Ok(()),
            };
            if self.clock.now_ms().saturating_sub(burst.last_write_ms) < self.settle_ms {
                return Ok(());
            }
            image.burst = None;
            if !burst.touched_data {
                debug!("Host write burst settled without touching the data block");
                return Ok(());
            }
            let block = &mut image.blocks[DATA_BLOCK];
            let end = block.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            let contents = zeroize::Zeroizing::new(block[..end].to_vec());
            block.zeroize();
            contents
        };

        match self.handler.as_mut() {
            Some(handler) => {
                debug!("Delivering {} byte file drop", contents.len());
                handler(contents.as_slice());
            }
            None => warn!("File drop discarded: no handler registered"),
        }
        Ok(())
    }
}

/// README writes come from the device and never start a burst
fn write_readme(image: &mut DiskImage, text: &str) {
    let bytes = text.as_bytes();
    if bytes.len() > BLOCK_SIZE {
        warn!(
            "README truncated from {} to {} bytes",
            bytes.len(),
            BLOCK_SIZE
        );
    }
    let len = bytes.len().min(BLOCK_SIZE);
    let block = &mut image.blocks[README_BLOCK];
    block.fill(0);
    block[..len].copy_from_slice(&bytes[..len]);
}

/// Host side of the disk
#[derive(Clone)]
pub struct HostPort {
    image: Arc<Mutex<DiskImage>>,
    clock: Arc<dyn Clock>,
}

impl HostPort {
    /// Read whole blocks starting at `lba`
    pub fn read_blocks(&self, lba: usize, out: &mut [u8]) -> Result<()> {
        if out.len() % BLOCK_SIZE != 0 {
            return Err(DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "read length is not a whole number of blocks",
            )));
        }
        check_range(lba, out.len() / BLOCK_SIZE)?;
        let image = lock(&self.image)?;
        for (i, chunk) in out.chunks_mut(BLOCK_SIZE).enumerate() {
            chunk.copy_from_slice(&image.blocks[lba + i]);
        }
        Ok(())
    }

    /// Write whole blocks starting at `lba`
    pub fn write_blocks(&self, lba: usize, data: &[u8]) -> Result<()> {
        if data.len() % BLOCK_SIZE != 0 {
            return Err(DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "write length is not a whole number of blocks",
            )));
        }
        let count = data.len() / BLOCK_SIZE;
        check_range(lba, count)?;

        let now = self.clock.now_ms();
        let mut image = lock(&self.image)?;
        if !image.attached {
            return Err(DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "disk not attached",
            )));
        }
        for (i, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
            image.blocks[lba + i].copy_from_slice(chunk);
        }

        let touched = (lba..lba + count).contains(&DATA_BLOCK);
        let burst = image.burst.get_or_insert(WriteBurst {
            last_write_ms: now,
            touched_data: false,
        });
        burst.last_write_ms = now;
        burst.touched_data |= touched;
        Ok(())
    }

    /// Drop a file: its data goes to the data block, zero padded
    pub fn drop_file(&self, contents: &[u8]) -> Result<()> {
        if contents.len() > BLOCK_SIZE {
            return Err(DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("file of {} bytes does not fit one block", contents.len()),
            )));
        }
        let mut block = zeroize::Zeroizing::new([0u8; BLOCK_SIZE]);
        block[..contents.len()].copy_from_slice(contents);
        self.write_blocks(DATA_BLOCK, &block[..])
    }

    /// README as the host would read it
    pub fn readme(&self) -> Result<String> {
        let mut block = [0u8; BLOCK_SIZE];
        self.read_blocks(README_BLOCK, &mut block)?;
        let end = block.iter().position(|&b| b == 0).unwrap_or(BLOCK_SIZE);
        Ok(String::from_utf8_lossy(&block[..end]).into_owned())
    }
}
