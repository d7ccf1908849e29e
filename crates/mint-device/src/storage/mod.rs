//! Virtual storage: how entropy reaches the device and status leaves it
//!
//! The host sees a small removable disk. Dropping a file on it delivers the
//! file's bytes to the registered handler once the host has gone quiet; the
//! device publishes its status by rewriting the disk's README.

pub mod drop_dir;
pub mod virtual_disk;

pub use drop_dir::{BreakSentinel, DropDirStorage};
pub use virtual_disk::VirtualDisk;

use crate::error::Result;

/// README shown before the device has settled into a state
pub const BOOT_README: &str = "MINT DEVICE\r\nDrop file for wallet\r\n";

/// Receives the full contents of each dropped file
pub type FileDropHandler = Box<dyn FnMut(&[u8]) + Send>;

/// Storage collaborator of the device
pub trait VirtualStorage: Send {
    /// Present the disk to the host
    fn begin(&mut self) -> Result<()>;

    /// Install the handler for file drops, replacing any previous one
    fn register_file_changed_callback(&mut self, handler: FileDropHandler);

    /// Replace the README the host sees
    fn update_display_text(&mut self, text: &str) -> Result<()>;

    /// Service pending host activity; may invoke the file-drop handler
    fn task(&mut self) -> Result<()>;
}
