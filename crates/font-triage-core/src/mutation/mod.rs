pub mod apply;
pub mod queue;

pub use apply::{ApplyEngine, ApplyGuard, ApplyReport, ItemOutcome};
pub use queue::{MutationQueue, PlannedOp};

use std::io;
use std::path::Path;

/// Answer to a write-permission request for one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Grants write access to directories before apply touches them.
///
/// A request may involve a human and may be refused. Refusal is `Denied`,
/// distinct from an `Err` (directory missing, unreadable metadata).
pub trait PermissionBroker {
    fn request_write(&self, dir: &Path) -> io::Result<Permission>;
}

/// Checks the directory exists and is not flagged read-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsPermissionBroker;

impl PermissionBroker for FsPermissionBroker {
    fn request_write(&self, dir: &Path) -> io::Result<Permission> {
        let metadata = std::fs::metadata(dir)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Not a directory: {}", dir.display()),
            ));
        }
        if metadata.permissions().readonly() {
            Ok(Permission::Denied)
        } else {
            Ok(Permission::Granted)
        }
    }
}
