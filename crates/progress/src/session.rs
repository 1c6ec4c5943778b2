//! Volatile session flags.
//!
//! Flags live for the lifetime of the host process (including environment
//! reloads within it) and are gone after a crash or restart. A persisted
//! progress record without the matching flag therefore means the previous
//! process died mid-run.

use std::collections::HashSet;
use std::sync::RwLock;

/// Process-lifetime boolean flags keyed by name.
pub trait SessionFlags: Send + Sync {
    fn get_flag(&self, key: &str) -> bool;
    fn set_flag(&self, key: &str);
    fn erase_flag(&self, key: &str);
}

/// In-memory [`SessionFlags`].
#[derive(Debug, Default)]
pub struct MemorySessionFlags {
    flags: RwLock<HashSet<String>>,
}

impl MemorySessionFlags {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionFlags for MemorySessionFlags {
    fn get_flag(&self, key: &str) -> bool {
        self.flags
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    fn set_flag(&self, key: &str) {
        self.flags
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string());
    }

    fn erase_flag(&self, key: &str) {
        self.flags
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}
