use std::fs::File;

/// Capabilities requested at open time, decoded from the engine's flags bitmask by the
/// registration layer before it ever reaches the core.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub create: bool,
    pub exclusive: bool,
    pub readonly: bool,
    pub delete_on_close: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Database,
    Journal,
    Wal,
}

/// A single open of a named file, or a passthrough to a host-filesystem temp file for opens
/// with no name. Addressing within a `Named` handle is always by 1-based page number; the
/// `Temp` variant is a narrow passthrough and carries no page semantics at all.
pub enum FileHandle {
    Named {
        name: String,
        kind: FileKind,
        flags: OpenFlags,
    },
    Temp {
        file: File,
        delete_on_close: bool,
    },
}

impl FileHandle {
    pub fn name(&self) -> Option<&str> {
        match self {
            FileHandle::Named { name, .. } => Some(name),
            FileHandle::Temp { .. } => None,
        }
    }

    pub fn delete_on_close(&self) -> bool {
        match self {
            FileHandle::Named { flags, .. } => flags.delete_on_close,
            FileHandle::Temp {
                delete_on_close, ..
            } => *delete_on_close,
        }
    }
}
