//! Core shared types for Lumen.
//!
//! This crate is intentionally small and dependency-free.

use std::any::Any;
use std::fmt;

/// Stable identity for a file known to the VFS layer.
///
/// Ids are allocated by `lumen-vfs`'s registry; this type only carries the raw
/// value so low-level crates don't need to depend on the VFS.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

impl FileId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

/// Best-effort extraction of a human-readable message from a panic payload.
///
/// Panic payloads are almost always `&str` or `String`; anything else gets a
/// placeholder so callers can log without re-panicking.
pub fn panic_payload_to_str(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_round_trips_raw_value() {
        let id = FileId::from_raw(42);
        assert_eq!(id.to_raw(), 42);
        assert_eq!(format!("{id:?}"), "FileId(42)");
    }

    #[test]
    fn panic_payload_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_payload_to_str(&*payload), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_payload_to_str(&*payload), "kaboom");

        let payload: Box<dyn Any + Send> = Box::new(17_u64);
        assert_eq!(panic_payload_to_str(&*payload), "<non-string panic payload>");
    }
}
