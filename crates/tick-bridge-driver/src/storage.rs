//! Persistent storage slots.
//!
//! The host's outer environment offers exactly one addressable slot holding
//! one opaque blob, read once at driver start and written at each tick end.
//! The slot is text-safe only, so every implementation round-trips the raw
//! bytes through the byte-preserving codec; the constraint is exercised,
//! never bypassed.

use std::path::PathBuf;

use tracing::debug;

use tick_bridge_common::{StorageError, codec};

/// A single external storage slot for the persistent state buffer.
///
/// Absence (`Ok(None)`) is a valid state and means a cold start.
pub trait StateSlot {
    /// Read the slot's current contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails or holds text that the
    /// byte-preserving codec cannot decode.
    fn load(&mut self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Overwrite the slot with a new state buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn store(&mut self, bytes: &[u8]) -> Result<(), StorageError>;
}

/// In-process slot holding the encoded text form.
///
/// Models the real storage boundary closely enough for tests: the stored
/// representation is text, not bytes.
#[derive(Debug, Default)]
pub struct MemorySlot {
    text: Option<String>,
}

impl MemorySlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot pre-seeded with raw bytes, as if a previous process
    /// lifetime had written them.
    pub fn seeded(bytes: &[u8]) -> Self {
        Self {
            text: Some(codec::encode(bytes)),
        }
    }

    /// The stored text form, if any.
    pub fn encoded_text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl StateSlot for MemorySlot {
    fn load(&mut self) -> Result<Option<Vec<u8>>, StorageError> {
        match &self.text {
            Some(text) => Ok(Some(codec::decode(text)?)),
            None => Ok(None),
        }
    }

    fn store(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        self.text = Some(codec::encode(bytes));
        Ok(())
    }
}

/// File-backed slot storing the encoded text as a UTF-8 file.
///
/// A missing file is a cold start, not an error.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    /// Create a slot backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl StateSlot for FileSlot {
    fn load(&mut self) -> Result<Option<Vec<u8>>, StorageError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored state; cold start");
                return Ok(None);
            }
            Err(e) => {
                return Err(StorageError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                });
            }
        };

        Ok(Some(codec::decode(&text)?))
    }

    fn store(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        std::fs::write(&self.path, codec::encode(bytes)).map_err(|e| StorageError::Io {
            path: self.path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_memory_slot_starts_empty() {
        let mut slot = MemorySlot::new();
        assert_eq!(slot.load().unwrap(), None);
    }

    #[test]
    fn test_memory_slot_round_trip() {
        let mut slot = MemorySlot::new();
        let state = [0x00, 0x42, 0x80, 0xFF];

        slot.store(&state).unwrap();
        assert_eq!(slot.load().unwrap(), Some(state.to_vec()));

        // The stored representation really is one char per byte.
        assert_eq!(slot.encoded_text().unwrap().chars().count(), 4);
    }

    #[test]
    fn test_memory_slot_seeded() {
        let mut slot = MemorySlot::seeded(&[1, 2, 3]);
        assert_eq!(slot.load().unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_file_slot_missing_is_cold_start() {
        let mut slot = FileSlot::new("/nonexistent/tick-bridge-state.txt");
        assert!(slot.load().unwrap().is_none());
    }

    #[test]
    fn test_file_slot_round_trip() {
        let path = std::env::temp_dir().join(format!("tick-bridge-slot-{}.txt", Uuid::new_v4()));
        let mut slot = FileSlot::new(&path);

        let state: Vec<u8> = (0..=255).collect();
        slot.store(&state).unwrap();
        assert_eq!(slot.load().unwrap(), Some(state));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_slot_rejects_foreign_text() {
        let path = std::env::temp_dir().join(format!("tick-bridge-slot-{}.txt", Uuid::new_v4()));
        std::fs::write(&path, "not from the encoder: \u{1F980}").unwrap();

        let mut slot = FileSlot::new(&path);
        assert!(matches!(slot.load(), Err(StorageError::Codec(_))));

        std::fs::remove_file(&path).unwrap();
    }
}
