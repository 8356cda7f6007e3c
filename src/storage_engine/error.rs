use std::{error::Error, fmt, io};

/// Errors reported by the shared hash map.
///
/// Every variant except [`MapError::MapClosed`] is fatal only for the call
/// that produced it; the map stays usable.
#[derive(Debug)]
pub enum MapError {
    /// The segment owning the key has no free slot left. Capacity is fixed
    /// for the life of the file, so this is never retried internally.
    CapacityExhausted { segment: usize },

    /// The serialized key does not fit the per-entry budget. Checked before
    /// any byte is written.
    EntryTooLarge { key_len: usize, max_key_len: usize },

    /// The map was closed; no further operations are possible.
    MapClosed,

    /// An I/O or mapping failure on the backing file.
    BackingStoreFailure(io::Error),

    /// Builder parameters that cannot describe a valid map.
    InvalidConfig(String),

    /// The file is not a map, is damaged, or was created with a different
    /// configuration or value type than the one requested.
    IncompatibleLayout(String),
}

impl MapError {
    /// Returns `true` for the one terminal condition.
    pub fn is_closed(&self) -> bool {
        matches!(self, MapError::MapClosed)
    }
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::CapacityExhausted { segment } => {
                write!(f, "Capacity exhausted: segment {} has no free slot", segment)
            }
            MapError::EntryTooLarge {
                key_len,
                max_key_len,
            } => write!(
                f,
                "Entry too large: key is {} bytes, at most {} bytes fit",
                key_len, max_key_len
            ),
            MapError::MapClosed => f.write_str("Map is closed"),
            MapError::BackingStoreFailure(err) => write!(f, "Backing store failure: {}", err),
            MapError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            MapError::IncompatibleLayout(msg) => write!(f, "Incompatible map file: {}", msg),
        }
    }
}

impl Error for MapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MapError::BackingStoreFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for MapError {
    fn from(err: io::Error) -> Self {
        MapError::BackingStoreFailure(err)
    }
}

pub type Result<T> = std::result::Result<T, MapError>;
