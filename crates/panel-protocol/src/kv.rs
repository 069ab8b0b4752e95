//! Typed key/value configuration store.
//!
//! Values live under a `(namespace, key)` pair and carry one of the NVS
//! item types. The first write pins the type of a key; later writes of
//! another type are refused until the key is erased.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageError;

/// Longest namespace or key name accepted by the store.
pub const MAX_NAME_LEN: usize = 15;

/// NVS item type codes, as exchanged with the serial peer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::FromRepr, strum::EnumIter,
)]
#[repr(u8)]
pub enum ItemType {
    /// Unsigned 8-bit integer.
    U8 = 0x01,
    /// Unsigned 16-bit integer.
    U16 = 0x02,
    /// Unsigned 32-bit integer.
    U32 = 0x04,
    /// Unsigned 64-bit integer.
    U64 = 0x08,
    /// Signed 8-bit integer.
    I8 = 0x11,
    /// Signed 16-bit integer.
    I16 = 0x12,
    /// Signed 32-bit integer.
    I32 = 0x14,
    /// Signed 64-bit integer.
    I64 = 0x18,
    /// String.
    Str = 0x21,
    /// Binary blob, exchanged as text.
    Blob = 0x42,
    /// Blob data chunk.
    BlobData = 0x48,
    /// Blob index.
    BlobIdx = 0x50,
    /// No value stored.
    Any = 0xff,
}

impl ItemType {
    /// Numeric code of the type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Type for a code received from the peer.
    pub fn from_code(code: u32) -> Option<Self> {
        u8::try_from(code).ok().and_then(Self::from_repr)
    }

    /// True for the integer types.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::U8 | Self::U16 | Self::U32 | Self::U64 | Self::I8 | Self::I16 | Self::I32 | Self::I64
        )
    }

    /// True for types whose value is rendered as raw text.
    pub fn is_textual(self) -> bool {
        matches!(self, Self::Str | Self::Blob | Self::BlobData)
    }
}

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ConfigValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Str(String),
    Blob(String),
}

impl ConfigValue {
    /// Parse the textual form of a value of type `item_type`.
    pub fn parse(item_type: ItemType, raw: &str) -> Result<Self, StorageError> {
        fn number<T: std::str::FromStr>(
            raw: &str,
            item_type: ItemType,
            wrap: fn(T) -> ConfigValue,
        ) -> Result<ConfigValue, StorageError> {
            raw.trim()
                .parse::<T>()
                .map(wrap)
                .map_err(|_| StorageError::InvalidValue {
                    value: raw.to_string(),
                    item_type,
                })
        }

        match item_type {
            ItemType::U8 => number(raw, item_type, Self::U8),
            ItemType::U16 => number(raw, item_type, Self::U16),
            ItemType::U32 => number(raw, item_type, Self::U32),
            ItemType::U64 => number(raw, item_type, Self::U64),
            ItemType::I8 => number(raw, item_type, Self::I8),
            ItemType::I16 => number(raw, item_type, Self::I16),
            ItemType::I32 => number(raw, item_type, Self::I32),
            ItemType::I64 => number(raw, item_type, Self::I64),
            ItemType::Str => Ok(Self::Str(raw.to_string())),
            ItemType::Blob => Ok(Self::Blob(raw.to_string())),
            ItemType::BlobData | ItemType::BlobIdx | ItemType::Any => {
                Err(StorageError::UnsupportedType(u32::from(item_type.code())))
            }
        }
    }

    /// Type of the value.
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::U8(_) => ItemType::U8,
            Self::U16(_) => ItemType::U16,
            Self::U32(_) => ItemType::U32,
            Self::U64(_) => ItemType::U64,
            Self::I8(_) => ItemType::I8,
            Self::I16(_) => ItemType::I16,
            Self::I32(_) => ItemType::I32,
            Self::I64(_) => ItemType::I64,
            Self::Str(_) => ItemType::Str,
            Self::Blob(_) => ItemType::Blob,
        }
    }

    /// Value as an unsigned integer, if it is a non-negative integer.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::U8(v) => Some(u64::from(v)),
            Self::U16(v) => Some(u64::from(v)),
            Self::U32(v) => Some(u64::from(v)),
            Self::U64(v) => Some(v),
            Self::I8(v) => u64::try_from(v).ok(),
            Self::I16(v) => u64::try_from(v).ok(),
            Self::I32(v) => u64::try_from(v).ok(),
            Self::I64(v) => u64::try_from(v).ok(),
            Self::Str(_) | Self::Blob(_) => None,
        }
    }

    /// Text of a string or blob value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Blob(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::Str(s) | Self::Blob(s) => f.write_str(s),
        }
    }
}

/// Key/value store used by the configuration stubs.
pub trait KeyValueStore: Send + Sync {
    /// Stored value, if any.
    fn get(&self, namespace: &str, key: &str) -> Option<ConfigValue>;

    /// Store a value, subject to type pinning.
    fn set_value(&self, namespace: &str, key: &str, value: ConfigValue) -> Result<(), StorageError>;

    /// Remove a key.
    fn erase_item(&self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Type of the stored value, [`ItemType::Any`] when unset.
    fn get_type(&self, namespace: &str, key: &str) -> ItemType {
        self.get(namespace, key)
            .map_or(ItemType::Any, |value| value.item_type())
    }

    /// Text of a string or blob value, `default` otherwise.
    fn get_string(&self, namespace: &str, key: &str, default: &str) -> String {
        self.get(namespace, key)
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }

    /// Integer value, `None` when unset or not an integer.
    fn get_item(&self, namespace: &str, key: &str) -> Option<ConfigValue> {
        self.get(namespace, key)
            .filter(|value| value.item_type().is_numeric())
    }

    /// Store a string value.
    fn set_string(&self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_value(namespace, key, ConfigValue::Str(value.to_string()))
    }

    /// Parse `value` as `item_type` and store it.
    fn set_item(
        &self,
        namespace: &str,
        key: &str,
        item_type: ItemType,
        value: &str,
    ) -> Result<(), StorageError> {
        self.set_value(namespace, key, ConfigValue::parse(item_type, value)?)
    }
}

type Namespaces = BTreeMap<String, BTreeMap<String, ConfigValue>>;

/// In-memory store, optionally persisted to a JSON file after every change.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<Namespaces>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// Empty, volatile store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by `path`. Existing content is loaded; a missing file
    /// starts empty and is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let namespaces = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            Namespaces::new()
        };
        debug!(path = %path.display(), namespaces = namespaces.len(), "key/value store loaded");
        Ok(Self {
            namespaces: RwLock::new(namespaces),
            path: Some(path),
        })
    }

    /// Backing file, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, namespaces: &Namespaces) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(namespaces)?)?;
        Ok(())
    }

    /// Persist `staged`, then make it the live content. A failed write
    /// leaves the live content untouched.
    fn commit(&self, live: &mut Namespaces, staged: Namespaces) -> Result<(), StorageError> {
        if let Err(e) = self.persist(&staged) {
            warn!(error = %e, "key/value store not persisted, change discarded");
            return Err(e);
        }
        *live = staged;
        Ok(())
    }
}

fn check_name(name: &str) -> Result<(), StorageError> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.chars().count() > MAX_NAME_LEN {
        "longer than 15 characters"
    } else {
        return Ok(());
    };
    Err(StorageError::InvalidKey {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Option<ConfigValue> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .and_then(|keys| keys.get(key))
            .cloned()
    }

    fn set_value(&self, namespace: &str, key: &str, value: ConfigValue) -> Result<(), StorageError> {
        check_name(namespace)?;
        check_name(key)?;

        let mut namespaces = self
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut staged = namespaces.clone();
        let keys = staged.entry(namespace.to_string()).or_default();
        if let Some(stored) = keys.get(key) {
            if stored.item_type() != value.item_type() {
                warn!(namespace, key, stored = %stored.item_type(), requested = %value.item_type(), "type conflict");
                return Err(StorageError::TypeConflict {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    stored: stored.item_type(),
                    requested: value.item_type(),
                });
            }
        }
        keys.insert(key.to_string(), value);
        self.commit(&mut *namespaces, staged)
    }

    fn erase_item(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let mut namespaces = self
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut staged = namespaces.clone();
        let removed = staged
            .get_mut(namespace)
            .and_then(|keys| keys.remove(key));
        if removed.is_none() {
            return Err(StorageError::MissingKey {
                namespace: namespace.to_string(),
                key: key.to_string(),
            });
        }
        staged.retain(|_, keys| !keys.is_empty());
        self.commit(&mut *namespaces, staged)
    }
}
