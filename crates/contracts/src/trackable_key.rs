//! TrackableKey - canonical identity key of a trackable
//!
//! A key is `<discriminant><identity value>` where the discriminant is a
//! single digit: `0` none, `1` id, `2` cuid, `3` name. The discriminant
//! keeps identities of different types apart (id `5` and cuid `5` never
//! collide). Uses `Arc<str>` internally so keys are cheap to clone into
//! filter maps and mapping tables.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::warn;

use crate::Trackable;

/// Which identity field a key was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    None,
    Id,
    Cuid,
    Name,
}

impl KeyType {
    /// Discriminant digit used as the key prefix
    pub fn discriminant(self) -> char {
        match self {
            KeyType::None => '0',
            KeyType::Id => '1',
            KeyType::Cuid => '2',
            KeyType::Name => '3',
        }
    }

    pub fn from_discriminant(c: char) -> Self {
        match c {
            '1' => KeyType::Id,
            '2' => KeyType::Cuid,
            '3' => KeyType::Name,
            _ => KeyType::None,
        }
    }

    /// Human readable name
    pub fn description(self) -> &'static str {
        match self {
            KeyType::None => "none",
            KeyType::Id => "id",
            KeyType::Cuid => "cuid",
            KeyType::Name => "name",
        }
    }

    pub fn from_description(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Some(KeyType::None),
            "id" => Some(KeyType::Id),
            "cuid" => Some(KeyType::Cuid),
            "name" => Some(KeyType::Name),
            _ => None,
        }
    }

    /// Parse a comma separated list such as `"id,name"`.
    ///
    /// Unknown entries are skipped with a warning; duplicates collapse.
    pub fn parse_list(list: &str) -> Vec<KeyType> {
        let mut out = Vec::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match KeyType::from_description(item) {
                Some(kt) if !out.contains(&kt) => out.push(kt),
                Some(_) => {}
                None => warn!(entry = item, "ignoring unknown key type"),
            }
        }
        out
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Canonical identity key.
///
/// # Examples
/// ```
/// use contracts::{KeyType, Position, Trackable, TrackableKey};
///
/// let t = Trackable::at(Position::default()).with_id(5);
/// let key = TrackableKey::derive(&t);
/// assert_eq!(key.key_type(), KeyType::Id);
/// assert_eq!(key.data(), "5");
///
/// let mut blank = Trackable::default();
/// assert!(key.reconcile(&mut blank));
/// assert_eq!(blank.id, 5);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackableKey(Arc<str>);

impl TrackableKey {
    /// Build a key from its type and identity value
    pub fn from_parts(key_type: KeyType, data: &str) -> Self {
        let mut s = String::with_capacity(data.len() + 1);
        s.push(key_type.discriminant());
        s.push_str(data);
        Self(Arc::from(s))
    }

    /// The NONE key (no usable identity)
    pub fn none() -> Self {
        Self::from_parts(KeyType::None, "")
    }

    /// Derive the key of a trackable.
    ///
    /// Precedence: negative id => none; id > 0 => id; non-empty cuid =>
    /// cuid; non-empty name => name; otherwise none. `id == 0` is "unset".
    pub fn derive(trackable: &Trackable) -> Self {
        if trackable.id < 0 {
            Self::none()
        } else if trackable.id > 0 {
            Self::from_parts(KeyType::Id, &trackable.id.to_string())
        } else if !trackable.cuid.is_empty() {
            Self::from_parts(KeyType::Cuid, &trackable.cuid)
        } else if !trackable.name.is_empty() {
            Self::from_parts(KeyType::Name, &trackable.name)
        } else {
            Self::none()
        }
    }

    pub fn key_type(&self) -> KeyType {
        self.0
            .chars()
            .next()
            .map(KeyType::from_discriminant)
            .unwrap_or(KeyType::None)
    }

    /// Identity value without the discriminant
    pub fn data(&self) -> &str {
        self.0.get(1..).unwrap_or("")
    }

    pub fn is_none(&self) -> bool {
        self.key_type() == KeyType::None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rewrite the identity fields of `trackable` so that it derives to
    /// this key, clearing the other identity fields.
    ///
    /// Returns `false` (leaving the trackable untouched) for NONE keys
    /// and for id keys whose value is not a positive integer.
    pub fn reconcile(&self, trackable: &mut Trackable) -> bool {
        match self.key_type() {
            KeyType::Id => match self.data().parse::<i64>() {
                Ok(id) if id > 0 => {
                    trackable.id = id;
                    trackable.cuid.clear();
                    trackable.name.clear();
                    true
                }
                _ => false,
            },
            KeyType::Cuid if !self.data().is_empty() => {
                trackable.id = 0;
                trackable.cuid = self.data().to_string();
                trackable.name.clear();
                true
            }
            KeyType::Name if !self.data().is_empty() => {
                trackable.id = 0;
                trackable.cuid.clear();
                trackable.name = self.data().to_string();
                true
            }
            _ => false,
        }
    }
}

impl Deref for TrackableKey {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for TrackableKey {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackableKey {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for TrackableKey {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for TrackableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TrackableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackableKey({:?})", self.0)
    }
}

impl Serialize for TrackableKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TrackableKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

/// Free-function form of [`TrackableKey::derive`] returning the key type too
pub fn derive_key(trackable: &Trackable) -> (TrackableKey, KeyType) {
    let key = TrackableKey::derive(trackable);
    let key_type = key.key_type();
    (key, key_type)
}
