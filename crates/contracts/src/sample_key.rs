//! SampleKey - identity of one logical signal
//!
//! A key is unique per source + signal pair (e.g. `"PMU_A:FREQ"`) and is
//! cloned for every sample, so it is backed by `Arc<str>`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Separator between source and signal name in composed keys.
pub const KEY_SEPARATOR: char = ':';

/// Signal identity with O(1) cloning.
///
/// # Examples
/// ```
/// use contracts::SampleKey;
///
/// let key = SampleKey::from_parts("PMU_A", "FREQ");
/// assert_eq!(key.as_str(), "PMU_A:FREQ");
/// assert_eq!(key.source(), "PMU_A");
/// assert_eq!(key.signal(), "FREQ");
/// ```
#[derive(Clone, Default)]
pub struct SampleKey(Arc<str>);

impl SampleKey {
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Compose a key from a source name and a signal name.
    pub fn from_parts(source: &str, signal: &str) -> Self {
        Self(Arc::from(format!("{source}{KEY_SEPARATOR}{signal}")))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Source part of a composed key, or the whole key if it has no separator.
    pub fn source(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(source, _)| source)
            .unwrap_or(&self.0)
    }

    /// Signal part of a composed key, or the whole key if it has no separator.
    pub fn signal(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(_, signal)| signal)
            .unwrap_or(&self.0)
    }
}

impl Deref for SampleKey {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for SampleKey {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets `HashMap<SampleKey, _>` be queried with `&str`.
impl Borrow<str> for SampleKey {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SampleKey {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for SampleKey {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SampleKey({:?})", self.0)
    }
}

impl PartialEq for SampleKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for SampleKey {}

impl PartialEq<str> for SampleKey {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for SampleKey {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl PartialOrd for SampleKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SampleKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// Must hash exactly like `str` for the `Borrow<str>` lookups above.
impl Hash for SampleKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for SampleKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SampleKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
