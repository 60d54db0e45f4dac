//! Resource keys.
//!
//! A [`ResourceKey`] is the identity used for caching and request coalescing.
//! Two requests with equal keys are the same resource.

use std::fmt;
use std::sync::Arc;

/// Normalized resource locator.
///
/// Normalization only trims surrounding whitespace; the locator is otherwise
/// kept verbatim so that malformed URLs reach the transport and surface as
/// network errors rather than being rejected at admission.
///
/// Cloning is cheap (shared `Arc<str>`), since keys are copied into the queue,
/// the in-flight registry, the cache and every emitted event.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    /// Creates a key from a locator string.
    pub fn new(locator: impl AsRef<str>) -> Self {
        Self(Arc::from(locator.as_ref().trim()))
    }

    /// Returns the locator as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({:?})", &*self.0)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKey {
    fn from(locator: &str) -> Self {
        Self::new(locator)
    }
}

impl From<String> for ResourceKey {
    fn from(locator: String) -> Self {
        Self::new(locator)
    }
}

impl From<&String> for ResourceKey {
    fn from(locator: &String) -> Self {
        Self::new(locator)
    }
}
