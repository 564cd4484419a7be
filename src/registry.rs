use std::collections::HashSet;

/// The element types known to an editing session.
///
/// A registry is built once when the session starts and passed by reference
/// to whatever needs to check the structure of a document. Only elements
/// whose type is registered as content-capable may directly contain text.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    content_types: HashSet<String>,
}

impl Default for ModelRegistry {
    #[inline]
    fn default() -> Self {
        Self::new()
            .with_content_type("paragraph")
            .with_content_type("heading")
            .with_content_type("preformatted")
    }
}

impl ModelRegistry {
    /// Returns `true` if elements of the given type may directly contain
    /// text.
    #[inline]
    pub fn can_contain_content(&self, kind: &str) -> bool {
        self.content_types.contains(kind)
    }

    /// Creates an empty registry in which no element can contain text.
    #[inline]
    pub fn new() -> Self {
        Self { content_types: HashSet::new() }
    }

    /// Registers a content-capable element type.
    #[inline]
    pub fn register_content_type<K: Into<String>>(&mut self, kind: K) {
        self.content_types.insert(kind.into());
    }

    /// Registers a content-capable element type, returning the updated
    /// registry.
    #[inline]
    pub fn with_content_type<K: Into<String>>(mut self, kind: K) -> Self {
        self.register_content_type(kind);
        self
    }
}
