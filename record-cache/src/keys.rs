//! Cache key definitions.

use std::fmt;

/// Class of a cache key, selects which TTL applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKeyClass {
    /// Anything without a dedicated TTL
    General,
    /// Eligible committee pool for a target record
    MemberPool,
}

impl CacheKeyClass {
    fn prefix(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::MemberPool => "pool",
        }
    }
}

/// Typed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Key class
    pub class: CacheKeyClass,
    /// Identifier within the class
    pub id: String,
}

impl CacheKey {
    /// Create a key in an explicit class
    pub fn new(class: CacheKeyClass, id: impl Into<String>) -> Self {
        Self {
            class,
            id: id.into(),
        }
    }

    /// Member pool for a target record
    pub fn member_pool(target_record_id: &str) -> Self {
        Self::new(CacheKeyClass::MemberPool, target_record_id)
    }

    /// Convert to storage key string
    pub fn to_storage_key(&self) -> String {
        format!("{}:{}", self.class.prefix(), self.id)
    }

    /// Prefix matching every key of a class
    pub fn class_pattern(class: CacheKeyClass) -> String {
        format!("{}:", class.prefix())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys_are_namespaced() {
        assert_eq!(CacheKey::member_pool("case-1").to_storage_key(), "pool:case-1");
        assert_eq!(CacheKey::new(CacheKeyClass::General, "abc").to_string(), "general:abc");
        assert_ne!(
            CacheKey::member_pool("x").to_storage_key(),
            CacheKey::new(CacheKeyClass::General, "x").to_storage_key()
        );
    }

    #[test]
    fn test_class_pattern_matches_keys() {
        let key = CacheKey::member_pool("case-9").to_storage_key();
        assert!(key.starts_with(&CacheKey::class_pattern(CacheKeyClass::MemberPool)));
    }
}
