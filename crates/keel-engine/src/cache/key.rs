use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// What a cached resource is used for. Part of the key, so identical content
/// built for two purposes is cached twice.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UsageTag {
    Pipeline,
    Texture,
    TransientBuffer,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CacheKey {
    pub content_hash: u64,
    pub usage: UsageTag,
}

impl CacheKey {
    pub fn new(content_hash: u64, usage: UsageTag) -> Self {
        Self {
            content_hash,
            usage,
        }
    }

    /// Keys `content` by its Fx hash.
    pub fn of<T: Hash + ?Sized>(content: &T, usage: UsageTag) -> Self {
        let mut hasher = FxHasher::default();
        content.hash(&mut hasher);
        Self::new(hasher.finish(), usage)
    }
}
