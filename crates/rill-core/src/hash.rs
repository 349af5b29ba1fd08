use std::hash::{Hash, Hasher};

pub use ahash::AHasher as DefaultHasher;

#[inline]
pub fn new() -> DefaultHasher {
    DefaultHasher::default()
}

/// convenience: hash a single value with the default hasher
///
/// Widget identity continuity across reruns depends on this being stable
/// for identical inputs within a process, so the hasher is constructed
/// from its fixed default state rather than a random one.
#[inline]
pub fn hash_one<T: Hash>(v: &T) -> u64 {
    let mut h = new();
    v.hash(&mut h);
    h.finish()
}
