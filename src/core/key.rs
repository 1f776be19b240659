use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::util::random::random_key;

/// A primary/foreign key type a store can be parameterized over.
///
/// Keys stored as text report their length through [`StoreKey::text_len`] so
/// the key-length cap can be applied to them; numeric and GUID keys return
/// `None` and are never capped.
pub trait StoreKey: Clone + Debug + Display + Eq + Ord + Hash + Send + Sync + 'static {
    /// Produce a fresh key. `sequence` starts at 1 and grows with every key a
    /// store hands out; key types without a natural ordering may ignore it.
    fn generate(sequence: u64) -> Self;

    fn text_len(&self) -> Option<usize> {
        None
    }
}

impl StoreKey for String {
    fn generate(_sequence: u64) -> Self {
        random_key()
    }

    fn text_len(&self) -> Option<usize> {
        Some(self.chars().count())
    }
}

impl StoreKey for i64 {
    fn generate(sequence: u64) -> Self {
        sequence as i64
    }
}

impl StoreKey for u64 {
    fn generate(sequence: u64) -> Self {
        sequence
    }
}

impl StoreKey for uuid::Uuid {
    fn generate(_sequence: u64) -> Self {
        uuid::Uuid::new_v4()
    }
}
