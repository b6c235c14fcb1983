//! Symbolic byte arrays and their hash-consing cache.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;

static NEXT_ARRAY_ID: AtomicU64 = AtomicU64::new(0);

/// An uninterpreted array of bytes, the root of every [`crate::UpdateList`].
///
/// Identity is nominal: each call to [`Array::new`] mints a distinct array
/// even under an equal name, while [`ArrayCache`] interns arrays so that the
/// same `(name, size)` request is answered with the same object. Equality and
/// ordering go by the minted id.
#[derive(Debug)]
pub struct Array {
    name: String,
    size: u64,
    id: u64,
}

impl Array {
    /// Mint a fresh array of `size` bytes, distinct from every other array.
    pub fn new(name: impl Into<String>, size: u64) -> Arc<Array> {
        Arc::new(Array {
            name: name.into(),
            size,
            id: NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// The array's name, as given at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of bytes the array holds.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The unique id assigned at creation.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Array {}

impl std::hash::Hash for Array {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Interns arrays by `(name, size)` so that repeated requests share one
/// [`Array`] object, which in turn maximizes structural sharing between the
/// terms built over them.
#[derive(Debug, Default)]
pub struct ArrayCache {
    arrays: HashMap<(String, u64), Arc<Array>>,
}

impl ArrayCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the array registered under `(name, size)`, minting it on first
    /// use.
    pub fn create(&mut self, name: &str, size: u64) -> Arc<Array> {
        self.arrays
            .entry((name.to_owned(), size))
            .or_insert_with(|| Array::new(name, size))
            .clone()
    }

    /// Number of distinct arrays interned so far.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// True iff no array has been interned.
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}
