use std::borrow::{Borrow, Cow};
use std::hash::Hash;

use hashbrown::HashMap;

/// A sparse vector of `(index, value)` pairs.
///
/// After [`make_sparse_vector()`], indices are strictly increasing.
pub type SparseVector = Vec<(u32, f64)>;

/// Sorts the pairs by index and sums the values of duplicated indices.
pub fn make_sparse_vector(mut v: SparseVector) -> SparseVector {
    v.sort_unstable_by_key(|&(i, _)| i);
    let mut result: SparseVector = Vec::with_capacity(v.len());
    for (i, x) in v {
        match result.last_mut() {
            Some((j, y)) if *j == i => *y += x,
            _ => result.push((i, x)),
        }
    }
    result
}

/// Computes the dot product of a sparse vector and a dense vector.
///
/// Indices beyond the end of `dense` are treated as zero.
#[inline]
pub fn sparse_dot(sparse: &[(u32, f64)], dense: &[f64]) -> f64 {
    sparse
        .iter()
        .filter_map(|&(i, x)| dense.get(i as usize).map(|w| w * x))
        .sum()
}

/// Computes `dense += scale * sparse`.
#[cfg(feature = "train")]
#[inline]
pub fn add_scaled_sparse(dense: &mut [f64], sparse: &[(u32, f64)], scale: f64) {
    for &(i, x) in sparse {
        dense[i as usize] += scale * x;
    }
}

/// Replaces every ASCII digit with `#`.
pub fn canonicalize_digits(word: &str) -> Cow<str> {
    if word.bytes().any(|b| b.is_ascii_digit()) {
        Cow::Owned(
            word.chars()
                .map(|c| if c.is_ascii_digit() { '#' } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(word)
    }
}

/// Assigns consecutive IDs to keys in first-seen order.
#[derive(Clone, Debug)]
pub struct Indexer<K> {
    ids: HashMap<K, usize>,
    keys: Vec<K>,
}

impl<K> Default for Indexer<K> {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
            keys: vec![],
        }
    }
}

impl<K> Indexer<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_id<Q: ?Sized>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ToOwned<Owned = K> + Eq + Hash,
    {
        if let Some(&id) = self.ids.get(key) {
            id
        } else {
            let id = self.ids.len();
            self.keys.push(key.to_owned());
            self.ids.insert(key.to_owned(), id);
            id
        }
    }

    pub fn find<Q: ?Sized>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + Hash,
    {
        self.ids.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<K> {
        self.keys
    }
}
