//! Insertion-ordered buckets keyed by composite field values.
//!
//! Join lookup, aggregation groups and top-N buckets all need "group by key, remember the
//! order keys were first seen". [`OrderedBuckets`] makes that order explicit: it is an
//! [`IndexMap`] (hash index plus insertion-ordered entries), and iteration always follows
//! first-seen order.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::models::{value_of, FieldValue, Row};

/// Hashable form of a single [`FieldValue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    /// `f64` bits, with `-0.0` folded into `0.0`.
    Number(u64),
    Datetime(DateTime<Utc>),
    String(String),
    Null,
}

impl From<&FieldValue> for KeyPart {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Number(n) if *n == 0.0 => KeyPart::Number(0f64.to_bits()),
            FieldValue::Number(n) => KeyPart::Number(n.to_bits()),
            FieldValue::Datetime(d) => KeyPart::Datetime(*d),
            FieldValue::String(s) => KeyPart::String(s.clone()),
            FieldValue::Null => KeyPart::Null,
        }
    }
}

/// Composite key over several fields.
pub type BucketKey = Vec<KeyPart>;

/// Build the composite key of `row` over `fields`; absent fields read as null.
pub fn row_key(row: &Row, fields: &[String]) -> BucketKey {
    fields.iter().map(|field| KeyPart::from(value_of(row, field))).collect()
}

/// Values grouped by key, iterated in first-seen key order.
#[derive(Debug, Clone)]
pub struct OrderedBuckets<V> {
    buckets: IndexMap<BucketKey, V>,
}

impl<V> OrderedBuckets<V> {
    pub fn new() -> Self {
        Self {
            buckets: IndexMap::new(),
        }
    }

    /// The bucket for `key`, created with `init` on first sight.
    pub fn entry_or_insert_with(&mut self, key: BucketKey, init: impl FnOnce() -> V) -> &mut V {
        self.buckets.entry(key).or_insert_with(init)
    }

    pub fn get(&self, key: &BucketKey) -> Option<&V> {
        self.buckets.get(key)
    }

    /// Buckets in first-seen order.
    pub fn into_values(self) -> impl Iterator<Item = V> {
        self.buckets.into_values()
    }
}

impl<V> OrderedBuckets<Vec<V>> {
    /// Append `value` to the bucket for `key`.
    pub fn push(&mut self, key: BucketKey, value: V) {
        self.entry_or_insert_with(key, Vec::new).push(value);
    }
}

impl<V> Default for OrderedBuckets<V> {
    fn default() -> Self {
        Self::new()
    }
}
