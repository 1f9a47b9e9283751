//! A single-coordinator, many-worker MapReduce engine.
//!
//! A central coordinator schedules a Map phase and a Reduce phase across a
//! dynamic pool of worker processes that pull work over RPC on a local
//! socket. Workers are stateless and interchangeable; data moves between
//! the phases as intermediate shard files on a shared filesystem, published
//! atomically so crashed or reassigned workers can never corrupt outputs.

use serde::{Deserialize, Serialize};
use std::hash::Hasher;

pub mod cmd;
pub mod codec;
pub mod coordinator;
pub mod rpc;
pub mod standalone;
pub mod worker;
pub mod workload;

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// A map function takes the input file's path and its entire contents, and
/// returns the emitted key-value pairs.
pub type MapFn = fn(path: &str, contents: &str) -> Vec<KeyValue>;

/// A reduce function takes a key and the ordered values collected for it,
/// and returns a single output value.
pub type ReduceFn = fn(key: &str, values: &[String]) -> String;

/// A map reduce application.
///
/// Both functions are required to be pure: a reassigned task may run the
/// same function over the same input on two workers, and either result may
/// end up published.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
///
/// The serialized form is one JSON object per pair with `Key` and `Value`
/// fields; intermediate shard files are streams of these records.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// The value.
    pub value: String,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Hashes an intermediate key. Compute the reduce partition for a given key
/// by calculating `ihash(key) % n_reduce`.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key);
    (hasher.finish() & 0x7fffffff) as u32
}
