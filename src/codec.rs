//! Reading and writing the intermediate record stream.
//!
//! Every shard file is a sequence of self-delimiting JSON records, one per
//! key-value pair. Records are appended one at a time during the Map phase
//! and decoded back in bulk during the Reduce phase.

use crate::KeyValue;
use anyhow::Result;
use std::io::{Read, Write};

/// Append one record to `w`.
pub fn write_record<W: Write>(w: &mut W, kv: &KeyValue) -> Result<()> {
    serde_json::to_writer(&mut *w, kv)?;
    w.write_all(b"\n")?;
    Ok(())
}

/// Decode every record in `r`. Decoding halts cleanly at end-of-file; a
/// malformed record is an error.
pub fn read_records<R: Read>(r: R) -> Result<Vec<KeyValue>> {
    let mut records = Vec::new();
    for kv in serde_json::Deserializer::from_reader(r).into_iter::<KeyValue>() {
        records.push(kv?);
    }
    Ok(records)
}
