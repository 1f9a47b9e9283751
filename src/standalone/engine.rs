use anyhow::Result;
use dashmap::DashMap;
use glob::glob;
use itertools::Itertools;
use std::fs::{self, File};
use std::io::Write;

use super::Job;
use crate::{ihash, KeyValue, Workload};

// types related to this engine
type BucketIndex = u32;
type Buckets = DashMap<BucketIndex, Vec<KeyValue>>;

pub fn perform_map(job: &Job, engine: &Workload) -> Result<Buckets> {
    // Iterator going through all files in the input file path
    let input_files = glob(&job.input)?;
    let buckets: Buckets = Buckets::new();
    for pathspec in input_files.flatten() {
        let contents = fs::read_to_string(&pathspec)?;
        let filename = pathspec.to_str().unwrap_or("unknown");
        let map_func = engine.map_fn;
        // Each mapped pair lands in a bucket according to its hashed key
        // (mod the partition count), the same partitioning the distributed
        // engine uses.
        for kv in map_func(filename, &contents) {
            let bucket_no = ihash(kv.key.as_bytes()) % job.n_reduce;
            buckets.entry(bucket_no).or_default().push(kv);
        }
    }

    Ok(buckets)
}

pub fn perform_reduce(job: &Job, engine: &Workload, buckets: Buckets) -> Result<()> {
    let reduce_func = engine.reduce_fn;
    let output_dir = &job.output;
    // For each bucket, sort the keys in ascending order, then apply the
    // reduce function to each run of equal keys and write the output file
    // named after the bucket id.
    for (reduce_id, mut bkt) in buckets.into_iter() {
        let out_pathspec = format!("{}/mr-out-{}", &output_dir, reduce_id);
        let mut out_file = File::create(&out_pathspec)?;
        bkt.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        for (key, value_group) in &bkt.into_iter().chunk_by(|kv| kv.key.clone()) {
            let values: Vec<String> = value_group.map(|kv| kv.value).collect();
            let out = reduce_func(&key, &values);
            writeln!(out_file, "{key} {out}")?;
        }
    }
    Ok(())
}
