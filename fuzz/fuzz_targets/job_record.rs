// fuzz/fuzz_targets/job_record.rs
//! Record decoding must never panic on whatever a crashed worker left behind.
#![no_main]

use std::collections::HashMap;

use jobtrail_core::{ArgDecompressor, GzipArgs, JobRecord};
use libfuzzer_sys::fuzz_target;

const FIELDS: [&str; 6] = ["start_time", "end_time", "args", "hostname", "pid", "error"];

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let fields: HashMap<String, String> = FIELDS
        .iter()
        .zip(text.split('\u{1f}'))
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect();

    let record = JobRecord::from_fields(&fields);
    let _ = record.duration(record.end_time.unwrap_or_default());
    if GzipArgs.is_compressed(&record.args) {
        let _ = GzipArgs.decompress(&record.args);
    }
});

