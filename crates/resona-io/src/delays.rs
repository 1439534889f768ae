//! IR delay text-file parsing.
//!
//! One record per line, whitespace-delimited: either `dynamic` or
//! `dynamic static`, both in samples. The dynamic part is the one a
//! renderer may scale (e.g. for ITD adjustment); the static part is fixed.

use crate::Result;
use std::fs;
use std::path::Path;

/// Reads `(dynamic, static)` delay pairs from a text file.
///
/// A missing second value is treated as 0 and blank lines are skipped.
/// A malformed record terminates the read: the records parsed so far are
/// returned. Values are in samples.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) when the file cannot be read.
pub fn read_delay_file<P: AsRef<Path>>(path: P) -> Result<Vec<(f64, f64)>> {
    let contents = fs::read_to_string(path)?;
    Ok(parse_delay_records(&contents))
}

fn parse_delay_records(contents: &str) -> Vec<(f64, f64)> {
    let mut records = Vec::new();

    for line in contents.lines() {
        let mut fields = line.split_whitespace();

        let Some(first) = fields.next() else {
            continue;
        };
        let Ok(dynamic) = first.parse::<f64>() else {
            break;
        };

        let fixed = match fields.next() {
            None => 0.0,
            Some(second) => match second.parse::<f64>() {
                Ok(v) => v,
                Err(_) => break,
            },
        };

        records.push((dynamic, fixed));
    }

    records
}
