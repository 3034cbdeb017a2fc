//! Offline check of result files written by the demo producers.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use crate::error::HarnessError;
use crate::ops::{RecordError, TaskRecord};

/// Tolerance used by the original checker.
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Verdict for a single non-empty line.
#[derive(Debug, PartialEq)]
pub enum LineVerdict {
    Match(TaskRecord),
    Mismatch { record: TaskRecord, computed: f64 },
    Malformed(RecordError),
}

#[derive(Debug, Default, PartialEq)]
pub struct VerifyReport {
    pub matched: usize,
    pub mismatched: usize,
    pub malformed: usize,
}

impl VerifyReport {
    pub fn lines(&self) -> usize {
        self.matched + self.mismatched + self.malformed
    }

    pub fn is_clean(&self) -> bool {
        self.mismatched == 0 && self.malformed == 0
    }

    fn absorb(&mut self, other: &VerifyReport) {
        self.matched += other.matched;
        self.mismatched += other.mismatched;
        self.malformed += other.malformed;
    }
}

pub fn verify_line(line: &str, tolerance: f64) -> LineVerdict {
    match line.parse::<TaskRecord>() {
        Ok(record) if record.deviation() < tolerance => LineVerdict::Match(record),
        Ok(record) => LineVerdict::Mismatch {
            computed: record.call.evaluate(),
            record,
        },
        Err(err) => LineVerdict::Malformed(err),
    }
}

/// Check every non-empty line of `reader`; `source` only labels log output.
pub fn verify_lines<R: BufRead>(
    reader: R,
    source: &str,
    tolerance: f64,
) -> std::io::Result<VerifyReport> {
    let mut report = VerifyReport::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        match verify_line(&line, tolerance) {
            LineVerdict::Match(_) => report.matched += 1,
            LineVerdict::Mismatch { record, computed } => {
                warn!(
                    source,
                    line = line_no,
                    task = record.id,
                    computed,
                    expected = record.result,
                    "result mismatch"
                );
                report.mismatched += 1;
            }
            LineVerdict::Malformed(err) => {
                warn!(source, line = line_no, %err, "malformed result line");
                report.malformed += 1;
            }
        }
    }
    Ok(report)
}

pub fn verify_file(path: &Path, tolerance: f64) -> Result<VerifyReport, HarnessError> {
    let file = File::open(path).map_err(|e| HarnessError::io(path, e))?;
    verify_lines(BufReader::new(file), &path.display().to_string(), tolerance)
        .map_err(|e| HarnessError::io(path, e))
}

/// Verify each file, print one summary line per file, and return the total.
pub fn run_verify<P: AsRef<Path>>(
    paths: &[P],
    tolerance: f64,
) -> Result<VerifyReport, HarnessError> {
    let mut total = VerifyReport::default();
    for path in paths {
        let path = path.as_ref();
        let report = verify_file(path, tolerance)?;
        println!(
            "{}: lines={} matched={} mismatched={} malformed={}",
            path.display(),
            report.lines(),
            report.matched,
            report.mismatched,
            report.malformed
        );
        total.absorb(&report);
    }
    println!(
        "VERIFY TOTAL lines={} matched={} mismatched={} malformed={}",
        total.lines(),
        total.matched,
        total.mismatched,
        total.malformed
    );
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn counts_each_kind_of_line() {
        let input = "\
Task ID 1 operation: sqrt, number: 4.0 result: 2.0

Task ID 2 operation: sin, number: 0.5 result: 0.9
Task ID 3 operation: pow
Task ID 4 operation: pow, numbers: 2.0 and 0.5 result: 1.414213
";
        let report = verify_lines(Cursor::new(input), "inline", DEFAULT_TOLERANCE).expect("read");
        assert_eq!(
            report,
            VerifyReport {
                matched: 2,
                mismatched: 1,
                malformed: 1
            }
        );
        assert_eq!(report.lines(), 4);
        assert!(!report.is_clean());
    }

    #[test]
    fn mismatch_reports_recomputed_value() {
        match verify_line("Task ID 9 operation: sqrt, number: 9.0 result: 4.0", DEFAULT_TOLERANCE) {
            LineVerdict::Mismatch { record, computed } => {
                assert_eq!(record.id, 9);
                assert_eq!(computed, 3.0);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn verifies_files_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sqrt_results.txt");
        let mut file = File::create(&path).expect("create");
        writeln!(
            file,
            "Task ID 1 operation: sqrt, number: 2.250000 result: 1.500000"
        )
        .expect("write");
        drop(file);

        let report = run_verify(&[&path], DEFAULT_TOLERANCE).expect("verify");
        assert!(report.is_clean());
        assert_eq!(report.matched, 1);

        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            verify_file(&missing, DEFAULT_TOLERANCE),
            Err(HarnessError::Io { .. })
        ));
    }
}
