//! Horizontal merge of per-sample expression count files into one
//! matrix.
//!
//! Each input is a two-column `key<TAB>count` file whose first line is
//! a header to discard. The first file owns the key set and the row
//! order; keys that only appear in later files are silently ignored.

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One `key<TAB>count` line of a per-sample expression file.
#[derive(Debug, Deserialize)]
struct CountRow {
    id: String,
    count: i64,
}

/// The merged matrix: one column per sample, rows in first-file
/// order.
#[derive(Debug)]
pub struct ExpressionMatrix {
    pub samples: Vec<String>,
    pub rows: Vec<(String, Vec<i64>)>,
}

impl ExpressionMatrix {
    /// Join the count files by key. The first file defines which keys
    /// exist and in which order; a key absent from a later file
    /// contributes a zero for that sample.
    pub fn from_count_files(files: &[PathBuf]) -> Result<ExpressionMatrix> {
        if files.is_empty() {
            bail!("no expression files to merge");
        }

        let samples = files.iter().map(|file| sample_name(file)).collect();

        let mut rows: Vec<(String, Vec<i64>)> = read_counts(&files[0])?
            .into_iter()
            .map(|(id, count)| (id, vec![count]))
            .collect();

        for file in &files[1..] {
            let counts: HashMap<String, i64> = read_counts(file)?.into_iter().collect();
            for (id, values) in &mut rows {
                values.push(counts.get(id).copied().unwrap_or(0));
            }
        }

        info!("merged {} samples over {} keys", files.len(), rows.len());

        Ok(ExpressionMatrix { samples, rows })
    }

    /// Write the matrix as tab-separated text. The header carries the
    /// sample names only (the key column is unnamed); rows whose
    /// cross-sample sum is zero are dropped entirely.
    pub fn write_tsv<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(out, "{}", self.samples.iter().join("\t"))?;
        for (id, values) in &self.rows {
            if values.iter().sum::<i64>() == 0 {
                continue;
            }
            writeln!(out, "{id}\t{}", values.iter().join("\t"))?;
        }
        Ok(())
    }

    pub fn write_tsv_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| path.display().to_string())?;
        self.write_tsv(BufWriter::new(file))
    }
}

/// Merge the given count files into one matrix file.
pub fn merge_count_files(files: &[PathBuf], output: &Path) -> Result<()> {
    ExpressionMatrix::from_count_files(files)?.write_tsv_path(output)
}

fn read_counts(path: &Path) -> Result<Vec<(String, i64)>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| path.display().to_string())?;

    let mut counts = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| path.display().to_string())?;
        // first line is a header, discarded
        if i == 0 {
            continue;
        }
        let row: CountRow = record
            .deserialize(None)
            .with_context(|| format!("{}: line {}", path.display(), i + 1))?;
        counts.push((row.id, row.count));
    }
    Ok(counts)
}

/// Sample name encoded in an expression file name: underscore token 3
/// of the stem (`expression_results_tsv_<sample>` convention), or the
/// whole stem for file names with fewer tokens.
pub fn sample_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
    let stem = name.strip_suffix(".tsv").unwrap_or(&name);
    stem.split('_').nth(3).unwrap_or(stem).to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_counts(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("Count\n{}\n", lines.join("\n"))).unwrap();
        path
    }

    #[test]
    fn zero_sum_rows_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_counts(dir.path(), "expression_results_tsv_s1.tsv", &["g1\t0", "g2\t5"]);
        let b = write_counts(dir.path(), "expression_results_tsv_s2.tsv", &["g1\t0", "g2\t3"]);

        let matrix = ExpressionMatrix::from_count_files(&[a, b]).unwrap();
        let mut buf = Vec::new();
        matrix.write_tsv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "s1\ts2\ng2\t5\t3\n");
    }

    #[test]
    fn first_file_owns_keys_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_counts(dir.path(), "a_b_c_s1.tsv", &["g2\t1", "g1\t2"]);
        let b = write_counts(
            dir.path(),
            "a_b_c_s2.tsv",
            &["g1\t4", "g3\t9", "g2\t3"],
        );

        let matrix = ExpressionMatrix::from_count_files(&[a, b]).unwrap();
        let keys: Vec<_> = matrix.rows.iter().map(|(id, _)| id.as_str()).collect();
        // g3 only exists in the second file and is ignored.
        assert_eq!(keys, ["g2", "g1"]);
        assert_eq!(matrix.rows[0].1, [1, 3]);
        assert_eq!(matrix.rows[1].1, [2, 4]);
    }

    #[test]
    fn key_missing_from_later_file_counts_zero() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_counts(dir.path(), "a_b_c_s1.tsv", &["g1\t7"]);
        let b = write_counts(dir.path(), "a_b_c_s2.tsv", &["g9\t1"]);

        let matrix = ExpressionMatrix::from_count_files(&[a, b]).unwrap();
        assert_eq!(matrix.rows, [("g1".to_string(), vec![7, 0])]);
    }

    #[test]
    fn sample_names_from_file_names() {
        assert_eq!(
            sample_name(Path::new("/tmp/expression_results_tsv_sampleA.tsv")),
            "sampleA"
        );
        // Not enough underscore tokens: fall back to the whole stem.
        assert_eq!(sample_name(Path::new("counts.tsv")), "counts");
    }

    #[test]
    fn empty_input_list_is_an_error() {
        let err = ExpressionMatrix::from_count_files(&[]).unwrap_err();
        assert!(err.to_string().contains("no expression files"));
    }

    #[test]
    fn non_numeric_count_names_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_counts(dir.path(), "a_b_c_s1.tsv", &["g1\tseven"]);
        let err = ExpressionMatrix::from_count_files(&[a]).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }
}
