use crate::parse::{parse_annotation_line, validate_annotation_line, AnnotationFormat, RawRecord};
use anyhow::{anyhow, Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Lines};
use std::path::Path;

/// One annotation record, owned. This is the unit handed to consumers:
/// attribute lookup returns `None` for unknown keys, it never fails.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub seq_id: String,
    pub source: String,
    pub feature_type: String,
    pub start: u64,
    pub end: u64,
    pub score: Option<f64>,
    pub strand: String,
    pub frame: String,
    attributes: Vec<(String, String)>,
}

impl AnnotationRecord {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Genomic span of the record; coordinates are 1-based inclusive.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

fn to_owned_record(rec: &RawRecord<'_>) -> Result<AnnotationRecord> {
    let utf8 = |field: &[u8]| -> Result<String> {
        Ok(std::str::from_utf8(field)?.to_string())
    };
    let mut attributes = Vec::with_capacity(rec.attributes.len());
    for &(k, v) in &rec.attributes {
        attributes.push((utf8(k)?, utf8(v)?));
    }
    Ok(AnnotationRecord {
        seq_id: utf8(rec.seq_id)?,
        source: utf8(rec.source)?,
        feature_type: utf8(rec.feature_type)?,
        start: rec.start,
        end: rec.end,
        score: rec.score,
        strand: utf8(rec.strand)?,
        frame: utf8(rec.frame)?,
        attributes,
    })
}

/// Streaming reader over the records of a GFF3 or GTF file.
///
/// The stream is finite, forward-only and consumed exactly once; a
/// caller needing a second pass must open a new reader. Comment lines
/// are skipped and an embedded FASTA section ends the stream.
pub struct AnnotationReader<R: BufRead> {
    lines: Lines<R>,
    format: AnnotationFormat,
    line_num: usize,
    done: bool,
}

impl<R: BufRead> AnnotationReader<R> {
    pub fn new(reader: R, format: AnnotationFormat) -> AnnotationReader<R> {
        AnnotationReader {
            lines: reader.lines(),
            format,
            line_num: 0,
            done: false,
        }
    }
}

impl AnnotationReader<Box<dyn BufRead>> {
    /// Open a possibly-compressed annotation file.
    pub fn from_path(
        path: &Path,
        format: AnnotationFormat,
    ) -> Result<AnnotationReader<Box<dyn BufRead>>> {
        Ok(AnnotationReader::new(open_annotation(path)?, format))
    }
}

impl<R: BufRead> Iterator for AnnotationReader<R> {
    type Item = Result<AnnotationRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err).context("reading annotation stream"));
                }
            };
            self.line_num += 1;

            // An embedded FASTA section ends the annotation records.
            if line.starts_with("##FASTA") || line.starts_with('>') {
                self.done = true;
                return None;
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line_num = self.line_num;
            let make_err =
                |msg: &str| anyhow!("Parsing annotation on line {line_num}: {msg}\nLine = '{line}'");

            let Ok((_, rec)) = parse_annotation_line(line.as_bytes(), self.format) else {
                // Since parsing failed, validation should fail.
                // Parsing errors are unreadable, so run full (slow) validation.
                // If for some reason our human-readable validator doesn't fail,
                // return a generic error message.
                self.done = true;
                return Some(Err(make_err(
                    &match validate_annotation_line(line.as_bytes(), self.format) {
                        Ok(()) => anyhow!(
                            "please check this line of your annotation file for formatting errors"
                        ),
                        Err(err) => err,
                    }
                    .to_string(),
                )));
            };

            return Some(to_owned_record(&rec).map_err(|err| make_err(&err.to_string())));
        }
    }
}

/// Open an annotation file for buffered reading, falling back to
/// `<path>.gz` when the plain path does not exist.
pub fn open_annotation(path: &Path) -> Result<Box<dyn BufRead>> {
    match File::open(path) {
        Ok(file) => Ok(Box::new(BufReader::new(file))),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let mut gz_path = path.as_os_str().to_owned();
            gz_path.push(".gz");
            let file = File::open(&gz_path).with_context(|| path.display().to_string())?;
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
        }
        Err(err) => Err(err).with_context(|| path.display().to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::BufReader;

    const GFF: &str = "\
##gff-version 3
6\tensembl\tgene\t100\t500\t.\t+\t.\tID=ENSG1

6\tensembl\ttranscript\t100\t400\t.\t+\t.\tID=ENST1;Parent=ENSG1
# a stray comment
6\tensembl\texon\t100\t200\t.\t+\t.\tParent=ENST1
##FASTA
>6
ACGT";

    #[test]
    fn skips_comments_and_stops_at_fasta() {
        let reader =
            AnnotationReader::new(BufReader::new(GFF.as_bytes()), AnnotationFormat::Gff);
        let records: Vec<_> = reader.map(Result::unwrap).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].feature_type, "gene");
        assert_eq!(records[0].attribute("ID"), Some("ENSG1"));
        assert_eq!(records[2].attribute("Parent"), Some("ENST1"));
        assert_eq!(records[2].length(), 101);
    }

    #[test]
    fn parse_failure_reports_line_number() {
        let bad = "6\tensembl\tgene\t100\t500\t.\t+\t.\tID=ENSG1\nnot a record\n";
        let mut reader =
            AnnotationReader::new(BufReader::new(bad.as_bytes()), AnnotationFormat::Gff);
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err().to_string();
        assert!(err.contains("line 2"), "unexpected message: {err}");
        // The stream is finished after an error.
        assert!(reader.next().is_none());
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let err = open_annotation(Path::new("/no/such/annotation.gff")).err().unwrap();
        let io = err.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), ErrorKind::NotFound);
    }
}
