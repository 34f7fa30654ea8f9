use crate::config::ExtractConfig;
use crate::errors::ExtractError;
use crate::metadata::{FeatureClass, FeatureIdx, FeatureLevel, FeatureMetadata};
use annotation_io::{AnnotationFormat, AnnotationReader, AnnotationRecord};
use log::{info, warn};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

/// Aggregated feature table, one entry per distinct feature id, kept
/// in first-seen order.
#[derive(Debug)]
pub struct FeatureTable {
    pub features: Vec<FeatureMetadata>,
    pub id_to_idx: HashMap<String, FeatureIdx>,
    level: FeatureLevel,
}

impl FeatureTable {
    pub fn get(&self, id: &str) -> Option<&FeatureMetadata> {
        self.id_to_idx
            .get(id)
            .map(|idx| &self.features[idx.0 as usize])
    }

    pub fn level(&self) -> FeatureLevel {
        self.level
    }

    /// Run an extraction over a possibly-compressed annotation file.
    pub fn from_annotation_path(
        path: &Path,
        config: &ExtractConfig,
    ) -> Result<FeatureTable, ExtractError> {
        let reader = AnnotationReader::from_path(path, config.format).map_err(|err| {
            match err.downcast_ref::<std::io::Error>() {
                Some(io) if io.kind() == ErrorKind::NotFound => ExtractError::FileNotFound {
                    path: path.to_path_buf(),
                },
                _ => ExtractError::Annotation(err),
            }
        })?;
        MetadataExtractor::new(config).extract(reader)
    }

    /// Write the table as tab-separated text: one header line, then
    /// one line per feature in first-seen order.
    ///
    /// The header names the value columns only (`Type`, `Length`, and
    /// for non-gene levels `GeneID`, plus `transcriptID` for sparse
    /// levels); the leading id column of each row is unnamed, so every
    /// row carries one more field than the header. Unresolved gene and
    /// transcript ids serialize as empty fields.
    pub fn write_tsv<W: Write>(&self, writer: W) -> Result<(), ExtractError> {
        let mut out = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_writer(writer);

        let mut header = vec!["Type", "Length"];
        if !self.level.is_gene() {
            header.push("GeneID");
            if self.level.is_sparse() {
                header.push("transcriptID");
            }
        }
        out.write_record(&header)?;

        for feature in &self.features {
            let length = feature.length.to_string();
            let mut row = vec![feature.id.as_str(), feature.class.as_str(), length.as_str()];
            if !self.level.is_gene() {
                row.push(feature.gene.as_deref().unwrap_or(""));
                if self.level.is_sparse() {
                    row.push(feature.transcript.as_deref().unwrap_or(""));
                }
            }
            out.write_record(&row)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn write_tsv_path(&self, path: &Path) -> Result<(), ExtractError> {
        self.write_tsv(BufWriter::new(File::create(path)?))
    }
}

/// Single-pass streaming aggregation over an annotation record
/// sequence.
///
/// The stream is consumed exactly once, in order; records are not
/// assumed sorted or grouped by id. While scanning, the extractor
/// simultaneously aggregates records of the target type and indexes
/// transcript records for the parent resolution pass that runs after
/// the stream is exhausted.
pub struct MetadataExtractor<'a> {
    config: &'a ExtractConfig,
    level: FeatureLevel,
    features: Vec<FeatureMetadata>,
    id_to_idx: HashMap<String, FeatureIdx>,
    /// child feature id -> parent gene id, from transcript records
    parents: HashMap<String, String>,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(config: &'a ExtractConfig) -> MetadataExtractor<'a> {
        MetadataExtractor {
            config,
            level: FeatureLevel::of_genomic_type(&config.genomic_type),
            features: Vec::new(),
            id_to_idx: HashMap::new(),
            parents: HashMap::new(),
        }
    }

    /// Consume the record stream and produce the resolved feature
    /// table. Any failure aborts the whole extraction.
    pub fn extract(
        mut self,
        records: impl IntoIterator<Item = anyhow::Result<AnnotationRecord>>,
    ) -> Result<FeatureTable, ExtractError> {
        for record in records {
            let record = record.map_err(ExtractError::Annotation)?;

            // The parent index is only needed to resolve non-gene
            // features.
            if !self.level.is_gene() {
                self.index_parent(&record);
            }

            if record
                .feature_type
                .eq_ignore_ascii_case(&self.config.genomic_type)
            {
                self.observe(&record)?;
            }
        }

        self.resolve();

        info!(
            "aggregated {} distinct {} features",
            self.features.len(),
            self.config.genomic_type
        );

        Ok(FeatureTable {
            features: self.features,
            id_to_idx: self.id_to_idx,
            level: self.level,
        })
    }

    /// Extend the child -> parent gene index from a transcript record
    /// (any type containing "transcript", case-insensitively).
    fn index_parent(&mut self, record: &AnnotationRecord) {
        if !record
            .feature_type
            .to_ascii_lowercase()
            .contains("transcript")
        {
            return;
        }

        let (child_key, parent_key) = if self.config.format.is_gtf() {
            ("transcript_id", "gene_id")
        } else {
            ("ID", "Parent")
        };
        match (record.attribute(child_key), record.attribute(parent_key)) {
            (Some(child), Some(parent)) => {
                self.parents.insert(child.to_string(), parent.to_string());
            }
            _ => warn!(
                "{} record without {child_key} or {parent_key} attribute left out of the transcript index",
                record.feature_type
            ),
        }
    }

    /// Aggregate one record of the target type into the table.
    fn observe(&mut self, record: &AnnotationRecord) -> Result<(), ExtractError> {
        let Some(id) = record.attribute(&self.config.attribute_id) else {
            return Err(ExtractError::MissingAttribute {
                genomic_type: record.feature_type.clone(),
                attribute: self.config.attribute_id.clone(),
            });
        };

        let length = record.length();
        match self.id_to_idx.entry(id.to_string()) {
            Entry::Occupied(entry) => {
                self.features[entry.get().0 as usize].merge_fragment(
                    length,
                    record.start,
                    record.end,
                );
            }
            Entry::Vacant(entry) => {
                let transcript = if self.level.is_sparse() {
                    owning_transcript(record, self.config.format)
                } else {
                    None
                };
                entry.insert(FeatureIdx(self.features.len() as u32));
                self.features.push(FeatureMetadata {
                    id: id.to_string(),
                    genomic_type: record.feature_type.clone(),
                    class: FeatureClass::classify(
                        &record.seq_id,
                        &self.config.mitochondrial_tag,
                        &self.config.spike_tag,
                    ),
                    length,
                    start: record.start,
                    end: record.end,
                    chromosome: record.seq_id.clone(),
                    gene: None,
                    transcript,
                });
            }
        }
        Ok(())
    }

    /// Fill the owning gene of every entry from the parent index.
    /// Runs only after the stream is exhausted, so resolution does not
    /// depend on the order of parents and children in the file.
    fn resolve(&mut self) {
        match self.level {
            FeatureLevel::Gene => {}
            FeatureLevel::Transcript => {
                for feature in &mut self.features {
                    feature.gene = self.parents.get(&feature.id).cloned();
                }
            }
            FeatureLevel::Sparse => {
                for feature in &mut self.features {
                    feature.gene = feature
                        .transcript
                        .as_deref()
                        .and_then(|transcript| self.parents.get(transcript))
                        .cloned();
                }
            }
        }
    }
}

/// The owning transcript of an exon or CDS record, read from the
/// record's own attributes. A composite value of the form
/// `kind:transcriptId:ID` reduces to its third colon-delimited
/// segment; values without three segments are kept whole.
fn owning_transcript(record: &AnnotationRecord, format: AnnotationFormat) -> Option<String> {
    let key = if format.is_gtf() { "transcript_id" } else { "Parent" };
    let value = record.attribute(key)?;
    if value.contains(':') {
        if let Some(payload) = value.split(':').nth(2) {
            return Some(payload.to_string());
        }
    }
    Some(value.to_string())
}

/// Extract features metadata from an annotation file and write the
/// tabular output. The output file is only written after the whole
/// extraction pass has succeeded.
pub fn extract_metadata_to_file(
    annotation: &Path,
    output: &Path,
    config: &ExtractConfig,
) -> Result<(), ExtractError> {
    let table = FeatureTable::from_annotation_path(annotation, config)?;
    table.write_tsv_path(output)
}
