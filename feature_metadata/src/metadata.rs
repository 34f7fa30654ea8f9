use std::fmt;

/// Coarse biological classification of a feature, derived once from
/// the sequence id of the record that created the entry. Merging
/// additional fragments never re-derives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureClass {
    Mitochondrial,
    Spike,
    Other,
}

impl FeatureClass {
    /// Classify a sequence id against the configured tags. The
    /// mitochondrial tag takes priority over the spike tag.
    pub fn classify(seq_id: &str, mitochondrial_tag: &str, spike_tag: &str) -> FeatureClass {
        if seq_id == mitochondrial_tag {
            FeatureClass::Mitochondrial
        } else if seq_id == spike_tag {
            FeatureClass::Spike
        } else {
            FeatureClass::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureClass::Mitochondrial => "mitochondrial",
            FeatureClass::Spike => "spike",
            FeatureClass::Other => "other",
        }
    }
}

impl fmt::Display for FeatureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hierarchy level of the aggregated feature kind, fixed once per
/// extraction from the configured genomic type instead of re-checking
/// type strings at every access.
///
/// Exon and CDS records are "sparse": they reference their transcript
/// rather than a gene, so resolving their owning gene takes a second
/// hop through the transcript index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureLevel {
    Gene,
    Transcript,
    Sparse,
}

impl FeatureLevel {
    pub fn of_genomic_type(genomic_type: &str) -> FeatureLevel {
        if genomic_type.eq_ignore_ascii_case("gene") {
            FeatureLevel::Gene
        } else if genomic_type.eq_ignore_ascii_case("exon")
            || genomic_type.eq_ignore_ascii_case("CDS")
        {
            FeatureLevel::Sparse
        } else {
            FeatureLevel::Transcript
        }
    }

    pub fn is_gene(self) -> bool {
        self == FeatureLevel::Gene
    }

    pub fn is_sparse(self) -> bool {
        self == FeatureLevel::Sparse
    }
}

#[derive(Hash, Eq, PartialEq, Debug, Clone, Ord, PartialOrd, Copy)]
pub struct FeatureIdx(pub u32);

/// Aggregated metadata for one distinct feature id.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMetadata {
    pub id: String,
    /// Feature type as spelled by the record that created the entry.
    pub genomic_type: String,
    pub class: FeatureClass,
    /// Sum of `end - start + 1` over every fragment with this id.
    pub length: u64,
    pub start: u64,
    pub end: u64,
    /// Sequence id of the first fragment seen.
    pub chromosome: String,
    /// Owning gene, filled by the resolution pass for non-gene levels.
    pub gene: Option<String>,
    /// Owning transcript, captured at creation time for sparse levels.
    pub transcript: Option<String>,
}

impl FeatureMetadata {
    /// Fold another fragment with the same id into this entry. The
    /// length accumulates; each boundary keeps the larger of the two
    /// conflicting values. Note this is not the min-start/max-end span
    /// union (see DESIGN.md, boundary merge direction).
    pub fn merge_fragment(&mut self, length: u64, start: u64, end: u64) {
        self.length += length;
        self.start = self.start.max(start);
        self.end = self.end.max(end);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classification_priority() {
        assert_eq!(
            FeatureClass::classify("MT", "MT", "ERCC"),
            FeatureClass::Mitochondrial
        );
        assert_eq!(
            FeatureClass::classify("ERCC", "MT", "ERCC"),
            FeatureClass::Spike
        );
        assert_eq!(FeatureClass::classify("6", "MT", "ERCC"), FeatureClass::Other);
        // When both tags name the same sequence, mitochondrial wins.
        assert_eq!(
            FeatureClass::classify("X", "X", "X"),
            FeatureClass::Mitochondrial
        );
    }

    #[test]
    fn level_of_genomic_type() {
        assert_eq!(FeatureLevel::of_genomic_type("gene"), FeatureLevel::Gene);
        assert_eq!(FeatureLevel::of_genomic_type("Gene"), FeatureLevel::Gene);
        assert_eq!(FeatureLevel::of_genomic_type("exon"), FeatureLevel::Sparse);
        assert_eq!(FeatureLevel::of_genomic_type("CDS"), FeatureLevel::Sparse);
        assert_eq!(FeatureLevel::of_genomic_type("cds"), FeatureLevel::Sparse);
        assert_eq!(
            FeatureLevel::of_genomic_type("transcript"),
            FeatureLevel::Transcript
        );
        assert_eq!(
            FeatureLevel::of_genomic_type("mRNA"),
            FeatureLevel::Transcript
        );
    }

    #[test]
    fn merge_keeps_larger_boundaries() {
        let mut feature = FeatureMetadata {
            id: "ENST1".to_string(),
            genomic_type: "exon".to_string(),
            class: FeatureClass::Other,
            length: 101,
            start: 300,
            end: 400,
            chromosome: "6".to_string(),
            gene: None,
            transcript: None,
        };
        feature.merge_fragment(101, 100, 200);
        assert_eq!(feature.length, 202);
        // Each side keeps the larger value, not the span union.
        assert_eq!(feature.start, 300);
        assert_eq!(feature.end, 400);

        feature.merge_fragment(50, 350, 900);
        assert_eq!(feature.length, 252);
        assert_eq!(feature.start, 350);
        assert_eq!(feature.end, 900);
    }
}
