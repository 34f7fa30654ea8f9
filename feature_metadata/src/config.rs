use annotation_io::AnnotationFormat;
use anyhow::{bail, Result};
use log::{info, warn};

const GENOMIC_TYPE_PARAM: &str = "genomic.type";
const ATTRIBUTE_ID_PARAM: &str = "attribute.id";
const MITOCHONDRIAL_TAG_PARAM: &str = "mitochondrial.tag";
const SPIKE_TAG_PARAM: &str = "spike.tag";
const FORMAT_PARAM: &str = "features.file.format";

// Legacy spellings still accepted from old workflow files.
const OLD_GENOMIC_TYPE_PARAM: &str = "genomictype";
const OLD_ATTRIBUTE_ID_PARAM: &str = "attributeid";

/// Options of one extraction run, passed explicitly into the
/// extractor. There is no process-wide configuration state.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Feature kind to aggregate, matched case-insensitively against
    /// each record's type.
    pub genomic_type: String,
    /// Attribute holding the feature id; chosen per desired hierarchy
    /// level (e.g. `ID` for genes, `Parent` for exons of a GFF file).
    pub attribute_id: String,
    /// Sequence id marking mitochondrial features.
    pub mitochondrial_tag: String,
    /// Sequence id marking exogenous spike-in features.
    pub spike_tag: String,
    pub format: AnnotationFormat,
}

impl Default for ExtractConfig {
    fn default() -> ExtractConfig {
        ExtractConfig {
            genomic_type: "exon".to_string(),
            attribute_id: "Parent".to_string(),
            mitochondrial_tag: "MT".to_string(),
            spike_tag: "ERCC".to_string(),
            format: AnnotationFormat::Gff,
        }
    }
}

impl ExtractConfig {
    /// Build a configuration from `name=value` parameter pairs using
    /// the workflow parameter names. Unknown names and unknown format
    /// values are errors; the legacy names are accepted with a
    /// warning.
    pub fn from_params<'a>(
        params: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<ExtractConfig> {
        let mut config = ExtractConfig::default();

        for (name, value) in params {
            match name {
                GENOMIC_TYPE_PARAM => config.genomic_type = value.to_string(),
                OLD_GENOMIC_TYPE_PARAM => {
                    warn!("parameter '{OLD_GENOMIC_TYPE_PARAM}' is deprecated, use '{GENOMIC_TYPE_PARAM}'");
                    config.genomic_type = value.to_string();
                }
                ATTRIBUTE_ID_PARAM => config.attribute_id = value.to_string(),
                OLD_ATTRIBUTE_ID_PARAM => {
                    warn!("parameter '{OLD_ATTRIBUTE_ID_PARAM}' is deprecated, use '{ATTRIBUTE_ID_PARAM}'");
                    config.attribute_id = value.to_string();
                }
                MITOCHONDRIAL_TAG_PARAM => config.mitochondrial_tag = value.to_string(),
                SPIKE_TAG_PARAM => config.spike_tag = value.to_string(),
                FORMAT_PARAM => config.format = value.parse()?,
                _ => bail!("unknown parameter: '{name}'"),
            }
        }

        info!(
            "mitochondrial tag={}, spike tag={}",
            config.mitochondrial_tag, config.spike_tag
        );
        info!(
            "genomic type={}, attribute ID={}, format={}",
            config.genomic_type,
            config.attribute_id,
            if config.format.is_gtf() { "gtf" } else { "gff" }
        );

        Ok(config)
    }
}
