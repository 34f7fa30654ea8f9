use std::path::PathBuf;

/// Failure surface of one extraction run. Every variant aborts the
/// whole extraction; the transform is deterministic, so there is no
/// partial-success mode and nothing to retry.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// A record of the target type lacks the configured id attribute.
    /// Always fatal: a partial feature table is worse than no table.
    /// Recoverable by reconfiguring `attribute.id`.
    #[error("Feature {genomic_type} does not contain a {attribute} attribute")]
    MissingAttribute {
        genomic_type: String,
        attribute: String,
    },

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Error while reading annotation file: {0}")]
    Annotation(anyhow::Error),

    #[error("Error while writing metadata file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for ExtractError {
    fn from(err: csv::Error) -> ExtractError {
        ExtractError::Io(match err.into_kind() {
            csv::ErrorKind::Io(err) => err,
            other => std::io::Error::new(std::io::ErrorKind::Other, format!("{other:?}")),
        })
    }
}
