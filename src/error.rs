pub type Result<T> = std::result::Result<T, ConsentPdfError>;

#[derive(Debug, thiserror::Error)]
pub enum ConsentPdfError {
    /// Template, font identifier or layout setting is wrong. This is a bug in
    /// the caller's configuration, never a property of the consent record.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// A font, trace file or output sink could not be loaded or written.
    #[error("i/o failure on {resource}: {source}")]
    RenderIo {
        resource: String,
        #[source]
        source: std::io::Error,
    },
    /// The incoming payload could not be mapped onto a consent record.
    #[error("invalid consent record: {0}")]
    Validation(String),
}

impl ConsentPdfError {
    pub(crate) fn resource_io(resource: impl Into<String>, source: std::io::Error) -> Self {
        ConsentPdfError::RenderIo {
            resource: resource.into(),
            source,
        }
    }

    pub(crate) fn font_file(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::resource_io(format!("font file {}", path.display()), source)
    }

    /// True for errors that mean the template or environment is broken, as
    /// opposed to a single bad record.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ConsentPdfError::Validation(_))
    }
}
