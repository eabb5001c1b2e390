use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum UploaderError {
    #[error("metadata file not found: {0}")]
    #[diagnostic(help("check `metadata_file` in the config or pass --data-dir"))]
    MetadataNotFound(Utf8PathBuf),

    #[error("failed to parse metadata XML: {0}")]
    MetadataParse(String),

    #[error("image element {src:?} has no usable <{field}> text")]
    MalformedMetadata { src: String, field: &'static str },

    #[error("invalid image uid {0:?}: expected a positive decimal number")]
    InvalidImageUid(String),

    #[error("invalid UID root: {0}")]
    InvalidUidRoot(String),

    #[error("image file not found: {0}")]
    ImageNotFound(Utf8PathBuf),

    #[error("failed to decode image {path}: {message}")]
    ImageDecode { path: Utf8PathBuf, message: String },

    #[error("image {path} is {width}x{height}, larger than a DICOM frame allows")]
    ImageTooLarge {
        path: Utf8PathBuf,
        width: u32,
        height: u32,
    },

    #[error("failed to read DICOM file {path}: {message}")]
    DicomRead { path: Utf8PathBuf, message: String },

    #[error("failed to write DICOM file {path}: {message}")]
    DicomWrite { path: Utf8PathBuf, message: String },

    #[error("PACS request failed: {0}")]
    PacsHttp(String),

    #[error("PACS returned status {status}: {message}")]
    PacsStatus { status: u16, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl UploaderError {
    /// Missing-input errors: a referenced file does not exist.
    pub fn is_missing_input(&self) -> bool {
        matches!(
            self,
            UploaderError::MetadataNotFound(_) | UploaderError::ImageNotFound(_)
        )
    }
}
