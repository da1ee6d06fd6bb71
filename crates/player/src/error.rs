use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashError {
    #[error("Invalid manifest: {0}")]
    ManifestError(String),

    #[error(transparent)]
    XmlError(#[from] quick_xml::Error),

    #[error("Invalid segment index: {0}")]
    IndexParseError(String),

    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error("Stream selection error: {0}")]
    StreamSelectionError(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(usize),

    #[error("Stream group does not belong to the period")]
    InvalidStreamGroup,

    #[error("Demuxer error: {0}")]
    DemuxerError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

impl DashError {
    pub fn is_manifest_error(&self) -> bool {
        matches!(self, Self::ManifestError(_) | Self::XmlError(_))
    }

    /// Transport level failure while downloading a chunk.
    pub fn is_chunk_load_error(&self) -> bool {
        matches!(self, Self::HttpError(_) | Self::RequestError(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<quick_xml::events::attributes::AttrError> for DashError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlError(e.into())
    }
}

pub type DashResult<T> = Result<T, DashError>;
