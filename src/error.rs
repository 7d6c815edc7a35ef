use std::fmt;

#[derive(Debug)]
pub enum SealPressError {
    /// The document's original PDF blob is absent from the store.
    OriginalNotFound(String),
    /// One of the two inputs to the merge stage is absent from the store.
    MergeSourceMissing(String),
    /// The source blob is not a usable PDF (parse failure, encrypted, no pages).
    PdfParse(String),
    InvalidConfiguration(String),
    Store(String),
    Io(std::io::Error),
}

impl fmt::Display for SealPressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SealPressError::OriginalNotFound(path) => {
                write!(f, "original PDF not found at {}", path)
            }
            SealPressError::MergeSourceMissing(path) => {
                write!(f, "merge source does not exist: {}", path)
            }
            SealPressError::PdfParse(message) => write!(f, "pdf parse error: {}", message),
            SealPressError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            SealPressError::Store(message) => write!(f, "store error: {}", message),
            SealPressError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for SealPressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SealPressError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SealPressError {
    fn from(value: std::io::Error) -> Self {
        SealPressError::Io(value)
    }
}

pub(crate) fn lopdf_err(err: lopdf::Error) -> SealPressError {
    SealPressError::PdfParse(err.to_string())
}
