use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("input is not an OOXML package (no ZIP signature)")]
    NotAPackage,

    #[error("corrupt package: {0}")]
    Corrupt(String),

    #[error("missing part: {0}")]
    MissingPart(String),

    #[error("malformed document XML: {0}")]
    MalformedXml(String),

    /// A hyperlink relationship that is absent or whose target is not a valid URI.
    /// When `target` is set, running [`crate::repair_hyperlink_uris`] and converting
    /// again may succeed.
    #[error("unresolved hyperlink {rel_id}{}", .target.as_deref().map(|t| format!(" (invalid target {t:?})")).unwrap_or_default())]
    UnresolvedHyperlink {
        rel_id: String,
        target: Option<String>,
    },

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("unsupported numbering format: {0}")]
    UnsupportedNumberingFormat(String),
}

impl Error {
    /// True when the package may convert after the hyperlink URI repair pass.
    pub fn is_repairable(&self) -> bool {
        matches!(
            self,
            Error::UnresolvedHyperlink {
                target: Some(_),
                ..
            }
        )
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::Corrupt(e.to_string())
    }
}
