#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Not enough bits: need {needed} at offset {offset}, have {available}")]
    NotEnoughBits {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("{kind} named '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("circular container reference at '{0}'")]
    Cycle(String),

    #[error("type named '{0}' has no raw encoding information")]
    NoEncoding(String),

    /// Encoding family recognized but deliberately unimplemented.
    #[error("raw encoding type not yet supported: {0}")]
    Unsupported(String),

    #[error("raw encoding for type named '{name}' ({bits} bits) is not recognized")]
    UnsupportedWidth { name: String, bits: u32 },

    #[error("repeat count parameter '{0}' has no usable value")]
    RepeatCount(String),

    #[error("ambiguous stream match: {0} candidate containers matched")]
    AmbiguousMatch(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Definition(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal diagnostics collected while a call proceeds.
///
/// An empty list after a resolve/encode/decode call is the contract for a
/// fully clean result; success alone does not imply every item converted
/// validly.
pub type Warnings = Vec<String>;
