pub type PipeResult<T> = Result<T, PipeError>;

/// Every stage failure is fatal: the pipeline cancels the remaining stages
/// and surfaces exactly one of these. Nothing is retried.
#[derive(thiserror::Error, Debug)]
pub enum PipeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("input line {line} is not a viewpoint record: {content:?}")]
    InputFormat { line: usize, content: String },

    #[error("url template error: {0}")]
    Template(String),

    #[error("fetch {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("decode still for frame {seq} failed: {reason}")]
    Decode { seq: usize, reason: String },

    #[error("assembly error: {0}")]
    Assembly(String),

    #[error("gif encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("pipeline cancelled")]
    Cancelled,
}

impl PipeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    pub fn transport(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn decode(seq: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            seq,
            reason: reason.into(),
        }
    }

    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// True for the shutdown marker, false for every real failure. The
    /// orchestrator reports the first real failure and swallows the
    /// `Cancelled` results the other stages exit with.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<gif::EncodingError> for PipeError {
    fn from(e: gif::EncodingError) -> Self {
        Self::Encode(e.to_string())
    }
}
