#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid IR: {0}")]
    InvalidIr(String),

    #[error("label {0} bound more than once")]
    LabelRebound(u32),

    #[error("unresolved fixup for label {0} at finalization")]
    UnresolvedFixup(u32),

    #[error("no spillable value while allocating a {0} register")]
    RegisterPressure(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
