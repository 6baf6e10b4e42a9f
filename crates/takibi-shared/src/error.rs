use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("display name carries no parsable instance tag")]
    MissingInstanceTag,

    #[error("empty display name")]
    EmptyName,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed chat message: {0}")]
    Message(String),

    #[error("malformed connect code: {0}")]
    ConnectCode(String),

    #[error("connect code has wrong payload type: {0}")]
    WrongPayloadType(String),

    #[error("service tag mismatch: expected {expected}, got {actual}")]
    ServiceTagMismatch { expected: String, actual: String },
}
