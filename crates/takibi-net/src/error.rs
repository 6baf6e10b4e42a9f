use thiserror::Error;

/// Transport-layer failures.
///
/// None of these are fatal: unavailable/permission failures are retryable by
/// restarting the affected layer, send failures re-queue the message, and a
/// closed channel only occurs during shutdown.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0} is not started")]
    NotStarted(&'static str),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("peer not connected: {0}")]
    NotConnected(String),

    #[error("transport channel closed")]
    ChannelClosed,
}
