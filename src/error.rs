use thiserror::Error;

/// Errors surfaced by [`crate::BrickService`]
#[derive(Debug, Error)]
pub enum BrickError {
    #[error("no scan in progress; call scan() before connect_to()")]
    NotScanning,

    #[error("transport error: {0}")]
    Transport(anyhow::Error),
}
