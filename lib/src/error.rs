// Copyright (c) 2022-2023 The MobileCoin Foundation

use notary_client_core::State;

/// Notary client API error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A start was attempted while the operation is mid-flight
    #[error("operation already running (state: {0})")]
    AlreadyRunning(State),

    /// Start rejected after shutdown was requested
    #[error("shutdown requested")]
    Shutdown,

    /// Arguments failed up-front validation
    #[error("invalid operation arguments: {0}")]
    InvalidArguments(&'static str),

    /// Structural failure in the protocol engine
    #[error("engine operation failed: {0}")]
    Engine(#[from] notary_client_core::Error),
}
