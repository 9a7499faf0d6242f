// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Notary transaction client library
//!
//! Drives logical requests (transfers, deposits, withdrawals, registrations,
//! messaging) through the multi-round-trip conversation a consensus-sensitive
//! notary requires: nymbox reconciliation, transaction-number reservation,
//! account download and inbox acceptance before and after execution, bounded
//! retries, and a single result future per request.
//!
//! ## Usage
//!
//! Create an [`Operation`] over a [`ConsensusContext`] (the per-(nym, notary)
//! session owned by the consensus layer), then call the typed `start_*`
//! entry point for the request:
//!
//! ```ignore
//! let op = Operation::new(ctx.clone());
//! let result = op
//!     .start_transfer(source, target, Amount(50), "lunch")
//!     .await?
//!     .await;
//! assert_eq!(result.status, DeliveryStatus::MessageSuccess);
//! ```
//!
//! A start is rejected (not queued) while a run is in flight; the instance
//! is reusable once it returns to `Idle`. [`Operation::shutdown`] stops
//! advancement cooperatively at the next suspension point.

pub mod context;
pub use context::{ConsensusContext, DeliveryFuture, ManagedNumber, Submit, SubmitArgs};

mod controller;

mod error;
pub use error::Error;

mod operation;
pub use operation::{
    Operation, OperationPayload, ResultFuture, DELIVERY_TIMEOUT, MAX_ERROR_COUNT, RESYNC_LIMIT,
};

mod sync;
pub use sync::AccountBoxes;

// Re-export the protocol engine types consumers interact with
pub use notary_client_core::{
    AccountId, Amount, Category, Cheque, DeliveryResult, DeliveryStatus, NotaryId, NymId,
    OperationKind, Purse, State, TransactionNumber, UnitId,
};
