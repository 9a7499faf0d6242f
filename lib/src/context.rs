// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Consensus context interface.
//!
//! One context exists per (nym, notary) session. It owns the things exactly
//! one party may own: the request-number sequence, the pool of reserved
//! single-use transaction numbers, the last reconciled nymbox hash, and the
//! submit queue that signs and transmits commands. The operation controller
//! never mutates these directly; it requests allocations and refreshes and
//! observes the outcome.
//!
//! Implementations wrap the transport/session layer and are out of scope
//! here; the test support crate provides one over a scripted notary.

use async_trait::async_trait;
use futures::future::BoxFuture;

use notary_client_core::{
    Command, DeliveryResult, Ledger, NotaryId, NymId, OperationKind, RequestNumber, Signer,
    TransactionNumber,
};

/// Future resolving to the outcome of one submitted command
pub type DeliveryFuture = BoxFuture<'static, DeliveryResult>;

/// Outcome of handing a command to the context's submit queue
pub enum Submit {
    /// Accepted; the future resolves when a reply (or loss) is observed
    Queued(DeliveryFuture),
    /// The context is mid-flight on another exchange; retry later
    Busy,
}

impl core::fmt::Debug for Submit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Submit::Queued(_) => f.write_str("Queued"),
            Submit::Busy => f.write_str("Busy"),
        }
    }
}

/// A transaction number drawn from the context's pool.
///
/// `valid` is false when the pool was empty; the value must not be used.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ManagedNumber {
    pub value: TransactionNumber,
    pub valid: bool,
}

impl ManagedNumber {
    pub fn invalid() -> Self {
        Self {
            value: TransactionNumber(0),
            valid: false,
        }
    }
}

/// Bookkeeping handed to the context alongside a submitted command, so it
/// can settle numbers and box state when the reply arrives
#[derive(Clone, Default, Debug)]
pub struct SubmitArgs {
    pub inbox: Option<Ledger>,
    pub outbox: Option<Ledger>,
    pub numbers: Vec<TransactionNumber>,
}

impl SubmitArgs {
    pub fn with_numbers(numbers: Vec<TransactionNumber>) -> Self {
        Self {
            numbers,
            ..Default::default()
        }
    }

    pub fn with_boxes(inbox: Ledger, outbox: Ledger, numbers: Vec<TransactionNumber>) -> Self {
        Self {
            inbox: Some(inbox),
            outbox: Some(outbox),
            numbers,
        }
    }
}

/// Per-(nym, notary) session state owned by the consensus layer
#[async_trait]
pub trait ConsensusContext: Send + Sync {
    /// Operating nym
    fn nym(&self) -> NymId;

    /// Notary this context converses with
    fn notary(&self) -> NotaryId;

    /// Credential signer for the operating nym
    fn signer(&self) -> &dyn Signer;

    /// Whether the locally reconciled nymbox hash matches the last
    /// authoritative value observed from the notary
    async fn nymbox_hash_matches(&self) -> bool;

    /// Download the nymbox and reconcile the local hash
    async fn refresh_nymbox(&self) -> Submit;

    /// Transaction numbers currently available for reservation
    async fn available_number_count(&self) -> usize;

    /// Draw the next transaction number from the pool
    async fn reserve_next_transaction_number(&self, kind: OperationKind) -> ManagedNumber;

    /// Return an unused reserved number to the pool
    async fn release_transaction_number(&self, number: TransactionNumber);

    /// Mark a reserved number as spent by an accepted transaction
    async fn consume_transaction_number(&self, number: TransactionNumber);

    /// Next request number in the per-nym sequence
    async fn next_request_number(&self) -> RequestNumber;

    /// Numbers issued to the nym and not yet closed (for balance statements)
    async fn issued_numbers(&self) -> Vec<TransactionNumber>;

    /// Sign the command in place. False when the credential cannot produce
    /// the required signature.
    async fn finalize(&self, command: &mut Command) -> bool;

    /// Queue a finalized command for transmission
    async fn submit(&self, command: Command, args: SubmitArgs) -> Submit;
}
