// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Notary transaction client core
//!
//! This provides the protocol data model and pure logic shared by notary
//! clients: operation kinds and categories, the controller state
//! enumeration, the command/reply message model, the box/ledger model,
//! transaction construction and reply evaluation.
//!
//! Everything here is synchronous and side-effect free; the async operation
//! controller driving these types against a live notary lives in the
//! `notary-client` crate.
//!
//! ## Operations
//!
//! Each client operation is one of [`OperationKind`], mapped by a closed
//! table to a [`Category`] which alone decides the controller states the
//! operation visits:
//!
//! | Category      | States                                                                    |
//! |---------------|---------------------------------------------------------------------------|
//! | Basic         | NymboxPre → Execute → NymboxPost → Idle                                   |
//! | Transaction   | NymboxPre → TransactionNumbers → AccountPre → Execute → AccountPost → NymboxPost → Idle |
//! | UpdateAccount | NymboxPre → TransactionNumbers → AccountPre → Execute → NymboxPost → Idle |
//! | CreateAccount | NymboxPre → Execute → AccountPost → NymboxPost → Idle                     |
//! | NymboxPre     | NymboxPre → Execute → NymboxPost → Idle                                   |
//! | NymboxPost    | NymboxPre → Execute → NymboxPost → Idle                                   |
//!
//! Notarized transactions are assembled by [`builder`]: request items plus a
//! [`BalanceStatement`][ledger::BalanceStatement], signed item → transaction
//! → ledger, wrapped into a [`Command`][msg::Command]. Replies come back as
//! [`Reply`][msg::Reply]; for transactions the embedded response ledger is
//! judged by [`reply::evaluate_transaction_reply`].

pub mod builder;

mod error;
pub use error::Error;

mod hash;
pub use hash::ConsensusHash;

pub mod ids;
pub use ids::{
    AccountId, Amount, NotaryId, NymId, RequestNumber, TransactionNumber, UnitId,
};

pub mod instrument;
pub use instrument::{Cheque, Purse};

mod kind;
pub use kind::{Category, OperationKind};

pub mod ledger;
pub use ledger::{AccountSnapshot, BoxKind, Ledger, TransactionKind};

pub mod msg;
pub use msg::{Command, DeliveryResult, DeliveryStatus, MessageKind, Reply};

pub mod reply;
pub use reply::{NullNotifier, WorkflowEvent, WorkflowNotifier};

mod signer;
pub use signer::{Signature, Signer};

mod state;
pub use state::State;
