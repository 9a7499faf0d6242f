// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Operation kinds and their protocol categories.
//!
//! Every client-visible operation maps to exactly one [`Category`], and the
//! category alone decides which controller states the operation visits. Both
//! mappings are closed, exhaustive matches so adding a kind without updating
//! the tables is a compile error rather than a silent fall-through.

use strum::{Display, EnumIter, EnumString, EnumVariantNames};

use crate::msg::MessageKind;
use crate::state::State;

/// Client operation kinds, one per typed start entry point
#[derive(Copy, Clone, PartialEq, Eq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum OperationKind {
    /// Register the nym with the notary
    RegisterNym,
    /// Register an asset account for a unit
    RegisterAccount,
    /// Issue a new unit definition (creates the issuer account)
    IssueUnitDefinition,
    /// Transfer funds between accounts
    SendTransfer,
    /// Send a plain message to another nym
    SendMessage,
    /// Send a peer request object
    SendPeerRequest,
    /// Reply to a peer request
    SendPeerReply,
    /// Deposit a cheque into an account
    DepositCheque,
    /// Deposit a cash purse into an account
    DepositCash,
    /// Withdraw cash from an account
    WithdrawCash,
    /// Convey a payment instrument to another nym
    ConveyPayment,
    /// Download a contract by id
    DownloadContract,
    /// Download the mint for a unit
    DownloadMint,
    /// Look up another nym's credentials
    CheckNym,
    /// Publish a nym contract to the notary
    PublishNym,
    /// Publish a notary contract
    PublishNotary,
    /// Publish a unit contract
    PublishUnit,
    /// Request admin privileges
    RequestAdmin,
    /// Request a fresh allocation of transaction numbers
    GetTransactionNumbers,
    /// Re-download an account and drain its inbox
    RefreshAccount,
}

/// Protocol categories, deciding the states an operation visits
#[derive(Copy, Clone, PartialEq, Eq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum Category {
    /// Single round trip, no box reconciliation afterwards
    Basic,
    /// Notarized transaction against one or more accounts
    Transaction,
    /// Account state refresh including inbox acceptance
    UpdateAccount,
    /// Creates a new account on the notary
    CreateAccount,
    /// Nymbox-level request whose effect lands in the nymbox
    NymboxPre,
    /// Requires a final nymbox sync after execution
    NymboxPost,
}

impl OperationKind {
    /// Protocol category for the kind
    pub const fn category(&self) -> Category {
        use OperationKind::*;

        match self {
            SendTransfer | DepositCheque | DepositCash | WithdrawCash => Category::Transaction,
            RefreshAccount => Category::UpdateAccount,
            RegisterAccount | IssueUnitDefinition => Category::CreateAccount,
            GetTransactionNumbers => Category::NymboxPre,
            RegisterNym => Category::NymboxPost,
            SendMessage | SendPeerRequest | SendPeerReply | ConveyPayment | DownloadContract
            | DownloadMint | CheckNym | PublishNym | PublishNotary | PublishUnit
            | RequestAdmin => Category::Basic,
        }
    }

    /// Transaction numbers that must be reserved before `Execute`
    pub const fn required_numbers(&self) -> usize {
        use OperationKind::*;

        match self {
            SendTransfer | DepositCheque | DepositCash | WithdrawCash => 2,
            RefreshAccount => 1,
            RegisterNym | RegisterAccount | IssueUnitDefinition | SendMessage
            | SendPeerRequest | SendPeerReply | ConveyPayment | DownloadContract
            | DownloadMint | CheckNym | PublishNym | PublishNotary | PublishUnit
            | RequestAdmin | GetTransactionNumbers => 0,
        }
    }

    /// Outgoing command kind submitted from `Execute`
    pub const fn message_kind(&self) -> MessageKind {
        use OperationKind::*;

        match self {
            RegisterNym => MessageKind::RegisterNym,
            RegisterAccount => MessageKind::RegisterAccount,
            IssueUnitDefinition => MessageKind::IssueUnitDefinition,
            SendTransfer | DepositCheque | DepositCash | WithdrawCash => {
                MessageKind::NotarizeTransaction
            }
            SendMessage => MessageKind::SendNymMessage,
            SendPeerRequest => MessageKind::SendPeerRequest,
            SendPeerReply => MessageKind::SendPeerReply,
            ConveyPayment => MessageKind::SendNymInstrument,
            DownloadContract => MessageKind::GetContract,
            DownloadMint => MessageKind::GetMint,
            CheckNym => MessageKind::CheckNym,
            PublishNym | PublishNotary | PublishUnit => MessageKind::PublishContract,
            RequestAdmin => MessageKind::RequestAdmin,
            GetTransactionNumbers => MessageKind::GetTransactionNumbers,
            RefreshAccount => MessageKind::GetAccountData,
        }
    }
}

impl Category {
    /// Next state once the nymbox hash is in sync
    pub const fn after_nymbox_pre(&self) -> State {
        match self {
            Category::Transaction | Category::UpdateAccount => State::TransactionNumbers,
            Category::Basic
            | Category::CreateAccount
            | Category::NymboxPre
            | Category::NymboxPost => State::Execute,
        }
    }

    /// Next state after a successful `Execute`
    pub const fn after_execute(&self) -> State {
        match self {
            Category::Transaction | Category::CreateAccount => State::AccountPost,
            Category::Basic
            | Category::UpdateAccount
            | Category::NymboxPre
            | Category::NymboxPost => State::NymboxPost,
        }
    }

    /// Whether `NymboxPost` must re-sync the nymbox before `Idle`
    pub const fn requires_final_sync(&self) -> bool {
        match self {
            Category::Basic => false,
            Category::Transaction
            | Category::UpdateAccount
            | Category::CreateAccount
            | Category::NymboxPre
            | Category::NymboxPost => true,
        }
    }
}
