// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command / reply message model for notary communication.
//!
//! Commands are addressed (request number) and signed by the consensus
//! context before transmission; the payload is built once and never mutated
//! afterwards, so resending after a transport failure only refreshes the
//! request number and signature.
//!
//! Wire encoding is owned by the transport layer and not specified here.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, EnumVariantNames};

use crate::hash::ConsensusHash;
use crate::ids::{AccountId, NotaryId, NymId, RequestNumber, TransactionNumber, UnitId};
use crate::instrument::Cheque;
use crate::ledger::{canonical, AccountSnapshot, BoxKind, Ledger, Signed, Transaction};
use crate::signer::Signature;

/// Outgoing command vocabulary.
///
/// Wider than [`OperationKind`][crate::OperationKind]: the account
/// synchronizer issues box download and acceptance commands of its own.
#[derive(
    Copy, Clone, PartialEq, Eq, Debug, EnumString, Display, EnumVariantNames, EnumIter,
    Serialize, Deserialize,
)]
pub enum MessageKind {
    RegisterNym,
    RegisterAccount,
    IssueUnitDefinition,
    NotarizeTransaction,
    ProcessInbox,
    GetAccountData,
    GetBoxReceipt,
    GetNymbox,
    GetTransactionNumbers,
    GetMint,
    GetContract,
    CheckNym,
    SendNymMessage,
    SendNymInstrument,
    SendPeerRequest,
    SendPeerReply,
    PublishContract,
    RequestAdmin,
}

/// Contract families accepted by [`MessageKind::PublishContract`]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
pub enum ContractKind {
    Nym,
    Notary,
    Unit,
}

/// Kind-specific command payload
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum CommandPayload {
    RegisterNym {
        credentials: String,
    },
    RegisterAccount {
        unit: UnitId,
    },
    IssueUnitDefinition {
        unit: UnitId,
        contract: String,
    },
    /// Message ledger wrapping exactly one notarized transaction
    Notarize {
        account: AccountId,
        ledger: Ledger,
    },
    /// Acceptance ledger clearing pending inbox receipts
    ProcessInbox {
        account: AccountId,
        ledger: Ledger,
    },
    GetAccountData {
        account: AccountId,
    },
    GetBoxReceipt {
        account: AccountId,
        box_kind: BoxKind,
        number: TransactionNumber,
    },
    GetNymbox,
    GetTransactionNumbers,
    GetMint {
        unit: UnitId,
    },
    GetContract {
        id: String,
    },
    CheckNym {
        target: NymId,
    },
    SendNymMessage {
        recipient: NymId,
        message: String,
    },
    SendNymInstrument {
        recipient: NymId,
        instrument: Cheque,
    },
    SendPeerRequest {
        recipient: NymId,
        request: String,
    },
    SendPeerReply {
        recipient: NymId,
        request_id: String,
        reply: String,
    },
    PublishContract {
        kind: ContractKind,
        id: String,
    },
    RequestAdmin {
        password: String,
    },
}

/// A single outgoing command
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Command {
    pub kind: MessageKind,
    pub nym: NymId,
    pub notary: NotaryId,
    /// Assigned at finalization; refreshed on every resend
    pub request_number: Option<RequestNumber>,
    pub payload: CommandPayload,
    pub signature: Option<Signature>,
}

impl Command {
    /// Create an unaddressed, unsigned command
    pub fn new(kind: MessageKind, nym: NymId, notary: NotaryId, payload: CommandPayload) -> Self {
        Self {
            kind,
            nym,
            notary,
            request_number: None,
            payload,
            signature: None,
        }
    }

    /// Whether the command is addressed and signed, ready to transmit
    pub fn is_finalized(&self) -> bool {
        self.request_number.is_some() && self.signature.is_some()
    }

    /// Re-address for resending: fresh request number, signature cleared.
    /// The payload is untouched, keeping the resend idempotent.
    pub fn readdress(&mut self, request_number: RequestNumber) {
        self.request_number = Some(request_number);
        self.signature = None;
    }

    /// Bytes the consensus context signs at finalization
    pub fn signable_bytes(&self) -> Vec<u8> {
        canonical(self)
    }
}

impl Signed for Command {
    fn clear_signature(&mut self) {
        self.signature = None;
    }
}

/// Kind-specific reply payload
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum ReplyPayload {
    /// Bare acknowledgement
    Ack,
    AccountData {
        account: AccountSnapshot,
        inbox: Ledger,
        outbox: Ledger,
    },
    AccountCreated {
        account: AccountSnapshot,
    },
    BoxReceipt {
        transaction: Transaction,
    },
    /// Response ledger, serialized; deserialized by the reply evaluator
    TransactionResponse {
        account: AccountId,
        ledger: String,
    },
    NumbersGranted {
        numbers: Vec<TransactionNumber>,
    },
    Nymbox {
        hash: ConsensusHash,
    },
    Contract {
        id: String,
        contract: String,
    },
    Mint {
        unit: UnitId,
        mint: String,
    },
}

/// Notary reply to a single command
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Reply {
    pub kind: MessageKind,
    pub request_number: RequestNumber,
    /// Message-level success; transaction-level results live in the
    /// embedded response ledger
    pub success: bool,
    /// Authoritative nymbox hash after this command was processed
    pub nymbox_hash: Option<ConsensusHash>,
    pub payload: ReplyPayload,
}

/// Message delivery status as observed by the client
#[derive(Copy, Clone, PartialEq, Eq, Debug, EnumString, Display, EnumIter)]
pub enum DeliveryStatus {
    /// The notary acknowledged the command
    MessageSuccess,
    /// The notary rejected the command
    MessageFailed,
    /// No conclusive reply (timeout, shutdown, transport loss)
    Unknown,
}

/// Terminal result of a delivery attempt (and of a whole operation)
#[derive(Clone, PartialEq, Debug)]
pub struct DeliveryResult {
    pub status: DeliveryStatus,
    pub reply: Option<Reply>,
}

impl DeliveryResult {
    /// Result for an acknowledged command
    pub fn success(reply: Reply) -> Self {
        Self {
            status: DeliveryStatus::MessageSuccess,
            reply: Some(reply),
        }
    }

    /// Result for a rejected command
    pub fn failed(reply: Reply) -> Self {
        Self {
            status: DeliveryStatus::MessageFailed,
            reply: Some(reply),
        }
    }

    /// Result when no conclusive reply was observed
    pub fn unknown() -> Self {
        Self {
            status: DeliveryStatus::Unknown,
            reply: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::MessageSuccess
    }
}
