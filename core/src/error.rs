// Copyright (c) 2022-2023 The MobileCoin Foundation

/// Protocol engine errors
///
/// These are structural: an operation that hits one of these cannot be
/// retried into success. Transient conditions (busy context, rejected
/// message, stale hash) are modeled as states/results, not errors.
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error {
    /// Amount must be strictly positive
    #[error("invalid amount")]
    InvalidAmount,

    /// Transfer source and destination match
    #[error("transfer to the source account")]
    SelfTransfer,

    /// Account balance cannot cover the transaction
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Instrument is not payable to the depositing nym
    #[error("instrument not payable to this nym")]
    NotPayable,

    /// Instrument / purse denominated in a different unit
    #[error("unit mismatch")]
    UnitMismatch,

    /// Purse holds no tokens
    #[error("empty purse")]
    EmptyPurse,

    /// Inbox has no receipts to accept
    #[error("inbox has no pending receipts")]
    EmptyInbox,

    /// Acceptance attempted over an unmaterialized receipt
    #[error("abbreviated receipt {0} not yet downloaded")]
    AbbreviatedReceipt(crate::ids::TransactionNumber),

    /// Transaction attempted before the account's boxes were downloaded
    #[error("account state not downloaded")]
    MissingAccountState,

    /// Transaction attempted without a reserved transaction number
    #[error("no transaction number reserved")]
    MissingNumber,

    /// Response ledger failed to deserialize
    #[error("malformed response ledger")]
    MalformedResponse,

    /// Reply payload did not match the command kind
    #[error("unexpected reply payload")]
    UnexpectedReply,
}
