// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Account, ledger, transaction and item model.
//!
//! Mirrors the notary's box structure: each account carries an inbox of
//! pending receipts and an outbox of in-flight transfers, each nym a nymbox
//! of notices. Outgoing commands wrap a message ledger containing exactly
//! one transaction; replies embed a response ledger whose item statuses
//! carry per-sub-transaction results.
//!
//! Inbox downloads may return entries in abbreviated form (number and
//! amount only); such entries must be materialized via a box-receipt
//! download before they can be accepted.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::ids::{AccountId, Amount, NotaryId, NymId, TransactionNumber, UnitId};
use crate::signer::{Signature, Signer};

/// Box selector for receipt downloads
#[derive(
    Copy, Clone, PartialEq, Eq, Debug, EnumString, Display, EnumIter, Serialize, Deserialize,
)]
pub enum BoxKind {
    Inbox,
    Outbox,
    Nymbox,
}

/// Role a ledger plays in the protocol
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
pub enum LedgerKind {
    Inbox,
    Outbox,
    Nymbox,
    /// Outgoing message ledger wrapping a single transaction
    Message,
    /// Notary response ledger embedded in a reply
    Response,
}

impl From<BoxKind> for LedgerKind {
    fn from(b: BoxKind) -> Self {
        match b {
            BoxKind::Inbox => LedgerKind::Inbox,
            BoxKind::Outbox => LedgerKind::Outbox,
            BoxKind::Nymbox => LedgerKind::Nymbox,
        }
    }
}

/// Transaction kinds appearing in boxes, messages and responses
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Incoming transfer awaiting acceptance (inbox) or in flight (outbox)
    Pending,
    /// Outgoing transfer order
    Transfer,
    /// Counterparty accepted our transfer
    TransferReceipt,
    /// A cheque we wrote was deposited
    ChequeReceipt,
    /// Cheque or cash deposit order
    Deposit,
    /// Cash withdrawal order
    Withdrawal,
    /// Inbox acceptance
    ProcessInbox,
    /// Nymbox notice
    Notice,
}

/// Item kinds within a transaction
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
pub enum ItemKind {
    Transfer,
    DepositCheque,
    Deposit,
    Withdrawal,
    /// Accept a pending incoming transfer
    AcceptPending,
    /// Accept a transfer/cheque receipt (closes its number)
    AcceptItemReceipt,
    BalanceStatement,
}

/// Item status: requests go out, the notary acknowledges or rejects
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
pub enum ItemStatus {
    Request,
    Acknowledged,
    Rejected,
}

/// One item within a transaction
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Item {
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub amount: Amount,
    /// Destination account for transfers
    pub destination: Option<AccountId>,
    /// Receipt or instrument number the item refers to
    pub reference: Option<TransactionNumber>,
    /// Attached payload (balance statement, memo)
    pub note: Option<String>,
    pub signature: Option<Signature>,
}

impl Item {
    /// Create an unsigned request item
    pub fn request(kind: ItemKind, amount: Amount) -> Self {
        Self {
            kind,
            status: ItemStatus::Request,
            amount,
            destination: None,
            reference: None,
            note: None,
            signature: None,
        }
    }

    pub fn with_destination(mut self, destination: AccountId) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_reference(mut self, reference: TransactionNumber) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Sign the item, replacing any prior signature
    pub fn sign(mut self, signer: &dyn Signer) -> Self {
        self.signature = None;
        let sig = signer.sign(&canonical(&self));
        self.signature = Some(sig);
        self
    }
}

/// One transaction within a ledger
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub number: TransactionNumber,
    pub kind: TransactionKind,
    /// Number of the transaction this one responds to or accepts
    pub in_reference_to: Option<TransactionNumber>,
    /// Display amount for box receipts
    pub amount: Amount,
    pub items: Vec<Item>,
    /// True when only the header was downloaded; items are absent until the
    /// box receipt is fetched
    pub abbreviated: bool,
    pub signature: Option<Signature>,
}

impl Transaction {
    /// Create an unsigned transaction shell
    pub fn new(number: TransactionNumber, kind: TransactionKind) -> Self {
        Self {
            number,
            kind,
            in_reference_to: None,
            amount: Amount::ZERO,
            items: Vec::new(),
            abbreviated: false,
            signature: None,
        }
    }

    pub fn with_reference(mut self, reference: TransactionNumber) -> Self {
        self.in_reference_to = Some(reference);
        self
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    pub fn push_item(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Sign the transaction over its items
    pub fn sign(mut self, signer: &dyn Signer) -> Self {
        self.signature = None;
        let sig = signer.sign(&canonical(&self));
        self.signature = Some(sig);
        self
    }

    /// Whether a response transaction reports success: it must carry items
    /// and every item must be acknowledged
    pub fn succeeded(&self) -> bool {
        !self.abbreviated
            && !self.items.is_empty()
            && self.items.iter().all(|i| i.status == ItemStatus::Acknowledged)
    }

    /// Accept-item kind required to clear this receipt from an inbox
    pub fn accept_kind(&self) -> ItemKind {
        match self.kind {
            TransactionKind::Pending => ItemKind::AcceptPending,
            _ => ItemKind::AcceptItemReceipt,
        }
    }
}

/// A box or message ledger
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Ledger {
    pub kind: LedgerKind,
    pub account: AccountId,
    pub notary: NotaryId,
    pub transactions: Vec<Transaction>,
    pub signature: Option<Signature>,
}

impl Ledger {
    pub fn new(kind: LedgerKind, account: AccountId, notary: NotaryId) -> Self {
        Self {
            kind,
            account,
            notary,
            transactions: Vec::new(),
            signature: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn push(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// Numbers of entries downloaded in abbreviated form
    pub fn abbreviated_numbers(&self) -> Vec<TransactionNumber> {
        self.transactions
            .iter()
            .filter(|t| t.abbreviated)
            .map(|t| t.number)
            .collect()
    }

    /// Replace an abbreviated entry with its fully materialized form.
    /// Returns false if no matching entry exists.
    pub fn materialize(&mut self, tx: Transaction) -> bool {
        match self.transactions.iter_mut().find(|t| t.number == tx.number) {
            Some(slot) => {
                *slot = tx;
                slot.abbreviated = false;
                true
            }
            None => false,
        }
    }

    /// Value credited if every pending receipt were accepted
    pub fn accepted_value(&self) -> Amount {
        self.transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Pending)
            .fold(Amount::ZERO, |acc, t| acc + t.amount)
    }

    /// Sign the ledger over its transactions
    pub fn sign(mut self, signer: &dyn Signer) -> Self {
        self.signature = None;
        let sig = signer.sign(&canonical(&self));
        self.signature = Some(sig);
        self
    }
}

/// Account master record as reported by the notary
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub unit: UnitId,
    pub owner: NymId,
    pub balance: Amount,
}

/// Balance statement attached to every notarized transaction.
///
/// States the balance the account will hold once the transaction executes,
/// plus the numbers the nym considers outstanding, so client and notary
/// can detect divergence before funds move.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BalanceStatement {
    /// Balance after the transaction in question executes
    pub projected: Amount,
    /// Transaction numbers issued to the nym and not yet closed
    pub issued: Vec<TransactionNumber>,
    /// Inbox receipts outstanding at statement time
    pub inbox: Vec<TransactionNumber>,
    /// Outbox transfers still in flight
    pub outbox: Vec<TransactionNumber>,
}

impl BalanceStatement {
    /// Compute the statement for a transaction moving `delta` on `account`
    pub fn compute(
        delta: Amount,
        account: &AccountSnapshot,
        inbox: &Ledger,
        outbox: &Ledger,
        issued: &[TransactionNumber],
    ) -> Self {
        let mut issued = issued.to_vec();
        issued.sort_unstable();

        Self {
            projected: account.balance + delta,
            issued,
            inbox: inbox.transactions.iter().map(|t| t.number).collect(),
            outbox: outbox.transactions.iter().map(|t| t.number).collect(),
        }
    }

    /// Wrap the statement into a signed [`ItemKind::BalanceStatement`] item
    pub fn into_item(self, signer: &dyn Signer) -> Item {
        let projected = self.projected;
        let note = serde_json::to_string(&self).unwrap_or_default();

        Item::request(ItemKind::BalanceStatement, projected)
            .with_note(note)
            .sign(signer)
    }
}

/// Canonical signing bytes: the value with its signature slot cleared.
/// Serialization of plain data types cannot fail.
pub(crate) fn canonical<T: Serialize + Clone + Signed>(value: &T) -> Vec<u8> {
    let mut c = value.clone();
    c.clear_signature();
    serde_json::to_vec(&c).unwrap_or_default()
}

/// Helper trait so signing can strip the signature slot before hashing
pub(crate) trait Signed {
    fn clear_signature(&mut self);
}

impl Signed for Item {
    fn clear_signature(&mut self) {
        self.signature = None;
    }
}

impl Signed for Transaction {
    fn clear_signature(&mut self) {
        self.signature = None;
    }
}

impl Signed for Ledger {
    fn clear_signature(&mut self) {
        self.signature = None;
    }
}
