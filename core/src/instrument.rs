// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Negotiable instruments carried inside operations.
//!
//! Cheques are drawn against a notary account and conveyed out of band (or
//! via [`SendNymInstrument`][crate::msg::MessageKind::SendNymInstrument]);
//! purses hold sealed cash tokens. Sealing and unsealing belong to the
//! crypto layer, so token blobs travel opaque.

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, Amount, NotaryId, NymId, TransactionNumber, UnitId};

/// A cheque drawn on a notary account
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Cheque {
    /// Transaction number backing the cheque
    pub number: TransactionNumber,
    /// Notary the cheque is drawn on
    pub notary: NotaryId,
    /// Unit of account
    pub unit: UnitId,
    /// Drawer's account
    pub sender_account: AccountId,
    /// Drawer's nym
    pub sender_nym: NymId,
    /// Named payee, if any (bearer cheque otherwise)
    pub recipient: Option<NymId>,
    /// Face value
    pub amount: Amount,
    /// Free-form memo
    pub memo: String,
}

impl Cheque {
    /// Whether the cheque may be deposited by the given nym
    pub fn payable_to(&self, nym: &NymId) -> bool {
        match &self.recipient {
            Some(r) => r == nym,
            None => true,
        }
    }
}

/// A purse of sealed cash tokens
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Purse {
    /// Unit the tokens are denominated in
    pub unit: UnitId,
    /// Total face value of the contained tokens
    pub total: Amount,
    /// Sealed token blobs
    pub tokens: Vec<String>,
}

impl Purse {
    /// Whether the purse holds any tokens at all
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
