// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Reply evaluation and workflow notification.
//!
//! A message-level success only means the notary processed the command; for
//! notarized transactions the per-sub-transaction verdicts live in the
//! embedded response ledger and decide whether funds actually moved.

use crate::error::Error;
use crate::ids::{AccountId, Amount, TransactionNumber};
use crate::ledger::Ledger;
use crate::msg::{Reply, ReplyPayload};

/// Deserialize the response ledger embedded in a transaction reply
pub fn parse_response_ledger(reply: &Reply) -> Result<Ledger, Error> {
    match &reply.payload {
        ReplyPayload::TransactionResponse { ledger, .. } => {
            serde_json::from_str(ledger).map_err(|_| Error::MalformedResponse)
        }
        _ => Err(Error::UnexpectedReply),
    }
}

/// Evaluate a notarized-transaction reply for `account`.
///
/// Rejects on message-level failure, a response ledger for a different
/// account, a ledger that fails to deserialize, or a ledger with zero
/// transactions (malformed, not vacuously successful). Succeeds only when
/// every transaction entry individually reports success.
pub fn evaluate_transaction_reply(account: &AccountId, reply: &Reply) -> bool {
    if !reply.success {
        #[cfg(feature = "log")]
        log::debug!("transaction reply rejected at message level");
        return false;
    }

    let ledger = match parse_response_ledger(reply) {
        Ok(l) => l,
        Err(_e) => {
            #[cfg(feature = "log")]
            log::warn!("unusable response ledger: {_e}");
            return false;
        }
    };

    if ledger.account != *account {
        #[cfg(feature = "log")]
        log::warn!(
            "response ledger for {} while reconciling {account}",
            ledger.account
        );
        return false;
    }

    if ledger.transactions.is_empty() {
        #[cfg(feature = "log")]
        log::warn!("response ledger carries no transactions");
        return false;
    }

    let succeeded = ledger.transactions.iter().filter(|t| t.succeeded()).count();

    #[cfg(feature = "log")]
    log::debug!(
        "response ledger: {succeeded}/{} transactions succeeded",
        ledger.transactions.len()
    );

    succeeded == ledger.transactions.len()
}

/// Workflow events surfaced to higher-level bookkeeping
#[derive(Clone, PartialEq, Debug)]
pub enum WorkflowEvent {
    TransferInitiated {
        source: AccountId,
        target: AccountId,
        amount: Amount,
    },
    ChequeDeposited {
        account: AccountId,
        number: TransactionNumber,
        amount: Amount,
    },
    CashDeposited {
        account: AccountId,
        amount: Amount,
    },
    CashWithdrawn {
        account: AccountId,
        amount: Amount,
    },
    AccountRegistered {
        account: AccountId,
    },
    UnitIssued {
        account: AccountId,
    },
    InboxProcessed {
        account: AccountId,
    },
}

/// Output contract towards payment-workflow bookkeeping.
///
/// The controller reports settled protocol milestones; what the bookkeeping
/// layer does with them is out of scope.
pub trait WorkflowNotifier: Send + Sync {
    fn notify(&self, event: WorkflowEvent);
}

/// Notifier that drops every event
#[derive(Copy, Clone, Default, Debug)]
pub struct NullNotifier;

impl WorkflowNotifier for NullNotifier {
    fn notify(&self, _event: WorkflowEvent) {}
}
