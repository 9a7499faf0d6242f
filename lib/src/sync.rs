// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Account synchronizer.
//!
//! Downloads an account's boxes, materializes every abbreviated inbox
//! receipt, and submits a process-inbox acceptance covering all pending
//! receipts. Used before a transaction (so balance statements are computed
//! against fresh state) and after it (to pick up the receipts the
//! transaction produced).
//!
//! Errors here are internal: the controller folds outcomes into booleans
//! and drives retries through the state machine.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;

use notary_client_core::{
    builder, reply::evaluate_transaction_reply, AccountId, AccountSnapshot, BoxKind, Command,
    DeliveryResult, Ledger, MessageKind, OperationKind, TransactionNumber,
    msg::{CommandPayload, ReplyPayload},
    ledger::Transaction,
};

use crate::context::{ConsensusContext, Submit, SubmitArgs};
use crate::operation::BUSY_POLL_INTERVAL;

/// Downloaded state of one account
#[derive(Clone, PartialEq, Debug)]
pub struct AccountBoxes {
    pub account: AccountSnapshot,
    pub inbox: Ledger,
    pub outbox: Ledger,
}

/// Aggregate result of a multi-account download pass
#[derive(Default)]
pub(crate) struct SyncOutcome {
    /// True only if every account succeeded
    pub success: bool,
    /// Accounts whose inbox was non-empty and required draining
    pub drained: BTreeSet<AccountId>,
    /// Fresh box state per account
    pub boxes: BTreeMap<AccountId, AccountBoxes>,
    /// Most recent delivery result observed
    pub last: Option<DeliveryResult>,
}

/// Result of refreshing a single account
pub(crate) struct RefreshOutcome {
    pub boxes: AccountBoxes,
    /// The inbox held receipts that were accepted
    pub drained: bool,
    pub last: Option<DeliveryResult>,
    /// Pre-reserved number consumed by the acceptance, if any
    pub used: Option<TransactionNumber>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SyncError {
    #[error("shutdown requested")]
    Shutdown,
    #[error("command finalization failed")]
    Finalize,
    #[error("no transaction numbers for inbox acceptance")]
    NoNumbers,
    #[error("delivery failed")]
    Delivery,
    #[error("inbox acceptance rejected")]
    Rejected,
    #[error("unexpected reply payload")]
    UnexpectedReply,
    #[error(transparent)]
    Engine(#[from] notary_client_core::Error),
}

pub(crate) struct Synchronizer<C> {
    ctx: std::sync::Arc<C>,
    shutdown: watch::Receiver<bool>,
    timeout: Duration,
}

impl<C: ConsensusContext> Synchronizer<C> {
    pub fn new(ctx: std::sync::Arc<C>, shutdown: watch::Receiver<bool>, timeout: Duration) -> Self {
        Self {
            ctx,
            shutdown,
            timeout,
        }
    }

    /// Download and reconcile every listed account.
    ///
    /// Stops at the first failing account; `success` is true only when all
    /// of them reconciled.
    pub async fn download_accounts(&mut self, accounts: &BTreeSet<AccountId>) -> SyncOutcome {
        let mut out = SyncOutcome {
            success: true,
            ..Default::default()
        };

        for id in accounts {
            match self.refresh_account(id, None).await {
                Ok(r) => {
                    if r.drained {
                        out.drained.insert(id.clone());
                    }
                    if r.last.is_some() {
                        out.last = r.last;
                    }
                    out.boxes.insert(id.clone(), r.boxes);
                }
                Err(e) => {
                    warn!("account {id} failed to reconcile: {e}");
                    out.success = false;
                    break;
                }
            }
        }

        out
    }

    /// Refresh one account: download boxes, materialize abbreviated
    /// receipts, accept the inbox.
    ///
    /// `pre_reserved` is a number the operation already holds for the
    /// acceptance; without one the acceptance draws from the pool itself.
    pub async fn refresh_account(
        &mut self,
        id: &AccountId,
        pre_reserved: Option<TransactionNumber>,
    ) -> Result<RefreshOutcome, SyncError> {
        let (account, mut inbox, outbox) = self.download_account_data(id).await?;

        // Materialize abbreviated receipts before anything can accept them
        for number in inbox.abbreviated_numbers() {
            let tx = self.download_box_receipt(id, BoxKind::Inbox, number).await?;
            if !inbox.materialize(tx) {
                return Err(SyncError::UnexpectedReply);
            }
        }

        let drained = !inbox.is_empty();
        let mut used = None;
        let mut last = None;

        if drained {
            let (result, consumed) = self
                .process_inbox(&account, &inbox, &outbox, pre_reserved)
                .await?;
            used = consumed;
            last = Some(result);

            // The acceptance moved the balance and emptied the inbox;
            // re-download so callers see the settled state
            let (account, inbox, outbox) = self.download_account_data(id).await?;
            return Ok(RefreshOutcome {
                boxes: AccountBoxes {
                    account,
                    inbox,
                    outbox,
                },
                drained,
                last,
                used,
            });
        }

        Ok(RefreshOutcome {
            boxes: AccountBoxes {
                account,
                inbox,
                outbox,
            },
            drained,
            last,
            used,
        })
    }

    /// Build and submit the acceptance transaction covering every pending
    /// inbox receipt. A number drawn here and not successfully spent is
    /// returned to the pool.
    pub async fn process_inbox(
        &mut self,
        account: &AccountSnapshot,
        inbox: &Ledger,
        outbox: &Ledger,
        pre_reserved: Option<TransactionNumber>,
    ) -> Result<(DeliveryResult, Option<TransactionNumber>), SyncError> {
        let (number, drawn) = match pre_reserved {
            Some(n) => (n, false),
            None => {
                let m = self
                    .ctx
                    .reserve_next_transaction_number(OperationKind::RefreshAccount)
                    .await;
                if !m.valid {
                    return Err(SyncError::NoNumbers);
                }
                (m.value, true)
            }
        };

        let r = self
            .process_inbox_with(account, inbox, outbox, number)
            .await;

        match r {
            Ok(result) => {
                self.ctx.consume_transaction_number(number).await;
                Ok((result, pre_reserved))
            }
            Err(e) => {
                // No leak on failure: internally drawn numbers go back to
                // the pool; pre-reserved ones stay with the operation
                if drawn {
                    self.ctx.release_transaction_number(number).await;
                }
                Err(e)
            }
        }
    }

    async fn process_inbox_with(
        &mut self,
        account: &AccountSnapshot,
        inbox: &Ledger,
        outbox: &Ledger,
        number: TransactionNumber,
    ) -> Result<DeliveryResult, SyncError> {
        debug!(
            "accepting {} inbox receipt(s) on {}",
            inbox.transactions.len(),
            account.id
        );

        let issued = self.ctx.issued_numbers().await;
        let signer = self.ctx.signer();

        let tx = builder::process_inbox(signer, number, account, inbox, outbox, &issued)?;
        let ledger = builder::message_ledger(signer, &account.id, &self.ctx.notary(), tx);

        let cmd = Command::new(
            MessageKind::ProcessInbox,
            self.ctx.nym(),
            self.ctx.notary(),
            CommandPayload::ProcessInbox {
                account: account.id.clone(),
                ledger,
            },
        );

        let args = SubmitArgs::with_boxes(inbox.clone(), outbox.clone(), vec![number]);
        let result = self.deliver(cmd, args).await?;

        let accepted = result.is_success()
            && result
                .reply
                .as_ref()
                .map(|r| evaluate_transaction_reply(&account.id, r))
                .unwrap_or(false);

        if !accepted {
            return Err(SyncError::Rejected);
        }

        Ok(result)
    }

    /// Fetch a single box receipt by number
    pub async fn download_box_receipt(
        &mut self,
        account: &AccountId,
        box_kind: BoxKind,
        number: TransactionNumber,
    ) -> Result<Transaction, SyncError> {
        debug!("downloading {box_kind} receipt {number} for {account}");

        let cmd = Command::new(
            MessageKind::GetBoxReceipt,
            self.ctx.nym(),
            self.ctx.notary(),
            CommandPayload::GetBoxReceipt {
                account: account.clone(),
                box_kind,
                number,
            },
        );

        let result = self.deliver(cmd, SubmitArgs::default()).await?;
        if !result.is_success() {
            return Err(SyncError::Delivery);
        }

        match result.reply.map(|r| r.payload) {
            Some(ReplyPayload::BoxReceipt { transaction }) => Ok(transaction),
            _ => Err(SyncError::UnexpectedReply),
        }
    }

    async fn download_account_data(
        &mut self,
        id: &AccountId,
    ) -> Result<(AccountSnapshot, Ledger, Ledger), SyncError> {
        debug!("downloading boxes for {id}");

        let cmd = Command::new(
            MessageKind::GetAccountData,
            self.ctx.nym(),
            self.ctx.notary(),
            CommandPayload::GetAccountData {
                account: id.clone(),
            },
        );

        let result = self.deliver(cmd, SubmitArgs::default()).await?;
        if !result.is_success() {
            return Err(SyncError::Delivery);
        }

        match result.reply.map(|r| r.payload) {
            Some(ReplyPayload::AccountData {
                account,
                inbox,
                outbox,
            }) => Ok((account, inbox, outbox)),
            _ => Err(SyncError::UnexpectedReply),
        }
    }

    /// Finalize and submit one command, polling through busy windows and
    /// observing shutdown at every suspension point
    async fn deliver(
        &mut self,
        mut cmd: Command,
        args: SubmitArgs,
    ) -> Result<DeliveryResult, SyncError> {
        loop {
            if *self.shutdown.borrow() {
                return Err(SyncError::Shutdown);
            }

            cmd.readdress(self.ctx.next_request_number().await);
            if !self.ctx.finalize(&mut cmd).await {
                return Err(SyncError::Finalize);
            }

            match self.ctx.submit(cmd.clone(), args.clone()).await {
                Submit::Busy => {
                    tokio::select! {
                        _ = tokio::time::sleep(BUSY_POLL_INTERVAL) => continue,
                        _ = self.shutdown.changed() => return Err(SyncError::Shutdown),
                    }
                }
                Submit::Queued(fut) => {
                    return tokio::select! {
                        r = fut => Ok(r),
                        _ = self.shutdown.changed() => Err(SyncError::Shutdown),
                        _ = tokio::time::sleep(self.timeout) => Ok(DeliveryResult::unknown()),
                    };
                }
            }
        }
    }
}
