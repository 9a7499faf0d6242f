// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Operation controller state machine.
//!
//! Drives one operation from `NymboxPre` to `Idle` against the consensus
//! context. Handlers are total: transient conditions (busy context, stale
//! hash, rejected message) leave the state unchanged or route back to an
//! earlier state, bounded by the error ceiling; only the terminal pass
//! publishes a forced `Unknown` if no result was set.
//!
//! Every network wait is a `select!` over (future ready, shutdown
//! requested, timeout), so a blocked delivery still observes shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{watch, Mutex};

use notary_client_core::{
    builder, reply::evaluate_transaction_reply, Category, Command, DeliveryResult,
    DeliveryStatus, MessageKind, OperationKind, State, WorkflowEvent, WorkflowNotifier,
    msg::{CommandPayload, ReplyPayload},
};

use crate::context::{ConsensusContext, Submit, SubmitArgs};
use crate::operation::{Inner, OperationPayload, BUSY_POLL_INTERVAL, MAX_ERROR_COUNT, RESYNC_LIMIT};
use crate::sync::Synchronizer;

/// One run of the state machine, spawned per start
pub(crate) struct Driver<C: ConsensusContext> {
    ctx: Arc<C>,
    inner: Arc<Mutex<Inner>>,
    running: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
    notifier: Arc<dyn WorkflowNotifier>,
    timeout: Duration,
}

impl<C: ConsensusContext + 'static> Driver<C> {
    pub fn new(
        ctx: Arc<C>,
        inner: Arc<Mutex<Inner>>,
        running: Arc<AtomicBool>,
        shutdown: watch::Receiver<bool>,
        notifier: Arc<dyn WorkflowNotifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            inner,
            running,
            shutdown,
            notifier,
            timeout,
        }
    }

    /// Tick the current state's handler until `Idle` (or shutdown)
    pub async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                debug!("shutdown observed, operation halted");
                return;
            }

            let state = self.inner.lock().await.state;
            match state {
                State::Idle => {
                    self.finish().await;
                    return;
                }
                State::NymboxPre => self.nymbox_pre().await,
                State::TransactionNumbers => self.transaction_numbers().await,
                State::AccountPre => self.account_pre().await,
                State::Execute => self.execute().await,
                State::AccountPost => self.account_post().await,
                State::NymboxPost => self.nymbox_post().await,
            }

            // Terminal failure once retries pass the ceiling
            let mut inner = self.inner.lock().await;
            if inner.state != State::Idle && inner.error_count > MAX_ERROR_COUNT {
                warn!(
                    "operation {} abandoned after {} failures",
                    inner.kind, inner.error_count
                );
                inner.publish(DeliveryResult::unknown());
                inner.transition(State::Idle);
            }
        }
    }

    /// Cleanup on reaching `Idle`: return unconsumed numbers, guarantee a
    /// published result, release the decision lock
    async fn finish(&mut self) {
        let reserved = {
            let mut inner = self.inner.lock().await;
            inner.pending = None;
            core::mem::take(&mut inner.reserved)
        };

        for number in reserved {
            debug!("returning unconsumed number {number}");
            self.ctx.release_transaction_number(number).await;
        }

        let mut inner = self.inner.lock().await;
        if !inner.published() {
            inner.publish(DeliveryResult::unknown());
        }

        debug!("operation {} idle", inner.kind);
        self.running.store(false, Ordering::SeqCst);
    }

    /// `NymboxPre`: make the local nymbox hash authoritative before
    /// touching anything else
    async fn nymbox_pre(&mut self) {
        let category = self.category().await;

        if self.ctx.nymbox_hash_matches().await {
            self.inner.lock().await.transition(category.after_nymbox_pre());
            return;
        }

        debug!("nymbox hash stale, refreshing");
        match self.ctx.refresh_nymbox().await {
            Submit::Busy => self.pause().await,
            Submit::Queued(fut) => match self.await_delivery(fut).await {
                Some(r) if r.is_success() => {
                    self.inner
                        .lock()
                        .await
                        .transition(category.after_nymbox_pre());
                }
                Some(_) => self.bump_errors().await,
                None => (),
            },
        }
    }

    /// `TransactionNumbers`: top up the operation's reservation, requesting
    /// more numbers from the notary when the pool runs short
    async fn transaction_numbers(&mut self) {
        let (kind, held) = {
            let inner = self.inner.lock().await;
            (inner.kind, inner.reserved.len())
        };
        let required = kind.required_numbers();

        if held + self.ctx.available_number_count().await >= required {
            while self.inner.lock().await.reserved.len() < required {
                let n = self.ctx.reserve_next_transaction_number(kind).await;
                if !n.valid {
                    self.bump_errors().await;
                    self.inner.lock().await.transition(State::NymboxPre);
                    return;
                }

                debug!("reserved transaction number {}", n.value);
                self.inner.lock().await.reserved.push(n.value);
            }

            self.inner.lock().await.transition(State::AccountPre);
            return;
        }

        debug!(
            "requesting transaction numbers ({held} held, {required} required)"
        );

        let cmd = Command::new(
            MessageKind::GetTransactionNumbers,
            self.ctx.nym(),
            self.ctx.notary(),
            CommandPayload::GetTransactionNumbers,
        );

        match self.submit_finalized(cmd, SubmitArgs::default()).await {
            None => (),
            Some(r) if r.is_success() => {
                // Fresh numbers land via the nymbox; reconcile it and walk
                // the machine again from the top
                if let Submit::Queued(fut) = self.ctx.refresh_nymbox().await {
                    let _ = self.await_delivery(fut).await;
                }
                self.inner.lock().await.transition(State::NymboxPre);
            }
            Some(_) => {
                self.bump_errors().await;
                self.inner.lock().await.transition(State::NymboxPre);
            }
        }
    }

    /// `AccountPre`: only Transaction-category operations reconcile their
    /// accounts before execution
    async fn account_pre(&mut self) {
        let (category, affected) = {
            let inner = self.inner.lock().await;
            (inner.kind.category(), inner.affected.clone())
        };

        if category != Category::Transaction {
            self.inner.lock().await.transition(State::Execute);
            return;
        }

        let outcome = self.synchronizer().download_accounts(&affected).await;
        let mut inner = self.inner.lock().await;
        inner.accounts.extend(outcome.boxes);

        if outcome.success {
            inner.transition(State::Execute);
        } else {
            inner.error_count += 1;
            inner.transition(State::NymboxPre);
        }
    }

    /// `Execute`: build (or re-address) the outgoing command, submit, route
    /// the result
    async fn execute(&mut self) {
        let kind = self.inner.lock().await.kind;

        // Account refresh executes through the synchronizer, not a
        // single command
        if kind == OperationKind::RefreshAccount {
            self.execute_refresh().await;
            return;
        }

        let pending = self.inner.lock().await.pending.clone();
        let cmd = match pending {
            // Unacknowledged command: resend as-is with fresh addressing
            Some(c) => c,
            None => match self.build_command().await {
                Ok(c) => c,
                Err(e) => {
                    warn!("command construction failed: {e}");
                    self.bump_errors().await;
                    self.inner.lock().await.transition(State::NymboxPre);
                    return;
                }
            },
        };

        self.inner.lock().await.pending = Some(cmd.clone());

        let numbers = self.inner.lock().await.reserved.clone();
        match self
            .submit_finalized(cmd, SubmitArgs::with_numbers(numbers))
            .await
        {
            None => (),
            Some(result) => self.route_execute_result(result).await,
        }
    }

    async fn route_execute_result(&mut self, result: DeliveryResult) {
        let (kind, category) = {
            let inner = self.inner.lock().await;
            (inner.kind, inner.kind.category())
        };

        match result.status {
            DeliveryStatus::MessageSuccess => (),
            status => {
                // Failed gets rebuilt against fresh state; Unknown keeps
                // the pending command for an idempotent resend
                debug!("execute returned {status}, retrying");
                if status == DeliveryStatus::MessageFailed {
                    self.inner.lock().await.pending = None;
                }
                self.bump_errors().await;
                self.inner.lock().await.transition(State::NymboxPre);
                return;
            }
        }

        // Transaction-level verdict for notarized commands
        if category == Category::Transaction {
            let account = match self.inner.lock().await.payload.primary_account() {
                Some(a) => a,
                None => {
                    self.bump_errors().await;
                    self.inner.lock().await.transition(State::NymboxPre);
                    return;
                }
            };

            let accepted = result
                .reply
                .as_ref()
                .map(|r| evaluate_transaction_reply(&account, r))
                .unwrap_or(false);

            if !accepted {
                warn!("notarized transaction rejected by {account} response ledger");
                self.inner.lock().await.pending = None;
                self.bump_errors().await;
                self.inner.lock().await.transition(State::NymboxPre);
                return;
            }

            // The embedded number is now spent
            let spent = self.inner.lock().await.reserved.first().copied();
            if let Some(n) = spent {
                self.ctx.consume_transaction_number(n).await;
                let mut inner = self.inner.lock().await;
                inner.reserved.retain(|x| *x != n);
                inner.consumed.push(n);
            }

            self.notify_settled(kind).await;
        }

        // Newly created accounts join the post-execution reconciliation
        if category == Category::CreateAccount {
            if let Some(ReplyPayload::AccountCreated { account }) =
                result.reply.as_ref().map(|r| &r.payload)
            {
                debug!("notary issued account {}", account.id);
                self.inner.lock().await.affected.insert(account.id.clone());

                let event = match kind {
                    OperationKind::IssueUnitDefinition => WorkflowEvent::UnitIssued {
                        account: account.id.clone(),
                    },
                    _ => WorkflowEvent::AccountRegistered {
                        account: account.id.clone(),
                    },
                };
                self.notifier.notify(event);
            }
        }

        let mut inner = self.inner.lock().await;
        inner.pending = None;
        inner.last = Some(result.clone());

        // Categories without post-execution reconciliation publish here
        if !matches!(category, Category::Transaction | Category::CreateAccount) {
            inner.publish(result);
        }

        inner.transition(category.after_execute());
    }

    /// `Execute` for account refresh: run the synchronizer over the target
    /// account, spending the pre-reserved acceptance number if the inbox
    /// held receipts
    async fn execute_refresh(&mut self) {
        let target = {
            let inner = self.inner.lock().await;
            inner
                .payload
                .primary_account()
                .map(|a| (a, inner.reserved.first().copied()))
        };
        let (account, pre_reserved) = match target {
            Some(t) => t,
            None => {
                self.bump_errors().await;
                self.inner.lock().await.transition(State::NymboxPre);
                return;
            }
        };

        let outcome = self
            .synchronizer()
            .refresh_account(&account, pre_reserved)
            .await;

        match outcome {
            Ok(r) => {
                if let Some(n) = r.used {
                    let mut inner = self.inner.lock().await;
                    inner.reserved.retain(|x| *x != n);
                    inner.consumed.push(n);
                }

                if r.drained {
                    self.notifier.notify(WorkflowEvent::InboxProcessed {
                        account: account.clone(),
                    });
                }

                let result = r.last.unwrap_or(DeliveryResult {
                    status: DeliveryStatus::MessageSuccess,
                    reply: None,
                });

                let mut inner = self.inner.lock().await;
                inner.accounts.insert(account, r.boxes);
                inner.last = Some(result.clone());
                inner.publish(result);
                inner.transition(Category::UpdateAccount.after_execute());
            }
            Err(e) => {
                warn!("account refresh failed: {e}");
                self.bump_errors().await;
                self.inner.lock().await.transition(State::NymboxPre);
            }
        }
    }

    /// `AccountPost`: reconcile affected accounts, publish the held result,
    /// converge accounts whose inbox needed draining
    async fn account_post(&mut self) {
        let affected = self.inner.lock().await.affected.clone();

        let outcome = self.synchronizer().download_accounts(&affected).await;
        if !outcome.success {
            self.bump_errors().await;
            self.inner.lock().await.transition(State::NymboxPre);
            return;
        }

        for account in &outcome.drained {
            self.notifier.notify(WorkflowEvent::InboxProcessed {
                account: account.clone(),
            });
        }

        let mut inner = self.inner.lock().await;
        inner.accounts.extend(outcome.boxes);

        if !inner.published() {
            let result = inner.last.clone().unwrap_or_else(DeliveryResult::unknown);
            inner.publish(result);
        }

        // Drained accounts need a second pass to verify convergence
        inner.resync = outcome.drained;
        inner.affected = core::mem::take(&mut inner.resync);

        if inner.affected.is_empty() {
            inner.resync_passes = 0;
            inner.transition(State::NymboxPost);
        } else {
            inner.resync_passes += 1;
            if inner.resync_passes > RESYNC_LIMIT {
                warn!("account reconciliation did not converge, retrying from the top");
                inner.resync_passes = 0;
                inner.error_count += 1;
                inner.transition(State::NymboxPre);
            }
            // Otherwise stay in AccountPost for the next pass
        }
    }

    /// `NymboxPost`: final nymbox sync for the categories that need one
    async fn nymbox_post(&mut self) {
        let category = self.category().await;

        if !category.requires_final_sync() || self.ctx.nymbox_hash_matches().await {
            self.inner.lock().await.transition(State::Idle);
            return;
        }

        debug!("final nymbox sync");
        match self.ctx.refresh_nymbox().await {
            Submit::Busy => self.pause().await,
            Submit::Queued(fut) => match self.await_delivery(fut).await {
                Some(r) if r.is_success() && self.ctx.nymbox_hash_matches().await => {
                    self.inner.lock().await.transition(State::Idle);
                }
                Some(_) => self.bump_errors().await,
                None => (),
            },
        }
    }

    /// Build the kind-specific outgoing command from the operation payload
    /// and the downloaded account state
    async fn build_command(&self) -> Result<Command, notary_client_core::Error> {
        use notary_client_core::Error as E;

        let inner = self.inner.lock().await;
        let nym = self.ctx.nym();
        let notary = self.ctx.notary();
        let signer = self.ctx.signer();
        let issued = self.ctx.issued_numbers().await;

        let payload = match &inner.payload {
            OperationPayload::RegisterNym { credentials } => CommandPayload::RegisterNym {
                credentials: credentials.clone(),
            },
            OperationPayload::RegisterAccount { unit } => CommandPayload::RegisterAccount {
                unit: unit.clone(),
            },
            OperationPayload::IssueUnitDefinition { unit, contract } => {
                CommandPayload::IssueUnitDefinition {
                    unit: unit.clone(),
                    contract: contract.clone(),
                }
            }
            OperationPayload::Transfer {
                source,
                target,
                amount,
                memo,
            } => {
                let boxes = inner.accounts.get(source).ok_or(E::MissingAccountState)?;
                let number = *inner.reserved.first().ok_or(E::MissingNumber)?;

                let tx = builder::transfer(
                    signer,
                    number,
                    &boxes.account,
                    &boxes.inbox,
                    &boxes.outbox,
                    &issued,
                    target,
                    *amount,
                    memo,
                )?;

                CommandPayload::Notarize {
                    account: source.clone(),
                    ledger: builder::message_ledger(signer, source, &notary, tx),
                }
            }
            OperationPayload::DepositCheque { account, cheque } => {
                let boxes = inner.accounts.get(account).ok_or(E::MissingAccountState)?;
                let number = *inner.reserved.first().ok_or(E::MissingNumber)?;

                let tx = builder::cheque_deposit(
                    signer,
                    number,
                    &nym,
                    &boxes.account,
                    &boxes.inbox,
                    &boxes.outbox,
                    &issued,
                    cheque,
                )?;

                CommandPayload::Notarize {
                    account: account.clone(),
                    ledger: builder::message_ledger(signer, account, &notary, tx),
                }
            }
            OperationPayload::DepositCash { account, purse } => {
                let boxes = inner.accounts.get(account).ok_or(E::MissingAccountState)?;
                let number = *inner.reserved.first().ok_or(E::MissingNumber)?;

                let tx = builder::cash_deposit(
                    signer,
                    number,
                    &boxes.account,
                    &boxes.inbox,
                    &boxes.outbox,
                    &issued,
                    purse,
                )?;

                CommandPayload::Notarize {
                    account: account.clone(),
                    ledger: builder::message_ledger(signer, account, &notary, tx),
                }
            }
            OperationPayload::WithdrawCash { account, amount } => {
                let boxes = inner.accounts.get(account).ok_or(E::MissingAccountState)?;
                let number = *inner.reserved.first().ok_or(E::MissingNumber)?;

                let tx = builder::withdrawal(
                    signer,
                    number,
                    &boxes.account,
                    &boxes.inbox,
                    &boxes.outbox,
                    &issued,
                    *amount,
                )?;

                CommandPayload::Notarize {
                    account: account.clone(),
                    ledger: builder::message_ledger(signer, account, &notary, tx),
                }
            }
            OperationPayload::Message { recipient, message } => CommandPayload::SendNymMessage {
                recipient: recipient.clone(),
                message: message.clone(),
            },
            OperationPayload::PeerRequest { recipient, request } => {
                CommandPayload::SendPeerRequest {
                    recipient: recipient.clone(),
                    request: request.clone(),
                }
            }
            OperationPayload::PeerReply {
                recipient,
                request_id,
                reply,
            } => CommandPayload::SendPeerReply {
                recipient: recipient.clone(),
                request_id: request_id.clone(),
                reply: reply.clone(),
            },
            OperationPayload::ConveyPayment { recipient, payment } => {
                CommandPayload::SendNymInstrument {
                    recipient: recipient.clone(),
                    instrument: payment.clone(),
                }
            }
            OperationPayload::DownloadContract { id } => CommandPayload::GetContract {
                id: id.clone(),
            },
            OperationPayload::DownloadMint { unit } => CommandPayload::GetMint {
                unit: unit.clone(),
            },
            OperationPayload::CheckNym { target } => CommandPayload::CheckNym {
                target: target.clone(),
            },
            OperationPayload::PublishNym { id } => CommandPayload::PublishContract {
                kind: notary_client_core::msg::ContractKind::Nym,
                id: id.to_string(),
            },
            OperationPayload::PublishNotary { id } => CommandPayload::PublishContract {
                kind: notary_client_core::msg::ContractKind::Notary,
                id: id.to_string(),
            },
            OperationPayload::PublishUnit { id } => CommandPayload::PublishContract {
                kind: notary_client_core::msg::ContractKind::Unit,
                id: id.to_string(),
            },
            OperationPayload::RequestAdmin { password } => CommandPayload::RequestAdmin {
                password: password.clone(),
            },
            OperationPayload::GetTransactionNumbers => CommandPayload::GetTransactionNumbers,
            OperationPayload::RefreshAccount { .. } | OperationPayload::None => {
                // RefreshAccount executes through the synchronizer and
                // never reaches command construction
                return Err(E::MissingAccountState);
            }
        };

        Ok(Command::new(
            inner.kind.message_kind(),
            nym,
            notary,
            payload,
        ))
    }

    /// Report a settled transaction milestone
    async fn notify_settled(&self, kind: OperationKind) {
        let inner = self.inner.lock().await;
        let event = match (&kind, &inner.payload) {
            (
                OperationKind::SendTransfer,
                OperationPayload::Transfer {
                    source,
                    target,
                    amount,
                    ..
                },
            ) => Some(WorkflowEvent::TransferInitiated {
                source: source.clone(),
                target: target.clone(),
                amount: *amount,
            }),
            (
                OperationKind::DepositCheque,
                OperationPayload::DepositCheque { account, cheque },
            ) => Some(WorkflowEvent::ChequeDeposited {
                account: account.clone(),
                number: cheque.number,
                amount: cheque.amount,
            }),
            (OperationKind::DepositCash, OperationPayload::DepositCash { account, purse }) => {
                Some(WorkflowEvent::CashDeposited {
                    account: account.clone(),
                    amount: purse.total,
                })
            }
            (
                OperationKind::WithdrawCash,
                OperationPayload::WithdrawCash { account, amount },
            ) => Some(WorkflowEvent::CashWithdrawn {
                account: account.clone(),
                amount: *amount,
            }),
            _ => None,
        };

        if let Some(event) = event {
            self.notifier.notify(event);
        }
    }

    /// Address, sign and submit one command; `None` means "no result this
    /// tick" (busy or shutdown) and leaves the state unchanged
    async fn submit_finalized(
        &mut self,
        mut cmd: Command,
        args: SubmitArgs,
    ) -> Option<DeliveryResult> {
        cmd.readdress(self.ctx.next_request_number().await);
        if !self.ctx.finalize(&mut cmd).await {
            warn!("command finalization failed");
            self.bump_errors().await;
            self.inner.lock().await.transition(State::NymboxPre);
            return None;
        }

        // Keep the addressed form so resends only differ in addressing
        {
            let mut inner = self.inner.lock().await;
            if inner.pending.is_some() {
                inner.pending = Some(cmd.clone());
            }
        }

        match self.ctx.submit(cmd, args).await {
            Submit::Busy => {
                debug!("context busy, retrying next tick");
                self.pause().await;
                None
            }
            Submit::Queued(fut) => self.await_delivery(fut).await,
        }
    }

    /// Wait for a delivery future, observing shutdown and the delivery
    /// timeout. `None` only on shutdown.
    async fn await_delivery(
        &mut self,
        fut: crate::context::DeliveryFuture,
    ) -> Option<DeliveryResult> {
        tokio::select! {
            r = fut => Some(r),
            _ = self.shutdown.changed() => {
                debug!("shutdown during delivery wait");
                None
            }
            _ = tokio::time::sleep(self.timeout) => {
                debug!("delivery timed out");
                Some(DeliveryResult::unknown())
            }
        }
    }

    /// Short pause between busy retries, cut short by shutdown
    async fn pause(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(BUSY_POLL_INTERVAL) => (),
            _ = self.shutdown.changed() => (),
        }
    }

    async fn bump_errors(&self) {
        let mut inner = self.inner.lock().await;
        inner.error_count += 1;
        debug!(
            "operation {} failure {}/{}",
            inner.kind, inner.error_count, MAX_ERROR_COUNT
        );
    }

    async fn category(&self) -> Category {
        self.inner.lock().await.kind.category()
    }

    fn synchronizer(&self) -> Synchronizer<C> {
        Synchronizer::new(self.ctx.clone(), self.shutdown.clone(), self.timeout)
    }
}
