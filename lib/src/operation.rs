// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Operation handle and lifecycle.
//!
//! One [`Operation`] instance drives one logical request at a time through
//! the protocol state machine. Instances are reusable: once the machine
//! returns to `Idle` a new typed start is accepted. A second start while
//! mid-flight is rejected, never queued.
//!
//! Every start returns a [`ResultFuture`] resolving to exactly one
//! [`DeliveryResult`]. Shutting the operation down stops advancement
//! without forging a result; dropping the instance with an unpublished
//! result resolves the future with `Unknown` status.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use log::debug;
use tokio::sync::{oneshot, watch, Mutex};

use notary_client_core::{
    AccountId, Amount, Cheque, Command, DeliveryResult, NotaryId, NullNotifier, NymId,
    OperationKind, Purse, State, TransactionNumber, UnitId, WorkflowNotifier,
};

use crate::context::ConsensusContext;
use crate::controller::Driver;
use crate::error::Error;
use crate::sync::AccountBoxes;

/// Consecutive failures tolerated before an operation is abandoned
pub const MAX_ERROR_COUNT: usize = 3;

/// Bound on post-transaction reconciliation passes
pub const RESYNC_LIMIT: usize = 3;

/// Interval between retries while the context reports busy
pub const BUSY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default bound on a single delivery wait
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Kind-specific operation parameters
#[derive(Clone, PartialEq, Debug)]
pub enum OperationPayload {
    None,
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
    Transfer {
        source: AccountId,
        target: AccountId,
        amount: Amount,
        memo: String,
    },
    Message {
        recipient: NymId,
        message: String,
    },
    PeerRequest {
        recipient: NymId,
        request: String,
    },
    PeerReply {
        recipient: NymId,
        request_id: String,
        reply: String,
    },
    DepositCheque {
        account: AccountId,
        cheque: Cheque,
    },
    DepositCash {
        account: AccountId,
        purse: Purse,
    },
    WithdrawCash {
        account: AccountId,
        amount: Amount,
    },
    ConveyPayment {
        recipient: NymId,
        payment: Cheque,
    },
    DownloadContract {
        id: String,
    },
    DownloadMint {
        unit: UnitId,
    },
    CheckNym {
        target: NymId,
    },
    PublishNym {
        id: NymId,
    },
    PublishNotary {
        id: NotaryId,
    },
    PublishUnit {
        id: UnitId,
    },
    RequestAdmin {
        password: String,
    },
    GetTransactionNumbers,
    RefreshAccount {
        account: AccountId,
    },
}

impl OperationPayload {
    /// Accounts that must be reconciled around execution
    pub(crate) fn affected_accounts(&self) -> BTreeSet<AccountId> {
        let mut accounts = BTreeSet::new();

        match self {
            OperationPayload::Transfer { source, .. } => {
                accounts.insert(source.clone());
            }
            OperationPayload::DepositCheque { account, .. }
            | OperationPayload::DepositCash { account, .. }
            | OperationPayload::WithdrawCash { account, .. }
            | OperationPayload::RefreshAccount { account } => {
                accounts.insert(account.clone());
            }
            _ => (),
        }

        accounts
    }

    /// Account a notarized transaction is drawn against
    pub(crate) fn primary_account(&self) -> Option<AccountId> {
        match self {
            OperationPayload::Transfer { source, .. } => Some(source.clone()),
            OperationPayload::DepositCheque { account, .. }
            | OperationPayload::DepositCash { account, .. }
            | OperationPayload::WithdrawCash { account, .. }
            | OperationPayload::RefreshAccount { account } => Some(account.clone()),
            _ => None,
        }
    }
}

/// Mutable operation state shared between handle and driver
pub(crate) struct Inner {
    pub kind: OperationKind,
    pub payload: OperationPayload,
    pub state: State,
    /// Constructed command awaiting acknowledgement; resent with a fresh
    /// request number rather than rebuilt
    pub pending: Option<Command>,
    /// Numbers drawn from the context for this operation
    pub reserved: Vec<TransactionNumber>,
    /// Reserved numbers spent by an accepted transaction
    pub consumed: Vec<TransactionNumber>,
    /// Accounts to reconcile before/after execution
    pub affected: BTreeSet<AccountId>,
    /// Accounts whose inbox was non-empty during post-sync, needing a
    /// second convergence pass
    pub resync: BTreeSet<AccountId>,
    /// Convergence passes performed in AccountPost
    pub resync_passes: usize,
    /// Downloaded box state, keyed by account
    pub accounts: BTreeMap<AccountId, AccountBoxes>,
    pub error_count: usize,
    /// Single-assignment result slot
    result_tx: Option<oneshot::Sender<DeliveryResult>>,
    /// Result held back until post-execution reconciliation completes
    pub last: Option<DeliveryResult>,
    /// States entered, in order (drops repeated ticks in one state)
    pub visited: Vec<State>,
}

impl Inner {
    fn idle() -> Self {
        Self {
            kind: OperationKind::GetTransactionNumbers,
            payload: OperationPayload::None,
            state: State::Idle,
            pending: None,
            reserved: Vec::new(),
            consumed: Vec::new(),
            affected: BTreeSet::new(),
            resync: BTreeSet::new(),
            resync_passes: 0,
            accounts: BTreeMap::new(),
            error_count: 0,
            result_tx: None,
            last: None,
            visited: Vec::new(),
        }
    }

    fn started(
        kind: OperationKind,
        payload: OperationPayload,
        result_tx: oneshot::Sender<DeliveryResult>,
    ) -> Self {
        Self {
            kind,
            affected: payload.affected_accounts(),
            payload,
            state: State::NymboxPre,
            result_tx: Some(result_tx),
            visited: vec![State::NymboxPre],
            ..Self::idle()
        }
    }

    /// Move to `next`, recording the transition. Staying put is a no-op.
    pub fn transition(&mut self, next: State) {
        if self.state != next {
            debug!("operation {}: {} -> {next}", self.kind, self.state);
            self.state = next;
            self.visited.push(next);
        }
    }

    /// Publish the operation result. Later calls are dropped: the result
    /// is single-assignment.
    pub fn publish(&mut self, result: DeliveryResult) {
        if let Some(tx) = self.result_tx.take() {
            debug!("operation {}: publishing {:?}", self.kind, result.status);
            let _ = tx.send(result);
        }
    }

    pub fn published(&self) -> bool {
        self.result_tx.is_none()
    }
}

/// Future resolving to the terminal [`DeliveryResult`] of one operation run.
///
/// If the operation is destroyed before a result is published the future
/// resolves with `Unknown` status.
pub struct ResultFuture {
    rx: oneshot::Receiver<DeliveryResult>,
}

impl Future for ResultFuture {
    type Output = DeliveryResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or_else(|_| DeliveryResult::unknown()))
    }
}

/// Handle to a reusable per-(nym, notary) operation instance
pub struct Operation<C: ConsensusContext + 'static> {
    ctx: Arc<C>,
    notifier: Arc<dyn WorkflowNotifier>,
    inner: Arc<Mutex<Inner>>,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    delivery_timeout: Duration,
}

impl<C: ConsensusContext + 'static> Operation<C> {
    /// Create an idle operation over the given consensus context
    pub fn new(ctx: Arc<C>) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            ctx,
            notifier: Arc::new(NullNotifier),
            inner: Arc::new(Mutex::new(Inner::idle())),
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            delivery_timeout: DELIVERY_TIMEOUT,
        }
    }

    /// Attach a workflow notifier for settled-milestone callbacks
    pub fn with_notifier(mut self, notifier: Arc<dyn WorkflowNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Override the per-delivery wait bound
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Request cooperative shutdown: the driver stops advancing at its next
    /// suspension point. No result is forged; pending futures resolve
    /// `Unknown` when the instance is dropped.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Whether a run is currently in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current controller state
    pub async fn state(&self) -> State {
        self.inner.lock().await.state
    }

    /// States entered during the most recent run, in order
    pub async fn visited(&self) -> Vec<State> {
        self.inner.lock().await.visited.clone()
    }

    /// Numbers still reserved for the current/most recent run
    pub async fn reserved_numbers(&self) -> Vec<TransactionNumber> {
        self.inner.lock().await.reserved.clone()
    }

    async fn start(
        &self,
        kind: OperationKind,
        payload: OperationPayload,
    ) -> Result<ResultFuture, Error> {
        if *self.shutdown.borrow() {
            return Err(Error::Shutdown);
        }

        // Decision lock: one state-machine pass per instance at a time
        if self.running.swap(true, Ordering::SeqCst) {
            let state = self.inner.lock().await.state;
            return Err(Error::AlreadyRunning(state));
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().await;
            *inner = Inner::started(kind, payload, tx);
        }

        debug!("starting operation {kind}");

        let driver = Driver::new(
            self.ctx.clone(),
            self.inner.clone(),
            self.running.clone(),
            self.shutdown.subscribe(),
            self.notifier.clone(),
            self.delivery_timeout,
        );
        tokio::spawn(driver.run());

        Ok(ResultFuture { rx })
    }

    /// Register the operating nym with the notary
    pub async fn start_register_nym(
        &self,
        credentials: impl Into<String>,
    ) -> Result<ResultFuture, Error> {
        let credentials = credentials.into();
        if credentials.is_empty() {
            return Err(Error::InvalidArguments("credentials must not be empty"));
        }

        self.start(
            OperationKind::RegisterNym,
            OperationPayload::RegisterNym { credentials },
        )
        .await
    }

    /// Register an asset account for `unit`
    pub async fn start_register_account(&self, unit: UnitId) -> Result<ResultFuture, Error> {
        self.start(
            OperationKind::RegisterAccount,
            OperationPayload::RegisterAccount { unit },
        )
        .await
    }

    /// Issue a unit definition, creating the issuer account
    pub async fn start_issue_unit_definition(
        &self,
        unit: UnitId,
        contract: impl Into<String>,
    ) -> Result<ResultFuture, Error> {
        let contract = contract.into();
        if contract.is_empty() {
            return Err(Error::InvalidArguments("contract must not be empty"));
        }

        self.start(
            OperationKind::IssueUnitDefinition,
            OperationPayload::IssueUnitDefinition { unit, contract },
        )
        .await
    }

    /// Transfer `amount` from `source` to `target`
    pub async fn start_transfer(
        &self,
        source: AccountId,
        target: AccountId,
        amount: Amount,
        memo: impl Into<String>,
    ) -> Result<ResultFuture, Error> {
        if !amount.is_positive() {
            return Err(Error::InvalidArguments("amount must be positive"));
        }
        if source == target {
            return Err(Error::InvalidArguments("transfer to the source account"));
        }

        self.start(
            OperationKind::SendTransfer,
            OperationPayload::Transfer {
                source,
                target,
                amount,
                memo: memo.into(),
            },
        )
        .await
    }

    /// Send a plain message to another nym
    pub async fn start_send_message(
        &self,
        recipient: NymId,
        message: impl Into<String>,
    ) -> Result<ResultFuture, Error> {
        self.start(
            OperationKind::SendMessage,
            OperationPayload::Message {
                recipient,
                message: message.into(),
            },
        )
        .await
    }

    /// Send a peer request object
    pub async fn start_send_peer_request(
        &self,
        recipient: NymId,
        request: impl Into<String>,
    ) -> Result<ResultFuture, Error> {
        self.start(
            OperationKind::SendPeerRequest,
            OperationPayload::PeerRequest {
                recipient,
                request: request.into(),
            },
        )
        .await
    }

    /// Reply to a previously received peer request
    pub async fn start_send_peer_reply(
        &self,
        recipient: NymId,
        request_id: impl Into<String>,
        reply: impl Into<String>,
    ) -> Result<ResultFuture, Error> {
        self.start(
            OperationKind::SendPeerReply,
            OperationPayload::PeerReply {
                recipient,
                request_id: request_id.into(),
                reply: reply.into(),
            },
        )
        .await
    }

    /// Deposit a cheque into `account`
    pub async fn start_deposit_cheque(
        &self,
        account: AccountId,
        cheque: Cheque,
    ) -> Result<ResultFuture, Error> {
        if !cheque.amount.is_positive() {
            return Err(Error::InvalidArguments("cheque amount must be positive"));
        }

        self.start(
            OperationKind::DepositCheque,
            OperationPayload::DepositCheque { account, cheque },
        )
        .await
    }

    /// Deposit a purse of cash tokens into `account`
    pub async fn start_deposit_cash(
        &self,
        account: AccountId,
        purse: Purse,
    ) -> Result<ResultFuture, Error> {
        if purse.is_empty() {
            return Err(Error::InvalidArguments("purse holds no tokens"));
        }

        self.start(
            OperationKind::DepositCash,
            OperationPayload::DepositCash { account, purse },
        )
        .await
    }

    /// Withdraw `amount` of cash from `account`
    pub async fn start_withdraw_cash(
        &self,
        account: AccountId,
        amount: Amount,
    ) -> Result<ResultFuture, Error> {
        if !amount.is_positive() {
            return Err(Error::InvalidArguments("amount must be positive"));
        }

        self.start(
            OperationKind::WithdrawCash,
            OperationPayload::WithdrawCash { account, amount },
        )
        .await
    }

    /// Convey a payment instrument to another nym
    pub async fn start_convey_payment(
        &self,
        recipient: NymId,
        payment: Cheque,
    ) -> Result<ResultFuture, Error> {
        if !payment.payable_to(&recipient) {
            return Err(Error::InvalidArguments("payment not payable to recipient"));
        }

        self.start(
            OperationKind::ConveyPayment,
            OperationPayload::ConveyPayment { recipient, payment },
        )
        .await
    }

    /// Download a contract by id
    pub async fn start_download_contract(
        &self,
        id: impl Into<String>,
    ) -> Result<ResultFuture, Error> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidArguments("contract id must not be empty"));
        }

        self.start(
            OperationKind::DownloadContract,
            OperationPayload::DownloadContract { id },
        )
        .await
    }

    /// Download the mint for `unit`
    pub async fn start_download_mint(&self, unit: UnitId) -> Result<ResultFuture, Error> {
        self.start(
            OperationKind::DownloadMint,
            OperationPayload::DownloadMint { unit },
        )
        .await
    }

    /// Look up another nym's published credentials
    pub async fn start_check_nym(&self, target: NymId) -> Result<ResultFuture, Error> {
        self.start(OperationKind::CheckNym, OperationPayload::CheckNym { target })
            .await
    }

    /// Publish a nym contract
    pub async fn start_publish_nym(&self, id: NymId) -> Result<ResultFuture, Error> {
        self.start(OperationKind::PublishNym, OperationPayload::PublishNym { id })
            .await
    }

    /// Publish a notary contract
    pub async fn start_publish_notary(&self, id: NotaryId) -> Result<ResultFuture, Error> {
        self.start(
            OperationKind::PublishNotary,
            OperationPayload::PublishNotary { id },
        )
        .await
    }

    /// Publish a unit contract
    pub async fn start_publish_unit(&self, id: UnitId) -> Result<ResultFuture, Error> {
        self.start(
            OperationKind::PublishUnit,
            OperationPayload::PublishUnit { id },
        )
        .await
    }

    /// Request admin privileges on the notary
    pub async fn start_request_admin(
        &self,
        password: impl Into<String>,
    ) -> Result<ResultFuture, Error> {
        self.start(
            OperationKind::RequestAdmin,
            OperationPayload::RequestAdmin {
                password: password.into(),
            },
        )
        .await
    }

    /// Request a fresh allocation of transaction numbers
    pub async fn start_get_transaction_numbers(&self) -> Result<ResultFuture, Error> {
        self.start(
            OperationKind::GetTransactionNumbers,
            OperationPayload::GetTransactionNumbers,
        )
        .await
    }

    /// Re-download `account` and drain its inbox
    pub async fn start_refresh_account(&self, account: AccountId) -> Result<ResultFuture, Error> {
        self.start(
            OperationKind::RefreshAccount,
            OperationPayload::RefreshAccount { account },
        )
        .await
    }
}
