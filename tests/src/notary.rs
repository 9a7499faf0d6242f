// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Scripted in-memory notary.
//!
//! Implements enough server behavior to exercise the client state machine:
//! nym registration, request-number sequencing, transaction-number issuance
//! and spend tracking, balance-statement validation, transfer/deposit/
//! withdrawal application, inbox acceptance, abbreviated box downloads, and
//! injectable failure windows.
//!
//! Simplifications vs a real notary: signatures are only checked for
//! presence, cheque numbers are not matched against the drawer's issued
//! set, and accepting a receipt does not close numbers across nyms.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, trace};
use tokio::sync::Mutex;

use notary_client_core::{
    ids::{AccountId, Amount, NotaryId, NymId, RequestNumber, TransactionNumber, UnitId},
    instrument::Cheque,
    ledger::{
        AccountSnapshot, BalanceStatement, Item, ItemKind, ItemStatus, Ledger, LedgerKind,
        Transaction, TransactionKind,
    },
    msg::{Command, CommandPayload, DeliveryResult, MessageKind, Reply, ReplyPayload},
    ConsensusHash,
};

/// Numbers granted per request
pub const NUMBER_GRANT: usize = 10;

/// Handling counters for assertions
#[derive(Copy, Clone, Default, Debug)]
pub struct NotaryStats {
    pub commands: usize,
    pub notarizations: usize,
    pub inbox_acceptances: usize,
    pub account_downloads: usize,
    pub box_receipt_downloads: usize,
    pub nymbox_downloads: usize,
}

struct NymRecord {
    nymbox_hash: ConsensusHash,
    last_request: u64,
    /// Numbers issued and still open
    issued: BTreeSet<TransactionNumber>,
    /// Numbers closed by accepted transactions
    spent: BTreeSet<TransactionNumber>,
}

impl NymRecord {
    fn new(nym: &NymId) -> Self {
        Self {
            nymbox_hash: ConsensusHash::digest(nym.as_str().as_bytes()),
            last_request: 0,
            issued: BTreeSet::new(),
            spent: BTreeSet::new(),
        }
    }
}

struct AccountRecord {
    snapshot: AccountSnapshot,
    /// Full entries; `abbreviated` marks entries served header-only until
    /// their box receipt is downloaded
    inbox: Ledger,
    outbox: Ledger,
}

struct NotaryState {
    nyms: BTreeMap<NymId, NymRecord>,
    accounts: BTreeMap<AccountId, AccountRecord>,
    next_number: u64,
    next_account: u64,
    fail_next: usize,
    drop_next: usize,
    stats: NotaryStats,
}

/// Scripted notary served over [`handle`][MockNotary::handle]
pub struct MockNotary {
    id: NotaryId,
    state: Mutex<NotaryState>,
}

impl MockNotary {
    pub fn new(id: NotaryId) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(NotaryState {
                nyms: BTreeMap::new(),
                accounts: BTreeMap::new(),
                next_number: 1000,
                next_account: 1,
                fail_next: 0,
                drop_next: 0,
                stats: NotaryStats::default(),
            }),
        })
    }

    pub fn id(&self) -> NotaryId {
        self.id.clone()
    }

    /// Register a nym directly (test setup)
    pub async fn register_nym(&self, nym: &NymId) {
        let mut s = self.state.lock().await;
        s.nyms.entry(nym.clone()).or_insert_with(|| NymRecord::new(nym));
    }

    /// Create a funded account directly (test setup)
    pub async fn create_account(
        &self,
        owner: &NymId,
        unit: &UnitId,
        balance: Amount,
    ) -> AccountId {
        let mut s = self.state.lock().await;
        s.nyms
            .entry(owner.clone())
            .or_insert_with(|| NymRecord::new(owner));
        create_account(&mut s, &self.id, owner, unit, balance)
    }

    /// Stage an inbox receipt on an account (test setup). Returns the
    /// receipt's transaction number.
    pub async fn push_inbox(
        &self,
        account: &AccountId,
        kind: TransactionKind,
        amount: Amount,
        abbreviated: bool,
    ) -> Option<TransactionNumber> {
        let mut s = self.state.lock().await;

        let number = TransactionNumber(s.next_number);
        s.next_number += 1;

        let record = s.accounts.get_mut(account)?;
        let mut tx = Transaction::new(number, kind).with_amount(amount);
        let mut item = Item::request(receipt_item_kind(kind), amount);
        item.status = ItemStatus::Acknowledged;
        tx.push_item(item);
        tx.abbreviated = abbreviated;
        record.inbox.push(tx);

        Some(number)
    }

    /// Mutate a nym's nymbox hash, simulating server-side delivery
    pub async fn touch_nymbox(&self, nym: &NymId) {
        let mut s = self.state.lock().await;
        if let Some(r) = s.nyms.get_mut(nym) {
            r.nymbox_hash.update(b"notice");
        }
    }

    pub async fn balance(&self, account: &AccountId) -> Option<Amount> {
        let s = self.state.lock().await;
        s.accounts.get(account).map(|a| a.snapshot.balance)
    }

    pub async fn inbox_len(&self, account: &AccountId) -> usize {
        let s = self.state.lock().await;
        s.accounts
            .get(account)
            .map(|a| a.inbox.transactions.len())
            .unwrap_or(0)
    }

    pub async fn outbox_len(&self, account: &AccountId) -> usize {
        let s = self.state.lock().await;
        s.accounts
            .get(account)
            .map(|a| a.outbox.transactions.len())
            .unwrap_or(0)
    }

    /// Open (issued, unspent) numbers held by a nym
    pub async fn issued_count(&self, nym: &NymId) -> usize {
        let s = self.state.lock().await;
        s.nyms.get(nym).map(|n| n.issued.len()).unwrap_or(0)
    }

    /// Reply `MessageFailed` to the next `n` commands
    pub async fn set_fail_next(&self, n: usize) {
        self.state.lock().await.fail_next = n;
    }

    /// Swallow the next `n` commands (client observes `Unknown`)
    pub async fn set_drop_next(&self, n: usize) {
        self.state.lock().await.drop_next = n;
    }

    pub async fn stats(&self) -> NotaryStats {
        self.state.lock().await.stats
    }

    /// Process one command, returning the delivery outcome
    pub async fn handle(&self, cmd: Command) -> DeliveryResult {
        let mut s = self.state.lock().await;
        s.stats.commands += 1;

        trace!("notary <- {:?} (rn {:?})", cmd.kind, cmd.request_number);

        if s.drop_next > 0 {
            s.drop_next -= 1;
            debug!("dropping {} command", cmd.kind);
            return DeliveryResult::unknown();
        }

        let rn = match cmd.request_number {
            Some(r) => r,
            None => return failed(cmd.kind, RequestNumber(0), ConsensusHash::new()),
        };

        // Registration bootstraps the nym record
        if cmd.kind == MessageKind::RegisterNym {
            let record = s
                .nyms
                .entry(cmd.nym.clone())
                .or_insert_with(|| NymRecord::new(&cmd.nym));
            record.last_request = rn.0;
            let hash = record.nymbox_hash;
            return success(cmd.kind, rn, hash, ReplyPayload::Ack);
        }

        let Some(record) = s.nyms.get_mut(&cmd.nym) else {
            debug!("unregistered nym {}", cmd.nym);
            return failed(cmd.kind, rn, ConsensusHash::new());
        };
        let hash = record.nymbox_hash;

        // Request numbers must strictly advance; resends carry fresh ones
        if rn.0 <= record.last_request {
            debug!("stale request number {rn}");
            return failed(cmd.kind, rn, hash);
        }
        record.last_request = rn.0;

        if cmd.signature.is_none() {
            return failed(cmd.kind, rn, hash);
        }

        if s.fail_next > 0 {
            s.fail_next -= 1;
            debug!("injected failure for {}", cmd.kind);
            return failed(cmd.kind, rn, hash);
        }

        let nym = cmd.nym.clone();
        let payload = match handle_payload(&mut s, &self.id, &nym, &cmd.payload) {
            Ok(p) => p,
            Err(()) => {
                let hash = nymbox_hash(&s, &nym);
                return failed(cmd.kind, rn, hash);
            }
        };

        let hash = nymbox_hash(&s, &nym);
        success(cmd.kind, rn, hash, payload)
    }
}

fn nymbox_hash(s: &NotaryState, nym: &NymId) -> ConsensusHash {
    s.nyms
        .get(nym)
        .map(|r| r.nymbox_hash)
        .unwrap_or_else(ConsensusHash::new)
}

fn success(
    kind: MessageKind,
    rn: RequestNumber,
    hash: ConsensusHash,
    payload: ReplyPayload,
) -> DeliveryResult {
    DeliveryResult::success(Reply {
        kind,
        request_number: rn,
        success: true,
        nymbox_hash: Some(hash),
        payload,
    })
}

fn failed(
    kind: MessageKind,
    rn: RequestNumber,
    hash: ConsensusHash,
) -> DeliveryResult {
    DeliveryResult::failed(Reply {
        kind,
        request_number: rn,
        success: false,
        nymbox_hash: Some(hash),
        payload: ReplyPayload::Ack,
    })
}

fn create_account(
    s: &mut NotaryState,
    notary: &NotaryId,
    owner: &NymId,
    unit: &UnitId,
    balance: Amount,
) -> AccountId {
    let id = AccountId::new(format!("acct-{}", s.next_account));
    s.next_account += 1;

    let snapshot = AccountSnapshot {
        id: id.clone(),
        unit: unit.clone(),
        owner: owner.clone(),
        balance,
    };
    s.accounts.insert(
        id.clone(),
        AccountRecord {
            snapshot,
            inbox: Ledger::new(LedgerKind::Inbox, id.clone(), notary.clone()),
            outbox: Ledger::new(LedgerKind::Outbox, id.clone(), notary.clone()),
        },
    );

    debug!("created account {id} for {owner}");
    id
}

fn receipt_item_kind(kind: TransactionKind) -> ItemKind {
    match kind {
        TransactionKind::Pending => ItemKind::Transfer,
        TransactionKind::ChequeReceipt => ItemKind::DepositCheque,
        _ => ItemKind::Transfer,
    }
}

fn handle_payload(
    s: &mut NotaryState,
    notary: &NotaryId,
    nym: &NymId,
    payload: &CommandPayload,
) -> Result<ReplyPayload, ()> {
    match payload {
        CommandPayload::RegisterAccount { unit } => {
            let id = create_account(s, notary, nym, unit, Amount::ZERO);
            let snapshot = s.accounts[&id].snapshot.clone();
            Ok(ReplyPayload::AccountCreated { account: snapshot })
        }

        CommandPayload::IssueUnitDefinition { unit, .. } => {
            let id = create_account(s, notary, nym, unit, Amount::ZERO);
            let snapshot = s.accounts[&id].snapshot.clone();
            Ok(ReplyPayload::AccountCreated { account: snapshot })
        }

        CommandPayload::GetAccountData { account } => {
            s.stats.account_downloads += 1;
            let record = s.accounts.get(account).ok_or(())?;
            if record.snapshot.owner != *nym {
                return Err(());
            }

            // Serve abbreviated entries header-only
            let mut inbox = record.inbox.clone();
            for t in inbox.transactions.iter_mut() {
                if t.abbreviated {
                    t.items.clear();
                }
            }

            Ok(ReplyPayload::AccountData {
                account: record.snapshot.clone(),
                inbox,
                outbox: record.outbox.clone(),
            })
        }

        CommandPayload::GetBoxReceipt {
            account,
            box_kind: _,
            number,
        } => {
            s.stats.box_receipt_downloads += 1;
            let record = s.accounts.get(account).ok_or(())?;
            let entry = record
                .inbox
                .transactions
                .iter()
                .find(|t| t.number == *number)
                .ok_or(())?;

            let mut full = entry.clone();
            full.abbreviated = false;
            Ok(ReplyPayload::BoxReceipt { transaction: full })
        }

        CommandPayload::GetNymbox => {
            s.stats.nymbox_downloads += 1;
            let record = s.nyms.get(nym).ok_or(())?;
            Ok(ReplyPayload::Nymbox {
                hash: record.nymbox_hash,
            })
        }

        CommandPayload::GetTransactionNumbers => {
            let mut numbers = Vec::with_capacity(NUMBER_GRANT);
            for _ in 0..NUMBER_GRANT {
                numbers.push(TransactionNumber(s.next_number));
                s.next_number += 1;
            }

            let record = s.nyms.get_mut(nym).ok_or(())?;
            record.issued.extend(numbers.iter().copied());
            // The grant notice lands in the nymbox
            record.nymbox_hash.update(b"numbers");

            debug!("granted {} numbers to {nym}", numbers.len());
            Ok(ReplyPayload::NumbersGranted { numbers })
        }

        CommandPayload::Notarize { account, ledger } => {
            s.stats.notarizations += 1;
            notarize(s, notary, nym, account, ledger)
        }

        CommandPayload::ProcessInbox { account, ledger } => {
            s.stats.inbox_acceptances += 1;
            process_inbox(s, nym, account, ledger)
        }

        CommandPayload::SendNymMessage { recipient, .. }
        | CommandPayload::SendNymInstrument { recipient, .. }
        | CommandPayload::SendPeerRequest { recipient, .. }
        | CommandPayload::SendPeerReply { recipient, .. } => {
            let record = s.nyms.get_mut(recipient).ok_or(())?;
            record.nymbox_hash.update(b"message");
            Ok(ReplyPayload::Ack)
        }

        CommandPayload::CheckNym { target } => {
            if !s.nyms.contains_key(target) {
                return Err(());
            }
            Ok(ReplyPayload::Contract {
                id: target.to_string(),
                contract: format!("credentials for {target}"),
            })
        }

        CommandPayload::GetContract { id } => Ok(ReplyPayload::Contract {
            id: id.clone(),
            contract: format!("contract {id}"),
        }),

        CommandPayload::GetMint { unit } => Ok(ReplyPayload::Mint {
            unit: unit.clone(),
            mint: format!("mint for {unit}"),
        }),

        CommandPayload::PublishContract { .. } | CommandPayload::RequestAdmin { .. } => {
            Ok(ReplyPayload::Ack)
        }

        // Registration is handled before dispatch
        CommandPayload::RegisterNym { .. } => Ok(ReplyPayload::Ack),
    }
}

/// Validate and apply a notarized transaction
fn notarize(
    s: &mut NotaryState,
    notary: &NotaryId,
    nym: &NymId,
    account: &AccountId,
    ledger: &Ledger,
) -> Result<ReplyPayload, ()> {
    let tx = ledger.transactions.first().ok_or(())?;

    // Number must be issued to the nym and still open
    {
        let record = s.nyms.get(nym).ok_or(())?;
        if !record.issued.contains(&tx.number) {
            debug!("number {} not issued to {nym}", tx.number);
            return Ok(rejected_response(notary, account, tx));
        }
    }

    // Interpret items
    let mut delta = Amount::ZERO;
    let mut transfer: Option<(AccountId, Amount)> = None;
    let mut cheque: Option<Cheque> = None;
    let mut statement: Option<BalanceStatement> = None;

    for item in &tx.items {
        match item.kind {
            ItemKind::Transfer => {
                let dest = item.destination.clone().ok_or(())?;
                delta = delta - item.amount;
                transfer = Some((dest, item.amount));
            }
            ItemKind::DepositCheque => {
                let note = item.note.as_deref().ok_or(())?;
                cheque = Some(serde_json::from_str(note).map_err(|_| ())?);
                delta = delta + item.amount;
            }
            ItemKind::Deposit => delta = delta + item.amount,
            ItemKind::Withdrawal => delta = delta - item.amount,
            ItemKind::BalanceStatement => {
                let note = item.note.as_deref().ok_or(())?;
                statement = Some(serde_json::from_str(note).map_err(|_| ())?);
            }
            _ => return Err(()),
        }
    }

    let statement = statement.ok_or(())?;

    // Statement must project the post-transaction balance and list exactly
    // the nym's open numbers
    {
        let acct = s.accounts.get(account).ok_or(())?;
        if acct.snapshot.owner != *nym {
            return Err(());
        }
        if statement.projected != acct.snapshot.balance + delta {
            debug!(
                "balance statement mismatch: {} != {} + {}",
                statement.projected, acct.snapshot.balance, delta
            );
            return Ok(rejected_response(notary, account, tx));
        }

        let record = s.nyms.get(nym).ok_or(())?;
        let stated: BTreeSet<_> = statement.issued.iter().copied().collect();
        if stated != record.issued {
            debug!("issued-number statement mismatch for {nym}");
            return Ok(rejected_response(notary, account, tx));
        }
    }

    // Apply
    if let Some(acct) = s.accounts.get_mut(account) {
        acct.snapshot.balance = acct.snapshot.balance + delta;
    }

    if let Some((target, amount)) = transfer {
        // Outbox entry on the source until the counterparty accepts
        let pending_number = TransactionNumber(s.next_number);
        s.next_number += 1;

        if let Some(acct) = s.accounts.get_mut(account) {
            acct.outbox.push(
                Transaction::new(tx.number, TransactionKind::Pending).with_amount(amount),
            );
        }

        // Pending receipt on the target's inbox
        if let Some(dest) = s.accounts.get_mut(&target) {
            let mut pending = Transaction::new(pending_number, TransactionKind::Pending)
                .with_reference(tx.number)
                .with_amount(amount);
            let mut item = Item::request(ItemKind::Transfer, amount);
            item.status = ItemStatus::Acknowledged;
            pending.push_item(item);
            dest.inbox.push(pending);
        }
    }

    if let Some(c) = cheque {
        // Debit the drawer and leave them a cheque receipt
        let receipt_number = TransactionNumber(s.next_number);
        s.next_number += 1;

        if let Some(drawer) = s.accounts.get_mut(&c.sender_account) {
            drawer.snapshot.balance = drawer.snapshot.balance - c.amount;

            let mut receipt = Transaction::new(receipt_number, TransactionKind::ChequeReceipt)
                .with_reference(c.number)
                .with_amount(c.amount);
            let mut item = Item::request(ItemKind::DepositCheque, c.amount);
            item.status = ItemStatus::Acknowledged;
            receipt.push_item(item);
            drawer.inbox.push(receipt);
        }
    }

    // The number is spent
    if let Some(record) = s.nyms.get_mut(nym) {
        record.issued.remove(&tx.number);
        record.spent.insert(tx.number);
    }

    Ok(accepted_response(notary, account, tx))
}

/// Validate and apply an inbox acceptance
fn process_inbox(
    s: &mut NotaryState,
    nym: &NymId,
    account: &AccountId,
    ledger: &Ledger,
) -> Result<ReplyPayload, ()> {
    let tx = ledger.transactions.first().ok_or(())?;
    let notary = ledger.notary.clone();

    {
        let record = s.nyms.get(nym).ok_or(())?;
        if !record.issued.contains(&tx.number) {
            return Ok(rejected_response(&notary, account, tx));
        }
    }

    let mut accepted: Vec<TransactionNumber> = Vec::new();
    let mut delta = Amount::ZERO;
    let mut statement: Option<BalanceStatement> = None;

    {
        let acct = s.accounts.get(account).ok_or(())?;
        if acct.snapshot.owner != *nym {
            return Err(());
        }

        for item in &tx.items {
            match item.kind {
                ItemKind::AcceptPending | ItemKind::AcceptItemReceipt => {
                    let reference = item.reference.ok_or(())?;
                    let entry = acct
                        .inbox
                        .transactions
                        .iter()
                        .find(|t| t.number == reference)
                        .ok_or(())?;

                    if entry.kind == TransactionKind::Pending {
                        delta = delta + entry.amount;
                    }
                    accepted.push(reference);
                }
                ItemKind::BalanceStatement => {
                    let note = item.note.as_deref().ok_or(())?;
                    statement = Some(serde_json::from_str(note).map_err(|_| ())?);
                }
                _ => return Err(()),
            }
        }

        // The acceptance must cover the whole inbox
        if accepted.len() != acct.inbox.transactions.len() {
            debug!("partial inbox acceptance rejected");
            return Ok(rejected_response(&notary, account, tx));
        }

        let statement_ref = statement.as_ref().ok_or(())?;
        if statement_ref.projected != acct.snapshot.balance + delta {
            return Ok(rejected_response(&notary, account, tx));
        }

        let record = s.nyms.get(nym).ok_or(())?;
        let stated: BTreeSet<_> = statement_ref.issued.iter().copied().collect();
        if stated != record.issued {
            return Ok(rejected_response(&notary, account, tx));
        }
    }

    // Apply: credit and clear
    if let Some(acct) = s.accounts.get_mut(account) {
        acct.snapshot.balance = acct.snapshot.balance + delta;
        acct.inbox
            .transactions
            .retain(|t| !accepted.contains(&t.number));
    }

    if let Some(record) = s.nyms.get_mut(nym) {
        record.issued.remove(&tx.number);
        record.spent.insert(tx.number);
    }

    Ok(accepted_response(&notary, account, tx))
}

fn accepted_response(notary: &NotaryId, account: &AccountId, tx: &Transaction) -> ReplyPayload {
    response_payload(notary, account, tx, ItemStatus::Acknowledged)
}

fn rejected_response(notary: &NotaryId, account: &AccountId, tx: &Transaction) -> ReplyPayload {
    response_payload(notary, account, tx, ItemStatus::Rejected)
}

fn response_payload(
    notary: &NotaryId,
    account: &AccountId,
    tx: &Transaction,
    status: ItemStatus,
) -> ReplyPayload {
    let mut response = tx.clone();
    for item in response.items.iter_mut() {
        item.status = status;
    }

    let mut ledger = Ledger::new(LedgerKind::Response, account.clone(), notary.clone());
    ledger.push(response);

    ReplyPayload::TransactionResponse {
        account: account.clone(),
        ledger: serde_json::to_string(&ledger).unwrap_or_default(),
    }
}
