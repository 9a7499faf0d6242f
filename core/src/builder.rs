// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Outgoing transaction construction.
//!
//! Pure functions from operation parameters and a read-only context view to
//! signed ledger payloads. Every notarized transaction follows the same
//! shape: one or more request items, a balance statement over the touched
//! account, item/transaction/ledger signed bottom-up. Submission, retries
//! and request numbering are the controller's business, not ours.

use crate::error::Error;
use crate::ids::{AccountId, Amount, NotaryId, NymId, TransactionNumber};
use crate::instrument::{Cheque, Purse};
use crate::ledger::{
    AccountSnapshot, BalanceStatement, Item, ItemKind, Ledger, LedgerKind, Transaction,
    TransactionKind,
};
use crate::signer::Signer;

/// Build a signed transfer transaction moving `amount` to `target`
#[allow(clippy::too_many_arguments)]
pub fn transfer(
    signer: &dyn Signer,
    number: TransactionNumber,
    source: &AccountSnapshot,
    inbox: &Ledger,
    outbox: &Ledger,
    issued: &[TransactionNumber],
    target: &AccountId,
    amount: Amount,
    memo: &str,
) -> Result<Transaction, Error> {
    if !amount.is_positive() {
        return Err(Error::InvalidAmount);
    }
    if *target == source.id {
        return Err(Error::SelfTransfer);
    }
    if source.balance < amount {
        return Err(Error::InsufficientFunds);
    }

    let mut tx = Transaction::new(number, TransactionKind::Transfer).with_amount(amount);

    let mut item = Item::request(ItemKind::Transfer, amount).with_destination(target.clone());
    if !memo.is_empty() {
        item = item.with_note(memo);
    }
    tx.push_item(item.sign(signer));

    let statement = BalanceStatement::compute(-amount, source, inbox, outbox, issued);
    tx.push_item(statement.into_item(signer));

    Ok(tx.sign(signer))
}

/// Build a signed cheque deposit transaction
#[allow(clippy::too_many_arguments)]
pub fn cheque_deposit(
    signer: &dyn Signer,
    number: TransactionNumber,
    depositor: &NymId,
    account: &AccountSnapshot,
    inbox: &Ledger,
    outbox: &Ledger,
    issued: &[TransactionNumber],
    cheque: &Cheque,
) -> Result<Transaction, Error> {
    if !cheque.amount.is_positive() {
        return Err(Error::InvalidAmount);
    }
    if !cheque.payable_to(depositor) {
        return Err(Error::NotPayable);
    }
    if cheque.unit != account.unit {
        return Err(Error::UnitMismatch);
    }

    let mut tx = Transaction::new(number, TransactionKind::Deposit).with_amount(cheque.amount);

    let item = Item::request(ItemKind::DepositCheque, cheque.amount)
        .with_reference(cheque.number)
        .with_note(serde_json::to_string(cheque).unwrap_or_default());
    tx.push_item(item.sign(signer));

    let statement = BalanceStatement::compute(cheque.amount, account, inbox, outbox, issued);
    tx.push_item(statement.into_item(signer));

    Ok(tx.sign(signer))
}

/// Build a signed cash deposit transaction for a purse of tokens
pub fn cash_deposit(
    signer: &dyn Signer,
    number: TransactionNumber,
    account: &AccountSnapshot,
    inbox: &Ledger,
    outbox: &Ledger,
    issued: &[TransactionNumber],
    purse: &Purse,
) -> Result<Transaction, Error> {
    if purse.is_empty() {
        return Err(Error::EmptyPurse);
    }
    if !purse.total.is_positive() {
        return Err(Error::InvalidAmount);
    }
    if purse.unit != account.unit {
        return Err(Error::UnitMismatch);
    }

    let mut tx = Transaction::new(number, TransactionKind::Deposit).with_amount(purse.total);

    let item = Item::request(ItemKind::Deposit, purse.total)
        .with_note(serde_json::to_string(purse).unwrap_or_default());
    tx.push_item(item.sign(signer));

    let statement = BalanceStatement::compute(purse.total, account, inbox, outbox, issued);
    tx.push_item(statement.into_item(signer));

    Ok(tx.sign(signer))
}

/// Build a signed cash withdrawal transaction
pub fn withdrawal(
    signer: &dyn Signer,
    number: TransactionNumber,
    account: &AccountSnapshot,
    inbox: &Ledger,
    outbox: &Ledger,
    issued: &[TransactionNumber],
    amount: Amount,
) -> Result<Transaction, Error> {
    if !amount.is_positive() {
        return Err(Error::InvalidAmount);
    }
    if account.balance < amount {
        return Err(Error::InsufficientFunds);
    }

    let mut tx = Transaction::new(number, TransactionKind::Withdrawal).with_amount(amount);

    tx.push_item(Item::request(ItemKind::Withdrawal, amount).sign(signer));

    let statement = BalanceStatement::compute(-amount, account, inbox, outbox, issued);
    tx.push_item(statement.into_item(signer));

    Ok(tx.sign(signer))
}

/// Build the acceptance transaction clearing every pending inbox receipt.
///
/// Every receipt must already be materialized; the caller downloads box
/// receipts for abbreviated entries first.
pub fn process_inbox(
    signer: &dyn Signer,
    number: TransactionNumber,
    account: &AccountSnapshot,
    inbox: &Ledger,
    outbox: &Ledger,
    issued: &[TransactionNumber],
) -> Result<Transaction, Error> {
    if inbox.is_empty() {
        return Err(Error::EmptyInbox);
    }
    if let Some(n) = inbox.abbreviated_numbers().first() {
        return Err(Error::AbbreviatedReceipt(*n));
    }

    let mut tx = Transaction::new(number, TransactionKind::ProcessInbox);

    for receipt in &inbox.transactions {
        let item = Item::request(receipt.accept_kind(), receipt.amount)
            .with_reference(receipt.number);
        tx.push_item(item.sign(signer));
    }

    let statement =
        BalanceStatement::compute(inbox.accepted_value(), account, inbox, outbox, issued);
    tx.push_item(statement.into_item(signer));

    Ok(tx.sign(signer))
}

/// Wrap a single transaction into a signed message ledger
pub fn message_ledger(
    signer: &dyn Signer,
    account: &AccountId,
    notary: &NotaryId,
    tx: Transaction,
) -> Ledger {
    let mut ledger = Ledger::new(LedgerKind::Message, account.clone(), notary.clone());
    ledger.push(tx);
    ledger.sign(signer)
}
