// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transfer scenarios: the full happy path, the stale-nymbox entry, and
//! transaction-number conservation.

use notary_client::{ConsensusContext, Operation};
use notary_client_core::{Amount, Category, DeliveryStatus};

use crate::{bob, expected_path, fund_numbers, setup_funded, unit, wait_idle, NUMBER_GRANT};

pub struct TransferExpectation {
    /// Source account opening balance
    pub balance: i64,
    /// Amount to move
    pub amount: i64,
    pub memo: &'static str,
}

pub const TRANSFERS: &[TransferExpectation] = &[
    TransferExpectation {
        balance: 1_000,
        amount: 50,
        memo: "lunch",
    },
    TransferExpectation {
        balance: 10,
        amount: 10,
        memo: "",
    },
    TransferExpectation {
        balance: 250_000,
        amount: 93_741,
        memo: "invoice 2023-117",
    },
];

/// Happy-path transfer: states, boxes, balances and number conservation
pub async fn test(v: &TransferExpectation) -> anyhow::Result<()> {
    let (notary, ctx, source) = setup_funded(v.balance).await;
    let target = notary.create_account(&bob(), &unit(), Amount::ZERO).await;

    fund_numbers(&ctx).await?;

    let op = Operation::new(ctx.clone());
    let result = op
        .start_transfer(source.clone(), target.clone(), Amount(v.amount), v.memo)
        .await?
        .await;

    anyhow::ensure!(result.is_success(), "transfer failed: {:?}", result.status);
    anyhow::ensure!(result.reply.is_some(), "success carries the reply");
    wait_idle(&op).await;

    // Exactly the Transaction-category path
    anyhow::ensure!(
        op.visited().await == expected_path(Category::Transaction),
        "unexpected state path: {:?}",
        op.visited().await
    );

    // Source debited, transfer pending in the outbox, recipient notified
    anyhow::ensure!(notary.balance(&source).await == Some(Amount(v.balance - v.amount)));
    anyhow::ensure!(notary.outbox_len(&source).await == 1);
    anyhow::ensure!(notary.inbox_len(&source).await == 0);
    anyhow::ensure!(notary.inbox_len(&target).await == 1);

    // Conservation: one number spent, the margin returned, none leaked
    let stats = ctx.pool_stats().await;
    anyhow::ensure!(stats.reserved == 0, "numbers leaked: {stats:?}");
    anyhow::ensure!(stats.spent == 1, "expected one spent number: {stats:?}");
    anyhow::ensure!(stats.available == NUMBER_GRANT - 1);
    anyhow::ensure!(notary.issued_count(&ctx.nym()).await == stats.available);

    Ok(())
}

/// Starting with a stale nymbox hash forces a refresh in `NymboxPre`
/// without disturbing the category path
pub async fn test_stale_nymbox() -> anyhow::Result<()> {
    let (notary, ctx, source) = setup_funded(500).await;
    let target = notary.create_account(&bob(), &unit(), Amount::ZERO).await;

    fund_numbers(&ctx).await?;

    let before = notary.stats().await.nymbox_downloads;
    ctx.set_stale().await;

    let op = Operation::new(ctx.clone());
    let result = op
        .start_transfer(source, target, Amount(125), "stale start")
        .await?
        .await;

    anyhow::ensure!(result.status == DeliveryStatus::MessageSuccess);
    wait_idle(&op).await;
    anyhow::ensure!(
        op.visited().await == expected_path(Category::Transaction),
        "unexpected state path: {:?}",
        op.visited().await
    );
    anyhow::ensure!(
        notary.stats().await.nymbox_downloads > before,
        "stale hash must force a nymbox refresh"
    );

    Ok(())
}
