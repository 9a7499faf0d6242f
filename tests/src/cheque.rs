// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Cheque deposit and inbox acceptance scenarios, including abbreviated
//! box-receipt materialization and post-transaction convergence.

use notary_client::{ConsensusContext, Operation};
use notary_client_core::{Amount, Category, TransactionKind};

use crate::{bob, demo_cheque, expected_path, fund_numbers, setup_funded, unit, wait_idle};

/// Deposit a cheque drawn by another nym; the drawer is debited and left a
/// cheque receipt
pub async fn test_deposit() -> anyhow::Result<()> {
    let (notary, ctx, account) = setup_funded(100).await;
    let drawer_account = notary.create_account(&bob(), &unit(), Amount(500)).await;

    fund_numbers(&ctx).await?;

    let cheque = demo_cheque(
        &notary.id(),
        &bob(),
        &drawer_account,
        Some(ctx.nym()),
        75,
    );

    let op = Operation::new(ctx.clone());
    let result = op
        .start_deposit_cheque(account.clone(), cheque)
        .await?
        .await;

    anyhow::ensure!(result.is_success(), "deposit failed: {:?}", result.status);
    wait_idle(&op).await;
    anyhow::ensure!(
        op.visited().await == expected_path(Category::Transaction),
        "unexpected state path: {:?}",
        op.visited().await
    );

    anyhow::ensure!(notary.balance(&account).await == Some(Amount(175)));
    anyhow::ensure!(notary.balance(&drawer_account).await == Some(Amount(425)));
    anyhow::ensure!(
        notary.inbox_len(&drawer_account).await == 1,
        "drawer keeps a cheque receipt until accepted"
    );

    Ok(())
}

/// Pending receipts (one abbreviated) are materialized and accepted in a
/// single acceptance covering every item
pub async fn test_accept_with_abbreviated_receipt() -> anyhow::Result<()> {
    let (notary, ctx, account) = setup_funded(100).await;

    fund_numbers(&ctx).await?;

    // Three staged receipts, the middle one served header-only
    notary
        .push_inbox(&account, TransactionKind::Pending, Amount(30), false)
        .await;
    notary
        .push_inbox(&account, TransactionKind::Pending, Amount(20), true)
        .await;
    notary
        .push_inbox(&account, TransactionKind::ChequeReceipt, Amount(10), false)
        .await;

    let op = Operation::new(ctx.clone());
    let result = op.start_refresh_account(account.clone()).await?.await;

    anyhow::ensure!(result.is_success(), "refresh failed: {:?}", result.status);
    wait_idle(&op).await;
    anyhow::ensure!(
        op.visited().await == expected_path(Category::UpdateAccount),
        "unexpected state path: {:?}",
        op.visited().await
    );

    let stats = notary.stats().await;
    anyhow::ensure!(
        stats.box_receipt_downloads == 1,
        "only the abbreviated receipt is fetched ({} downloads)",
        stats.box_receipt_downloads
    );
    anyhow::ensure!(stats.inbox_acceptances == 1, "one acceptance covers all");

    // Both pending amounts credited, inbox drained
    anyhow::ensure!(notary.balance(&account).await == Some(Amount(150)));
    anyhow::ensure!(notary.inbox_len(&account).await == 0);

    // The pre-reserved acceptance number was spent, not leaked
    let pool = ctx.pool_stats().await;
    anyhow::ensure!(pool.reserved == 0, "numbers leaked: {pool:?}");
    anyhow::ensure!(pool.spent == 1, "acceptance spends one number: {pool:?}");

    Ok(())
}

/// Depositing a cheque drawn on the deposit account itself produces a
/// receipt in that same inbox; `AccountPost` must converge in a second pass
pub async fn test_self_deposit_converges() -> anyhow::Result<()> {
    let (notary, ctx, account) = setup_funded(100).await;

    fund_numbers(&ctx).await?;

    let nym = ctx.nym();
    let cheque = demo_cheque(&notary.id(), &nym, &account, Some(nym.clone()), 40);

    let op = Operation::new(ctx.clone());
    let result = op
        .start_deposit_cheque(account.clone(), cheque)
        .await?
        .await;

    anyhow::ensure!(result.is_success(), "deposit failed: {:?}", result.status);
    wait_idle(&op).await;
    anyhow::ensure!(
        op.visited().await == expected_path(Category::Transaction),
        "unexpected state path: {:?}",
        op.visited().await
    );

    // Credit and debit cancel out once the receipt is accepted
    anyhow::ensure!(notary.balance(&account).await == Some(Amount(100)));
    anyhow::ensure!(notary.inbox_len(&account).await == 0, "inbox must converge");
    anyhow::ensure!(notary.stats().await.inbox_acceptances == 1);

    Ok(())
}
