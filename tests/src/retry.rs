// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Failure handling scenarios: rejected messages, the retry ceiling, busy
//! contexts, and lost replies.

use notary_client::Operation;
use notary_client_core::DeliveryStatus;

use crate::{bob, setup, wait_idle};

/// Four consecutive failures exceed the ceiling; the future resolves
/// `Unknown` with no reply
pub async fn test_failure_ceiling() -> anyhow::Result<()> {
    let (notary, ctx) = setup().await;
    notary.set_fail_next(4).await;

    let op = Operation::new(ctx.clone());
    let result = op.start_check_nym(bob()).await?.await;

    anyhow::ensure!(
        result.status == DeliveryStatus::Unknown,
        "expected terminal Unknown, got {:?}",
        result.status
    );
    anyhow::ensure!(result.reply.is_none(), "terminal Unknown carries no reply");
    wait_idle(&op).await;
    anyhow::ensure!(!op.is_running(), "operation must settle to Idle");

    Ok(())
}

/// A single rejected message is retried into success
pub async fn test_single_failure_recovers() -> anyhow::Result<()> {
    let (notary, ctx) = setup().await;
    notary.set_fail_next(1).await;

    let op = Operation::new(ctx.clone());
    let result = op.start_check_nym(bob()).await?.await;

    anyhow::ensure!(result.is_success(), "retry must recover: {:?}", result.status);
    Ok(())
}

/// A busy context delays execution without failing the operation
pub async fn test_busy_context() -> anyhow::Result<()> {
    let (_notary, ctx) = setup().await;
    ctx.set_busy(2).await;

    let op = Operation::new(ctx.clone());
    let result = op.start_check_nym(bob()).await?.await;

    anyhow::ensure!(result.is_success(), "busy must not fail: {:?}", result.status);
    Ok(())
}

/// A swallowed command is resent (fresh request number, same payload);
/// the notary's strictly-increasing request check accepts the resend
pub async fn test_lost_reply_resend() -> anyhow::Result<()> {
    let (notary, ctx) = setup().await;
    notary.set_drop_next(1).await;

    let op = Operation::new(ctx.clone());
    let result = op.start_check_nym(bob()).await?.await;

    anyhow::ensure!(result.is_success(), "resend must recover: {:?}", result.status);
    anyhow::ensure!(
        notary.stats().await.commands == 2,
        "exactly one resend expected ({} commands)",
        notary.stats().await.commands
    );

    Ok(())
}
