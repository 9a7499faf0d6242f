// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Common tests for notary protocol clients.
//!
//! Provides a scripted in-memory notary, a consensus-context implementation
//! over it, and reusable scenario functions driven by the integration tests
//! in the client crate.

use std::sync::Arc;

use log::LevelFilter;

use notary_client::{ConsensusContext, Operation};
use notary_client_core::{
    AccountId, Amount, Category, Cheque, NotaryId, NymId, State, TransactionNumber, UnitId,
};

pub use context::{PoolStats, TestContext, TestSigner};

pub mod notary;
pub use notary::{MockNotary, NotaryStats, NUMBER_GRANT};

pub mod cheque;
pub mod retry;
pub mod transfer;

/// Unit of account used throughout the tests
pub const UNIT: &str = "unit-USD";

#[ctor::ctor]
fn log_init() {
    let _ = simplelog::SimpleLogger::init(LevelFilter::Debug, Default::default());
}

pub fn unit() -> UnitId {
    UnitId::from(UNIT)
}

pub fn bob() -> NymId {
    NymId::from("bob")
}

/// Notary with `alice` (the operating nym) and `bob` registered
pub async fn setup() -> (Arc<MockNotary>, Arc<TestContext>) {
    let notary = MockNotary::new(NotaryId::from("notary-1"));

    let alice = NymId::from("alice");
    notary.register_nym(&alice).await;
    notary.register_nym(&bob()).await;

    let ctx = TestContext::new(alice, notary.clone());
    (notary, ctx)
}

/// [`setup`] plus a funded account for the operating nym
pub async fn setup_funded(balance: i64) -> (Arc<MockNotary>, Arc<TestContext>, AccountId) {
    let (notary, ctx) = setup().await;
    let account = notary
        .create_account(&ctx.nym(), &unit(), Amount(balance))
        .await;
    (notary, ctx, account)
}

/// Stock the context's number pool via the protocol
pub async fn fund_numbers(ctx: &Arc<TestContext>) -> anyhow::Result<()> {
    let op = Operation::new(ctx.clone());
    let result = op.start_get_transaction_numbers().await?.await;
    anyhow::ensure!(result.is_success(), "number grant failed");
    wait_idle(&op).await;
    Ok(())
}

/// Wait for the driver to finish its Idle cleanup. The result future can
/// resolve before numbers are returned and the decision lock released.
pub async fn wait_idle<C: ConsensusContext + 'static>(op: &Operation<C>) {
    while op.is_running() {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

/// A cheque drawn on `account` by `drawer`
pub fn demo_cheque(
    notary: &NotaryId,
    drawer: &NymId,
    account: &AccountId,
    recipient: Option<NymId>,
    amount: i64,
) -> Cheque {
    Cheque {
        number: TransactionNumber(1),
        notary: notary.clone(),
        unit: unit(),
        sender_account: account.clone(),
        sender_nym: drawer.clone(),
        recipient,
        amount: Amount(amount),
        memo: "demo cheque".to_string(),
    }
}

/// States an operation of `category` is expected to visit, in order
pub fn expected_path(category: Category) -> Vec<State> {
    use State::*;

    match category {
        Category::Basic => vec![NymboxPre, Execute, NymboxPost, Idle],
        Category::Transaction => vec![
            NymboxPre,
            TransactionNumbers,
            AccountPre,
            Execute,
            AccountPost,
            NymboxPost,
            Idle,
        ],
        Category::UpdateAccount => vec![
            NymboxPre,
            TransactionNumbers,
            AccountPre,
            Execute,
            NymboxPost,
            Idle,
        ],
        Category::CreateAccount => vec![NymboxPre, Execute, AccountPost, NymboxPost, Idle],
        Category::NymboxPre | Category::NymboxPost => vec![NymboxPre, Execute, NymboxPost, Idle],
    }
}
