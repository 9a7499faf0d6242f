// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Operation controller state enumeration.

use strum::{Display, EnumIter, EnumString, EnumVariantNames};

/// Controller states for a single operation.
///
/// `Idle` is both the initial and the only terminal state; an operation
/// instance is reusable once it returns to `Idle`. Which of the intermediate
/// states are visited is decided by the operation's
/// [`Category`][crate::Category].
#[derive(Copy, Clone, PartialEq, Eq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum State {
    /// Reconcile the nymbox hash before anything else
    NymboxPre,
    /// Ensure enough transaction numbers are reserved
    TransactionNumbers,
    /// Download and reconcile affected accounts before execution
    AccountPre,
    /// Build (or re-address) and submit the outgoing command
    Execute,
    /// Reconcile affected accounts after execution, converging resyncs
    AccountPost,
    /// Final nymbox sync
    NymboxPost,
    /// No operation running
    Idle,
}
