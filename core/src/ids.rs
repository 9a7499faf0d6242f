// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Strongly typed identifiers shared across the protocol engine.
//!
//! Nym, notary, account and unit identifiers are opaque strings minted by
//! the (out of scope) contract layer; transaction and request numbers are
//! notary-issued integers. Wrapping these keeps raw values from crossing
//! module boundaries.

use core::fmt::Display;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier string
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fetch the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = core::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identity (nym) identifier, a digest of the identity's key source
    NymId
);

string_id!(
    /// Notary (server) identifier
    NotaryId
);

string_id!(
    /// Asset account identifier, minted by the notary on registration
    AccountId
);

string_id!(
    /// Unit definition (asset contract) identifier
    UnitId
);

/// Single-use ticket required by the notary to accept a transaction
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TransactionNumber(pub u64);

impl Display for TransactionNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-nym monotonic request sequence number
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct RequestNumber(pub u64);

impl Display for RequestNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed value in the smallest denomination of an account's unit
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Debug, Serialize, Deserialize,
)]
pub struct Amount(pub i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Whether the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl core::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl core::ops::Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl core::ops::Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
