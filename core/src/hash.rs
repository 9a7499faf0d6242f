// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Consensus hash, the client/server synchronization checkpoint.
//!
//! The notary maintains a digest over each nym's nymbox (and account box)
//! state; the client tracks the last value it has reconciled against. A
//! mismatch is the signal that boxes must be downloaded before any
//! transaction is attempted.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha512_256};

/// Rolling digest over box state
#[derive(Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusHash([u8; 32]);

impl ConsensusHash {
    /// Create a new (empty) consensus hash
    pub const fn new() -> Self {
        Self([0u8; 32])
    }

    /// Compute a hash over a single payload
    pub fn digest(data: &[u8]) -> Self {
        let mut b = [0u8; 32];
        let r = Sha512_256::new().chain_update(data).finalize();
        b.copy_from_slice(r.as_ref());

        Self(b)
    }

    /// Update the hash with a new event, chaining over the prior state
    pub fn update(&mut self, data: &[u8]) -> &Self {
        let mut d = Sha512_256::new();

        // Prior state
        d.update(self.0);

        // New event
        d.update(data);

        self.0.copy_from_slice(d.finalize().as_ref());

        self
    }

    /// Fetch the raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Default for ConsensusHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Debug format [ConsensusHash] as hex
impl core::fmt::Debug for ConsensusHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Display [ConsensusHash] as hex
impl core::fmt::Display for ConsensusHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
