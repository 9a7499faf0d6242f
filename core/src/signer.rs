// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Signing interface to the credential layer.
//!
//! Key management, credential verification and the signature algorithm are
//! owned by the (out of scope) credential subsystem; the engine only needs
//! "sign these bytes as the operating nym".

use serde::{Deserialize, Serialize};

/// Opaque detached signature over a payload
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Debug format [Signature] as hex
impl core::fmt::Debug for Signature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// [`Signer`] trait provides credential support for command construction
pub trait Signer: Send + Sync {
    /// Sign a payload with the operating nym's active credential
    fn sign(&self, payload: &[u8]) -> Signature;
}

impl<T: Signer + ?Sized> Signer for &T {
    fn sign(&self, payload: &[u8]) -> Signature {
        T::sign(self, payload)
    }
}
