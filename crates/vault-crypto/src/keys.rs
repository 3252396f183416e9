//! Master key material and its lifecycle.
//!
//! An engine owns exactly two symmetric keys: the primary AES key and the
//! HMAC key. They are either drawn fresh from the engine CSPRNG or restored
//! from a keyfile, and both are wiped from memory when the holder drops.

use rand::rngs::StdRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Supported AES key lengths.
///
/// Generation always uses [`KeyLength::PREFERRED`]; the other lengths exist
/// so that vaults written under a constrained crypto policy stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLength {
    Bits128,
    Bits192,
    Bits256,
}

impl KeyLength {
    pub const PREFERRED: KeyLength = KeyLength::Bits256;

    /// Largest key length this build can express.
    pub const MAX_BITS: u32 = 256;

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            128 => Some(Self::Bits128),
            192 => Some(Self::Bits192),
            256 => Some(Self::Bits256),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Bits128 => 128,
            Self::Bits192 => 192,
            Self::Bits256 => 256,
        }
    }

    pub fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }
}

/// The two decrypted master keys, zeroized on drop.
///
/// Raw key bytes never cross the engine boundary; the accessors are
/// crate-internal feed lines for the cipher constructions.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct MasterKeys {
    primary: Vec<u8>,
    hmac: Vec<u8>,
    #[zeroize(skip)]
    length: KeyLength,
}

impl MasterKeys {
    /// Copies key bytes out of transient (zeroizing) buffers.
    pub(crate) fn new(primary: &[u8], hmac: &[u8], length: KeyLength) -> Self {
        debug_assert_eq!(primary.len(), length.bytes());
        debug_assert_eq!(hmac.len(), length.bytes());
        Self {
            primary: primary.to_vec(),
            hmac: hmac.to_vec(),
            length,
        }
    }

    /// Draws both keys directly from the engine CSPRNG.
    pub(crate) fn generate(rng: &mut StdRng, length: KeyLength) -> Self {
        let mut primary = vec![0u8; length.bytes()];
        let mut hmac = vec![0u8; length.bytes()];
        rng.fill_bytes(&mut primary);
        rng.fill_bytes(&mut hmac);
        Self {
            primary,
            hmac,
            length,
        }
    }

    /// Primary AES key (content bodies, size field, SIV CTR half).
    pub(crate) fn primary(&self) -> &[u8] {
        &self.primary
    }

    /// Secondary key (content HMAC, SIV S2V half).
    pub(crate) fn hmac(&self) -> &[u8] {
        &self.hmac
    }

    pub(crate) fn length(&self) -> KeyLength {
        self.length
    }
}

impl std::fmt::Debug for MasterKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKeys")
            .field("primary", &"[REDACTED]")
            .field("hmac", &"[REDACTED]")
            .field("length", &self.length)
            .finish()
    }
}
