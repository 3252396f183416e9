//! The engine: key state, per-instance CSPRNG and the operation surface.
//!
//! A `Cryptor` is a single-instance, caller-synchronized object with no
//! internal threads. Operations that only read key material take `&self`
//! and may run concurrently on disjoint channels; operations that consume
//! engine entropy or replace the keys take `&mut self`, so the borrow
//! checker enforces the serialization the format requires.

use std::io::{Read, Write};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::content;
use crate::error::{CryptoError, Result};
use crate::io::{CryptorIoSupport, SeekableByteChannel};
use crate::keyfile;
use crate::keys::{KeyLength, MasterKeys};
use crate::path;

/// Vault encryption engine holding the two master keys.
pub struct Cryptor {
    keys: Option<MasterKeys>,
    rng: StdRng,
}

impl Cryptor {
    /// Creates an engine with freshly generated 256-bit master keys and a
    /// CSPRNG seeded from the platform entropy source.
    pub fn new() -> Self {
        let mut rng = StdRng::from_entropy();
        let keys = MasterKeys::generate(&mut rng, KeyLength::PREFERRED);
        Self {
            keys: Some(keys),
            rng,
        }
    }

    fn keys(&self) -> Result<&MasterKeys> {
        self.keys.as_ref().ok_or(CryptoError::KeysDestroyed)
    }

    /// Wraps the master keys under a passphrase-derived KEK and writes the
    /// keyfile record to `out`.
    ///
    /// On failure `out` is left in an indeterminate partial state.
    pub fn encrypt_master_key<W: Write>(&mut self, out: W, passphrase: &str) -> Result<()> {
        let keys = self.keys.as_ref().ok_or(CryptoError::KeysDestroyed)?;
        keyfile::encrypt_master_key(keys, &mut self.rng, out, passphrase)
    }

    /// Restores master keys from a keyfile record.
    ///
    /// Distinguishes [`CryptoError::WrongPassword`] (unwrap integrity
    /// failure) from [`CryptoError::UnsupportedKeyLength`] and generic
    /// [`CryptoError::DecryptFailed`]. On success the new keys replace any
    /// prior ones, which are wiped as they drop. Must not overlap with any
    /// other operation on the same engine.
    pub fn decrypt_master_key<R: Read>(&mut self, input: R, passphrase: &str) -> Result<()> {
        let new_keys = keyfile::decrypt_master_key(input, passphrase)?;
        self.keys = Some(new_keys);
        Ok(())
    }

    /// Destroys both master keys. Every subsequent crypto operation fails
    /// with [`CryptoError::KeysDestroyed`] until a keyfile is decrypted
    /// into this engine again.
    pub fn zeroize_keys(&mut self) {
        if self.keys.take().is_some() {
            debug!("master keys destroyed");
        }
    }

    /// Encrypts a cleartext path component-wise.
    ///
    /// Splits by `cleartext_sep`, encrypts every component, joins with
    /// `encrypted_sep`. Long components may read and write a metadata
    /// sidecar through `io`.
    pub fn encrypt_path<S: CryptorIoSupport + ?Sized>(
        &mut self,
        cleartext_path: &str,
        encrypted_sep: char,
        cleartext_sep: char,
        io: &mut S,
    ) -> Result<String> {
        let keys = self.keys.as_ref().ok_or(CryptoError::KeysDestroyed)?;
        path::encrypt_path(
            keys,
            &mut self.rng,
            cleartext_path,
            encrypted_sep,
            cleartext_sep,
            io,
        )
    }

    /// Decrypts an encrypted path component-wise.
    pub fn decrypt_path<S: CryptorIoSupport + ?Sized>(
        &self,
        encrypted_path: &str,
        encrypted_sep: char,
        cleartext_sep: char,
        io: &S,
    ) -> Result<String> {
        path::decrypt_path(
            self.keys()?,
            encrypted_path,
            encrypted_sep,
            cleartext_sep,
            io,
        )
    }

    /// Encrypts a plaintext stream into the channel, replacing its
    /// contents. Returns the plaintext byte count.
    pub fn encrypt_file<R: Read, C: SeekableByteChannel + ?Sized>(
        &mut self,
        plaintext: R,
        channel: &mut C,
    ) -> Result<u64> {
        let keys = self.keys.as_ref().ok_or(CryptoError::KeysDestroyed)?;
        content::encrypt_file(keys, &mut self.rng, plaintext, channel)
    }

    /// Decrypts the whole file into `plaintext` and verifies the MAC.
    ///
    /// Raises [`CryptoError::MacAuthenticationFailed`] *after* the bytes
    /// have been delivered; single-pass reads and bit-rot salvage are the
    /// deliberate trade-off, the caller surfaces the warning.
    pub fn decrypt_file<C: SeekableByteChannel + ?Sized, W: Write>(
        &self,
        channel: &mut C,
        plaintext: W,
    ) -> Result<u64> {
        content::decrypt_file(self.keys()?, channel, plaintext)
    }

    /// Decrypts `length` bytes starting at plaintext offset `pos`, without
    /// MAC verification.
    pub fn decrypt_range<C: SeekableByteChannel + ?Sized, W: Write>(
        &self,
        channel: &mut C,
        plaintext: W,
        pos: u64,
        length: u64,
    ) -> Result<u64> {
        content::decrypt_range(self.keys()?, channel, plaintext, pos, length)
    }

    /// Verifies the stored content MAC in constant time.
    pub fn is_authentic<C: SeekableByteChannel + ?Sized>(&self, channel: &mut C) -> Result<bool> {
        content::is_authentic(self.keys()?, channel)
    }

    /// Decrypts the length field. `None` means the header could not be
    /// read in full; the value is unauthenticated either way.
    pub fn decrypted_content_length<C: SeekableByteChannel + ?Sized>(
        &self,
        channel: &mut C,
    ) -> Result<Option<u64>> {
        content::decrypted_content_length(self.keys()?, channel)
    }
}

impl Default for Cryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cryptor")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}
