//! Cipher constructions shared by the codecs.
//!
//! Everything here is a thin, key-size-dispatched wrapper over the
//! RustCrypto implementations: AES-CTR with a full-block big-endian
//! counter, single-block AES-ECB for the size field, RFC 3394 key wrap,
//! RFC 5297 AES-SIV for filenames, HMAC-SHA-256 and the scrypt KEK
//! derivation. Key material arrives as validated 128/192/256-bit slices;
//! any other length is a bug upstream.

use aes::{Aes128, Aes192, Aes256};
use aes_kw::{KekAes128, KekAes192, KekAes256};
use aes_siv::siv::{Aes128Siv, Aes256Siv, Siv};
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use cmac::Cmac;
use ctr::Ctr128BE;
use hmac::Hmac;
use scrypt::{scrypt, Params};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, Result};
use crate::keys::KeyLength;
use crate::AES_BLOCK_LENGTH;

/// RFC 3394 adds one semiblock of integrity check data.
pub(crate) const KEY_WRAP_OVERHEAD: usize = 8;

pub(crate) type HmacSha256 = Hmac<Sha256>;

type Aes192Siv = Siv<Aes192, Cmac<Aes192>>;

/// AES-CTR stream cipher over the 16-byte counting IV.
///
/// The whole IV is the initial counter block and increments as a 128-bit
/// big-endian integer, which keeps the keystream compatible with files
/// whose IV stores the block counter in its last eight bytes.
pub(crate) enum AesCtr {
    Aes128(Ctr128BE<Aes128>),
    Aes192(Ctr128BE<Aes192>),
    Aes256(Ctr128BE<Aes256>),
}

impl AesCtr {
    pub(crate) fn new(key: &[u8], iv: &[u8; AES_BLOCK_LENGTH]) -> Self {
        let iv = GenericArray::from_slice(iv);
        match key.len() {
            16 => Self::Aes128(Ctr128BE::new(GenericArray::from_slice(key), iv)),
            24 => Self::Aes192(Ctr128BE::new(GenericArray::from_slice(key), iv)),
            32 => Self::Aes256(Ctr128BE::new(GenericArray::from_slice(key), iv)),
            n => unreachable!("master key length {n} is validated at construction"),
        }
    }

    pub(crate) fn apply_keystream(&mut self, buf: &mut [u8]) {
        match self {
            Self::Aes128(c) => c.apply_keystream(buf),
            Self::Aes192(c) => c.apply_keystream(buf),
            Self::Aes256(c) => c.apply_keystream(buf),
        }
    }
}

/// Single-block AES, used only for the encrypted size field.
pub(crate) enum AesEcb {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AesEcb {
    pub(crate) fn new(key: &[u8]) -> Self {
        match key.len() {
            16 => Self::Aes128(Aes128::new(GenericArray::from_slice(key))),
            24 => Self::Aes192(Aes192::new(GenericArray::from_slice(key))),
            32 => Self::Aes256(Aes256::new(GenericArray::from_slice(key))),
            n => unreachable!("master key length {n} is validated at construction"),
        }
    }

    pub(crate) fn encrypt_block(&self, block: &mut [u8; AES_BLOCK_LENGTH]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }

    pub(crate) fn decrypt_block(&self, block: &mut [u8; AES_BLOCK_LENGTH]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.decrypt_block(block),
            Self::Aes192(c) => c.decrypt_block(block),
            Self::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// HMAC-SHA-256 keyed with the secondary master key.
pub(crate) fn hmac_sha256(key: &[u8]) -> HmacSha256 {
    hmac::Mac::new_from_slice(key).expect("HMAC-SHA-256 accepts keys of any length")
}

/// Deterministic filename encryption, RFC 5297 with no associated data.
///
/// The combined SIV key is the S2V (CMAC) half followed by the CTR half,
/// i.e. `mac_key || ctr_key`; the split must not change, it is part of the
/// on-disk format.
pub(crate) fn siv_encrypt(ctr_key: &[u8], mac_key: &[u8], plaintext: &[u8]) -> Vec<u8> {
    match ctr_key.len() {
        16 => {
            let mut combined = Zeroizing::new([0u8; 32]);
            combined[..16].copy_from_slice(mac_key);
            combined[16..].copy_from_slice(ctr_key);
            let mut siv = Aes128Siv::new(GenericArray::from_slice(&combined[..]));
            siv.encrypt(no_headers(), plaintext)
                .expect("SIV encryption of an in-memory name cannot fail")
        }
        24 => {
            let mut combined = Zeroizing::new([0u8; 48]);
            combined[..24].copy_from_slice(mac_key);
            combined[24..].copy_from_slice(ctr_key);
            let mut siv = Aes192Siv::new(GenericArray::from_slice(&combined[..]));
            siv.encrypt(no_headers(), plaintext)
                .expect("SIV encryption of an in-memory name cannot fail")
        }
        32 => {
            let mut combined = Zeroizing::new([0u8; 64]);
            combined[..32].copy_from_slice(mac_key);
            combined[32..].copy_from_slice(ctr_key);
            let mut siv = Aes256Siv::new(GenericArray::from_slice(&combined[..]));
            siv.encrypt(no_headers(), plaintext)
                .expect("SIV encryption of an in-memory name cannot fail")
        }
        n => unreachable!("master key length {n} is validated at construction"),
    }
}

pub(crate) fn siv_decrypt(ctr_key: &[u8], mac_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let result = match ctr_key.len() {
        16 => {
            let mut combined = Zeroizing::new([0u8; 32]);
            combined[..16].copy_from_slice(mac_key);
            combined[16..].copy_from_slice(ctr_key);
            let mut siv = Aes128Siv::new(GenericArray::from_slice(&combined[..]));
            siv.decrypt(no_headers(), ciphertext)
        }
        24 => {
            let mut combined = Zeroizing::new([0u8; 48]);
            combined[..24].copy_from_slice(mac_key);
            combined[24..].copy_from_slice(ctr_key);
            let mut siv = Aes192Siv::new(GenericArray::from_slice(&combined[..]));
            siv.decrypt(no_headers(), ciphertext)
        }
        32 => {
            let mut combined = Zeroizing::new([0u8; 64]);
            combined[..32].copy_from_slice(mac_key);
            combined[32..].copy_from_slice(ctr_key);
            let mut siv = Aes256Siv::new(GenericArray::from_slice(&combined[..]));
            siv.decrypt(no_headers(), ciphertext)
        }
        n => unreachable!("master key length {n} is validated at construction"),
    };
    result.map_err(|_| CryptoError::DecryptFailed("filename authentication failed".into()))
}

fn no_headers() -> std::iter::Empty<&'static [u8]> {
    std::iter::empty()
}

/// RFC 3394 key wrap under a KEK of the same length as the wrapped key.
pub(crate) fn wrap_key(kek: &[u8], key: &[u8]) -> Vec<u8> {
    let mut wrapped = vec![0u8; key.len() + KEY_WRAP_OVERHEAD];
    let result = match kek.len() {
        16 => {
            let mut k = [0u8; 16];
            k.copy_from_slice(kek);
            let outcome = KekAes128::from(k).wrap(key, &mut wrapped);
            k.zeroize();
            outcome
        }
        24 => {
            let mut k = [0u8; 24];
            k.copy_from_slice(kek);
            let outcome = KekAes192::from(k).wrap(key, &mut wrapped);
            k.zeroize();
            outcome
        }
        32 => {
            let mut k = [0u8; 32];
            k.copy_from_slice(kek);
            let outcome = KekAes256::from(k).wrap(key, &mut wrapped);
            k.zeroize();
            outcome
        }
        n => unreachable!("KEK length {n} is validated at construction"),
    };
    result.expect("key wrap of validated key material cannot fail");
    wrapped
}

/// RFC 3394 key unwrap. An integrity check failure means the KEK was
/// derived from the wrong passphrase (or the keyfile was tampered with).
pub(crate) fn unwrap_key(kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if wrapped.len() <= KEY_WRAP_OVERHEAD || wrapped.len() % 8 != 0 {
        return Err(CryptoError::DecryptFailed(format!(
            "wrapped key has invalid length {}",
            wrapped.len()
        )));
    }
    let mut key = Zeroizing::new(vec![0u8; wrapped.len() - KEY_WRAP_OVERHEAD]);
    let result = match kek.len() {
        16 => {
            let mut k = [0u8; 16];
            k.copy_from_slice(kek);
            let outcome = KekAes128::from(k).unwrap(wrapped, &mut key);
            k.zeroize();
            outcome
        }
        24 => {
            let mut k = [0u8; 24];
            k.copy_from_slice(kek);
            let outcome = KekAes192::from(k).unwrap(wrapped, &mut key);
            k.zeroize();
            outcome
        }
        32 => {
            let mut k = [0u8; 32];
            k.copy_from_slice(kek);
            let outcome = KekAes256::from(k).unwrap(wrapped, &mut key);
            k.zeroize();
            outcome
        }
        n => unreachable!("KEK length {n} is validated at construction"),
    };
    match result {
        Ok(()) => Ok(key),
        Err(aes_kw::Error::IntegrityCheckFailed) => Err(CryptoError::WrongPassword),
        Err(e) => Err(CryptoError::DecryptFailed(format!("key unwrap: {e}"))),
    }
}

/// scrypt KEK derivation with parallelism fixed at 1.
///
/// `cost_param` is the keyfile's recorded N. Invalid persisted parameters
/// are a structure fault of the keyfile, not a programmer error.
pub(crate) fn derive_kek(
    passphrase: &str,
    salt: &[u8],
    cost_param: u32,
    block_size: u32,
    length: KeyLength,
) -> Result<Zeroizing<Vec<u8>>> {
    if cost_param < 2 || !cost_param.is_power_of_two() {
        return Err(CryptoError::DecryptFailed(format!(
            "invalid scrypt cost parameter {cost_param}"
        )));
    }
    let log_n = cost_param.trailing_zeros() as u8;
    let params = Params::new(log_n, block_size, 1, length.bytes())
        .map_err(|e| CryptoError::DecryptFailed(format!("invalid scrypt parameters: {e}")))?;
    let mut kek = Zeroizing::new(vec![0u8; length.bytes()]);
    scrypt(passphrase.as_bytes(), salt, &params, &mut kek)
        .map_err(|e| CryptoError::DecryptFailed(format!("scrypt derivation failed: {e}")))?;
    Ok(kek)
}
