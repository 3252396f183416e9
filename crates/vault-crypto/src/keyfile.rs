//! Keyfile codec: the passphrase-protected record of the master keys.
//!
//! The persisted document is a single JSON object whose field set is part
//! of the on-disk contract; byte strings use standard base64 and the scrypt
//! parameters are recorded so old keyfiles keep deriving the same KEK.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::StdRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CryptoError, Result};
use crate::keys::{KeyLength, MasterKeys};
use crate::primitives::{self, KEY_WRAP_OVERHEAD};
use crate::{SCRYPT_BLOCK_SIZE, SCRYPT_COST_PARAM, SCRYPT_SALT_LENGTH};

/// Field names are fixed; do not rename.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct KeyFile {
    #[serde(rename = "scryptSalt")]
    scrypt_salt: String,
    #[serde(rename = "scryptCostParam")]
    scrypt_cost_param: u32,
    #[serde(rename = "scryptBlockSize")]
    scrypt_block_size: u32,
    #[serde(rename = "keyLength")]
    key_length: u32,
    #[serde(rename = "primaryMasterKey")]
    primary_master_key: String,
    #[serde(rename = "hMacMasterKey")]
    hmac_master_key: String,
}

/// Wraps both master keys under a fresh passphrase-derived KEK and writes
/// the keyfile record to `out`.
pub(crate) fn encrypt_master_key<W: Write>(
    keys: &MasterKeys,
    rng: &mut StdRng,
    mut out: W,
    passphrase: &str,
) -> Result<()> {
    let mut salt = [0u8; SCRYPT_SALT_LENGTH];
    rng.fill_bytes(&mut salt);
    let kek = primitives::derive_kek(
        passphrase,
        &salt,
        SCRYPT_COST_PARAM,
        SCRYPT_BLOCK_SIZE,
        keys.length(),
    )?;

    let keyfile = KeyFile {
        scrypt_salt: BASE64.encode(salt),
        scrypt_cost_param: SCRYPT_COST_PARAM,
        scrypt_block_size: SCRYPT_BLOCK_SIZE,
        key_length: keys.length().bits(),
        primary_master_key: BASE64.encode(primitives::wrap_key(&kek, keys.primary())),
        hmac_master_key: BASE64.encode(primitives::wrap_key(&kek, keys.hmac())),
    };

    serde_json::to_writer(&mut out, &keyfile).map_err(std::io::Error::from)?;
    out.flush()?;
    Ok(())
}

/// Parses a keyfile record and unwraps both master keys.
///
/// A failed unwrap integrity check surfaces as [`CryptoError::WrongPassword`];
/// every structural defect of the record is [`CryptoError::DecryptFailed`].
pub(crate) fn decrypt_master_key<R: Read>(input: R, passphrase: &str) -> Result<MasterKeys> {
    let keyfile: KeyFile = serde_json::from_reader(input).map_err(|e| {
        if e.is_io() {
            CryptoError::Io(e.into())
        } else {
            CryptoError::DecryptFailed(format!("malformed keyfile: {e}"))
        }
    })?;

    let length = keyfile.validated_key_length()?;

    let salt = decode_field(&keyfile.scrypt_salt, "scryptSalt")?;
    let wrapped_primary = decode_field(&keyfile.primary_master_key, "primaryMasterKey")?;
    let wrapped_hmac = decode_field(&keyfile.hmac_master_key, "hMacMasterKey")?;

    let expected = length.bytes() + KEY_WRAP_OVERHEAD;
    if wrapped_primary.len() != expected || wrapped_hmac.len() != expected {
        return Err(CryptoError::DecryptFailed(format!(
            "wrapped key length inconsistent with declared {} bit keys",
            length.bits()
        )));
    }

    let kek = primitives::derive_kek(
        passphrase,
        &salt,
        keyfile.scrypt_cost_param,
        keyfile.scrypt_block_size,
        length,
    )?;

    let primary = primitives::unwrap_key(&kek, &wrapped_primary)?;
    let hmac = primitives::unwrap_key(&kek, &wrapped_hmac)?;
    debug!(key_length = length.bits(), "master keys unwrapped");
    Ok(MasterKeys::new(&primary, &hmac, length))
}

impl KeyFile {
    fn validated_key_length(&self) -> Result<KeyLength> {
        KeyLength::from_bits(self.key_length).ok_or(CryptoError::UnsupportedKeyLength {
            declared: self.key_length,
            max: KeyLength::MAX_BITS,
        })
    }
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| CryptoError::DecryptFailed(format!("keyfile field {field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn test_rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn fresh_keys(rng: &mut StdRng) -> MasterKeys {
        MasterKeys::generate(rng, KeyLength::Bits256)
    }

    #[test]
    fn roundtrip_restores_identical_keys() {
        let mut rng = test_rng();
        let keys = fresh_keys(&mut rng);

        let mut blob = Vec::new();
        encrypt_master_key(&keys, &mut rng, &mut blob, "le pass phrase").unwrap();

        let restored = decrypt_master_key(blob.as_slice(), "le pass phrase").unwrap();
        assert_eq!(restored.primary(), keys.primary());
        assert_eq!(restored.hmac(), keys.hmac());
        assert_eq!(restored.length(), KeyLength::Bits256);
    }

    #[test]
    fn wrong_passphrase_is_distinguished() {
        let mut rng = test_rng();
        let keys = fresh_keys(&mut rng);

        let mut blob = Vec::new();
        encrypt_master_key(&keys, &mut rng, &mut blob, "correct").unwrap();

        let err = decrypt_master_key(blob.as_slice(), "Correct").unwrap_err();
        assert!(matches!(err, CryptoError::WrongPassword));
    }

    #[test]
    fn emitted_record_uses_contract_field_names() {
        let mut rng = test_rng();
        let keys = fresh_keys(&mut rng);

        let mut blob = Vec::new();
        encrypt_master_key(&keys, &mut rng, &mut blob, "pw").unwrap();
        let text = String::from_utf8(blob).unwrap();

        for field in [
            "scryptSalt",
            "scryptCostParam",
            "scryptBlockSize",
            "keyLength",
            "primaryMasterKey",
            "hMacMasterKey",
        ] {
            assert!(text.contains(field), "missing field {field}");
        }
        assert!(text.contains("\"keyLength\":256"));
    }

    #[test]
    fn oversized_key_length_is_rejected_before_kdf() {
        let record = r#"{
            "scryptSalt": "AAAAAAAAAAA=",
            "scryptCostParam": 16384,
            "scryptBlockSize": 8,
            "keyLength": 512,
            "primaryMasterKey": "AAAA",
            "hMacMasterKey": "AAAA"
        }"#;
        let err = decrypt_master_key(record.as_bytes(), "pw").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::UnsupportedKeyLength {
                declared: 512,
                max: 256
            }
        ));
    }

    #[test]
    fn malformed_record_is_a_decrypt_failure() {
        let err = decrypt_master_key(&b"not json"[..], "pw").unwrap_err();
        assert!(matches!(err, CryptoError::DecryptFailed(_)));

        let missing = r#"{"scryptSalt": "AAAA"}"#;
        let err = decrypt_master_key(missing.as_bytes(), "pw").unwrap_err();
        assert!(matches!(err, CryptoError::DecryptFailed(_)));
    }

    #[test]
    fn inconsistent_wrapped_key_length_is_rejected() {
        let mut rng = test_rng();
        let keys = MasterKeys::generate(&mut rng, KeyLength::Bits128);

        let mut blob = Vec::new();
        encrypt_master_key(&keys, &mut rng, &mut blob, "pw").unwrap();

        // Declare 256-bit keys over 128-bit wrapped payloads.
        let text = String::from_utf8(blob).unwrap();
        let text = text.replace("\"keyLength\":128", "\"keyLength\":256");
        let err = decrypt_master_key(text.as_bytes(), "pw").unwrap_err();
        assert!(matches!(err, CryptoError::DecryptFailed(_)));
    }
}
