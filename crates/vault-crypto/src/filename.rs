//! Filename codec: deterministic encryption of single path components.
//!
//! A component is SIV-encrypted, base32-encoded and suffixed with the basic
//! extension. Names whose encoded form would exceed the filesystem-safe
//! limit spill into the long-name protocol: the component is stored as
//! `<prefix><uuid>.lng.aes` and the full encoded name lives in a metadata
//! sidecar shared by all long names with the same prefix.
//!
//! Determinism is load-bearing: re-encrypting an existing name must produce
//! the same storage name, so lookups never depend on directory listings.

use data_encoding::BASE32;
use rand::rngs::StdRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CryptoError, Result};
use crate::io::CryptorIoSupport;
use crate::keys::MasterKeys;
use crate::primitives;

/// Extension of regular (short form) encrypted names.
pub const BASIC_FILE_EXT: &str = ".aes";

/// Extension of shortened (long form) encrypted names.
pub const LONG_NAME_FILE_EXT: &str = ".lng.aes";

/// Extension of the per-group metadata sidecar.
pub const METADATA_FILE_EXT: &str = ".meta";

/// Characters of the base32 form shared by a long-name group.
pub const LONG_NAME_PREFIX_LENGTH: usize = 8;

/// Upper bound for a storage name including its extension.
pub const ENCRYPTED_FILENAME_LENGTH_LIMIT: usize = 255;

/// Matches exactly the directory entries carrying encrypted payload,
/// excluding metadata sidecars.
pub fn is_payload_file(name: &str) -> bool {
    name.ends_with(BASIC_FILE_EXT) || name.ends_with(LONG_NAME_FILE_EXT)
}

/// Per-group mapping between shortening UUIDs and full encoded names.
///
/// Both directions are unique: an encoded name is assigned exactly one UUID
/// for the lifetime of the record, and every UUID resolves to exactly one
/// encoded name.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct LongFilenameMetadata {
    filenames: Vec<FilenameMapping>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FilenameMapping {
    uuid: Uuid,
    #[serde(rename = "encryptedFilename")]
    encrypted_filename: String,
}

impl LongFilenameMetadata {
    /// Reuses the existing UUID for `encrypted` or mints a new random one.
    fn uuid_for_encrypted_name(&mut self, encrypted: &str, rng: &mut StdRng) -> Uuid {
        if let Some(mapping) = self
            .filenames
            .iter()
            .find(|m| m.encrypted_filename == encrypted)
        {
            return mapping.uuid;
        }
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        self.filenames.push(FilenameMapping {
            uuid,
            encrypted_filename: encrypted.to_owned(),
        });
        uuid
    }

    fn encrypted_name_for(&self, uuid: Uuid) -> Option<&str> {
        self.filenames
            .iter()
            .find(|m| m.uuid == uuid)
            .map(|m| m.encrypted_filename.as_str())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.filenames.len()
    }
}

/// Encrypts one cleartext path component into its storage name.
pub(crate) fn encrypt_component<S: CryptorIoSupport + ?Sized>(
    keys: &MasterKeys,
    rng: &mut StdRng,
    cleartext: &str,
    io: &mut S,
) -> Result<String> {
    let siv_out = primitives::siv_encrypt(keys.primary(), keys.hmac(), cleartext.as_bytes());
    let encoded = BASE32.encode(&siv_out);

    if encoded.len() + BASIC_FILE_EXT.len() <= ENCRYPTED_FILENAME_LENGTH_LIMIT {
        return Ok(format!("{encoded}{BASIC_FILE_EXT}"));
    }

    let prefix = &encoded[..LONG_NAME_PREFIX_LENGTH];
    let metadata_name = format!("{prefix}{METADATA_FILE_EXT}");
    let mut metadata = load_metadata(io, &metadata_name)?;
    let uuid = metadata.uuid_for_encrypted_name(&encoded, rng);
    store_metadata(io, &metadata_name, &metadata)?;
    Ok(format!("{prefix}{uuid}{LONG_NAME_FILE_EXT}"))
}

/// Decrypts one storage name back into its cleartext component.
pub(crate) fn decrypt_component<S: CryptorIoSupport + ?Sized>(
    keys: &MasterKeys,
    encrypted: &str,
    io: &S,
) -> Result<String> {
    let encoded = if let Some(base) = encrypted.strip_suffix(LONG_NAME_FILE_EXT) {
        resolve_long_name(base, io)?
    } else if let Some(base) = strip_suffix_ignore_case(encrypted, BASIC_FILE_EXT) {
        base.to_owned()
    } else {
        return Err(CryptoError::DecryptFailed(format!(
            "unsupported path component: {encrypted}"
        )));
    };

    let siv_out = BASE32
        .decode(encoded.as_bytes())
        .map_err(|e| CryptoError::DecryptFailed(format!("invalid base32 name: {e}")))?;
    let cleartext = primitives::siv_decrypt(keys.primary(), keys.hmac(), &siv_out)?;
    String::from_utf8(cleartext)
        .map_err(|e| CryptoError::DecryptFailed(format!("decrypted name is not UTF-8: {e}")))
}

fn resolve_long_name<S: CryptorIoSupport + ?Sized>(base: &str, io: &S) -> Result<String> {
    let malformed = || CryptoError::DecryptFailed(format!("malformed long name: {base}"));
    let prefix = base.get(..LONG_NAME_PREFIX_LENGTH).ok_or_else(malformed)?;
    let uuid_str = base.get(LONG_NAME_PREFIX_LENGTH..).ok_or_else(malformed)?;
    let uuid = Uuid::parse_str(uuid_str).map_err(|_| malformed())?;

    let metadata_name = format!("{prefix}{METADATA_FILE_EXT}");
    let metadata = load_metadata(io, &metadata_name)?;
    metadata
        .encrypted_name_for(uuid)
        .map(str::to_owned)
        .ok_or_else(|| CryptoError::DecryptFailed(format!("unknown shortened name {uuid}")))
}

fn load_metadata<S: CryptorIoSupport + ?Sized>(io: &S, name: &str) -> Result<LongFilenameMetadata> {
    match io.read_path_specific_metadata(name)? {
        None => Ok(LongFilenameMetadata::default()),
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
            CryptoError::DecryptFailed(format!("malformed long-name metadata {name}: {e}"))
        }),
    }
}

fn store_metadata<S: CryptorIoSupport + ?Sized>(
    io: &mut S,
    name: &str,
    metadata: &LongFilenameMetadata,
) -> Result<()> {
    let bytes = serde_json::to_vec(metadata).map_err(std::io::Error::from)?;
    io.write_path_specific_metadata(name, &bytes)?;
    Ok(())
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    let head = value.get(..split)?;
    let tail = value.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyLength;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapIoSupport {
        blobs: HashMap<String, Vec<u8>>,
    }

    impl CryptorIoSupport for MapIoSupport {
        fn read_path_specific_metadata(&self, name: &str) -> std::io::Result<Option<Vec<u8>>> {
            Ok(self.blobs.get(name).cloned())
        }

        fn write_path_specific_metadata(
            &mut self,
            name: &str,
            content: &[u8],
        ) -> std::io::Result<()> {
            self.blobs.insert(name.to_owned(), content.to_vec());
            Ok(())
        }
    }

    fn fixture() -> (MasterKeys, StdRng, MapIoSupport) {
        let mut rng = StdRng::seed_from_u64(11);
        let keys = MasterKeys::generate(&mut rng, KeyLength::Bits256);
        (keys, rng, MapIoSupport::default())
    }

    #[test]
    fn short_names_roundtrip_and_are_deterministic() {
        let (keys, mut rng, mut io) = fixture();
        for name in ["hello.txt", "Üñíçødé ✓", "a"] {
            let one = encrypt_component(&keys, &mut rng, name, &mut io).unwrap();
            let two = encrypt_component(&keys, &mut rng, name, &mut io).unwrap();
            assert_eq!(one, two);
            assert!(one.ends_with(BASIC_FILE_EXT));
            assert_eq!(decrypt_component(&keys, &one, &io).unwrap(), name);
        }
        assert!(io.blobs.is_empty(), "short names must not touch metadata");
    }

    #[test]
    fn basic_extension_strips_case_insensitively() {
        let (keys, mut rng, mut io) = fixture();
        let encrypted = encrypt_component(&keys, &mut rng, "readme", &mut io).unwrap();
        let upper = format!(
            "{}{}",
            encrypted.trim_end_matches(BASIC_FILE_EXT),
            ".AES"
        );
        assert_eq!(decrypt_component(&keys, &upper, &io).unwrap(), "readme");
    }

    #[test]
    fn shortening_boundary_is_exact() {
        let (keys, mut rng, mut io) = fixture();

        // 139 cleartext bytes encode to 248 base32 chars, the largest short
        // form under the 255-char limit; 140 bytes tip over to 256 chars.
        let longest_short = "a".repeat(139);
        let shortest_long = "a".repeat(140);

        let short = encrypt_component(&keys, &mut rng, &longest_short, &mut io).unwrap();
        assert!(short.ends_with(BASIC_FILE_EXT));
        assert!(short.len() <= ENCRYPTED_FILENAME_LENGTH_LIMIT);
        assert_eq!(decrypt_component(&keys, &short, &io).unwrap(), longest_short);

        let long = encrypt_component(&keys, &mut rng, &shortest_long, &mut io).unwrap();
        assert!(long.ends_with(LONG_NAME_FILE_EXT));
        assert!(long.len() <= ENCRYPTED_FILENAME_LENGTH_LIMIT);
        assert_eq!(decrypt_component(&keys, &long, &io).unwrap(), shortest_long);
    }

    #[test]
    fn long_names_reuse_their_uuid() {
        let (keys, mut rng, mut io) = fixture();
        let name = "x".repeat(200);

        let first = encrypt_component(&keys, &mut rng, &name, &mut io).unwrap();
        assert_eq!(io.blobs.len(), 1);
        let sidecar = io.blobs.values().next().unwrap().clone();
        let metadata: LongFilenameMetadata = serde_json::from_slice(&sidecar).unwrap();
        assert_eq!(metadata.len(), 1);

        let second = encrypt_component(&keys, &mut rng, &name, &mut io).unwrap();
        assert_eq!(first, second);
        let metadata: LongFilenameMetadata =
            serde_json::from_slice(io.blobs.values().next().unwrap()).unwrap();
        assert_eq!(metadata.len(), 1, "re-encryption must not grow the sidecar");

        assert_eq!(decrypt_component(&keys, &first, &io).unwrap(), name);
    }

    #[test]
    fn sidecar_record_roundtrips_through_json() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut metadata = LongFilenameMetadata::default();
        let uuid = metadata.uuid_for_encrypted_name("SOMENAME", &mut rng);

        let bytes = serde_json::to_vec(&metadata).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"filenames\""));
        assert!(text.contains("\"encryptedFilename\":\"SOMENAME\""));

        let parsed: LongFilenameMetadata = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.encrypted_name_for(uuid), Some("SOMENAME"));
    }

    #[test]
    fn malformed_components_are_rejected() {
        let (keys, mut rng, mut io) = fixture();

        for bad in [
            "no-extension",
            "short.lng.aes",                // too short for a prefix
            "ABCDEFGHnot-a-uuid.lng.aes", // prefix present, UUID malformed
            "ABCDEFGä-rest.lng.aes",      // prefix boundary inside a multibyte char
        ] {
            let err = decrypt_component(&keys, bad, &io).unwrap_err();
            assert!(matches!(err, CryptoError::DecryptFailed(_)), "{bad}");
        }

        // Valid long form whose UUID is absent from the sidecar.
        let name = "y".repeat(200);
        let encrypted = encrypt_component(&keys, &mut rng, &name, &mut io).unwrap();
        io.blobs.clear();
        let err = decrypt_component(&keys, &encrypted, &io).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptFailed(_)));
    }

    #[test]
    fn tampered_short_name_fails_authentication() {
        let (keys, mut rng, mut io) = fixture();
        let encrypted = encrypt_component(&keys, &mut rng, "secret.txt", &mut io).unwrap();

        // Swap the first two base32 characters.
        let mut chars: Vec<char> = encrypted.chars().collect();
        if chars[0] == chars[1] {
            chars[1] = if chars[1] == 'A' { 'B' } else { 'A' };
        }
        chars.swap(0, 1);
        let tampered: String = chars.into_iter().collect();
        if tampered == encrypted {
            return;
        }

        let err = decrypt_component(&keys, &tampered, &io).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptFailed(_)));
    }

    #[test]
    fn payload_filter_matches_only_payload_entries() {
        assert!(is_payload_file("MZXW6YTBOI======.aes"));
        assert!(is_payload_file("ABCDEFGH550e8400-e29b-41d4-a716-446655440000.lng.aes"));
        assert!(!is_payload_file("ABCDEFGH.meta"));
        assert!(!is_payload_file("masterkey.json"));
        assert!(!is_payload_file("notes.txt"));
    }
}
