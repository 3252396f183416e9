//! # vault-crypto
//!
//! Client-side, zero-knowledge encryption engine for a virtual file vault.
//! Cleartext files and directory trees are stored as opaque encrypted files
//! inside an ordinary backing directory; only a holder of the user
//! passphrase can read names and contents.
//!
//! ## What this crate provides
//!
//! - **Keyfile codec**: the two master keys, AES-key-wrapped (RFC 3394)
//!   under a scrypt-derived KEK and persisted as a JSON record
//! - **Filename codec**: deterministic AES-SIV encryption of path
//!   components, base32-encoded, with a metadata sidecar protocol for
//!   names exceeding the filesystem-safe length limit
//! - **Content codec**: per-file AES-CTR streaming encryption with an
//!   HMAC-SHA-256 tag, an ECB-encrypted size field, block padding and
//!   randomized trailing fake blocks for size obfuscation
//! - **Random access**: seekable partial-range reads that re-seed the CTR
//!   counter instead of decrypting from the start
//!
//! ## What it does not provide
//!
//! The filesystem mount layer, UI, passphrase prompting and actual file
//! I/O live outside. The engine consumes a [`SeekableByteChannel`] per
//! encrypted file and a [`CryptorIoSupport`] callback for metadata
//! sidecars, both implemented by the hosting layer.
//!
//! ## Usage sketch
//!
//! ```rust
//! use std::io::Cursor;
//! use vault_crypto::Cryptor;
//!
//! let mut cryptor = Cryptor::new();
//!
//! let mut keyfile = Vec::new();
//! cryptor.encrypt_master_key(&mut keyfile, "correct horse battery staple")?;
//!
//! let mut channel = Cursor::new(Vec::new());
//! cryptor.encrypt_file(&b"attack at dawn"[..], &mut channel)?;
//!
//! let mut plaintext = Vec::new();
//! cryptor.decrypt_file(&mut channel, &mut plaintext)?;
//! assert_eq!(plaintext, b"attack at dawn");
//! # Ok::<(), vault_crypto::CryptoError>(())
//! ```
//!
//! ## Security model
//!
//! The on-disk formats are fixed; there is no version byte and
//! compatibility is by position. The content MAC is verified *after* the
//! plaintext has been streamed out (single-pass reads, bit-rot salvage);
//! range reads skip it entirely. Key material is zeroized on drop and on
//! [`Cryptor::zeroize_keys`].

mod content;
mod cryptor;
pub mod error;
mod filename;
pub mod io;
mod keyfile;
mod keys;
mod path;
mod primitives;

pub use cryptor::Cryptor;
pub use error::{CryptoError, Result};
pub use filename::{
    is_payload_file, BASIC_FILE_EXT, ENCRYPTED_FILENAME_LENGTH_LIMIT, LONG_NAME_FILE_EXT,
    LONG_NAME_PREFIX_LENGTH, METADATA_FILE_EXT,
};
pub use io::{CryptorIoSupport, SeekableByteChannel};
pub use keys::KeyLength;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// AES block length in bytes.
pub const AES_BLOCK_LENGTH: usize = 16;

/// HMAC-SHA-256 tag length in bytes.
pub const MAC_LENGTH: usize = 32;

/// Fixed header length of an encrypted file: IV, MAC and size field.
pub const HEADER_LENGTH: u64 = 64;

/// scrypt salt length in bytes.
pub const SCRYPT_SALT_LENGTH: usize = 8;

/// scrypt cost parameter N recorded in freshly written keyfiles.
pub const SCRYPT_COST_PARAM: u32 = 1 << 14;

/// scrypt block size recorded in freshly written keyfiles.
pub const SCRYPT_BLOCK_SIZE: u32 = 8;
