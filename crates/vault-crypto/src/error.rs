use thiserror::Error;

/// Errors surfaced by the vault encryption engine.
///
/// The variants distinguish what a caller can meaningfully react to:
/// a wrong passphrase is recoverable by asking the user again, a failed
/// content MAC is a warning the UI must surface, and everything else that
/// indicates corrupted or tampered ciphertext collapses into
/// [`CryptoError::DecryptFailed`].
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The keyfile unwrap integrity check failed.
    ///
    /// Produced solely by the RFC 3394 key-unwrap step, which covers both
    /// a wrong passphrase and a tampered keyfile; cryptographically the two
    /// are indistinguishable.
    #[error("wrong passphrase")]
    WrongPassword,

    /// The keyfile declares a key length this build cannot express.
    #[error("unsupported key length: {declared} bits (maximum {max})")]
    UnsupportedKeyLength { declared: u32, max: u32 },

    /// Ciphertext integrity or structure fault at read time.
    ///
    /// Covers filename authentication failures, malformed long-name
    /// components, missing sidecar entries and malformed persisted records.
    #[error("decryption failed: {0}")]
    DecryptFailed(String),

    /// The content HMAC did not match the stored tag.
    ///
    /// Raised *after* the decrypted bytes have been delivered, so a caller
    /// can still salvage data from non-malicious bit rot. Treat as a
    /// [`CryptoError::DecryptFailed`] with salvageable output.
    #[error("content MAC verification failed")]
    MacAuthenticationFailed,

    /// The engine's keys have been destroyed via `zeroize_keys`.
    #[error("engine keys have been destroyed")]
    KeysDestroyed,

    /// I/O error from the channel or metadata collaborator, unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_condition() {
        assert_eq!(CryptoError::WrongPassword.to_string(), "wrong passphrase");
        let err = CryptoError::UnsupportedKeyLength {
            declared: 512,
            max: 256,
        };
        assert_eq!(
            err.to_string(),
            "unsupported key length: 512 bits (maximum 256)"
        );
    }

    #[test]
    fn io_errors_pass_through() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short header");
        let err: CryptoError = io.into();
        assert!(matches!(err, CryptoError::Io(_)));
        assert!(err.to_string().contains("short header"));
    }
}
