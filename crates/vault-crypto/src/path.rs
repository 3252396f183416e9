//! Path codec: splits paths into components and delegates each one.
//!
//! Separator characters are configuration, not state: callers pass both
//! the cleartext and the encrypted separator per call. Empty components
//! are preserved so that leading or trailing separators round-trip.

use rand::rngs::StdRng;

use crate::error::Result;
use crate::filename;
use crate::io::CryptorIoSupport;
use crate::keys::MasterKeys;

pub(crate) fn encrypt_path<S: CryptorIoSupport + ?Sized>(
    keys: &MasterKeys,
    rng: &mut StdRng,
    cleartext_path: &str,
    encrypted_sep: char,
    cleartext_sep: char,
    io: &mut S,
) -> Result<String> {
    let mut encrypted = Vec::new();
    for component in cleartext_path.split(cleartext_sep) {
        if component.is_empty() {
            encrypted.push(String::new());
        } else {
            encrypted.push(filename::encrypt_component(keys, rng, component, io)?);
        }
    }
    Ok(encrypted.join(&encrypted_sep.to_string()))
}

pub(crate) fn decrypt_path<S: CryptorIoSupport + ?Sized>(
    keys: &MasterKeys,
    encrypted_path: &str,
    encrypted_sep: char,
    cleartext_sep: char,
    io: &S,
) -> Result<String> {
    let mut cleartext = Vec::new();
    for component in encrypted_path.split(encrypted_sep) {
        if component.is_empty() {
            cleartext.push(String::new());
        } else {
            cleartext.push(filename::decrypt_component(keys, component, io)?);
        }
    }
    Ok(cleartext.join(&cleartext_sep.to_string()))
}
