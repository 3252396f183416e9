#![no_main]

use libfuzzer_sys::fuzz_target;
use vault_crypto::{Cryptor, CryptorIoSupport};

struct NoMetadata;

impl CryptorIoSupport for NoMetadata {
    fn read_path_specific_metadata(&self, _name: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn write_path_specific_metadata(&mut self, _name: &str, _content: &[u8]) -> std::io::Result<()> {
        Ok(())
    }
}

// Arbitrary component strings must never panic the decoder, only error.
fuzz_target!(|data: &[u8]| {
    let Ok(component) = std::str::from_utf8(data) else {
        return;
    };
    let cryptor = Cryptor::new();
    let _ = cryptor.decrypt_path(component, ':', '/', &NoMetadata);
});
