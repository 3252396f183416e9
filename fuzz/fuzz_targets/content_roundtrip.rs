#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use vault_crypto::Cryptor;

fuzz_target!(|data: &[u8]| {
    let mut cryptor = Cryptor::new();

    let mut channel = Cursor::new(Vec::new());
    let written = cryptor
        .encrypt_file(data, &mut channel)
        .expect("in-memory encryption must succeed");
    assert_eq!(written, data.len() as u64);

    let mut plaintext = Vec::new();
    let read = cryptor
        .decrypt_file(&mut channel, &mut plaintext)
        .expect("authentic ciphertext must decrypt");
    assert_eq!(read, data.len() as u64);
    assert_eq!(plaintext, data);

    if !data.is_empty() {
        let pos = (data.len() / 2) as u64;
        let mut range = Vec::new();
        cryptor
            .decrypt_range(&mut channel, &mut range, pos, u64::MAX - pos)
            .expect("range reads never fail on authentic files");
        assert_eq!(&range[..data.len() - pos as usize], &data[pos as usize..]);
    }
});
