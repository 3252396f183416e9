//! Content codec: the per-file encrypted format.
//!
//! On-disk layout, offsets in bytes:
//!
//! | offset | length | contents                                            |
//! |--------|--------|-----------------------------------------------------|
//! | 0      | 16     | counting IV (8 random bytes ‖ big-endian block ctr) |
//! | 16     | 32     | HMAC-SHA-256 over bytes `[64, end)`                 |
//! | 48     | 16     | AES-ECB encrypted plaintext length                  |
//! | 64     | n·16   | AES-CTR ciphertext: plaintext ‖ padding ‖ fakes     |
//!
//! There is no version byte; compatibility is by position. Writers leave a
//! zero-length header in place while streaming so that racing readers see a
//! well-formed empty file instead of garbage, and only stamp the real MAC
//! and length once the body is complete.

use std::io::{self, Read, Write};

use rand::rngs::StdRng;
use rand::{Rng, RngCore};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::{CryptoError, Result};
use crate::io::{ChannelReader, ChannelWriter, CtrReader, CtrWriter, MacReader, MacWriter};
use crate::io::SeekableByteChannel;
use crate::keys::MasterKeys;
use crate::primitives::{hmac_sha256, AesCtr, AesEcb};
use crate::{AES_BLOCK_LENGTH, HEADER_LENGTH, MAC_LENGTH};

const MAC_OFFSET: u64 = 16;
const CONTENT_LENGTH_OFFSET: u64 = 48;
const ZERO_BLOCK: [u8; AES_BLOCK_LENGTH] = [0u8; AES_BLOCK_LENGTH];

/// Reads and decrypts the length field at offset 48.
///
/// Returns `None` when fewer than 16 bytes are available (truncated or
/// still-initializing file); a successfully decrypted zero is `Some(0)`.
/// The value is unauthenticated — verify the MAC before trusting it.
pub(crate) fn decrypted_content_length<C: SeekableByteChannel + ?Sized>(
    keys: &MasterKeys,
    channel: &mut C,
) -> Result<Option<u64>> {
    channel.seek_to(CONTENT_LENGTH_OFFSET)?;
    let mut block = [0u8; AES_BLOCK_LENGTH];
    let mut filled = 0;
    while filled < block.len() {
        let n = channel.read(&mut block[filled..])?;
        if n == 0 {
            return Ok(None);
        }
        filled += n;
    }

    AesEcb::new(keys.primary()).decrypt_block(&mut block);
    let mut length_bytes = [0u8; 8];
    length_bytes.copy_from_slice(&block[..8]);
    let length = i64::from_be_bytes(length_bytes);
    u64::try_from(length)
        .map(Some)
        .map_err(|_| CryptoError::DecryptFailed(format!("negative content length {length}")))
}

/// Encrypts `length` into the zero-padded ECB block at offset 48.
fn write_content_length<C: SeekableByteChannel + ?Sized>(
    keys: &MasterKeys,
    channel: &mut C,
    length: u64,
) -> Result<()> {
    let mut block = ZERO_BLOCK;
    block[..8].copy_from_slice(&(length as i64).to_be_bytes());
    AesEcb::new(keys.primary()).encrypt_block(&mut block);
    channel.seek_to(CONTENT_LENGTH_OFFSET)?;
    write_all(channel, &block)
}

/// Encrypts a plaintext stream into the channel. Returns the plaintext size.
///
/// The body is padded to a block boundary and extended by a random number
/// of fake blocks so the ciphertext length does not reveal the plaintext
/// length beyond the encrypted size field.
pub(crate) fn encrypt_file<R: Read, C: SeekableByteChannel + ?Sized>(
    keys: &MasterKeys,
    rng: &mut StdRng,
    mut plaintext: R,
    channel: &mut C,
) -> Result<u64> {
    channel.truncate(0)?;
    channel.seek_to(0)?;

    let mut iv = [0u8; AES_BLOCK_LENGTH];
    rng.fill_bytes(&mut iv);
    iv[AES_BLOCK_LENGTH - 8..].copy_from_slice(&0u64.to_be_bytes());
    write_all(channel, &iv)?;

    // MAC placeholder, overwritten after the body is complete.
    write_all(channel, &[0u8; MAC_LENGTH])?;

    // Zero-length placeholder keeps racing readers on a well-formed file.
    write_content_length(keys, channel, 0)?;

    let cipher = AesCtr::new(keys.primary(), &iv);
    let mac = hmac_sha256(keys.hmac());
    let mut body = CtrWriter::new(
        MacWriter::new(ChannelWriter::new(&mut *channel), mac),
        cipher,
    );

    let plaintext_size = io::copy(&mut plaintext, &mut body)?;

    // Fill the last block, then obscure the block count.
    let padding = AES_BLOCK_LENGTH - (plaintext_size % AES_BLOCK_LENGTH as u64) as usize;
    body.write_all(&ZERO_BLOCK[..padding])?;

    let plaintext_blocks = plaintext_size.div_ceil(AES_BLOCK_LENGTH as u64);
    let fake_blocks = rng.gen_range(0..=plaintext_blocks.div_ceil(10));
    for _ in 0..fake_blocks {
        body.write_all(&ZERO_BLOCK)?;
    }
    body.flush()?;

    let tag = body.into_inner().into_tag();
    channel.seek_to(MAC_OFFSET)?;
    write_all(channel, &tag)?;
    write_content_length(keys, channel, plaintext_size)?;

    debug!(bytes = plaintext_size, fake_blocks, "file content encrypted");
    Ok(plaintext_size)
}

/// Decrypts the whole file into `plaintext`. Returns the byte count.
///
/// The MAC is compared in constant time after the full ciphertext
/// (padding and fake blocks included) has been drained. On mismatch the
/// decrypted bytes have already been delivered; the error tells the caller
/// to distrust them, it does not undo the write.
pub(crate) fn decrypt_file<C: SeekableByteChannel + ?Sized, W: Write>(
    keys: &MasterKeys,
    channel: &mut C,
    mut plaintext: W,
) -> Result<u64> {
    channel.seek_to(0)?;
    let mut iv = [0u8; AES_BLOCK_LENGTH];
    read_exact_header(channel, &mut iv)?;
    let mut stored_tag = [0u8; MAC_LENGTH];
    read_exact_header(channel, &mut stored_tag)?;

    let content_length = decrypted_content_length(keys, channel)?
        .ok_or_else(|| CryptoError::Io(header_eof()))?;

    channel.seek_to(HEADER_LENGTH)?;
    let mut tapped = MacReader::new(ChannelReader::new(&mut *channel), hmac_sha256(keys.hmac()));
    let mut body = CtrReader::new(&mut tapped, AesCtr::new(keys.primary(), &iv));

    let copied = io::copy(&mut (&mut body).take(content_length), &mut plaintext)?;
    drop(body);

    // Drain padding and fake blocks so the tap sees the full ciphertext.
    io::copy(&mut tapped, &mut io::sink())?;

    let computed = tapped.into_tag();
    if !bool::from(computed[..].ct_eq(&stored_tag[..])) {
        return Err(CryptoError::MacAuthenticationFailed);
    }
    Ok(copied)
}

/// Decrypts `length` bytes starting at plaintext offset `pos`.
///
/// Seeks directly to the containing block and re-seeds the CTR counter, so
/// the cost is proportional to the requested range. The MAC is not checked;
/// callers needing integrity must authenticate the file separately.
pub(crate) fn decrypt_range<C: SeekableByteChannel + ?Sized, W: Write>(
    keys: &MasterKeys,
    channel: &mut C,
    mut plaintext: W,
    pos: u64,
    length: u64,
) -> Result<u64> {
    channel.seek_to(0)?;
    let mut iv = [0u8; AES_BLOCK_LENGTH];
    read_exact_header(channel, &mut iv)?;

    let first_block = pos / AES_BLOCK_LENGTH as u64;
    let block_start = first_block * AES_BLOCK_LENGTH as u64;
    let offset_in_block = pos - block_start;
    iv[AES_BLOCK_LENGTH - 8..].copy_from_slice(&first_block.to_be_bytes());

    channel.seek_to(HEADER_LENGTH + block_start)?;
    let mut body = CtrReader::new(
        ChannelReader::new(&mut *channel),
        AesCtr::new(keys.primary(), &iv),
    );

    io::copy(&mut (&mut body).take(offset_in_block), &mut io::sink())?;
    let copied = io::copy(&mut body.take(length), &mut plaintext)?;
    Ok(copied)
}

/// Verifies the stored MAC against the full ciphertext.
pub(crate) fn is_authentic<C: SeekableByteChannel + ?Sized>(
    keys: &MasterKeys,
    channel: &mut C,
) -> Result<bool> {
    channel.seek_to(MAC_OFFSET)?;
    let mut stored_tag = [0u8; MAC_LENGTH];
    read_exact_header(channel, &mut stored_tag)?;

    channel.seek_to(HEADER_LENGTH)?;
    let mut tapped = MacReader::new(ChannelReader::new(&mut *channel), hmac_sha256(keys.hmac()));
    io::copy(&mut tapped, &mut io::sink())?;

    let computed = tapped.into_tag();
    Ok(bool::from(computed[..].ct_eq(&stored_tag[..])))
}

fn read_exact_header<C: SeekableByteChannel + ?Sized>(
    channel: &mut C,
    buf: &mut [u8],
) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = channel.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(header_eof());
        }
        filled += n;
    }
    Ok(())
}

fn header_eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "failed to read file header")
}

fn write_all<C: SeekableByteChannel + ?Sized>(channel: &mut C, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = channel.write(buf)?;
        if n == 0 {
            return Err(CryptoError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "channel refused to accept bytes",
            )));
        }
        buf = &buf[n..];
    }
    Ok(())
}
