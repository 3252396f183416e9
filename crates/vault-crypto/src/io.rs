//! Collaborator seams and streaming adapters.
//!
//! The engine never touches the filesystem directly. It consumes two
//! abstractions from the hosting layer: a [`SeekableByteChannel`] over one
//! encrypted file and a [`CryptorIoSupport`] callback for the small
//! metadata sidecars of the long-name protocol. The adapters in this module
//! turn a channel into `std::io` streams and insert MAC and CTR taps into
//! the byte flow.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use hmac::Mac;

use crate::primitives::{AesCtr, HmacSha256};

/// Byte-level random access to a single encrypted file.
///
/// Semantics match a POSIX file descriptor opened for read/write on a
/// regular file. `truncate` clamps the current position to the new size.
pub trait SeekableByteChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn position(&mut self) -> io::Result<u64>;
    fn seek_to(&mut self, position: u64) -> io::Result<()>;
    fn size(&mut self) -> io::Result<u64>;
    fn truncate(&mut self, size: u64) -> io::Result<()>;
}

impl SeekableByteChannel for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn seek_to(&mut self, position: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(position)).map(|_| ())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.set_len(size)?;
        if self.stream_position()? > size {
            self.seek(SeekFrom::Start(size))?;
        }
        Ok(())
    }
}

/// In-memory channel, mainly useful for tests and buffering layers.
impl SeekableByteChannel for Cursor<Vec<u8>> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(Cursor::position(self))
    }

    fn seek_to(&mut self, position: u64) -> io::Result<()> {
        self.set_position(position);
        Ok(())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.get_mut().truncate(size as usize);
        if Cursor::position(self) > size {
            self.set_position(size);
        }
        Ok(())
    }
}

/// Path-scoped metadata I/O provided by the hosting layer.
///
/// `name` is a sibling filename next to the encrypted file group, e.g. the
/// long-name metadata sidecar. Writes should use atomic-replace semantics.
/// Concurrent encrypts touching the same long-name group must be serialized
/// by the implementor (one lock per group prefix is sufficient).
pub trait CryptorIoSupport {
    /// Returns `None` if no metadata blob with that name exists yet.
    fn read_path_specific_metadata(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    fn write_path_specific_metadata(&mut self, name: &str, content: &[u8]) -> io::Result<()>;
}

/// `Read` view of a channel, starting at its current position.
pub(crate) struct ChannelReader<'a, C: SeekableByteChannel + ?Sized> {
    channel: &'a mut C,
}

impl<'a, C: SeekableByteChannel + ?Sized> ChannelReader<'a, C> {
    pub(crate) fn new(channel: &'a mut C) -> Self {
        Self { channel }
    }
}

impl<C: SeekableByteChannel + ?Sized> Read for ChannelReader<'_, C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }
}

/// `Write` view of a channel, starting at its current position.
pub(crate) struct ChannelWriter<'a, C: SeekableByteChannel + ?Sized> {
    channel: &'a mut C,
}

impl<'a, C: SeekableByteChannel + ?Sized> ChannelWriter<'a, C> {
    pub(crate) fn new(channel: &'a mut C) -> Self {
        Self { channel }
    }
}

impl<C: SeekableByteChannel + ?Sized> Write for ChannelWriter<'_, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.channel.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Feeds every byte read through the inner reader into a running HMAC.
pub(crate) struct MacReader<R: Read> {
    inner: R,
    mac: HmacSha256,
}

impl<R: Read> MacReader<R> {
    pub(crate) fn new(inner: R, mac: HmacSha256) -> Self {
        Self { inner, mac }
    }

    pub(crate) fn into_tag(self) -> [u8; 32] {
        self.mac.finalize().into_bytes().into()
    }
}

impl<R: Read> Read for MacReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.mac.update(&buf[..n]);
        Ok(n)
    }
}

/// Feeds every byte accepted by the inner writer into a running HMAC.
///
/// The tap observes bytes in exactly the order the inner writer accepts
/// them, including partial writes, so the tag always matches what reached
/// the channel.
pub(crate) struct MacWriter<W: Write> {
    inner: W,
    mac: HmacSha256,
}

impl<W: Write> MacWriter<W> {
    pub(crate) fn new(inner: W, mac: HmacSha256) -> Self {
        Self { inner, mac }
    }

    pub(crate) fn into_tag(self) -> [u8; 32] {
        self.mac.finalize().into_bytes().into()
    }
}

impl<W: Write> Write for MacWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.mac.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypting reader: yields the CTR keystream applied to the inner bytes.
pub(crate) struct CtrReader<R: Read> {
    inner: R,
    cipher: AesCtr,
}

impl<R: Read> CtrReader<R> {
    pub(crate) fn new(inner: R, cipher: AesCtr) -> Self {
        Self { inner, cipher }
    }
}

impl<R: Read> Read for CtrReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

/// Encrypting writer: applies the CTR keystream before passing bytes on.
pub(crate) struct CtrWriter<W: Write> {
    inner: W,
    cipher: AesCtr,
}

impl<W: Write> CtrWriter<W> {
    pub(crate) fn new(inner: W, cipher: AesCtr) -> Self {
        Self { inner, cipher }
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CtrWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut ciphertext = buf.to_vec();
        self.cipher.apply_keystream(&mut ciphertext);
        self.inner.write_all(&ciphertext)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::hmac_sha256;

    #[test]
    fn cursor_channel_truncate_clamps_position() {
        let mut chan = Cursor::new(vec![0u8; 100]);
        chan.seek_to(80).unwrap();
        chan.truncate(10).unwrap();
        assert_eq!(SeekableByteChannel::position(&mut chan).unwrap(), 10);
        assert_eq!(chan.size().unwrap(), 10);
    }

    #[test]
    fn cursor_channel_write_extends() {
        let mut chan = Cursor::new(Vec::new());
        chan.seek_to(4).unwrap();
        assert_eq!(std::io::Write::write(&mut chan, b"abcd").unwrap(), 4);
        assert_eq!(chan.size().unwrap(), 8);
        assert_eq!(&chan.get_ref()[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn file_channel_roundtrip() {
        let mut file = tempfile::tempfile().unwrap();
        {
            let chan: &mut dyn SeekableByteChannel = &mut file;
            chan.write(b"hello world").unwrap();
            chan.seek_to(6).unwrap();
            let mut buf = [0u8; 5];
            chan.read(&mut buf).unwrap();
            assert_eq!(&buf, b"world");
            chan.truncate(5).unwrap();
            assert_eq!(chan.size().unwrap(), 5);
            assert_eq!(chan.position().unwrap(), 5);
        }
    }

    #[test]
    fn mac_taps_agree_between_read_and_write() {
        let key = [7u8; 32];
        let payload = b"tap order must not depend on direction".to_vec();

        let mut sink = Vec::new();
        let mut writer = MacWriter::new(&mut sink, hmac_sha256(&key));
        writer.write_all(&payload).unwrap();
        let write_tag = writer.into_tag();

        let mut reader = MacReader::new(payload.as_slice(), hmac_sha256(&key));
        io::copy(&mut reader, &mut io::sink()).unwrap();
        let read_tag = reader.into_tag();

        assert_eq!(write_tag, read_tag);
        assert_eq!(sink, payload);
    }
}
