// # Chunked stream cipher
//
// Stateful authenticated encryption of a byte stream as a sequence of
// tagged chunks, wire-compatible with libsodium's
// crypto_secretstream_xchacha20poly1305. This is NOT a standard AEAD:
// each chunk is
//
//   encrypted_tag (1 byte) || ciphertext (p bytes) || MAC (16 bytes)
//
// and the MAC chains chunks together through the evolving nonce, so a
// decryptor rejects any reorder, truncation, or tamper.
//
// Construction per chunk:
// - subkey k = HChaCha20(stream_key, header[0..16]); the 12-byte ChaCha20
//   nonce is LE32 counter (starting at 1) || inonce, inonce seeded from
//   header[16..24].
// - Poly1305 key = first 32 bytes of ChaCha20 block 0.
// - The tag byte is encrypted inside a full 64-byte block at block 1; the
//   payload is encrypted starting at block 2.
// - MAC input: 64-byte tag block || ciphertext (zero-padded to 16) ||
//   LE64 ad length || LE64 (64 + payload length).
// - After each chunk, MAC[0..8] is XORed into the inonce and the counter
//   is incremented. A FINAL tag rekeys the state.
//
// Framing of a whole stream is handled by `encrypt_stream`: fixed 4 MiB
// reads, the chunk holding the last plaintext byte is tagged FINAL, and a
// stream whose length is an exact multiple of the chunk size gets an
// empty FINAL terminator after the last full MESSAGE chunk. The 24-byte
// header produced at init never appears in the ciphertext output; it
// travels separately in the catalog entry.

use std::io::{Read, Write};
use std::path::Path;

use chacha20::cipher::consts::U10;
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::{hchacha, ChaCha20};
use poly1305::universal_hash::{KeyInit, UniversalHash};
use poly1305::Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::SecretKey;

/// Plaintext read size for whole-stream encryption (4 MiB).
pub const PLAIN_CHUNK_BYTES: usize = 4 * 1024 * 1024;

/// Bytes added to every chunk: the encrypted tag plus the MAC.
pub const CHUNK_OVERHEAD: usize = 17;

/// Ciphertext read size for whole-stream decryption.
pub const CIPHER_CHUNK_BYTES: usize = PLAIN_CHUNK_BYTES + CHUNK_OVERHEAD;

/// Length of the stream header produced at encryptor creation.
pub const HEADER_BYTES: usize = 24;

const TAG_MESSAGE: u8 = 0x00;
const TAG_REKEY: u8 = 0x02;
const TAG_FINAL: u8 = 0x03;

/// Chunk tag as it appears on the wire (decrypted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkTag {
    /// An intermediate chunk; more chunks follow.
    Message,
    /// The last chunk of the stream.
    Final,
}

impl ChunkTag {
    fn to_byte(self) -> u8 {
        match self {
            ChunkTag::Message => TAG_MESSAGE,
            ChunkTag::Final => TAG_FINAL,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, StreamError> {
        match byte {
            TAG_MESSAGE => Ok(ChunkTag::Message),
            TAG_FINAL => Ok(ChunkTag::Final),
            other => Err(StreamError::UnknownTag(other)),
        }
    }
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream header must be {HEADER_BYTES} bytes, got {0}")]
    InvalidHeaderLength(usize),
    #[error("ciphertext chunk shorter than the {CHUNK_OVERHEAD}-byte chunk overhead")]
    CipherTooShort,
    #[error("chunk failed authentication")]
    Authentication,
    #[error("stream message counter overflowed")]
    CounterOverflow,
    #[error("unknown chunk tag {0:#04x}")]
    UnknownTag(u8),
    #[error("stream ended before a final chunk")]
    MissingFinal,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn hchacha20(key: &[u8; 32], input: &[u8; 16]) -> [u8; 32] {
    let derived = hchacha::<U10>(key.into(), input.into());
    let mut out = [0u8; 32];
    out.copy_from_slice(derived.as_slice());
    out
}

/// Shared push/pull state: derived subkey plus counter||inonce nonce.
#[derive(Zeroize, ZeroizeOnDrop)]
struct StreamState {
    key: [u8; 32],
    nonce: [u8; 12],
}

impl StreamState {
    fn init(key: &SecretKey, header: &[u8; HEADER_BYTES]) -> Self {
        let mut hchacha_input = [0u8; 16];
        hchacha_input.copy_from_slice(&header[..16]);

        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&1u32.to_le_bytes());
        nonce[4..].copy_from_slice(&header[16..]);

        StreamState {
            key: hchacha20(key.as_bytes(), &hchacha_input),
            nonce,
        }
    }

    fn counter(&self) -> u32 {
        u32::from_le_bytes(self.nonce[..4].try_into().expect("nonce counter is 4 bytes"))
    }

    /// Advance the nonce after a chunk: fold the MAC into the inonce and
    /// bump the counter. A tag carrying the rekey bit (FINAL does) rekeys;
    /// a plain counter wrap is an error surfaced to the caller.
    fn advance(&mut self, mac: &[u8], tag_byte: u8) -> Result<(), StreamError> {
        for i in 0..8 {
            self.nonce[4 + i] ^= mac[i];
        }
        let next = self.counter().wrapping_add(1);
        self.nonce[..4].copy_from_slice(&next.to_le_bytes());

        if tag_byte & TAG_REKEY != 0 {
            self.rekey();
        } else if next == 0 {
            return Err(StreamError::CounterOverflow);
        }
        Ok(())
    }

    fn rekey(&mut self) {
        let mut buf = [0u8; 40];
        buf[..32].copy_from_slice(&self.key);
        buf[32..].copy_from_slice(&self.nonce[4..]);

        let mut cipher = ChaCha20::new((&self.key).into(), (&self.nonce).into());
        cipher.apply_keystream(&mut buf);

        self.key.copy_from_slice(&buf[..32]);
        self.nonce[4..].copy_from_slice(&buf[32..]);
        self.nonce[..4].copy_from_slice(&1u32.to_le_bytes());

        buf.zeroize();
    }
}

/// Poly1305 over the chunk transcript. The lengths block is a single
/// 16-byte block holding both LE64 lengths, matching libsodium's layout.
fn chunk_mac(poly_key: &[u8; 32], tag_block: &[u8; 64], ciphertext: &[u8]) -> [u8; 16] {
    let mut poly = Poly1305::new(poly_key.into());
    poly.update_padded(tag_block);
    if !ciphertext.is_empty() {
        poly.update_padded(ciphertext);
    }

    let mut lengths = [0u8; 16];
    lengths[..8].copy_from_slice(&0u64.to_le_bytes());
    lengths[8..].copy_from_slice(&((64 + ciphertext.len()) as u64).to_le_bytes());
    poly.update_padded(&lengths);

    let mut mac = [0u8; 16];
    mac.copy_from_slice(poly.finalize().as_slice());
    mac
}

/// Stream encryptor. Created together with the 24-byte header the
/// matching decryptor needs.
pub struct StreamEncryptor {
    state: StreamState,
}

impl StreamEncryptor {
    /// Create an encryptor with a fresh random header.
    pub fn new(key: &SecretKey) -> (Self, [u8; HEADER_BYTES]) {
        let mut header = [0u8; HEADER_BYTES];
        OsRng.fill_bytes(&mut header);

        let encryptor = StreamEncryptor {
            state: StreamState::init(key, &header),
        };
        (encryptor, header)
    }

    /// Encrypt one chunk. Output length is `plaintext.len() + 17`.
    pub fn push(&mut self, plaintext: &[u8], tag: ChunkTag) -> Result<Vec<u8>, StreamError> {
        let mut cipher = ChaCha20::new((&self.state.key).into(), (&self.state.nonce).into());

        let mut block0 = [0u8; 64];
        cipher.apply_keystream(&mut block0);
        let mut poly_key = [0u8; 32];
        poly_key.copy_from_slice(&block0[..32]);
        block0.zeroize();

        let mut tag_block = [0u8; 64];
        tag_block[0] = tag.to_byte();
        cipher.seek(64u64);
        cipher.apply_keystream(&mut tag_block);
        let encrypted_tag = tag_block[0];

        cipher.seek(128u64);
        let mut ciphertext = plaintext.to_vec();
        cipher.apply_keystream(&mut ciphertext);

        let mac = chunk_mac(&poly_key, &tag_block, &ciphertext);
        poly_key.zeroize();

        let mut out = Vec::with_capacity(ciphertext.len() + CHUNK_OVERHEAD);
        out.push(encrypted_tag);
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&mac);

        self.state.advance(&mac, tag.to_byte())?;
        Ok(out)
    }
}

/// Stream decryptor, initialized from the header the encryptor produced.
pub struct StreamDecryptor {
    state: StreamState,
}

impl StreamDecryptor {
    pub fn new(header: &[u8], key: &SecretKey) -> Result<Self, StreamError> {
        let header: [u8; HEADER_BYTES] = header
            .try_into()
            .map_err(|_| StreamError::InvalidHeaderLength(header.len()))?;
        Ok(StreamDecryptor {
            state: StreamState::init(key, &header),
        })
    }

    /// Authenticate and decrypt one chunk, returning its plaintext and tag.
    pub fn pull(&mut self, chunk: &[u8]) -> Result<(Vec<u8>, ChunkTag), StreamError> {
        if chunk.len() < CHUNK_OVERHEAD {
            return Err(StreamError::CipherTooShort);
        }

        let payload_len = chunk.len() - CHUNK_OVERHEAD;
        let encrypted_tag = chunk[0];
        let ciphertext = &chunk[1..1 + payload_len];
        let stored_mac = &chunk[1 + payload_len..];

        let mut cipher = ChaCha20::new((&self.state.key).into(), (&self.state.nonce).into());

        let mut block0 = [0u8; 64];
        cipher.apply_keystream(&mut block0);
        let mut poly_key = [0u8; 32];
        poly_key.copy_from_slice(&block0[..32]);
        block0.zeroize();

        // Recover the tag byte, then restore the encrypted form: the MAC
        // covers the transcript as written, not the decrypted tag.
        let mut tag_block = [0u8; 64];
        tag_block[0] = encrypted_tag;
        cipher.seek(64u64);
        cipher.apply_keystream(&mut tag_block);
        let tag_byte = tag_block[0];
        tag_block[0] = encrypted_tag;

        let mac = chunk_mac(&poly_key, &tag_block, ciphertext);
        poly_key.zeroize();

        if mac.ct_eq(stored_mac).unwrap_u8() != 1 {
            return Err(StreamError::Authentication);
        }

        cipher.seek(128u64);
        let mut plaintext = ciphertext.to_vec();
        cipher.apply_keystream(&mut plaintext);

        self.state.advance(stored_mac, tag_byte)?;
        let tag = ChunkTag::from_byte(tag_byte)?;
        Ok((plaintext, tag))
    }
}

/// Fill `buf` from `source`, reading until it is full or EOF is reached.
/// Returns the number of bytes read; anything short of `buf.len()` means
/// the source is exhausted.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Encrypt a whole stream in 4 MiB chunks.
///
/// The chunk containing the last plaintext byte is tagged FINAL; a stream
/// whose length is an exact non-zero multiple of 4 MiB gets all full
/// chunks as MESSAGE followed by an empty FINAL terminator. Only chunk
/// bytes are written to `dest` - the returned header is not.
///
/// Returns the stream header and the number of ciphertext bytes written.
pub fn encrypt_stream<R: Read, W: Write>(
    source: &mut R,
    dest: &mut W,
    key: &SecretKey,
) -> Result<([u8; HEADER_BYTES], u64), StreamError> {
    let (mut encryptor, header) = StreamEncryptor::new(key);
    let mut buf = vec![0u8; PLAIN_CHUNK_BYTES];
    let mut written = 0u64;

    loop {
        let n = read_full(source, &mut buf)?;
        tracing::trace!(bytes = n, "read plaintext chunk");

        if n == buf.len() {
            let chunk = encryptor.push(&buf[..n], ChunkTag::Message)?;
            dest.write_all(&chunk)?;
            written += chunk.len() as u64;
        } else {
            // Short or empty read: the source is exhausted and this chunk
            // terminates the stream. The empty case covers both empty
            // input and exact-multiple lengths.
            let chunk = encryptor.push(&buf[..n], ChunkTag::Final)?;
            dest.write_all(&chunk)?;
            written += chunk.len() as u64;
            break;
        }
    }

    dest.flush()?;
    Ok((header, written))
}

/// Decrypt a stream produced by [`encrypt_stream`], writing plaintext to
/// `dest`. Fails if any chunk fails authentication or if the stream ends
/// without a FINAL chunk.
pub fn decrypt_stream<R: Read, W: Write>(
    source: &mut R,
    dest: &mut W,
    header: &[u8],
    key: &SecretKey,
) -> Result<u64, StreamError> {
    let mut decryptor = StreamDecryptor::new(header, key)?;
    let mut buf = vec![0u8; CIPHER_CHUNK_BYTES];
    let mut written = 0u64;

    loop {
        let n = read_full(source, &mut buf)?;
        if n == 0 {
            return Err(StreamError::MissingFinal);
        }

        let (plaintext, tag) = decryptor.pull(&buf[..n])?;
        dest.write_all(&plaintext)?;
        written += plaintext.len() as u64;

        if tag == ChunkTag::Final {
            break;
        }
    }

    dest.flush()?;
    Ok(written)
}

/// Encrypt `source` into `dest` on disk. Returns the stream header and
/// the encrypted file size.
pub fn encrypt_file(
    source: &Path,
    dest: &Path,
    key: &SecretKey,
) -> Result<([u8; HEADER_BYTES], u64), StreamError> {
    let mut reader = std::io::BufReader::new(std::fs::File::open(source)?);
    let mut writer = std::io::BufWriter::new(std::fs::File::create(dest)?);
    encrypt_stream(&mut reader, &mut writer, key)
}

/// Decrypt an encrypted file into `dest`. Returns the plaintext size.
pub fn decrypt_file(
    source: &Path,
    dest: &Path,
    header: &[u8],
    key: &SecretKey,
) -> Result<u64, StreamError> {
    let mut reader = std::io::BufReader::new(std::fs::File::open(source)?);
    let mut writer = std::io::BufWriter::new(std::fs::File::create(dest)?);
    decrypt_stream(&mut reader, &mut writer, header, key)
}

/// Encrypt a small in-memory buffer as a single FINAL chunk.
/// Used for thumbnails and serialized metadata.
pub fn encrypt_bytes(
    data: &[u8],
    key: &SecretKey,
) -> Result<(Vec<u8>, [u8; HEADER_BYTES]), StreamError> {
    let (mut encryptor, header) = StreamEncryptor::new(key);
    let chunk = encryptor.push(data, ChunkTag::Final)?;
    Ok((chunk, header))
}

/// Decrypt a buffer produced by [`encrypt_bytes`].
pub fn decrypt_bytes(chunk: &[u8], header: &[u8], key: &SecretKey) -> Result<Vec<u8>, StreamError> {
    let mut decryptor = StreamDecryptor::new(header, key)?;
    let (plaintext, tag) = decryptor.pull(chunk)?;
    if tag != ChunkTag::Final {
        return Err(StreamError::MissingFinal);
    }
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(plaintext: &[u8]) -> (Vec<u8>, [u8; HEADER_BYTES], Vec<u8>) {
        let key = SecretKey::generate();
        let mut encrypted = Vec::new();
        let (header, written) =
            encrypt_stream(&mut Cursor::new(plaintext), &mut encrypted, &key).unwrap();
        assert_eq!(written as usize, encrypted.len());

        let mut decrypted = Vec::new();
        decrypt_stream(&mut Cursor::new(&encrypted), &mut decrypted, &header, &key).unwrap();
        (encrypted, header, decrypted)
    }

    #[test]
    fn test_push_pull_roundtrip() {
        let key = SecretKey::generate();
        let (mut encryptor, header) = StreamEncryptor::new(&key);

        let c1 = encryptor.push(b"first chunk", ChunkTag::Message).unwrap();
        let c2 = encryptor.push(b"second chunk", ChunkTag::Final).unwrap();
        assert_eq!(c1.len(), b"first chunk".len() + CHUNK_OVERHEAD);

        let mut decryptor = StreamDecryptor::new(&header, &key).unwrap();
        let (p1, t1) = decryptor.pull(&c1).unwrap();
        assert_eq!(p1, b"first chunk");
        assert_eq!(t1, ChunkTag::Message);

        let (p2, t2) = decryptor.pull(&c2).unwrap();
        assert_eq!(p2, b"second chunk");
        assert_eq!(t2, ChunkTag::Final);
    }

    #[test]
    fn test_single_chunk_stream_is_final() {
        // 100 bytes of 0x41 -> one 117-byte chunk carrying FINAL
        let plaintext = vec![0x41u8; 100];
        let key = SecretKey::generate();
        let mut encrypted = Vec::new();
        let (header, _) =
            encrypt_stream(&mut Cursor::new(&plaintext), &mut encrypted, &key).unwrap();
        assert_eq!(encrypted.len(), 117);

        let mut decryptor = StreamDecryptor::new(&header, &key).unwrap();
        let (decrypted, tag) = decryptor.pull(&encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
        assert_eq!(tag, ChunkTag::Final);
    }

    #[test]
    fn test_exact_multiple_gets_empty_terminator() {
        // Exactly one chunk of zeros -> full MESSAGE chunk + empty FINAL
        let plaintext = vec![0u8; PLAIN_CHUNK_BYTES];
        let (encrypted, _header, decrypted) = roundtrip(&plaintext);
        assert_eq!(encrypted.len(), PLAIN_CHUNK_BYTES + 2 * CHUNK_OVERHEAD);
        assert_eq!(decrypted, plaintext);

        // The second chunk is the 17-byte empty terminator.
        let terminator = &encrypted[PLAIN_CHUNK_BYTES + CHUNK_OVERHEAD..];
        assert_eq!(terminator.len(), CHUNK_OVERHEAD);
    }

    #[test]
    fn test_just_over_one_chunk() {
        // 4 MiB + 100 bytes -> chunks of 4_194_321 and 117 bytes
        let plaintext = vec![0x5au8; PLAIN_CHUNK_BYTES + 100];
        let (encrypted, _header, decrypted) = roundtrip(&plaintext);
        assert_eq!(encrypted.len(), PLAIN_CHUNK_BYTES + 100 + 2 * CHUNK_OVERHEAD);
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_input_is_single_empty_final() {
        let (encrypted, _header, decrypted) = roundtrip(b"");
        assert_eq!(encrypted.len(), CHUNK_OVERHEAD);
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_header_not_embedded_in_blob() {
        let plaintext = vec![0x77u8; 4096];
        let key = SecretKey::generate();
        let mut encrypted = Vec::new();
        let (header, _) =
            encrypt_stream(&mut Cursor::new(&plaintext), &mut encrypted, &key).unwrap();
        assert_ne!(&encrypted[..HEADER_BYTES], &header[..]);
    }

    #[test]
    fn test_bit_flip_rejected() {
        let plaintext = vec![0x13u8; 1000];
        let key = SecretKey::generate();
        let mut encrypted = Vec::new();
        let (header, _) =
            encrypt_stream(&mut Cursor::new(&plaintext), &mut encrypted, &key).unwrap();

        for index in [0, 1, 500, encrypted.len() - 1] {
            let mut tampered = encrypted.clone();
            tampered[index] ^= 0x01;
            let mut out = Vec::new();
            let result = decrypt_stream(&mut Cursor::new(&tampered), &mut out, &header, &key);
            assert!(result.is_err(), "flip at byte {} accepted", index);
        }
    }

    #[test]
    fn test_truncation_rejected() {
        let plaintext = vec![0x13u8; 1000];
        let key = SecretKey::generate();
        let mut encrypted = Vec::new();
        let (header, _) =
            encrypt_stream(&mut Cursor::new(&plaintext), &mut encrypted, &key).unwrap();

        for cut in [1, CHUNK_OVERHEAD, encrypted.len() - 1, encrypted.len()] {
            let truncated = &encrypted[..encrypted.len() - cut];
            let mut out = Vec::new();
            let result = decrypt_stream(&mut Cursor::new(truncated), &mut out, &header, &key);
            assert!(result.is_err(), "truncating {} bytes accepted", cut);
        }
    }

    #[test]
    fn test_chunk_swap_rejected() {
        let key = SecretKey::generate();
        let (mut encryptor, header) = StreamEncryptor::new(&key);
        let c1 = encryptor.push(b"one", ChunkTag::Message).unwrap();
        let c2 = encryptor.push(b"two", ChunkTag::Final).unwrap();

        let mut decryptor = StreamDecryptor::new(&header, &key).unwrap();
        assert!(matches!(
            decryptor.pull(&c2),
            Err(StreamError::Authentication)
        ));
        let _ = c1;
    }

    #[test]
    fn test_short_chunk_rejected() {
        let key = SecretKey::generate();
        let (_, header) = StreamEncryptor::new(&key);
        let mut decryptor = StreamDecryptor::new(&header, &key).unwrap();
        assert!(matches!(
            decryptor.pull(&[0u8; CHUNK_OVERHEAD - 1]),
            Err(StreamError::CipherTooShort)
        ));
    }

    #[test]
    fn test_missing_final_rejected() {
        let key = SecretKey::generate();
        let (mut encryptor, header) = StreamEncryptor::new(&key);
        let only = encryptor.push(b"not the end", ChunkTag::Message).unwrap();

        let mut out = Vec::new();
        let result = decrypt_stream(&mut Cursor::new(&only), &mut out, &header, &key);
        assert!(matches!(result, Err(StreamError::MissingFinal)));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let (encrypted, header, _) = roundtrip(b"some plaintext");
        let other = SecretKey::generate();
        let mut out = Vec::new();
        let result = decrypt_stream(&mut Cursor::new(&encrypted), &mut out, &header, &other);
        assert!(result.is_err());
    }

    #[test]
    fn test_multi_chunk_roundtrip() {
        // Two full chunks plus a short tail
        let plaintext = vec![0x42u8; 2 * PLAIN_CHUNK_BYTES + 12345];
        let (encrypted, _, decrypted) = roundtrip(&plaintext);
        assert_eq!(
            encrypted.len(),
            plaintext.len() + 3 * CHUNK_OVERHEAD
        );
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_bytes_helpers_roundtrip() {
        let key = SecretKey::generate();
        let (sealed, header) = encrypt_bytes(b"thumbnail bytes", &key).unwrap();
        assert_eq!(sealed.len(), b"thumbnail bytes".len() + CHUNK_OVERHEAD);

        let opened = decrypt_bytes(&sealed, &header, &key).unwrap();
        assert_eq!(opened, b"thumbnail bytes");
    }

    #[test]
    fn test_invalid_header_length() {
        let key = SecretKey::generate();
        assert!(matches!(
            StreamDecryptor::new(&[0u8; 23], &key),
            Err(StreamError::InvalidHeaderLength(23))
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let source = dir.path().join("plain.bin");
        let encrypted = dir.path().join("cipher.bin");
        let restored = dir.path().join("restored.bin");

        let plaintext = vec![0xabu8; 100_000];
        std::fs::write(&source, &plaintext).expect("Failed to write test file");

        let key = SecretKey::generate();
        let (header, size) = encrypt_file(&source, &encrypted, &key).unwrap();
        assert_eq!(size, std::fs::metadata(&encrypted).unwrap().len());

        decrypt_file(&encrypted, &restored, &header, &key).unwrap();
        assert_eq!(std::fs::read(&restored).unwrap(), plaintext);
    }
}
