//! XChaCha20-Poly1305 secretstream, decryption side.
//!
//! This is the chunked construction libsodium exposes as
//! `crypto_secretstream_xchacha20poly1305`. A stream starts with a 24-byte
//! header; every chunk on the wire is
//!
//! ```text
//! masked tag (1) || ciphertext (n) || Poly1305 MAC (16)
//! ```
//!
//! and decrypts to `n` bytes plus a [`ChunkTag`]. The MAC input, including
//! libsodium's `mlen mod 16` padding after the ciphertext, is reproduced
//! byte for byte so that streams written by libsodium verify here.
//!
//! # Initial counter
//!
//! Backups are written with the 32-bit block counter at **0** after
//! initialization, not at 1 as libsodium's `init_pull` leaves it. Re-keying
//! still resets the counter to 1.

use chacha20::cipher::consts::U10;
use chacha20::cipher::generic_array::GenericArray;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha20, Key as CipherKey, Nonce as CipherNonce, hchacha};
use poly1305::universal_hash::{KeyInit, UniversalHash};
use poly1305::{Block as MacBlock, Key as MacKey, Poly1305, Tag as MacTag};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Stream key length.
pub const KEY_BYTES: usize = 32;

/// Stream header length.
pub const HEADER_BYTES: usize = 24;

/// Per-chunk overhead: one tag byte plus a 16-byte MAC.
pub const ABYTES: usize = 1 + MAC_BYTES;

const MAC_BYTES: usize = 16;
const INONCE_BYTES: usize = 8;
const BLOCK_BYTES: usize = 64;

pub const TAG_MESSAGE: u8 = 0x00;
pub const TAG_PUSH: u8 = 0x01;
pub const TAG_REKEY: u8 = 0x02;
pub const TAG_FINAL: u8 = TAG_PUSH | TAG_REKEY;

const INITIAL_COUNTER: u32 = 0;
const REKEY_COUNTER: u32 = 1;

const PAD0: [u8; 16] = [0u8; 16];

/// The role a chunk plays in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkTag {
    /// Ordinary data, more follows.
    Message,
    /// End of a logical message, more follows.
    Push,
    /// Key rotation after this chunk, more follows.
    Rekey,
    /// Last chunk of the stream.
    Final,
}

impl ChunkTag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            TAG_MESSAGE => Some(ChunkTag::Message),
            TAG_PUSH => Some(ChunkTag::Push),
            TAG_REKEY => Some(ChunkTag::Rekey),
            TAG_FINAL => Some(ChunkTag::Final),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            ChunkTag::Message => TAG_MESSAGE,
            ChunkTag::Push => TAG_PUSH,
            ChunkTag::Rekey => TAG_REKEY,
            ChunkTag::Final => TAG_FINAL,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PullError {
    #[error("chunk of {len} bytes is shorter than the {ABYTES}-byte overhead")]
    ChunkTooShort { len: usize },

    #[error("output buffer holds {available} bytes, chunk needs {needed}")]
    OutputTooSmall { needed: usize, available: usize },

    #[error("chunk authentication failed")]
    Forged,

    #[error("authenticated chunk carries unknown tag {0:#04x}")]
    UnknownTag(u8),
}

/// Evolving key/nonce state shared by both stream directions.
#[derive(Zeroize, ZeroizeOnDrop)]
struct StreamState {
    key: [u8; KEY_BYTES],
    inonce: [u8; INONCE_BYTES],
    counter: u32,
}

impl StreamState {
    fn init(key: &[u8; KEY_BYTES], header: &[u8; HEADER_BYTES]) -> Self {
        let (hchacha_input, inonce) = header.split_at(16);
        let mut subkey = hchacha::<U10>(
            CipherKey::from_slice(key),
            GenericArray::from_slice(hchacha_input),
        );

        let mut state = StreamState {
            key: [0u8; KEY_BYTES],
            inonce: [0u8; INONCE_BYTES],
            counter: INITIAL_COUNTER,
        };
        state.key.copy_from_slice(&subkey);
        state.inonce.copy_from_slice(inonce);
        subkey.as_mut_slice().zeroize();
        state
    }

    /// ChaCha20-IETF positioned at block 0 under the current nonce.
    fn cipher(&self) -> ChaCha20 {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&self.counter.to_le_bytes());
        nonce[4..].copy_from_slice(&self.inonce);
        ChaCha20::new(CipherKey::from_slice(&self.key), CipherNonce::from_slice(&nonce))
    }

    /// Derive the one-time MAC and the tag keystream block for the next chunk.
    ///
    /// Consumes keystream blocks 0 and 1, leaving the cipher at block 2 where
    /// the message keystream starts.
    fn begin_chunk(&self) -> (ChaCha20, ChunkMac, Zeroizing<[u8; BLOCK_BYTES]>) {
        let mut cipher = self.cipher();
        let mut block = Zeroizing::new([0u8; BLOCK_BYTES]);
        cipher.apply_keystream(&mut block[..]);
        let mac = ChunkMac::new(&block[..32]);

        block.fill(0);
        cipher.apply_keystream(&mut block[..]);
        (cipher, mac, block)
    }

    fn advance(&mut self, mac: &MacTag, tag: u8) {
        for (n, m) in self.inonce.iter_mut().zip(mac.iter()) {
            *n ^= m;
        }
        self.counter = self.counter.wrapping_add(1);
        if tag & TAG_REKEY != 0 || self.counter == 0 {
            self.rekey();
        }
    }

    fn rekey(&mut self) {
        let mut material = Zeroizing::new([0u8; KEY_BYTES + INONCE_BYTES]);
        material[..KEY_BYTES].copy_from_slice(&self.key);
        material[KEY_BYTES..].copy_from_slice(&self.inonce);
        self.cipher().apply_keystream(&mut material[..]);
        self.key.copy_from_slice(&material[..KEY_BYTES]);
        self.inonce.copy_from_slice(&material[KEY_BYTES..]);
        self.counter = REKEY_COUNTER;
    }
}

/// Poly1305 over the chunk's MAC input, fed incrementally.
///
/// libsodium's padding leaves the input unaligned, so partial blocks are
/// buffered and the tail goes through `compute_unpadded`.
struct ChunkMac {
    mac: Poly1305,
    pending: [u8; 16],
    pending_len: usize,
}

impl ChunkMac {
    fn new(one_time_key: &[u8]) -> Self {
        Self {
            mac: Poly1305::new(MacKey::from_slice(one_time_key)),
            pending: [0u8; 16],
            pending_len: 0,
        }
    }

    fn update(&mut self, mut data: &[u8]) {
        if self.pending_len > 0 {
            let take = (16 - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];
            if self.pending_len < 16 {
                return;
            }
            self.mac.update(&[*MacBlock::from_slice(&self.pending)]);
            self.pending_len = 0;
        }

        let mut blocks = data.chunks_exact(16);
        for block in &mut blocks {
            self.mac.update(&[*MacBlock::from_slice(block)]);
        }
        let rest = blocks.remainder();
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }

    /// Feed everything after the tag block and produce the MAC.
    fn finish(mut self, ciphertext: &[u8]) -> MacTag {
        self.update(ciphertext);
        self.update(&PAD0[..ciphertext.len() % 16]);
        // No associated data is ever used for backups.
        self.update(&0u64.to_le_bytes());
        self.update(&((BLOCK_BYTES + ciphertext.len()) as u64).to_le_bytes());
        let tag = self.mac.compute_unpadded(&self.pending[..self.pending_len]);
        self.pending.zeroize();
        tag
    }
}

/// Decryption state of one secretstream.
///
/// Holds the derived subkey and nonce; both are wiped on drop.
pub struct PullStream {
    state: StreamState,
}

impl PullStream {
    /// Initialize from the stream key and the 24-byte stream header.
    pub fn init(key: &[u8; KEY_BYTES], header: &[u8; HEADER_BYTES]) -> Self {
        Self {
            state: StreamState::init(key, header),
        }
    }

    /// Authenticate and decrypt one chunk into `out`.
    ///
    /// Returns the plaintext length and tag. On any error nothing has been
    /// written to `out` and the stream state is unchanged.
    pub fn pull(&mut self, chunk: &[u8], out: &mut [u8]) -> Result<(usize, ChunkTag), PullError> {
        if chunk.len() < ABYTES {
            return Err(PullError::ChunkTooShort { len: chunk.len() });
        }
        let mlen = chunk.len() - ABYTES;
        if out.len() < mlen {
            return Err(PullError::OutputTooSmall {
                needed: mlen,
                available: out.len(),
            });
        }

        let masked_tag = chunk[0];
        let (ciphertext, stored_mac) = chunk[1..].split_at(mlen);

        let (mut cipher, mut mac, mut block) = self.state.begin_chunk();
        let tag_byte = masked_tag ^ block[0];
        block[0] = masked_tag;
        mac.update(&block[..]);
        let computed = mac.finish(ciphertext);

        if !bool::from(computed.as_slice().ct_eq(stored_mac)) {
            return Err(PullError::Forged);
        }
        let tag = ChunkTag::from_byte(tag_byte).ok_or(PullError::UnknownTag(tag_byte))?;

        let plaintext = &mut out[..mlen];
        plaintext.copy_from_slice(ciphertext);
        cipher.apply_keystream(plaintext);

        self.state.advance(&computed, tag_byte);
        Ok((mlen, tag))
    }
}

/// Encryption side, used by tests to build containers.
#[cfg(test)]
pub(crate) struct PushStream {
    state: StreamState,
}

#[cfg(test)]
impl PushStream {
    pub(crate) fn init(key: &[u8; KEY_BYTES], header: &[u8; HEADER_BYTES]) -> Self {
        Self {
            state: StreamState::init(key, header),
        }
    }

    pub(crate) fn push(&mut self, message: &[u8], tag: ChunkTag) -> Vec<u8> {
        let (mut cipher, mut mac, mut block) = self.state.begin_chunk();
        let masked_tag = tag.as_byte() ^ block[0];
        block[0] = masked_tag;
        mac.update(&block[..]);

        let mut out = Vec::with_capacity(message.len() + ABYTES);
        out.push(masked_tag);
        out.extend_from_slice(message);
        cipher.apply_keystream(&mut out[1..]);
        let computed = mac.finish(&out[1..]);
        out.extend_from_slice(&computed);

        self.state.advance(&computed, tag.as_byte());
        out
    }
}
