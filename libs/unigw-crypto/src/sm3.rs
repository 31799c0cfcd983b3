//! SM3 message digest (GB/T 32905-2016).
//!
//! Merkle-Damgard construction over 512-bit blocks with a 256-bit state.
//! [`digest`] and [`digest_hex`] cover the one-shot case; [`Sm3`] absorbs
//! input incrementally.

/// Digest length in bytes.
pub const DIGEST_SIZE: usize = 32;

/// Compression block length in bytes.
pub const BLOCK_SIZE: usize = 64;

/// Offset inside the last block where the 64-bit length field starts.
const LENGTH_OFFSET: usize = BLOCK_SIZE - 8;

const IV: [u32; 8] = [
    0x7380_166f,
    0x4914_b2b9,
    0x1724_42d7,
    0xda8a_0600,
    0xa96f_30bc,
    0x1631_38aa,
    0xe38d_ee4d,
    0xb0fb_0e4e,
];

/// Round constant for rounds 0..16.
const T_EARLY: u32 = 0x79cc_4519;
/// Round constant for rounds 16..64.
const T_LATE: u32 = 0x7a87_9d8a;

#[inline]
fn p0(x: u32) -> u32 {
    x ^ x.rotate_left(9) ^ x.rotate_left(17)
}

#[inline]
fn p1(x: u32) -> u32 {
    x ^ x.rotate_left(15) ^ x.rotate_left(23)
}

#[inline]
fn ff(x: u32, y: u32, z: u32, round: u32) -> u32 {
    if round < 16 {
        x ^ y ^ z
    } else {
        (x & y) | (x & z) | (y & z)
    }
}

#[inline]
fn gg(x: u32, y: u32, z: u32, round: u32) -> u32 {
    if round < 16 {
        x ^ y ^ z
    } else {
        (x & y) | (!x & z)
    }
}

/// Message length in bits, as carried by the padding.
fn bit_length(len: u64) -> u64 {
    match len.checked_mul(8) {
        Some(bits) => bits,
        None => panic!("SM3 input of {len} bytes exceeds the 64-bit length field"),
    }
}

/// Compression function `CF(V, B)`. `block` must be exactly [`BLOCK_SIZE`] bytes.
#[allow(clippy::similar_names)]
fn compress(state: &mut [u32; 8], block: &[u8]) {
    debug_assert_eq!(block.len(), BLOCK_SIZE);

    let mut w = [0u32; 68];
    for (word, chunk) in w.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    for j in 16..68 {
        w[j] = p1(w[j - 16] ^ w[j - 9] ^ w[j - 3].rotate_left(15))
            ^ w[j - 13].rotate_left(7)
            ^ w[j - 6];
    }

    let mut w_prime = [0u32; 64];
    for (j, word) in w_prime.iter_mut().enumerate() {
        *word = w[j] ^ w[j + 4];
    }

    // Working register A..H.
    let mut r = *state;
    for (round, (&wj, &wj_prime)) in (0u32..).zip(w.iter().zip(w_prime.iter())) {
        let t = if round < 16 { T_EARLY } else { T_LATE };
        let a12 = r[0].rotate_left(12);
        let ss1 = a12
            .wrapping_add(r[4])
            .wrapping_add(t.rotate_left(round % 32))
            .rotate_left(7);
        let ss2 = ss1 ^ a12;
        let tt1 = ff(r[0], r[1], r[2], round)
            .wrapping_add(r[3])
            .wrapping_add(ss2)
            .wrapping_add(wj_prime);
        let tt2 = gg(r[4], r[5], r[6], round)
            .wrapping_add(r[7])
            .wrapping_add(ss1)
            .wrapping_add(wj);
        r = [
            tt1,
            r[0],
            r[1].rotate_left(9),
            r[2],
            p0(tt2),
            r[4],
            r[5].rotate_left(19),
            r[6],
        ];
    }

    for (v, reg) in state.iter_mut().zip(r) {
        *v ^= reg;
    }
}

/// Pad a message to a whole number of blocks.
///
/// Appends `0x80`, zero bytes up to 56 mod 64, then the message bit length
/// as a big-endian `u64`.
///
/// # Panics
/// Panics if the bit length of `message` does not fit in 64 bits.
#[must_use]
pub fn pad(message: &[u8]) -> Vec<u8> {
    let bits = bit_length(u64::try_from(message.len()).unwrap_or(u64::MAX));
    let zeros = (BLOCK_SIZE + LENGTH_OFFSET - (message.len() + 1) % BLOCK_SIZE) % BLOCK_SIZE;

    let mut out = Vec::with_capacity(message.len() + 1 + zeros + 8);
    out.extend_from_slice(message);
    out.push(0x80);
    out.resize(out.len() + zeros, 0);
    out.extend_from_slice(&bits.to_be_bytes());
    out
}

/// Incremental SM3 hasher.
///
/// ```
/// let mut h = unigw_crypto::Sm3::new();
/// h.update(b"ab");
/// h.update(b"c");
/// assert_eq!(h.finalize(), unigw_crypto::digest(b"abc"));
/// ```
#[derive(Clone)]
pub struct Sm3 {
    state: [u32; 8],
    buffer: [u8; BLOCK_SIZE],
    buffered: usize,
    length: u64,
}

impl Sm3 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: IV,
            buffer: [0; BLOCK_SIZE],
            buffered: 0,
            length: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.length = self
            .length
            .saturating_add(u64::try_from(data.len()).unwrap_or(u64::MAX));

        if self.buffered > 0 {
            let take = (BLOCK_SIZE - self.buffered).min(data.len());
            self.buffer[self.buffered..self.buffered + take].copy_from_slice(&data[..take]);
            self.buffered += take;
            data = &data[take..];
            if self.buffered < BLOCK_SIZE {
                return;
            }
            compress(&mut self.state, &self.buffer);
            self.buffered = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_SIZE);
        for block in &mut blocks {
            compress(&mut self.state, block);
        }
        let rest = blocks.remainder();
        self.buffer[..rest.len()].copy_from_slice(rest);
        self.buffered = rest.len();
    }

    /// Apply padding and return the 32-byte digest.
    ///
    /// # Panics
    /// Panics if more than `u64::MAX / 8` bytes were absorbed.
    #[must_use]
    pub fn finalize(self) -> [u8; DIGEST_SIZE] {
        let bits = bit_length(self.length);
        let mut state = self.state;

        let mut tail = [0u8; 2 * BLOCK_SIZE];
        tail[..self.buffered].copy_from_slice(&self.buffer[..self.buffered]);
        tail[self.buffered] = 0x80;
        let tail_len = if self.buffered < LENGTH_OFFSET {
            BLOCK_SIZE
        } else {
            2 * BLOCK_SIZE
        };
        tail[tail_len - 8..tail_len].copy_from_slice(&bits.to_be_bytes());
        for block in tail[..tail_len].chunks_exact(BLOCK_SIZE) {
            compress(&mut state, block);
        }

        let mut out = [0u8; DIGEST_SIZE];
        for (chunk, word) in out.chunks_exact_mut(4).zip(state) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        out
    }
}

impl Default for Sm3 {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot SM3 digest.
///
/// # Panics
/// Panics if the bit length of `message` does not fit in 64 bits.
#[must_use]
pub fn digest(message: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sm3::new();
    hasher.update(message);
    hasher.finalize()
}

/// One-shot SM3 digest as 64 lowercase hex characters.
///
/// # Panics
/// Panics if the bit length of `message` does not fit in 64 bits.
#[must_use]
pub fn digest_hex(message: &[u8]) -> String {
    hex::encode(digest(message))
}
