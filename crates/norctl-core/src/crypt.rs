//! Transparent at-rest encryption for flagged partitions
//!
//! Data on encrypted partitions is transformed in fixed 32-byte units,
//! each keyed by a per-device key pair and tweaked by the unit's
//! sequential index within the buffer being transferred (not by its
//! absolute flash address - callers resuming a partial operation must
//! preserve that). The transform is a balanced four-round Feistel
//! network over the two 16-byte halves of a unit, so decryption is the
//! same network run in reverse.

/// Size of one cipher unit in bytes
pub const UNIT_LEN: usize = 32;

const ROUNDS: usize = 4;

/// Per-device key pair: one half keys the rounds, the other the tweak
#[derive(Clone, Copy)]
pub struct DeviceKeys {
    /// Round-key half
    pub cipher: [u8; 16],
    /// Tweak-derivation half
    pub tweak: [u8; 16],
}

/// Tweakable 32-byte-unit cipher
#[derive(Clone)]
pub struct UnitCipher {
    rk: [u32; ROUNDS],
    tk: [u32; 4],
}

impl UnitCipher {
    /// Build the cipher from the device key pair
    pub fn new(keys: &DeviceKeys) -> Self {
        let mut rk = [0u32; ROUNDS];
        let mut tk = [0u32; 4];
        for i in 0..4 {
            rk[i] = word_at(&keys.cipher, i);
            tk[i] = word_at(&keys.tweak, i);
        }
        Self { rk, tk }
    }

    /// Derive the per-unit tweak words from the sequential unit index
    fn tweak(&self, index: u32) -> [u32; 4] {
        let seed = ((self.tk[0] as u64) << 32 | self.tk[1] as u64) ^ index as u64;
        let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut words = [0u32; 4];
        for (i, w) in words.iter_mut().enumerate() {
            x ^= x >> 30;
            x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
            x ^= x >> 27;
            x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
            x ^= x >> 31;
            *w = (x as u32) ^ self.tk[2 + (i & 1)];
        }
        words
    }

    /// Feistel round function (need not be invertible)
    fn round(half: &[u32; 4], rk: u32, tw: &[u32; 4]) -> [u32; 4] {
        let mut out = [0u32; 4];
        for i in 0..4 {
            let mixed = (half[i] ^ tw[i])
                .wrapping_mul(0x2545_F491)
                .rotate_left(13)
                .wrapping_add(half[(i + 1) & 3] ^ rk);
            out[i] = mixed ^ (mixed >> 16);
        }
        out
    }

    /// Encrypt one unit in place
    pub fn encrypt_unit(&self, unit: &mut [u8; UNIT_LEN], index: u32) {
        let (mut left, mut right) = split(unit);
        let tw = self.tweak(index);
        for r in 0..ROUNDS {
            let f = Self::round(&right, self.rk[r], &tw);
            let next = xor(&left, &f);
            left = right;
            right = next;
        }
        join(unit, &left, &right);
    }

    /// Decrypt one unit in place
    pub fn decrypt_unit(&self, unit: &mut [u8; UNIT_LEN], index: u32) {
        let (mut left, mut right) = split(unit);
        let tw = self.tweak(index);
        for r in (0..ROUNDS).rev() {
            let f = Self::round(&left, self.rk[r], &tw);
            let prev = xor(&right, &f);
            right = left;
            left = prev;
        }
        join(unit, &left, &right);
    }
}

fn word_at(bytes: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
}

fn split(unit: &[u8; UNIT_LEN]) -> ([u32; 4], [u32; 4]) {
    let mut left = [0u32; 4];
    let mut right = [0u32; 4];
    for i in 0..4 {
        left[i] = word_at(&unit[..16], i);
        right[i] = word_at(&unit[16..], i);
    }
    (left, right)
}

fn join(unit: &mut [u8; UNIT_LEN], left: &[u32; 4], right: &[u32; 4]) {
    for i in 0..4 {
        unit[i * 4..i * 4 + 4].copy_from_slice(&left[i].to_le_bytes());
        unit[16 + i * 4..16 + i * 4 + 4].copy_from_slice(&right[i].to_le_bytes());
    }
}

fn xor(a: &[u32; 4], b: &[u32; 4]) -> [u32; 4] {
    [a[0] ^ b[0], a[1] ^ b[1], a[2] ^ b[2], a[3] ^ b[3]]
}
