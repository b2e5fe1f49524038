//! Stand-in session math shared by the model receiver and model cipher.
//!
//! Both ends derive the same values from the same inputs, which is all the
//! transmitter can observe. This is NOT the real block cipher.

use rand::seq::index;
use rand::Rng;
use sha1::{Digest, Sha1};

use hdcp1x_core::{uint_from_le, Ksv, RepeaterInfo};

/// Values both ends hold after the block computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    seed: [u8; 20],
    pub mo: u64,
}

impl Session {
    pub fn derive(aksv: Ksv, bksv: Ksv, an: u64, repeater: bool) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(aksv.to_le_bytes());
        hasher.update(bksv.to_le_bytes());
        hasher.update(an.to_le_bytes());
        hasher.update([repeater as u8]);
        let mut seed = [0u8; 20];
        seed.copy_from_slice(&hasher.finalize());

        Self { seed, mo: uint_from_le(&seed[2..10]) }
    }

    /// Ro, the first check value.
    pub fn ro(&self) -> u16 {
        self.ri(0)
    }

    /// Check value after `frame` link-check ticks. Frame 0 is Ro.
    pub fn ri(&self, frame: u32) -> u16 {
        if frame == 0 {
            return u16::from_le_bytes([self.seed[0], self.seed[1]]);
        }
        let mut hasher = Sha1::new();
        hasher.update(self.seed);
        hasher.update(frame.to_le_bytes());
        let out = hasher.finalize();
        u16::from_le_bytes([out[0], out[1]])
    }
}

/// V for a KSV list, as the five words V'H0..V'H4.
pub fn ksv_list_digest(ksvs: &[Ksv], info: RepeaterInfo, mo: u64) -> [u32; 5] {
    let mut hasher = Sha1::new();
    for ksv in ksvs {
        hasher.update(ksv.to_le_bytes());
    }
    hasher.update(info.to_le_bytes());
    hasher.update(mo.to_le_bytes());
    let digest = hasher.finalize();

    let mut words = [0u32; 5];
    for (w, chunk) in words.iter_mut().zip(digest.chunks_exact(4)) {
        *w = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// A random well-formed KSV: 20 of the 40 bits set.
pub fn random_ksv<R: Rng + ?Sized>(rng: &mut R) -> Ksv {
    let raw = index::sample(rng, 40, Ksv::WEIGHT as usize)
        .iter()
        .fold(0u64, |acc, bit| acc | (1u64 << bit));
    Ksv::new(raw)
}
