//! Fiat–Shamir transcript with domain separation and grinding
//!
//! Deterministic, label-stable transform over BLAKE3: every absorb is
//! prefixed by a fixed domain-separation tag and a human-readable label and
//! is length-delimited; challenge derivation clones the running state and
//! reads the XOF, so deriving challenges never consumes absorb state.
//!
//! The strict challenge order of the protocol is
//! `public_inputs → commit_root → γ batching → ℓ′ eval points → η DECS
//! coefficients → subset E → grinding nonces`; each round `i` may demand a
//! proof-of-work nonce whose hash carries `κ_i` leading zero bits before its
//! challenges are derived.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use blake3::Hasher;
use std::io::Read;

use crate::ext::{ExtElem, ExtField};

/// Canonical labels; reordering or renaming existing variants breaks every
/// recorded transcript.
#[derive(Clone, Copy, Debug)]
pub enum FsLabel {
    PublicInputs,
    CommitRoot,
    GammaBatch,
    EvalPoints,
    RowEvals,
    ParQuotient,
    AggSum,
    DecsCoeffs,
    DecsRows,
    SubsetE,
    Grind,
}

impl FsLabel {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            FsLabel::PublicInputs => "public_inputs",
            FsLabel::CommitRoot => "commit_root",
            FsLabel::GammaBatch => "gamma_batch",
            FsLabel::EvalPoints => "eval_points",
            FsLabel::RowEvals => "row_evals",
            FsLabel::ParQuotient => "par_quotient",
            FsLabel::AggSum => "agg_sum",
            FsLabel::DecsCoeffs => "decs_coeffs",
            FsLabel::DecsRows => "decs_rows",
            FsLabel::SubsetE => "subset_e",
            FsLabel::Grind => "grind",
        }
    }
}

/// Fiat–Shamir transcript (BLAKE3-based).
pub struct Transcript {
    label: &'static str,
    hasher: Hasher,
    ctr: u64,
}

impl Transcript {
    pub fn new(label: &'static str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"latcred.transcript.v1");
        hasher.update(label.as_bytes());
        Self { label, hasher, ctr: 0 }
    }

    // ---------------------------- absorbs ----------------------------

    pub fn absorb_bytes(&mut self, label: FsLabel, bytes: &[u8]) {
        self.hasher.update(b"item:");
        self.hasher.update(label.as_str().as_bytes());
        self.hasher.update(b":len:");
        self.hasher.update(&(bytes.len() as u64).to_be_bytes());
        self.hasher.update(b":data:");
        self.hasher.update(bytes);
    }

    #[inline]
    pub fn absorb_u64(&mut self, label: FsLabel, v: u64) {
        self.absorb_bytes(label, &v.to_be_bytes());
    }

    pub fn absorb_scalars(&mut self, label: FsLabel, vals: &[u64]) {
        let mut buf = Vec::with_capacity(8 + 8 * vals.len());
        buf.extend_from_slice(&(vals.len() as u64).to_be_bytes());
        for v in vals {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        self.absorb_bytes(label, &buf);
    }

    pub fn absorb_ext_slice(&mut self, label: FsLabel, vals: &[ExtElem]) {
        let mut buf = Vec::with_capacity(8 + 16 * vals.len());
        buf.extend_from_slice(&(vals.len() as u64).to_be_bytes());
        for v in vals {
            buf.extend_from_slice(&v.c0.to_le_bytes());
            buf.extend_from_slice(&v.c1.to_le_bytes());
        }
        self.absorb_bytes(label, &buf);
    }

    // ---------------------------- challenges ----------------------------

    fn xof(&self, label: FsLabel, ctr: u64) -> blake3::OutputReader {
        let mut h = self.hasher.clone();
        h.update(b"challenge:");
        h.update(b"latcred.v1");
        h.update(b":tlabel:");
        h.update(self.label.as_bytes());
        h.update(b":label:");
        h.update(label.as_str().as_bytes());
        h.update(b":ctr:");
        h.update(&ctr.to_be_bytes());
        h.finalize_xof()
    }

    /// Derive `k` extension-field challenges.
    pub fn challenge_ext_many(&mut self, label: FsLabel, ext: &ExtField, k: usize) -> Vec<ExtElem> {
        let mut xof = self.xof(label, self.ctr);
        self.ctr = self.ctr.wrapping_add(1);
        let mut out = Vec::with_capacity(k);
        let mut buf = [0u8; 32];
        for _ in 0..k {
            let _ = xof.read(&mut buf);
            out.push(ext.from_uniform_bytes(&buf));
        }
        out
    }

    #[inline]
    pub fn challenge_ext(&mut self, label: FsLabel, ext: &ExtField) -> ExtElem {
        self.challenge_ext_many(label, ext, 1)[0]
    }

    /// Derive `k` distinct indices from `[lo, hi)` by rejection.
    pub fn challenge_subset(&mut self, label: FsLabel, k: usize, lo: usize, hi: usize) -> Vec<usize> {
        debug_assert!(hi - lo >= k, "subset larger than the index range");
        let mut xof = self.xof(label, self.ctr);
        self.ctr = self.ctr.wrapping_add(1);
        let span = (hi - lo) as u64;
        let mut out = Vec::with_capacity(k);
        let mut buf = [0u8; 8];
        while out.len() < k {
            let _ = xof.read(&mut buf);
            let idx = lo + (u64::from_le_bytes(buf) % span) as usize;
            if !out.contains(&idx) {
                out.push(idx);
            }
        }
        out
    }

    // ---------------------------- grinding ----------------------------

    fn grind_digest(&self, round: u8, nonce: u64) -> [u8; 32] {
        let mut h = self.hasher.clone();
        h.update(b"grind:");
        h.update(b"latcred.v1");
        h.update(&[round]);
        h.update(&nonce.to_be_bytes());
        *h.finalize().as_bytes()
    }

    /// Search a nonce whose grind digest has `kappa` leading zero bits, then
    /// bind it to the transcript. `kappa = 0` binds the zero nonce.
    pub fn grind(&mut self, round: u8, kappa: u32) -> u64 {
        let mut nonce = 0u64;
        loop {
            if leading_zero_bits(&self.grind_digest(round, nonce)) >= kappa {
                break;
            }
            nonce += 1;
        }
        self.absorb_u64(FsLabel::Grind, nonce);
        nonce
    }

    /// Verifier side: check the claimed nonce, then bind it.
    pub fn check_grind(&mut self, round: u8, kappa: u32, nonce: u64) -> bool {
        let ok = leading_zero_bits(&self.grind_digest(round, nonce)) >= kappa;
        self.absorb_u64(FsLabel::Grind, nonce);
        ok
    }
}

pub fn leading_zero_bits(digest: &[u8; 32]) -> u32 {
    let mut bits = 0;
    for &b in digest {
        if b == 0 {
            bits += 8;
        } else {
            bits += b.leading_zeros();
            break;
        }
    }
    bits
}
