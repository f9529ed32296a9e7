//! Persisted JSON artifacts
//!
//! Holder-side credential state and the signature bundle, serialized the
//! same way across runs: centered integer coefficient vectors for every
//! witness row, hex for seeds and digests, decimal strings for big-integer
//! norms. The bundle key is `(N, q_hex)`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use num_bigint::BigInt;
use std::path::Path;

use crate::issuance::{HolderSecrets, Issuance, IssuerChallenge};
use crate::keygen::TrapdoorKey;
use crate::params::Params;
use crate::ring::Ring;
use crate::sampler::Preimage;

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Holder-side credential state, serialized as centered integer vectors.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CredentialState {
    pub params_digest: String,
    pub ac_path: String,
    pub bbs_path: String,
    pub m1: Vec<i64>,
    pub m2: Vec<i64>,
    pub ru0: Vec<i64>,
    pub ru1: Vec<i64>,
    pub r: Vec<i64>,
    pub ri0: Vec<i64>,
    pub ri1: Vec<i64>,
    pub r0: Vec<i64>,
    pub r1: Vec<i64>,
    pub k0: Vec<i64>,
    pub k1: Vec<i64>,
    pub com: Vec<Vec<u64>>,
    pub t_coeffs: Vec<i64>,
    /// Trapdoor coefficients, holder-side only when the holder doubles as
    /// its own issuer (test rigs).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key: Option<(Vec<i64>, Vec<i64>)>,
}

impl CredentialState {
    pub fn collect(
        ring: &Ring,
        params: &Params,
        secrets: &HolderSecrets,
        challenge: &IssuerChallenge,
        iss: &Issuance,
        ac_path: &str,
        bbs_path: &str,
        key: Option<&TrapdoorKey>,
    ) -> Self {
        Self {
            params_digest: hex::encode(params.digest()),
            ac_path: ac_path.into(),
            bbs_path: bbs_path.into(),
            m1: ring.center(&secrets.m1),
            m2: ring.center(&secrets.m2),
            ru0: ring.center(&secrets.ru0),
            ru1: ring.center(&secrets.ru1),
            r: ring.center(&secrets.r),
            ri0: ring.center(&challenge.ri0),
            ri1: ring.center(&challenge.ri1),
            r0: ring.center(&iss.r0),
            r1: ring.center(&iss.r1),
            k0: ring.center(&iss.k0),
            k1: ring.center(&iss.k1),
            com: iss.com.iter().map(|p| p.coeffs.clone()).collect(),
            t_coeffs: iss.t_coeffs.clone(),
            key: key.map(|k| (k.f.clone(), k.g.clone())),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BundleError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Signature bundle keyed by `(N, q_hex)`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignatureBundle {
    pub n: usize,
    pub q_hex: String,
    pub m_seed: String,
    pub x0_seed: String,
    pub x1_seed: String,
    pub t_coeffs: Vec<i64>,
    pub h_coeffs: Vec<u64>,
    pub s0: Vec<i64>,
    pub s1: Vec<i64>,
    /// Norm residual (equal to `s0` under the exact reconstruction path).
    pub s2: Vec<i64>,
    pub norm_sq: String,
    pub trials_used: usize,
}

impl SignatureBundle {
    pub fn bundle_key(&self) -> String {
        format!("({}, {})", self.n, self.q_hex)
    }

    pub fn collect(
        ring: &Ring,
        key: &TrapdoorKey,
        sig: &Preimage,
        t_coeffs: &[i64],
        seeds: [&[u8]; 3],
    ) -> Self {
        Self {
            n: ring.n,
            q_hex: format!("{:#x}", ring.q),
            m_seed: hex::encode(seeds[0]),
            x0_seed: hex::encode(seeds[1]),
            x1_seed: hex::encode(seeds[2]),
            t_coeffs: t_coeffs.to_vec(),
            h_coeffs: key.h.coeffs.clone(),
            s0: sig.s0.clone(),
            s1: sig.s1.clone(),
            s2: sig.s0.clone(),
            norm_sq: sig.norm_sq.to_string(),
            trials_used: sig.trials,
        }
    }

    pub fn norm_sq_int(&self) -> Option<BigInt> {
        self.norm_sq.parse().ok()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BundleError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_bundle_round_trips_through_json() {
        let b = SignatureBundle {
            n: 64,
            q_hex: "0x3001".into(),
            m_seed: hex::encode(b"m"),
            x0_seed: hex::encode(b"x0"),
            x1_seed: hex::encode(b"x1"),
            t_coeffs: vec![1, -2, 3],
            h_coeffs: vec![5, 6, 7],
            s0: vec![-1, 0, 2],
            s1: vec![4, -4, 0],
            s2: vec![-1, 0, 2],
            norm_sq: "41".into(),
            trials_used: 3,
        };
        let json = serde_json::to_string(&b).unwrap();
        let back: SignatureBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
        assert_eq!(back.bundle_key(), "(64, 0x3001)");
        assert_eq!(back.norm_sq_int().unwrap(), BigInt::from(41));
    }
}
