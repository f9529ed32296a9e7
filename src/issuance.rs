//! Issuance flow (holder ⇄ issuer)
//!
//! Two messages: the holder commits to `(m₁, m₂, rU0, rU1, r)` with the
//! Ajtai matrix (`PrepareCommit`), the issuer answers with `(rI0, rI1)`, and
//! `ApplyChallenge` folds the challenge in — per evaluation slot, the
//! combined randomness is wrapped into `[−B, B]` modulo `2B+1` with a carry
//! in `{−1, 0, 1}`, the BBS hash target is recomputed from the combined
//! randomness, and the centered coefficients of its inverse transform become
//! the issuer-signable target `T`.
//!
//! The packed-half discipline lives here too: `m₁` occupies the lower half
//! of Ω in the evaluation domain, `m₂` the upper half
//! ([`check_packed_half_eval`] is what the statement builder enforces), and
//! the issuance statement — the pre-signature proof — is assembled from the
//! same rows (19 parallel constraints for the default five-row commitment).

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use rand::Rng;
use tracing::debug;

use crate::hash::{self, SeedPolyBounds};
use crate::params::Params;
use crate::piop::{PiopError, RowRef, Statement};
use crate::ring::{center_bounded, Basis, Poly, Ring, RingError};

/// Number of committed witness polynomials (`m₁ ‖ m₂ ‖ rU0 ‖ rU1 ‖ r`).
pub const COMMIT_WIDTH: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum IssuanceError {
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error(transparent)]
    Piop(#[from] PiopError),
    #[error("packing invariant violated for {0}")]
    Packing(&'static str),
    #[error("witness coefficient {0} outside [−B, B]")]
    BoundViolation(i64),
}

/// Issuer/system public material.
#[derive(Debug, Clone)]
pub struct PublicSetup {
    pub ac: Vec<Vec<Poly>>,
    pub bbs: [Poly; 4],
    pub seed: Vec<u8>,
}

pub fn setup(ring: &Ring, seed: &[u8]) -> PublicSetup {
    PublicSetup {
        ac: hash::sample_matrix(ring, "ajtai.ac", seed, COMMIT_WIDTH, COMMIT_WIDTH),
        bbs: hash::sample_bbs_basis(ring, seed),
        seed: seed.to_vec(),
    }
}

/// Holder secrets, all in the evaluation basis.
#[derive(Debug, Clone)]
pub struct HolderSecrets {
    pub m1: Poly,
    pub m2: Poly,
    pub ru0: Poly,
    pub ru1: Poly,
    pub r: Poly,
}

/// Evaluation-domain packed half sampling: values confined to one half of
/// the first `n_cols` slots, zero elsewhere.
pub fn sample_packed_half_eval(
    ring: &Ring,
    n_cols: usize,
    lower: bool,
    label: &str,
    seed: &[u8],
    bounds: SeedPolyBounds,
) -> Poly {
    let small = hash::sample_seed_poly(ring, label, seed, bounds);
    let mut out = Poly::zero(ring.n, Basis::Evaluation);
    let (lo, hi) = if lower { (0, n_cols / 2) } else { (n_cols / 2, n_cols) };
    out.coeffs[lo..hi].copy_from_slice(&small.coeffs[lo..hi]);
    out
}

/// Constant packed half (the fixture shape used by the concrete scenarios).
pub fn packed_constant(ring: &Ring, n_cols: usize, lower: bool, value: i64) -> Poly {
    let mut out = Poly::zero(ring.n, Basis::Evaluation);
    let (lo, hi) = if lower { (0, n_cols / 2) } else { (n_cols / 2, n_cols) };
    for c in &mut out.coeffs[lo..hi] {
        *c = ring.lift_val(value);
    }
    out
}

/// The packing invariant: zero outside the allowed half of Ω.
pub fn check_packed_half_eval(p: &Poly, n_cols: usize, lower: bool) -> bool {
    debug_assert_eq!(p.basis, Basis::Evaluation);
    let (lo, hi) = if lower { (0, n_cols / 2) } else { (n_cols / 2, n_cols) };
    p.coeffs
        .iter()
        .enumerate()
        .all(|(i, &v)| (lo..hi).contains(&i) || v == 0)
}

/// Evaluation-domain polynomial with every slot in `[−B, B]`.
pub fn sample_bounded_eval(ring: &Ring, label: &str, seed: &[u8], b: u64) -> Poly {
    let p = hash::sample_seed_poly(ring, label, seed, SeedPolyBounds { bound: b as u32 });
    Poly { coeffs: p.coeffs, basis: Basis::Evaluation }
}

pub fn sample_secrets(ring: &Ring, params: &Params, seed: &[u8]) -> HolderSecrets {
    let bounds = SeedPolyBounds { bound: params.b as u32 };
    HolderSecrets {
        m1: sample_packed_half_eval(ring, params.n_cols, true, "m1", seed, bounds),
        m2: sample_packed_half_eval(ring, params.n_cols, false, "m2", seed, bounds),
        ru0: sample_bounded_eval(ring, "ru0", seed, params.b),
        ru1: sample_bounded_eval(ring, "ru1", seed, params.b),
        r: sample_bounded_eval(ring, "r", seed, params.b),
    }
}

/// Issuer challenge `(rI0, rI1)`, slots bounded by `B`.
#[derive(Debug, Clone)]
pub struct IssuerChallenge {
    pub ri0: Poly,
    pub ri1: Poly,
}

pub fn issuer_challenge(ring: &Ring, params: &Params, rng: &mut impl Rng) -> IssuerChallenge {
    let b = params.b as i64;
    let mut draw = || Poly {
        coeffs: (0..ring.n).map(|_| ring.lift_val(rng.gen_range(-b..=b))).collect(),
        basis: Basis::Evaluation,
    };
    IssuerChallenge { ri0: draw(), ri1: draw() }
}

/// First message: `com = Ac·w`.
pub fn prepare_commit(
    ring: &Ring,
    setup: &PublicSetup,
    secrets: &HolderSecrets,
) -> Result<Vec<Poly>, IssuanceError> {
    let w = [
        secrets.m1.clone(),
        secrets.m2.clone(),
        secrets.ru0.clone(),
        secrets.ru1.clone(),
        secrets.r.clone(),
    ];
    Ok(hash::commit(ring, &setup.ac, &w)?)
}

/// Everything `ApplyChallenge` derives.
#[derive(Debug, Clone)]
pub struct Issuance {
    pub com: Vec<Poly>,
    pub r0: Poly,
    pub r1: Poly,
    pub k0: Poly,
    pub k1: Poly,
    /// Hash target in the evaluation basis.
    pub t_ntt: Poly,
    /// Issuer-signable centered coefficients.
    pub t_coeffs: Vec<i64>,
}

/// Fold the issuer challenge: slot-wise centered wrap with carries, then the
/// BBS hash over the combined randomness.
pub fn apply_challenge(
    ring: &Ring,
    params: &Params,
    setup: &PublicSetup,
    secrets: &HolderSecrets,
    challenge: &IssuerChallenge,
) -> Result<Issuance, IssuanceError> {
    let com = prepare_commit(ring, setup, secrets)?;
    let wrap = |ru: &Poly, ri: &Poly| -> (Poly, Poly) {
        let mut r_vals = Vec::with_capacity(ring.n);
        let mut k_vals = Vec::with_capacity(ring.n);
        for (&a, &b) in ru.coeffs.iter().zip(&ri.coeffs) {
            let v = ring.center_val(a) + ring.center_val(b);
            let (r, k) = center_bounded(v, params.b);
            r_vals.push(r);
            k_vals.push(k);
        }
        (ring.lift(&r_vals, Basis::Evaluation), ring.lift(&k_vals, Basis::Evaluation))
    };
    let (r0, k0) = wrap(&secrets.ru0, &challenge.ri0);
    let (r1, k1) = wrap(&secrets.ru1, &challenge.ri1);

    let m = ring.add(&secrets.m1, &secrets.m2)?;
    let t_ntt = hash::bbs_hash(ring, &setup.bbs, &m, &r0, &r1)?;
    let t_coeffs = ring.center(&ring.to_coeff(&t_ntt));
    debug!(n = ring.n, "challenge applied, hash target derived");

    Ok(Issuance { com, r0, r1, k0, k1, t_ntt, t_coeffs })
}

// ===========================================================================
// Statement assembly
// ===========================================================================

fn omega_slots(p: &Poly, n_cols: usize) -> Vec<u64> {
    debug_assert_eq!(p.basis, Basis::Evaluation);
    p.coeffs[..n_cols].to_vec()
}

/// Row references shared by the issuance and showing statements.
pub struct CredentialRows {
    pub m1: RowRef,
    pub m2: RowRef,
    pub ru0: RowRef,
    pub ru1: RowRef,
    pub r: RowRef,
    pub r0: RowRef,
    pub r1: RowRef,
    pub k0: RowRef,
    pub k1: RowRef,
    pub b_rows: [RowRef; 4],
}

/// Push the credential witness rows and the 19 parallel constraints of the
/// pre-signature statement; `t_row` is the hash-target row (public at
/// issuance, witness at showing).
pub fn push_credential_constraints(
    st: &mut Statement,
    ring: &Ring,
    params: &Params,
    setup: &PublicSetup,
    secrets: &HolderSecrets,
    iss: &Issuance,
    challenge: &IssuerChallenge,
    t_row: RowRef,
) -> Result<CredentialRows, IssuanceError> {
    let q = ring.q;
    let nc = params.n_cols;
    if !check_packed_half_eval(&secrets.m1, nc, true) {
        return Err(IssuanceError::Packing("m1"));
    }
    if !check_packed_half_eval(&secrets.m2, nc, false) {
        return Err(IssuanceError::Packing("m2"));
    }

    // --- witness rows
    let m1 = st.add_witness("m1", omega_slots(&secrets.m1, nc))?;
    let m2 = st.add_witness("m2", omega_slots(&secrets.m2, nc))?;
    let ru0 = st.add_witness("ru0", omega_slots(&secrets.ru0, nc))?;
    let ru1 = st.add_witness("ru1", omega_slots(&secrets.ru1, nc))?;
    let r = st.add_witness("r", omega_slots(&secrets.r, nc))?;
    let r0 = st.add_witness("r0", omega_slots(&iss.r0, nc))?;
    let r1 = st.add_witness("r1", omega_slots(&iss.r1, nc))?;
    let k0 = st.add_witness("k0", omega_slots(&iss.k0, nc))?;
    let k1 = st.add_witness("k1", omega_slots(&iss.k1, nc))?;
    let w_refs = [m1, m2, ru0, ru1, r];

    // --- public rows
    let mut ac_refs = Vec::with_capacity(setup.ac.len());
    for (i, row) in setup.ac.iter().enumerate() {
        let mut refs = Vec::with_capacity(row.len());
        for (j, a) in row.iter().enumerate() {
            refs.push(st.add_public(format!("ac[{i}][{j}]"), omega_slots(a, nc))?);
        }
        ac_refs.push(refs);
    }
    let mut com_refs = Vec::with_capacity(iss.com.len());
    for (i, c) in iss.com.iter().enumerate() {
        com_refs.push(st.add_public(format!("com[{i}]"), omega_slots(c, nc))?);
    }
    let b_rows = [
        st.add_public("bbs.b0", omega_slots(&setup.bbs[0], nc))?,
        st.add_public("bbs.b1", omega_slots(&setup.bbs[1], nc))?,
        st.add_public("bbs.b2", omega_slots(&setup.bbs[2], nc))?,
        st.add_public("bbs.b3", omega_slots(&setup.bbs[3], nc))?,
    ];
    let ri0 = st.add_public("ri0", omega_slots(&challenge.ri0, nc))?;
    let ri1 = st.add_public("ri1", omega_slots(&challenge.ri1, nc))?;
    let sel_hi = {
        let vals = (0..nc).map(|i| u64::from(i >= nc / 2)).collect();
        st.add_public("sel_hi", vals)?
    };
    let sel_lo = {
        let vals = (0..nc).map(|i| u64::from(i < nc / 2)).collect();
        st.add_public("sel_lo", vals)?
    };

    // honest inputs must already sit inside [−B, B] on Ω
    for row in [m1, m2, ru0, ru1, r, r0, r1] {
        if let RowRef::Witness(i) = row {
            for &x in &st.witness_rows[i].values {
                let c = if 2 * x > q { x as i64 - q as i64 } else { x as i64 };
                if c.unsigned_abs() > params.b {
                    return Err(IssuanceError::BoundViolation(c));
                }
            }
        }
    }

    // --- constraints (5 commit + 2 wrap + 1 hash + 2 packing + 9 membership)
    for (i, row) in ac_refs.iter().enumerate() {
        st.commit_residual(i, com_refs[i], row, &w_refs, q);
    }
    st.centered_wrap(0, ru0, ri0, r0, k0, params.b, q);
    st.centered_wrap(1, ru1, ri1, r1, k1, params.b, q);
    st.hash_equation(t_row, b_rows, m1, m2, r0, r1, q);
    st.packing("pack.m1", sel_hi, m1);
    st.packing("pack.m2", sel_lo, m2);
    st.carry_membership(0, k0, q);
    st.carry_membership(1, k1, q);
    for (name, row) in [
        ("m1", m1),
        ("m2", m2),
        ("ru0", ru0),
        ("ru1", ru1),
        ("r", r),
        ("r0", r0),
        ("r1", r1),
    ] {
        add_bound_membership(st, name, row, params)?;
    }

    Ok(CredentialRows { m1, m2, ru0, ru1, r, r0, r1, k0, k1, b_rows })
}

/// Signed base-`2^W` digits of `v`, least significant first.
pub fn signed_digits(mut v: i64, w_bits: u32, l: usize) -> Vec<i64> {
    let base = 1i64 << w_bits;
    let half = base >> 1;
    let mut out = Vec::with_capacity(l);
    for _ in 0..l {
        let d = (v + half).rem_euclid(base) - half;
        out.push(d);
        v = (v - d) >> w_bits;
    }
    out
}

/// Bound membership for one row: the exact `2B+1`-point product when it fits
/// the window, otherwise the digit chain (digit rows + recomposition).
pub fn add_bound_membership(
    st: &mut Statement,
    name: &str,
    row: RowRef,
    params: &Params,
) -> Result<(), IssuanceError> {
    let q = params.q;
    let b = params.b;
    let bits = 64 - (2 * b).leading_zeros(); // ⌈log₂(2B+1)⌉
    if params.l_digits == 0 && bits <= params.w_bits {
        st.bound_range_product(format!("{name}.range"), row, b, q);
        return Ok(());
    }
    let w = params.w_bits;
    let l = if params.l_digits > 0 { params.l_digits } else { bits.div_ceil(w) as usize };
    // digit rows carry the decomposition of the row's centered values
    let values: Vec<i64> = match row {
        RowRef::Witness(i) => st.witness_rows[i]
            .values
            .iter()
            .map(|&x| if 2 * x > q { x as i64 - q as i64 } else { x as i64 })
            .collect(),
        RowRef::Public(_) => return Ok(()), // bounds bind witnesses only
    };
    let mut digit_refs = Vec::with_capacity(l);
    for di in 0..l {
        let vals: Vec<u64> = values
            .iter()
            .map(|&v| signed_digits(v, w, l)[di].rem_euclid(q as i64) as u64)
            .collect();
        digit_refs.push(st.add_witness(format!("{name}.d{di}"), vals)?);
    }
    st.bound_digit_chain(name, row, &digit_refs, w, q);
    Ok(())
}

/// The full pre-signature statement (hash target public).
pub fn issuance_statement(
    ring: &Ring,
    params: &Params,
    setup: &PublicSetup,
    secrets: &HolderSecrets,
    iss: &Issuance,
    challenge: &IssuerChallenge,
) -> Result<Statement, IssuanceError> {
    let mut st = Statement::new(params.n_cols);
    let t_row = st.add_public("t", omega_slots(&iss.t_ntt, params.n_cols))?;
    push_credential_constraints(&mut st, ring, params, setup, secrets, iss, challenge, t_row)?;
    st.check_refs()?;
    st.check_degree_cap(params.ell, params.n)?;
    Ok(st)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn fixture() -> (Ring, Params, PublicSetup, HolderSecrets, IssuerChallenge, Issuance) {
        let params = Params::credential_default();
        let ring = params.ring().unwrap();
        let setup = setup_pub(&ring);
        let secrets = sample_secrets(&ring, &params, b"holder-seed");
        let mut rng = ChaCha20Rng::seed_from_u64(41);
        let challenge = issuer_challenge(&ring, &params, &mut rng);
        let iss = apply_challenge(&ring, &params, &setup, &secrets, &challenge).unwrap();
        (ring, params, setup, secrets, challenge, iss)
    }

    fn setup_pub(ring: &Ring) -> PublicSetup {
        setup(ring, b"system-seed")
    }

    #[test]
    fn packed_halves_hold() {
        let (_, params, _, secrets, _, _) = fixture();
        assert!(check_packed_half_eval(&secrets.m1, params.n_cols, true));
        assert!(check_packed_half_eval(&secrets.m2, params.n_cols, false));
        assert!(!check_packed_half_eval(&secrets.m1, params.n_cols, false));
    }

    #[test]
    fn wrap_identity_holds_per_slot() {
        let (ring, params, _, secrets, challenge, iss) = fixture();
        let m = 2 * params.b as i64 + 1;
        for i in 0..ring.n {
            let ru = ring.center_val(secrets.ru0.coeffs[i]);
            let ri = ring.center_val(challenge.ri0.coeffs[i]);
            let r = ring.center_val(iss.r0.coeffs[i]);
            let k = ring.center_val(iss.k0.coeffs[i]);
            assert!((-(params.b as i64)..=params.b as i64).contains(&r));
            assert!((-1..=1).contains(&k));
            assert_eq!(ru + ri, r + m * k);
        }
    }

    #[test]
    fn issuance_statement_is_satisfied_with_19_constraints() {
        let (ring, params, setup, secrets, challenge, iss) = fixture();
        let st = issuance_statement(&ring, &params, &setup, &secrets, &iss, &challenge).unwrap();
        assert_eq!(st.parallel_count(), 19);
        assert!(st.aggregated.is_empty());
        assert!(st.is_satisfied(ring.q));
    }

    #[test]
    fn forbidden_half_value_breaks_packing() {
        let (ring, params, setup, secrets, challenge, iss) = fixture();
        let mut st = issuance_statement(&ring, &params, &setup, &secrets, &iss, &challenge).unwrap();
        // m2 forbidden (lower) half
        st.witness_rows[1].values[0] = 5;
        assert!(!st.is_satisfied(ring.q));
    }

    #[test]
    fn signed_digit_recomposition() {
        for v in -36i64..=27 {
            let d = signed_digits(v, 3, 2);
            assert_eq!(v, d[0] + 8 * d[1]);
            assert!(d.iter().all(|&x| (-4..4).contains(&x)));
        }
    }
}
