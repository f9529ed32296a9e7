//! Issuance scenarios at the working instance `N = 1024, q = 1 038 337`:
//! the constant-secret fixture, its pre-signature proof, the packing /
//! hash-target rejections, and the ℓ∞ digit-chain membership path.

use anyhow::Result;
use latcred::ext::ExtField;
use latcred::issuance::{
    apply_challenge, check_packed_half_eval, issuance_statement, packed_constant, setup,
    HolderSecrets, IssuerChallenge,
};
use latcred::params::Params;
use latcred::ring::{Basis, Poly, Ring};
use latcred::showing::{Prover, Verifier, VerifyError};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn working_params() -> Params {
    let mut p = Params::credential_default();
    p.n = 1024;
    p.q = 1_038_337;
    p.b = 8;
    p.n_cols = 8;
    p.ell = 16;
    p.validate().unwrap();
    p
}

fn constant_eval(ring: &Ring, v: i64) -> Poly {
    Poly { coeffs: vec![ring.lift_val(v); ring.n], basis: Basis::Evaluation }
}

/// The constant-secret fixture: `m₁ = 1` on the lower half, `m₂ = 2` on the
/// upper half, `rU0 = 3`, `rU1 = 4`, `r = 1`, issuer challenge `1`.
fn constant_fixture(
    params: &Params,
) -> Result<(Ring, latcred::issuance::PublicSetup, HolderSecrets, IssuerChallenge, latcred::issuance::Issuance)>
{
    init_tracing();
    let ring = params.ring()?;
    let pub_setup = setup(&ring, b"issuer-system");
    let secrets = HolderSecrets {
        m1: packed_constant(&ring, params.n_cols, true, 1),
        m2: packed_constant(&ring, params.n_cols, false, 2),
        ru0: constant_eval(&ring, 3),
        ru1: constant_eval(&ring, 4),
        r: constant_eval(&ring, 1),
    };
    let challenge = IssuerChallenge {
        ri0: constant_eval(&ring, 1),
        ri1: constant_eval(&ring, 1),
    };
    let iss = apply_challenge(&ring, params, &pub_setup, &secrets, &challenge)?;
    Ok((ring, pub_setup, secrets, challenge, iss))
}

#[test]
fn constant_fixture_combines_as_expected() -> Result<()> {
    let params = working_params();
    let (ring, _, secrets, _, iss) = constant_fixture(&params)?;

    assert!(check_packed_half_eval(&secrets.m1, params.n_cols, true));
    assert!(check_packed_half_eval(&secrets.m2, params.n_cols, false));

    // combined r0 = 4, r1 = 5, carries zero
    for i in 0..ring.n {
        assert_eq!(ring.center_val(iss.r0.coeffs[i]), 4);
        assert_eq!(ring.center_val(iss.r1.coeffs[i]), 5);
        assert_eq!(iss.k0.coeffs[i], 0);
        assert_eq!(iss.k1.coeffs[i], 0);
    }
    Ok(())
}

#[test]
fn presignature_proof_verifies_with_19_parallel_constraints() -> Result<()> {
    let params = working_params();
    let (ring, pub_setup, secrets, challenge, iss) = constant_fixture(&params)?;
    let st = issuance_statement(&ring, &params, &pub_setup, &secrets, &iss, &challenge)?;

    // 5 (commit) + 2 (center) + 1 (hash) + 2 (packing) + 9 (membership)
    assert_eq!(st.parallel_count(), 19);
    assert!(st.is_satisfied(ring.q));

    let ext = ExtField::new(params.theta, params.q)?;
    let mut rng = ChaCha20Rng::seed_from_u64(71);
    let proof = Prover::new(&ring, &params, ext).prove(&st, &mut rng)?;
    Verifier::new(&ring, &params, ext).verify(&st, &proof)?;
    Ok(())
}

/// With `l_digits > 0` the membership gadget switches from the exact range
/// product to the ℓ∞ digit chain: per bounded row, `L` digit rows with
/// `2^W`-point products plus the recomposition tie. The chain must accept
/// honest witnesses, survive a prove/verify round-trip, and reject a
/// tampered digit.
#[test]
fn digit_chain_membership_round_trip() -> Result<()> {
    let mut params = working_params();
    params.w_bits = 3;
    params.l_digits = 2; // L·W = 6 ≥ ⌈log₂(2B+1)⌉ = 5
    params.validate().unwrap();

    let (ring, pub_setup, secrets, challenge, iss) = constant_fixture(&params)?;
    let st = issuance_statement(&ring, &params, &pub_setup, &secrets, &iss, &challenge)?;

    // 12 base constraints plus, per bounded row, 2 digit products + 1
    // recomposition for the seven bounded rows.
    assert_eq!(st.parallel_count(), 12 + 7 * 3);
    assert!(st.witness_rows.iter().any(|r| r.name == "ru0.d0"));
    assert!(st.witness_rows.iter().any(|r| r.name == "r1.d1"));
    assert!(st.is_satisfied(ring.q));

    let ext = ExtField::new(params.theta, params.q)?;
    let mut rng = ChaCha20Rng::seed_from_u64(76);
    let proof = Prover::new(&ring, &params, ext).prove(&st, &mut rng)?;
    Verifier::new(&ring, &params, ext).verify(&st, &proof)?;

    // a digit outside [−2^{W−1}, 2^{W−1}) breaks both the digit product and
    // the recomposition
    let mut bad = st.clone();
    let d0 = bad.witness_rows.iter().position(|r| r.name == "ru0.d0").unwrap();
    bad.witness_rows[d0].values[1] = ring.lift_val(4);
    assert!(!bad.is_satisfied(ring.q));
    let mut rng = ChaCha20Rng::seed_from_u64(77);
    let proof = Prover::new(&ring, &params, ext).prove(&bad, &mut rng)?;
    assert!(matches!(
        Verifier::new(&ring, &params, ext).verify(&bad, &proof),
        Err(VerifyError::ConstraintMismatch(_))
    ));
    Ok(())
}

/// Flipping one NTT slot of `m₂` into its forbidden half must break the
/// proof.
#[test]
fn forbidden_half_slot_rejects() -> Result<()> {
    let params = working_params();
    let (ring, pub_setup, secrets, challenge, iss) = constant_fixture(&params)?;
    let mut st = issuance_statement(&ring, &params, &pub_setup, &secrets, &iss, &challenge)?;
    let m2 = st.witness_rows.iter().position(|r| r.name == "m2").unwrap();
    st.witness_rows[m2].values[1] = 2; // lower half is forbidden for m2
    assert!(!st.is_satisfied(ring.q));

    let ext = ExtField::new(params.theta, params.q)?;
    let mut rng = ChaCha20Rng::seed_from_u64(72);
    let proof = Prover::new(&ring, &params, ext).prove(&st, &mut rng)?;
    assert!(matches!(
        Verifier::new(&ring, &params, ext).verify(&st, &proof),
        Err(VerifyError::ConstraintMismatch(_))
    ));
    Ok(())
}

/// Tampering the public hash target `T[0]` by +1 must break the proof.
#[test]
fn tampered_public_target_rejects() -> Result<()> {
    let params = working_params();
    let (ring, pub_setup, secrets, challenge, iss) = constant_fixture(&params)?;
    let mut st = issuance_statement(&ring, &params, &pub_setup, &secrets, &iss, &challenge)?;
    let t = st.public_rows.iter().position(|r| r.name == "t").unwrap();
    st.public_rows[t].values[0] = (st.public_rows[t].values[0] + 1) % ring.q;
    assert!(!st.is_satisfied(ring.q));

    let ext = ExtField::new(params.theta, params.q)?;
    let mut rng = ChaCha20Rng::seed_from_u64(73);
    let proof = Prover::new(&ring, &params, ext).prove(&st, &mut rng)?;
    assert!(matches!(
        Verifier::new(&ring, &params, ext).verify(&st, &proof),
        Err(VerifyError::ConstraintMismatch(_))
    ));
    Ok(())
}

/// A witness coefficient outside `[−B, B]` must break the proof.
#[test]
fn out_of_bound_witness_rejects() -> Result<()> {
    let params = working_params();
    let (ring, pub_setup, secrets, challenge, iss) = constant_fixture(&params)?;
    let mut st = issuance_statement(&ring, &params, &pub_setup, &secrets, &iss, &challenge)?;
    let ru0 = st.witness_rows.iter().position(|r| r.name == "ru0").unwrap();
    st.witness_rows[ru0].values[2] = ring.lift_val(params.b as i64 + 1);
    assert!(!st.is_satisfied(ring.q));

    let ext = ExtField::new(params.theta, params.q)?;
    let mut rng = ChaCha20Rng::seed_from_u64(74);
    let proof = Prover::new(&ring, &params, ext).prove(&st, &mut rng)?;
    assert!(Verifier::new(&ring, &params, ext).verify(&st, &proof).is_err());
    Ok(())
}

/// Every single-byte tamper of the serialized proof must be rejected.
#[test]
fn transcript_binding_over_serialized_proof() -> Result<()> {
    let params = working_params();
    let (ring, pub_setup, secrets, challenge, iss) = constant_fixture(&params)?;
    let st = issuance_statement(&ring, &params, &pub_setup, &secrets, &iss, &challenge)?;
    let ext = ExtField::new(params.theta, params.q)?;
    let mut rng = ChaCha20Rng::seed_from_u64(75);
    let proof = Prover::new(&ring, &params, ext).prove(&st, &mut rng)?;
    let verifier = Verifier::new(&ring, &params, ext);
    verifier.verify(&st, &proof)?;

    // root byte
    let mut bad = proof.clone();
    bad.commitment.root[7] ^= 0x20;
    assert!(verifier.verify(&st, &bad).is_err());

    // an oracle value
    let mut bad = proof.clone();
    bad.evals[0][0].c1 = (bad.evals[0][0].c1 + 1) % params.q;
    assert!(verifier.verify(&st, &bad).is_err());

    // a DECS coefficient
    let mut bad = proof.clone();
    bad.decs_rows[1][3].c0 = (bad.decs_rows[1][3].c0 + 1) % params.q;
    assert!(verifier.verify(&st, &bad).is_err());

    // an opened tail value
    let mut bad = proof.clone();
    bad.openings[2].values[0] = (bad.openings[2].values[0] + 1) % params.q;
    assert!(verifier.verify(&st, &bad).is_err());

    // a grinding nonce
    let mut bad = proof;
    bad.grind[0] = bad.grind[0].wrapping_add(1);
    assert!(verifier.verify(&st, &bad).is_err());
    Ok(())
}
