//! Showing end-to-end: credential + signature + PRF tag, with the
//! tag/packing/hash rejections. Runs at `N = 256` so the 98-lane PRF trace
//! stays tractable.

use anyhow::Result;
use latcred::ext::ExtField;
use latcred::issuance::{apply_challenge, issuer_challenge, sample_secrets, setup};
use latcred::keygen::{keygen, KeygenOpts};
use latcred::params::Params;
use latcred::prf::PrfParams;
use latcred::report::SoundnessReport;
use latcred::sampler::{PreimageSampler, SignOpts};
use latcred::showing::{showing_statement, Prover, ShowingInputs, Verifier, VerifyError};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn show_params() -> Params {
    let mut p = Params::credential_default();
    p.n = 256;
    p.ell = 6;
    p.ell_prime = 2;
    p.eta = 2;
    p.theta = 2;
    p.kappa = [0, 0, 0, 0];
    p.validate().unwrap();
    p
}

struct Fixture {
    ring: latcred::ring::Ring,
    params: Params,
    st: latcred::piop::Statement,
    tag: Vec<u64>,
}

/// Full pipeline: keygen → issuance → sign → showing statement, with the
/// Poseidon-2 width `t = 98` (`RF = 8`, `RP = 10`).
fn showing_fixture(seed: u64) -> Result<Fixture> {
    init_tracing();
    let params = show_params();
    let ring = params.ring()?;
    let mut rng = ChaCha20Rng::seed_from_u64(seed);

    let pub_setup = setup(&ring, b"show-system");
    let secrets = sample_secrets(&ring, &params, b"show-holder");
    let challenge = issuer_challenge(&ring, &params, &mut rng);
    let iss = apply_challenge(&ring, &params, &pub_setup, &secrets, &challenge)?;

    let key = keygen(&ring, &KeygenOpts::default(), &mut rng)?;
    let sign_opts = SignOpts { slack: 1e6, ..SignOpts::default() };
    let sampler = PreimageSampler::new(&ring, &key, sign_opts)?;
    let sig = sampler.sign(&iss.t_coeffs, &mut rng)?;

    // t = lenkey + lennonce = 4 + 94 = 98
    let prf = PrfParams::derive(b"show-prf", params.q, 4, 94, 4, 8, 10)?;
    let nonce: Vec<u64> = (0..94).map(|i| 1000 + i as u64).collect();
    let inputs = ShowingInputs { h: &key.h, sig: &sig, prf: &prf, nonce: &nonce };
    let (st, tag) =
        showing_statement(&ring, &params, &pub_setup, &secrets, &iss, &challenge, &inputs)?;
    Ok(Fixture { ring, params, st, tag })
}

#[test]
fn showing_proof_round_trip_with_prf_tag() -> Result<()> {
    let fx = showing_fixture(81)?;
    assert!(fx.st.is_satisfied(fx.ring.q), "honest showing statement must satisfy");
    assert_eq!(fx.tag.len(), 4);

    let report = SoundnessReport::compute(&fx.params, &fx.st);
    assert!(report.aggregated_constraints > 0);
    assert!(report.witness_rows > 1000, "the 98-lane trace dominates the row count");

    let ext = ExtField::new(fx.params.theta, fx.params.q)?;
    let mut rng = ChaCha20Rng::seed_from_u64(82);
    let proof = Prover::new(&fx.ring, &fx.params, ext).prove(&fx.st, &mut rng)?;
    Verifier::new(&fx.ring, &fx.params, ext).verify(&fx.st, &proof)?;
    Ok(())
}

/// Changing one lane of the public tag must break verification.
#[test]
fn tag_lane_tamper_rejects() -> Result<()> {
    let mut fx = showing_fixture(83)?;
    let tag0 = fx
        .st
        .public_rows
        .iter()
        .position(|r| r.name == "prf.tag[0]")
        .unwrap();
    for v in fx.st.public_rows[tag0].values.iter_mut() {
        *v = (*v + 1) % fx.ring.q;
    }
    assert!(!fx.st.is_satisfied(fx.ring.q));

    let ext = ExtField::new(fx.params.theta, fx.params.q)?;
    let mut rng = ChaCha20Rng::seed_from_u64(84);
    let proof = Prover::new(&fx.ring, &fx.params, ext).prove(&fx.st, &mut rng)?;
    assert!(matches!(
        Verifier::new(&fx.ring, &fx.params, ext).verify(&fx.st, &proof),
        Err(VerifyError::ConstraintMismatch(_))
    ));
    Ok(())
}

/// Changing a hidden `m₂` slot while keeping the (now-witness) hash target
/// fixed must break the hash equation.
#[test]
fn hash_mismatch_rejects() -> Result<()> {
    let mut fx = showing_fixture(85)?;
    let m2 = fx.st.witness_rows.iter().position(|r| r.name == "m2").unwrap();
    let hi = fx.params.n_cols / 2; // allowed half, so only the hash breaks
    fx.st.witness_rows[m2].values[hi] = (fx.st.witness_rows[m2].values[hi] + 1) % fx.ring.q;
    assert!(!fx.st.is_satisfied(fx.ring.q));

    let ext = ExtField::new(fx.params.theta, fx.params.q)?;
    let mut rng = ChaCha20Rng::seed_from_u64(86);
    let proof = Prover::new(&fx.ring, &fx.params, ext).prove(&fx.st, &mut rng)?;
    assert!(Verifier::new(&fx.ring, &fx.params, ext).verify(&fx.st, &proof).is_err());
    Ok(())
}

/// The signature equation ties `U` to the hidden target: tampering `s1`
/// breaks it.
#[test]
fn signature_row_tamper_rejects() -> Result<()> {
    let mut fx = showing_fixture(87)?;
    let s1 = fx.st.witness_rows.iter().position(|r| r.name == "u.s1").unwrap();
    fx.st.witness_rows[s1].values[0] = (fx.st.witness_rows[s1].values[0] + 1) % fx.ring.q;
    assert!(!fx.st.is_satisfied(fx.ring.q));

    let ext = ExtField::new(fx.params.theta, fx.params.q)?;
    let mut rng = ChaCha20Rng::seed_from_u64(88);
    let proof = Prover::new(&fx.ring, &fx.params, ext).prove(&fx.st, &mut rng)?;
    assert!(Verifier::new(&fx.ring, &fx.params, ext).verify(&fx.st, &proof).is_err());
    Ok(())
}
