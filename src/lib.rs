//! Crate root: public surface and protocol-wide invariants
//!
//! `latcred` is the cryptographic core of a lattice-based anonymous
//! credential system: a two-phase protocol (issuance, showing) whose proofs
//! are Polynomial IOPs compiled through a Merkle-committed linear-code
//! commitment and bound by Fiat–Shamir.
//!
//! ## Invariants
//!
//! - **Ring.** `Rq = Zq[X]/(X^N + 1)` with `N` a power of two and a prime
//!   `q ≡ 1 (mod 2N)`; elements carry an explicit basis flag, and
//!   multiplication exists only pointwise in the evaluation basis.
//! - **Trapdoor.** Keygen accepts a candidate only on the exact integer
//!   identity `f·G − g·F = q`; the preimage sampler guarantees
//!   `h·s₁ + s₀ ≡ T (mod q)` and the big-float norm predicate
//!   `‖(s₁, s₀)‖² ≤ 2N·(slack·σ)²`.
//! - **Fiat–Shamir.** BLAKE3 with explicit domain separation,
//!   length-delimited absorbs and an XOF for challenges; the challenge order
//!   is fixed and each round may carry a grinding nonce. Prover and verifier
//!   replay the exact same byte schedule.
//! - **Failure mode.** Typed errors throughout (`thiserror`); the sampler
//!   retries silently only on norm/residual rejections, verification never
//!   retries and returns the first matching diagnostic.
//!
//! The crate is `forbid(unsafe_code)` end to end.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

/// Arbitrary-precision binary floats and complex pairs (trapdoor reductions).
pub mod bigfloat;
/// Persisted JSON artifacts: credential state, signature bundles.
pub mod bundle;
/// Twisted complex FFT embeddings (256-bit and `f64` paths).
pub mod cfft;
/// Extension scalars `Kθ` for challenge amplification.
pub mod ext;
/// BBS ring hash, Ajtai commitment, seed-polynomial sampling.
pub mod hash;
/// Two-message issuance flow and the pre-signature statement.
pub mod issuance;
/// Annulus trapdoor keygen.
pub mod keygen;
/// LVCS/DECS Merkle-committed row commitment.
pub mod lvcs;
/// Salted blake3 Merkle tree.
pub mod merkle;
/// Protocol parameters and validation.
pub mod params;
/// Constraint system and PIOP builder.
pub mod piop;
/// Poseidon-2 trace plumbing.
pub mod prf;
/// Soundness and layout bookkeeping.
pub mod report;
/// Ring and transform primitives over `Rq`.
pub mod ring;
/// Hybrid two-step preimage sampler.
pub mod sampler;
/// Showing statement, prover and verifier.
pub mod showing;
/// NTRU trapdoor solver.
pub mod solver;
/// Fiat–Shamir transcript with grinding.
pub mod transcript;

pub use ext::{ExtElem, ExtField};
pub use keygen::{keygen, KeygenOpts, TrapdoorKey};
pub use params::Params;
pub use piop::Statement;
pub use ring::{Basis, Poly, Ring};
pub use sampler::{PreimageSampler, SignOpts};
pub use showing::{Proof, Prover, Verifier};

/// Default Fiat–Shamir security parameter.
pub const SECURITY_LAMBDA: usize = params::DEFAULT_LAMBDA;
