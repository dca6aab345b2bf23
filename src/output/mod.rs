//! Output file ownership and verification module

pub mod verifier;
pub mod writer;

pub use verifier::{OutputVerifier, VerificationReport};
pub use writer::{OutputTarget, PartialOutput};
