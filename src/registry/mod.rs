pub mod verifier;

pub use verifier::{ArtifactIdentity, RegistryVerifier, Verification};
