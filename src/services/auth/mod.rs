//! Bearer token authentication: nonce issuance, issuer secrets and token verification.

pub mod nonce_store;
pub mod secret_resolver;
pub mod token_signer;
pub mod token_verifier;

pub use nonce_store::{IssuedNonce, NonceStore};
pub use secret_resolver::{IssuerSecret, SecretResolver, StaticSecretResolver};
pub use token_signer::{create_token, sign_token};
pub use token_verifier::{TokenVerifier, VerifierOptions};
