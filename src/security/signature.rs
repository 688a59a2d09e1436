use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes the HMAC-SHA256 tag of `message` under `secret`.
pub fn hmac_sha256(secret: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Checks `signature` against the HMAC-SHA256 of `message` in constant time.
pub fn verify_hmac_sha256(secret: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let expected = hmac_sha256(secret, message);
    constant_time_equal(&expected, signature)
}

/// Generates a nonce from 32 cryptographically secure random bytes
///
/// # Returns
/// * `String` - A 64-character hex-encoded string
pub fn generate_nonce() -> String {
    let mut nonce_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut nonce_bytes);
    hex::encode(nonce_bytes)
}

/// Compares two byte slices in constant time.
///
/// Slices of different length compare unequal.
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
