pub mod identity_handler;
pub mod nonce_handler;

pub use identity_handler::get_identity;
pub use nonce_handler::issue_nonce;
