use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

/// `len` bytes from the thread-local CSPRNG.
pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// `len` random bytes encoded as unpadded base64url.
pub(crate) fn random_urlsafe(len: usize) -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(len))
}
