
use rand::{thread_rng, Rng};

use crate::candidate::CREDENTIAL_LEN;

// Restricted alphanumeric alphabet for locally generated ufrag/pwd-shaped
// credentials.
const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates an 8-byte printable ASCII credential.
pub(crate) fn generate_credential() -> String {
    let mut rng = thread_rng();
    (0..CREDENTIAL_LEN)
        .map(|_| RUNES_ALPHA[rng.gen_range(0..RUNES_ALPHA.len())] as char)
        .collect()
}

/// Generates a fresh 16-byte STUN transaction id for a triggered check.
pub(crate) fn generate_transaction_id() -> [u8; 16] {
    let mut rng = thread_rng();
    let mut id = [0u8; 16];
    rng.fill(&mut id);
    id
}
