use rand::{Rng, RngCore};
use rand_core::OsRng;

use crate::model::session;

/// 128 random bits, hex encoded.
pub fn generate_session_id() -> session::Id {
    let mut rng = OsRng::default();
    format!("{:016x}{:016x}", rng.next_u64(), rng.next_u64())
}

/// `length` random lowercase ASCII letters.
///
/// Not collision free: two uploads can draw the same name.
pub fn random_name(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect()
}
