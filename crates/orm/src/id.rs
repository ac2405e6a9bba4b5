//! Client-side row identifiers
//!
//! Identifiers are generated before insert, so a collision surfaces as a unique
//! violation from the database and is handled by retrying with a fresh id.

use rand::Rng;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of generated identifiers
pub const ID_LENGTH: usize = 24;

/// Generate a random identifier: a lowercase letter followed by base36 characters.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let mut id = String::with_capacity(ID_LENGTH);

    id.push(char::from(b'a' + rng.gen_range(0..26u8)));
    for _ in 1..ID_LENGTH {
        id.push(char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]));
    }

    id
}
