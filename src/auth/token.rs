use rand::{rngs::OsRng, Rng};

pub const TOKEN_LENGTH: usize = 64;

/// Draws from `[0, 127)` and keeps only `[0-9A-Za-z]`, so every accepted
/// character is equally likely.
pub fn generate_token() -> String {
    generate_token_with(&mut OsRng)
}

pub fn generate_token_with<R: Rng>(rng: &mut R) -> String {
    let mut token = String::with_capacity(TOKEN_LENGTH);
    while token.len() < TOKEN_LENGTH {
        let candidate: u8 = rng.gen_range(0..127);
        if candidate.is_ascii_alphanumeric() {
            token.push(char::from(candidate));
        }
    }
    token
}
