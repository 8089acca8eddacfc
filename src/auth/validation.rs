//! Login and password rules checked before any account mutation.

pub const MIN_LOGIN_LENGTH: usize = 8;
/// Matches the width of every login column in `migrations/`.
pub const MAX_LOGIN_LENGTH: usize = 64;
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn is_login_valid(login: &str) -> bool {
    let length = login.chars().count();
    (MIN_LOGIN_LENGTH..=MAX_LOGIN_LENGTH).contains(&length)
        && login.chars().all(char::is_alphanumeric)
}

pub fn is_password_valid(password: &str) -> bool {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return false;
    }

    let (mut digit, mut upper, mut lower, mut special) = (false, false, false, false);
    let mut counted = 0;
    for c in password.chars() {
        if c.is_ascii_digit() {
            digit = true;
        } else if c.is_uppercase() {
            upper = true;
        } else if c.is_lowercase() {
            lower = true;
        } else if is_symbol(c) {
            special = true;
        } else if !c.is_alphabetic() {
            continue;
        }
        counted += 1;
    }

    counted >= MIN_PASSWORD_LENGTH && digit && upper && lower && special
}

pub fn are_credentials_valid(login: &str, password: &str) -> bool {
    is_login_valid(login) && is_password_valid(password)
}

fn is_symbol(c: char) -> bool {
    c.is_ascii_punctuation() || !(c.is_alphanumeric() || c.is_whitespace() || c.is_control())
}
