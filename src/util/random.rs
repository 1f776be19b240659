use crate::core::types::{ConcurrencyToken, ReferenceId};

pub trait FromRandom {
    fn from_random() -> Self;
}

impl FromRandom for ConcurrencyToken {
    fn from_random() -> Self {
        ConcurrencyToken(random_string(36))
    }
}

impl FromRandom for ReferenceId {
    fn from_random() -> Self {
        ReferenceId(random_string(64))
    }
}

impl ConcurrencyToken {
    pub fn generate() -> Self {
        Self::from_random()
    }

    /// A fresh token guaranteed to differ from `previous`.
    pub fn replacing(previous: &ConcurrencyToken) -> Self {
        loop {
            let token = Self::from_random();
            if &token != previous {
                return token;
            }
        }
    }
}

/// A random textual primary key short enough for a 50 character key column.
pub fn random_key() -> String {
    random_string(36)
}

/// Base64 encoding of `size` random alphanumerics, so the result is
/// `ceil(size * 4 / 3)` characters long.
fn random_string(size: usize) -> String {
    use rand::Rng;

    let s: String = rand::thread_rng()
        .sample_iter(rand::distributions::Alphanumeric)
        .take(size)
        .map(|b| b as char)
        .collect();
    base64::encode_config(s, base64::URL_SAFE_NO_PAD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validation::{MAX_CONCURRENCY_TOKEN_LENGTH, MAX_KEY_LENGTH};

    #[test]
    fn generated_values_fit_their_columns() {
        assert_eq!(random_key().len(), 48);
        assert!(random_key().len() <= MAX_KEY_LENGTH);
        assert!(ConcurrencyToken::generate().0.len() <= MAX_CONCURRENCY_TOKEN_LENGTH);
    }

    #[test]
    fn reference_ids_are_longer_than_keys() {
        let reference = ReferenceId::from_random();
        assert_eq!(reference.0.len(), 86);
    }

    #[test]
    fn replacement_token_differs() {
        let token = ConcurrencyToken::generate();
        assert_ne!(ConcurrencyToken::replacing(&token), token);
    }
}
