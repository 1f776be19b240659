use crate::core::types::{ClientSecret, HashedClientSecret, HashedReferenceId, ReferenceId};
use crate::store::Error;

use super::random::FromRandom;

#[derive(Debug)]
pub struct Salt(pub String);

impl FromRandom for Salt {
    fn from_random() -> Self {
        use rand::Rng;

        let salt: String = rand::thread_rng()
            .sample_iter(rand::distributions::Alphanumeric)
            .take(32)
            .map(|b| b as char)
            .collect();
        Salt(salt)
    }
}

/// Hashes credentials before they reach a store. Client secrets are salted
/// with argon2; token reference ids get an unsalted SHA-512 digest so they
/// can still be looked up by equality.
#[derive(Debug)]
pub struct HashingService {
    secret_key: String,
}

pub trait HashTo: AsRef<str> {
    type HashedType;
}

impl HashTo for ClientSecret {
    type HashedType = HashedClientSecret;
}

impl HashTo for ReferenceId {
    type HashedType = HashedReferenceId;
}

impl HashingService {
    pub fn with_secret_key(secret_key: String) -> Self {
        Self { secret_key }
    }

    fn get_config(&self) -> argon2::Config {
        let mut config = argon2::Config::default();
        config.secret = self.secret_key.as_bytes();
        config
    }

    pub fn hash<T, H>(&self, to_hash: &T) -> Result<H, Error>
    where
        T: HashTo<HashedType = H>,
        H: From<String>,
    {
        let salt = Salt::from_random();
        let hash = argon2::hash_encoded(
            to_hash.as_ref().as_bytes(),
            salt.0.as_bytes(),
            &self.get_config(),
        )?;

        Ok(hash.into())
    }

    pub fn verify<T, H>(&self, secret: &T, hashed: &H) -> Result<bool, Error>
    where
        T: HashTo<HashedType = H>,
        H: AsRef<str>,
    {
        let result = argon2::verify_encoded_ext(
            hashed.as_ref(),
            secret.as_ref().as_bytes(),
            self.secret_key.as_bytes(),
            &[],
        )?;
        Ok(result)
    }

    pub fn hash_without_salt<T, H>(&self, to_hash: &T) -> H
    where
        T: HashTo<HashedType = H>,
        H: From<String>,
    {
        use sha2::Digest;

        let digest = sha2::Sha512::digest(to_hash.as_ref().as_bytes());
        base64::encode_config(digest, base64::URL_SAFE).into()
    }
}
