//! Salted PBKDF2-HMAC-SHA256 password hashing.
//!
//! Stored form is `pbkdf2-sha256${rounds}${hex(salt)}${hex(key)}`. The round
//! count travels with the hash, so raising [`ROUNDS`] leaves existing hashes
//! verifiable.
//!
//! Derivation is CPU-bound; request handlers go through [`hash_blocking`] and
//! [`verify_blocking`], which run it on tokio's blocking pool.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::errors::Result;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
#[cfg(not(test))]
const ROUNDS: u32 = 600_000;
#[cfg(test)]
const ROUNDS: u32 = 64;

/// Hash `password` with a fresh random salt.
pub fn hash(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = derive(password, &salt, ROUNDS);
    format!(
        "{SCHEME}${ROUNDS}${}${}",
        hex::encode(salt),
        hex::encode(key.as_slice())
    )
}

/// Check `password` against a stored hash. Malformed hashes never verify.
pub fn verify(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(rounds), Some(salt_hex), Some(key_hex), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let Ok(rounds) = rounds.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(key_hex)) else {
        return false;
    };
    if rounds == 0 || expected.len() != KEY_LEN {
        return false;
    }
    let actual = derive(password, &salt, rounds);
    actual.as_slice().ct_eq(&expected).into()
}

/// [`hash`] on the blocking pool.
pub async fn hash_blocking(password: Zeroizing<String>) -> Result<String> {
    Ok(tokio::task::spawn_blocking(move || hash(&password)).await?)
}

/// [`verify`] on the blocking pool.
pub async fn verify_blocking(password: Zeroizing<String>, stored: String) -> Result<bool> {
    Ok(tokio::task::spawn_blocking(move || verify(&password, &stored)).await?)
}

fn derive(password: &str, salt: &[u8], rounds: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut *key);
    key
}
