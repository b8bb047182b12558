use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
};
use thiserror::Error;

/// Salt length in bytes; encoded into the PHC string next to the hash.
const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
    #[error("invalid hash parameters: {0}")]
    Params(String),
    #[error("hashing failed: {0}")]
    Hashing(String),
    #[error("stored password hash is malformed: {0}")]
    Malformed(String),
}

/// HashCost
///
/// The Argon2id work factor. `memory_kib` and `iterations` trade CPU and memory
/// per hash against brute-force resistance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
        }
    }
}

/// PasswordHasher
///
/// One-way credential hashing. Every call to [`hash`](Self::hash) draws a fresh
/// salt, so hashing the same password twice yields different strings that both
/// verify. Verification reads the parameters back out of the stored PHC string,
/// so hashes made under an older cost keep working after the cost changes.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Result<Self, HashError> {
        let params = Params::new(cost.memory_kib, cost.iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| HashError::Params(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let mut salt_bytes = [0u8; SALT_LEN];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| HashError::Entropy(e.to_string()))?;
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|e| HashError::Hashing(e.to_string()))?;

        let phc = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| HashError::Hashing(e.to_string()))?;
        Ok(phc.to_string())
    }

    /// Returns `Ok(false)` on a mismatch; an error only when `hashed` cannot be parsed.
    pub fn verify(&self, plaintext: &str, hashed: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(hashed).map_err(|e| HashError::Malformed(e.to_string()))?;

        match self.argon2().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError::Malformed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> PasswordHasher {
        PasswordHasher::new(HashCost {
            memory_kib: 1024,
            iterations: 1,
        })
        .unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let hasher = light();
        let hashed = hasher.hash("bobtown").unwrap();

        assert!(hashed.starts_with("$argon2id$"));
        assert!(hasher.verify("bobtown", &hashed).unwrap());
        assert!(!hasher.verify("bobtowN", &hashed).unwrap());
    }

    #[test]
    fn salts_differ_between_calls() {
        let hasher = light();
        let first = hasher.hash("monkey").unwrap();
        let second = hasher.hash("monkey").unwrap();

        assert_ne!(first, second);
        assert!(hasher.verify("monkey", &second).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let err = light().verify("monkey", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, HashError::Malformed(_)));
    }

    #[test]
    fn rejects_impossible_cost() {
        let result = PasswordHasher::new(HashCost {
            memory_kib: 1,
            iterations: 0,
        });
        assert!(matches!(result, Err(HashError::Params(_))));
    }
}
