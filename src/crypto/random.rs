use rand_core::{OsRng, TryRngCore};

use crate::error::Error;

/// Upper bound on a single random request.
pub const MAX_RANDOM_LEN: usize = 65_536;

/// Fills a fresh buffer of `len` bytes from the operating-system CSPRNG.
///
/// Zero-length and oversized requests are input errors, not silent no-ops.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, Error> {
    if len == 0 {
        return Err(Error::InputValidation(
            "random length must be non-zero".to_string(),
        ));
    }
    if len > MAX_RANDOM_LEN {
        return Err(Error::InputValidation(format!(
            "random length {len} exceeds maximum of {MAX_RANDOM_LEN}"
        )));
    }

    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| Error::Random)?;

    Ok(bytes)
}

/// Fills a fixed-size array from the operating-system CSPRNG.
pub fn random_array<const N: usize>() -> Result<[u8; N], Error> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| Error::Random)?;

    Ok(bytes)
}

/// A fresh 32-byte seed for key generation.
pub fn random_seed() -> Result<[u8; 32], Error> {
    random_array::<32>()
}

/// Checks that the OS entropy source is responsive.
///
/// Callers that need entropy during startup can probe availability first;
/// there is no user-space fallback generator.
pub fn entropy_available() -> bool {
    random_array::<1>().is_ok()
}
