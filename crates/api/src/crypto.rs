//! Random token generation for OAuth state and nonce values.

/// Bytes of entropy per generated token.
const TOKEN_BYTES: usize = 32;

/// The OS random source could not be read.
#[derive(Debug, thiserror::Error)]
#[error("RNG failure: {0}")]
pub struct RngError(#[from] getrandom::Error);

/// Generate an unguessable token (256 bits). Returns hex-encoded.
pub fn generate_token() -> Result<String, RngError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut bytes)?;
    Ok(hex::encode(bytes))
}
