use ring::rand::{SecureRandom, SystemRandom};
use sqlx::PgPool;

use crate::models::member::Member;

pub const PIN_LENGTH: usize = 4;
const QR_TOKEN_BYTES: usize = 16;
const MAX_PIN_ATTEMPTS: usize = 10;

#[derive(thiserror::Error, Debug)]
#[error("System random number generator failed")]
pub struct RandomError;

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error(transparent)]
    Random(#[from] RandomError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Could not find a free check-in PIN")]
    PinSpaceExhausted,
}

/// Random numeric kiosk PIN, zero padded
pub fn generate_pin() -> Result<String, RandomError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 4];
    rng.fill(&mut bytes).map_err(|_| RandomError)?;
    let value = u32::from_be_bytes(bytes) % 10u32.pow(PIN_LENGTH as u32);
    Ok(format!("{:0width$}", value, width = PIN_LENGTH))
}

/// Opaque token printed in the member's check-in QR code
pub fn generate_qr_token() -> Result<String, RandomError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; QR_TOKEN_BYTES];
    rng.fill(&mut bytes).map_err(|_| RandomError)?;
    Ok(hex::encode(bytes))
}

/// Draws PINs until one is not taken by another member
pub async fn generate_unique_pin(pool: &PgPool) -> Result<String, CredentialError> {
    for _ in 0..MAX_PIN_ATTEMPTS {
        let pin = generate_pin()?;
        if !Member::pin_exists(pool, &pin).await? {
            return Ok(pin);
        }
    }

    tracing::error!(attempts = MAX_PIN_ATTEMPTS, "Every generated PIN collided");
    Err(CredentialError::PinSpaceExhausted)
}

pub fn is_well_formed_pin(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.chars().all(|c| c.is_ascii_digit())
}
