use aes_gcm::{
    Aes128Gcm, Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

/// The size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Unwrapped Flow session key, zeroized on drop.
pub type AesKey = Zeroizing<Vec<u8>>;

/// Holds the RSA private key used to unwrap per-exchange session keys.
pub struct FlowCrypto {
    private_key: RsaPrivateKey,
}

impl FlowCrypto {
    /// Loads the RSA private key from a PEM string (PKCS#8, with PKCS#1
    /// fallback).
    pub fn from_pem(pem: &str) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| AppError::KeyUnwrap(format!("Invalid private key PEM: {}", e)))?;

        Ok(Self { private_key })
    }

    /// Decrypts the RSA-OAEP (MGF1-SHA256 / SHA-256) wrapped AES session key.
    ///
    /// # Arguments
    ///
    /// * `encrypted_key` - The wrapped key bytes from `encrypted_aes_key`.
    ///
    /// # Returns
    ///
    /// The unwrapped AES key (128 or 256 bit).
    pub fn unwrap_session_key(&self, encrypted_key: &[u8]) -> Result<AesKey> {
        let key = self
            .private_key
            .decrypt(Oaep::new::<Sha256>(), encrypted_key)
            .map_err(|e| AppError::KeyUnwrap(format!("OAEP decrypt failed: {}", e)))?;

        if key.len() != 16 && key.len() != 32 {
            return Err(AppError::KeyUnwrap(format!(
                "Unexpected session key length: {}",
                key.len()
            )));
        }

        Ok(Zeroizing::new(key))
    }
}

/// Returns the ones'-complement of the request IV.
///
/// The counterpart expects the response to be encrypted under the request
/// key with every IV byte XORed with 0xFF. Wire rule, do not change.
pub fn flip_iv(iv: &[u8]) -> Vec<u8> {
    iv.iter().map(|b| b ^ 0xFF).collect()
}

/// Decrypts and authenticates an inbound Flow payload.
///
/// The last 16 bytes of `ciphertext` are the GCM tag, the remainder is the
/// body; both are verified in one step. A tag mismatch yields an opaque
/// decryption error, never partial plaintext.
pub fn decrypt_payload(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() <= TAG_SIZE {
        return Err(AppError::Decryption("Ciphertext too short".to_string()));
    }

    let nonce = nonce_from(iv)?;
    // aes-gcm's Aead treats the input as body || tag, which matches the
    // wire layout exactly.
    open(key, &nonce, ciphertext)
}

/// Encrypts an outbound Flow response under the same session key and the
/// bit-flipped request IV, appending the GCM tag to the ciphertext.
pub fn encrypt_response(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let flipped = flip_iv(iv);
    let nonce = nonce_from(&flipped)?;
    seal(key, &nonce, plaintext)
}

fn nonce_from(iv: &[u8]) -> Result<[u8; NONCE_SIZE]> {
    iv.try_into()
        .map_err(|_| AppError::Decryption(format!("Invalid IV length: {}", iv.len())))
}

fn seal(key: &[u8], nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = Nonce::from_slice(nonce);
    match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .map_err(|e| AppError::Encryption(format!("Invalid key: {}", e)))?
            .encrypt(nonce, plaintext)
            .map_err(|e| AppError::Encryption(format!("Encryption failed: {}", e))),
        32 => Aes256Gcm::new_from_slice(key)
            .map_err(|e| AppError::Encryption(format!("Invalid key: {}", e)))?
            .encrypt(nonce, plaintext)
            .map_err(|e| AppError::Encryption(format!("Encryption failed: {}", e))),
        n => Err(AppError::Encryption(format!("Unsupported key length: {}", n))),
    }
}

fn open(key: &[u8], nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let nonce = Nonce::from_slice(nonce);
    match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .map_err(|e| AppError::Decryption(format!("Invalid key: {}", e)))?
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::Decryption("Authentication failed".to_string())),
        32 => Aes256Gcm::new_from_slice(key)
            .map_err(|e| AppError::Decryption(format!("Invalid key: {}", e)))?
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::Decryption("Authentication failed".to_string())),
        n => Err(AppError::Decryption(format!("Unsupported key length: {}", n))),
    }
}
