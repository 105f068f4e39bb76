use super::{LONG_NONCE_LEN, NONCE_LEN, SymmetricKey, TAG_LEN, secure_random};
use crate::error::FaceError;
use aes_gcm::{
    Aes256Gcm, AesGcm, Key,
    aead::{AeadInPlace, KeyInit, consts::U16, generic_array::GenericArray},
    aes::Aes256,
};
use zeroize::Zeroizing;

/// AES-256-GCM with a 16-byte nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Output of [`seal_detached`]: nonce, ciphertext and tag kept apart.
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// Encrypt plaintext under a fresh random nonce
pub fn seal_detached(key: &SymmetricKey, plaintext: &[u8]) -> Result<Sealed, FaceError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
        .map_err(|_| FaceError::MalformedInput("plaintext too large to encrypt".into()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed {
        nonce,
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypt and verify ciphertext.
///
/// Accepts 12- and 16-byte nonces. The plaintext is returned only when the
/// tag verifies.
pub fn open_detached(
    key: &SymmetricKey,
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>, FaceError> {
    if tag.len() != TAG_LEN {
        return Err(FaceError::MalformedInput(format!(
            "tag must be {TAG_LEN} bytes, got {}",
            tag.len()
        )));
    }

    match nonce.len() {
        NONCE_LEN => open_with(
            Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
            nonce,
            ciphertext,
            tag,
        ),
        LONG_NONCE_LEN => open_with(
            Aes256Gcm16::new(Key::<Aes256Gcm16>::from_slice(key.as_bytes())),
            nonce,
            ciphertext,
            tag,
        ),
        n => Err(FaceError::MalformedInput(format!(
            "iv must be {NONCE_LEN} or {LONG_NONCE_LEN} bytes, got {n}"
        ))),
    }
}

fn open_with<C: AeadInPlace>(
    cipher: C,
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>, FaceError> {
    // the buffer holds keystream output even when the tag check fails
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            buffer.as_mut_slice(),
            GenericArray::from_slice(tag),
        )
        .map_err(|_| FaceError::Decryption)?;
    Ok(buffer)
}
