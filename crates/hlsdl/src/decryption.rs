// Segment decryption: AES-128-CBC with PKCS#7 padding, offloaded to the blocking pool.

use aes::Aes128;
use bytes::Bytes;
use cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::error::DownloadError;
use crate::manifest::EncryptionDescriptor;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// MPEG-TS sync byte
pub const TS_SYNC_BYTE: u8 = 0x47;

const AES_128: &str = "AES-128";

/// Decrypt a segment payload with the playlist's key.
///
/// The explicit IV is used when present; otherwise the key doubles as the IV.
/// A missing key or an unsupported method is reported as a non-retryable error.
pub async fn decrypt_segment(
    data: Bytes,
    encryption: &EncryptionDescriptor,
) -> Result<Bytes, DownloadError> {
    if !encryption.method.eq_ignore_ascii_case(AES_128) {
        return Err(DownloadError::decrypt_fatal(format!(
            "unsupported encryption method `{}`",
            encryption.method
        )));
    }

    if !encryption.has_key() {
        return Err(DownloadError::decrypt_fatal(format!(
            "decryption key from {} is unavailable",
            encryption.key_url
        )));
    }

    let key: [u8; 16] = encryption.key.as_ref().try_into().map_err(|_| {
        DownloadError::decrypt_fatal(format!(
            "key must be 16 bytes, got {}",
            encryption.key.len()
        ))
    })?;
    let iv = encryption.iv.unwrap_or(key);

    tokio::task::spawn_blocking(move || decrypt_sync(&data, &key, &iv))
        .await
        .map_err(|e| DownloadError::decrypt(format!("decryption task failed: {e}")))?
}

/// Synchronous AES-128-CBC decryption.
pub fn decrypt_sync(data: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Result<Bytes, DownloadError> {
    let mut buffer = data.to_vec();

    let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|e| {
        DownloadError::decrypt_fatal(format!("failed to initialize AES decryptor: {e}"))
    })?;

    let decrypted_len = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .map_err(|e| DownloadError::decrypt(format!("decryption failed: {e}")))?
        .len();

    buffer.truncate(decrypted_len);
    Ok(Bytes::from(buffer))
}

/// Drop any bytes preceding the first MPEG-TS sync byte.
///
/// Payloads without a sync byte are returned unchanged.
pub fn strip_leading_padding(data: Bytes) -> Bytes {
    match memchr::memchr(TS_SYNC_BYTE, &data) {
        Some(0) | None => data,
        Some(offset) => data.slice(offset..),
    }
}
