use crate::Error;
use crate::keys::SIGNALING_KEY_LEN;
use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const SUPPORTED_VERSION: u8 = 1;
const CIPHER_KEY_SIZE: usize = 32;
const MAC_KEY_SIZE: usize = 20;
const MAC_SIZE: usize = 10;
const IV_SIZE: usize = 16;
const CIPHERTEXT_OFFSET: usize = 1 + IV_SIZE;

/// Decryptor for push payloads sealed with the account's signaling key.
///
/// Envelope layout: `version (1) | iv (16) | AES-256-CBC ciphertext | mac (10)`,
/// where the mac is HMAC-SHA256 over everything before it, truncated to 10
/// bytes. The signaling key splits into a 32-byte AES key and a 20-byte MAC key.
pub struct LegacyCipher {
    cipher_key: Zeroizing<[u8; CIPHER_KEY_SIZE]>,
    mac_key: Zeroizing<[u8; MAC_KEY_SIZE]>,
}

impl LegacyCipher {
    /// Builds the decryptor from a base64 signaling key.
    pub fn new(signaling_key: &str) -> Result<Self, Error> {
        let key_bytes = Zeroizing::new(
            STANDARD
                .decode(signaling_key)
                .map_err(|err| Error::Native(format!("Invalid signaling key encoding: {err}")))?,
        );
        if key_bytes.len() < SIGNALING_KEY_LEN {
            return Err(Error::Native(format!(
                "Signaling key too short: {} bytes",
                key_bytes.len()
            )));
        }

        let mut cipher_key = Zeroizing::new([0u8; CIPHER_KEY_SIZE]);
        cipher_key.copy_from_slice(&key_bytes[..CIPHER_KEY_SIZE]);
        let mut mac_key = Zeroizing::new([0u8; MAC_KEY_SIZE]);
        mac_key.copy_from_slice(&key_bytes[CIPHER_KEY_SIZE..CIPHER_KEY_SIZE + MAC_KEY_SIZE]);

        Ok(Self {
            cipher_key,
            mac_key,
        })
    }

    /// Verifies and decrypts a raw envelope.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, Error> {
        if envelope.len() < CIPHERTEXT_OFFSET + MAC_SIZE {
            return Err(Error::Native(format!(
                "Legacy envelope too short: {} bytes",
                envelope.len()
            )));
        }
        if envelope[0] != SUPPORTED_VERSION {
            return Err(Error::Native(format!(
                "Unsupported legacy envelope version: {}",
                envelope[0]
            )));
        }

        let (signed, their_mac) = envelope.split_at(envelope.len() - MAC_SIZE);
        let mut mac = HmacSha256::new_from_slice(self.mac_key.as_slice())
            .map_err(|err| Error::Native(err.to_string()))?;
        mac.update(signed);
        mac.verify_truncated_left(their_mac)
            .map_err(|_| Error::Native("Invalid legacy envelope MAC".to_string()))?;

        let cipher =
            Aes256CbcDec::new_from_slices(self.cipher_key.as_slice(), &signed[1..CIPHERTEXT_OFFSET])
                .map_err(|err| Error::Native(err.to_string()))?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&signed[CIPHERTEXT_OFFSET..])
            .map_err(|_| Error::Native("Bad padding in legacy envelope".to_string()))
    }

    /// Decodes a base64 body as delivered by push and decrypts it.
    pub fn decrypt_body(&self, body: &str) -> Result<Vec<u8>, Error> {
        let envelope = STANDARD
            .decode(body.trim())
            .map_err(|err| Error::Native(format!("Invalid legacy body encoding: {err}")))?;
        self.decrypt(&envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

    fn signaling_key() -> (String, [u8; 52]) {
        let mut key = [0u8; 52];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        (STANDARD.encode(key), key)
    }

    fn seal(key: &[u8; 52], version: u8, plaintext: &[u8]) -> Vec<u8> {
        let iv = [0x24u8; 16];
        let mut cipher_key = [0u8; 32];
        cipher_key.copy_from_slice(&key[..32]);
        let ciphertext = Aes256CbcEnc::new(&cipher_key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut envelope = vec![version];
        envelope.extend_from_slice(&iv);
        envelope.extend_from_slice(&ciphertext);

        let mut mac = HmacSha256::new_from_slice(&key[32..52]).unwrap();
        mac.update(&envelope);
        let tag = mac.finalize().into_bytes();
        envelope.extend_from_slice(&tag[..MAC_SIZE]);
        envelope
    }

    #[test]
    fn test_decrypts_sealed_envelope() {
        let (encoded, raw) = signaling_key();
        let cipher = LegacyCipher::new(&encoded).unwrap();
        let envelope = seal(&raw, SUPPORTED_VERSION, b"legacy push payload");

        assert_eq!(cipher.decrypt(&envelope).unwrap(), b"legacy push payload");
        assert_eq!(
            cipher.decrypt_body(&STANDARD.encode(&envelope)).unwrap(),
            b"legacy push payload"
        );
    }

    #[test]
    fn test_rejects_tampered_mac() {
        let (encoded, raw) = signaling_key();
        let cipher = LegacyCipher::new(&encoded).unwrap();

        let mut envelope = seal(&raw, SUPPORTED_VERSION, b"payload");
        let last = envelope.len() - 1;
        envelope[last] ^= 0x01;
        assert!(cipher.decrypt(&envelope).is_err());

        let mut envelope = seal(&raw, SUPPORTED_VERSION, b"payload");
        envelope[CIPHERTEXT_OFFSET] ^= 0x80;
        assert!(cipher.decrypt(&envelope).is_err());
    }

    #[test]
    fn test_rejects_wrong_version_and_short_input() {
        let (encoded, raw) = signaling_key();
        let cipher = LegacyCipher::new(&encoded).unwrap();

        assert!(cipher.decrypt(&seal(&raw, 2, b"payload")).is_err());
        assert!(cipher.decrypt(&[SUPPORTED_VERSION; 20]).is_err());
        assert!(cipher.decrypt_body("not base64!").is_err());
    }

    #[test]
    fn test_rejects_short_signaling_key() {
        assert!(LegacyCipher::new(&STANDARD.encode([0u8; 32])).is_err());
        assert!(LegacyCipher::new("***").is_err());
    }
}
