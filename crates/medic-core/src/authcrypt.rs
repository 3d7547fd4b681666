//! Authenticated multi-recipient encryption.
//!
//! A random content key encrypts the payload with ChaCha20-Poly1305, using
//! the protected header as associated data. For every recipient the content
//! key is wrapped under a key derived with HKDF-SHA256 from the X25519
//! agreement between the sender's and the recipient's keys.

use crate::identity::Decrypted;
use crate::{Error, LocalKey, Result, VerKey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub const ALG: &str = "Authcrypt";
pub const ENC: &str = "chacha20poly1305";
pub const TYP: &str = "JWM/1.0";

const WRAP_INFO: &[u8] = b"medic-authcrypt-v1";

/// Wire form of an encrypted message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Base64url of the JSON [`ProtectedHeader`].
    pub protected: String,
    pub iv: String,
    pub ciphertext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub enc: String,
    pub typ: String,
    pub alg: String,
    pub recipients: Vec<WrappedKey>,
}

/// Content key wrapped for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKey {
    pub kid: VerKey,
    pub sender: VerKey,
    pub iv: String,
    pub encrypted_key: String,
}

/// Encrypt `plaintext` from `sender` to each of `recipients`.
pub fn seal(sender: &LocalKey, recipients: &[VerKey], plaintext: &[u8]) -> Result<Vec<u8>> {
    if recipients.is_empty() {
        return Err(Error::RecipientKey);
    }

    let cek: [u8; 32] = rand::random();
    let sender_verkey = sender.verkey();

    let mut wrapped = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let kek = wrap_key(sender, recipient, &sender_verkey, recipient)?;
        let iv: [u8; 12] = rand::random();
        let encrypted_key = cipher(&kek)
            .encrypt(Nonce::from_slice(&iv), cek.as_slice())
            .map_err(|_| Error::Encoding("content key wrap failed".into()))?;
        wrapped.push(WrappedKey {
            kid: *recipient,
            sender: sender_verkey,
            iv: URL_SAFE_NO_PAD.encode(iv),
            encrypted_key: URL_SAFE_NO_PAD.encode(encrypted_key),
        });
    }

    let header = ProtectedHeader {
        enc: ENC.to_string(),
        typ: TYP.to_string(),
        alg: ALG.to_string(),
        recipients: wrapped,
    };
    let protected = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);

    let iv: [u8; 12] = rand::random();
    let ciphertext = cipher(&cek)
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: protected.as_bytes(),
            },
        )
        .map_err(|_| Error::Encoding("payload encryption failed".into()))?;

    let envelope = EncryptedEnvelope {
        protected,
        iv: URL_SAFE_NO_PAD.encode(iv),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parse the envelope and its protected header without decrypting.
pub fn parse(bytes: &[u8]) -> Result<(EncryptedEnvelope, ProtectedHeader)> {
    let envelope: EncryptedEnvelope =
        serde_json::from_slice(bytes).map_err(|e| Error::Decoding(e.to_string()))?;
    let header_bytes = URL_SAFE_NO_PAD
        .decode(&envelope.protected)
        .map_err(|e| Error::Decoding(e.to_string()))?;
    let header: ProtectedHeader =
        serde_json::from_slice(&header_bytes).map_err(|e| Error::Decoding(e.to_string()))?;
    if header.alg != ALG || header.enc != ENC {
        return Err(Error::Decoding(format!(
            "unsupported algorithm {}/{}",
            header.alg, header.enc
        )));
    }
    Ok((envelope, header))
}

/// Decrypt with the first local key the envelope is addressed to.
pub fn open<'a, F>(bytes: &[u8], lookup: F) -> Result<Decrypted>
where
    F: Fn(&VerKey) -> Option<&'a LocalKey>,
{
    let (envelope, header) = parse(bytes)?;

    let (entry, local) = header
        .recipients
        .iter()
        .find_map(|r| lookup(&r.kid).map(|k| (r, k)))
        .ok_or(Error::NotAddressed)?;

    let kek = wrap_key(local, &entry.sender, &entry.sender, &entry.kid)?;
    let cek = cipher(&kek)
        .decrypt(
            Nonce::from_slice(&decode_iv(&entry.iv)?),
            decode(&entry.encrypted_key)?.as_slice(),
        )
        .map_err(|_| Error::Decoding("content key unwrap failed".into()))?;
    let cek: [u8; 32] = cek
        .try_into()
        .map_err(|_| Error::Decoding("content key has wrong length".into()))?;

    let plaintext = cipher(&cek)
        .decrypt(
            Nonce::from_slice(&decode_iv(&envelope.iv)?),
            Payload {
                msg: &decode(&envelope.ciphertext)?,
                aad: envelope.protected.as_bytes(),
            },
        )
        .map_err(|_| Error::Decoding("payload authentication failed".into()))?;

    Ok(Decrypted {
        plaintext,
        sender_verkey: Some(entry.sender),
        recipient_verkey: entry.kid,
    })
}

/// Derive the wrap key for the (sender, recipient) pair from our side of the agreement.
fn wrap_key(
    local: &LocalKey,
    peer: &VerKey,
    sender: &VerKey,
    recipient: &VerKey,
) -> Result<[u8; 32]> {
    let shared = local.x25519().diffie_hellman(&peer.x25519()?);

    let mut info = Vec::with_capacity(WRAP_INFO.len() + 64);
    info.extend_from_slice(WRAP_INFO);
    info.extend_from_slice(sender.as_bytes());
    info.extend_from_slice(recipient.as_bytes());

    let mut okm = [0u8; 32];
    Hkdf::<Sha256>::new(None, shared.as_bytes())
        .expand(&info, &mut okm)
        .map_err(|_| Error::Encoding("key derivation failed".into()))?;
    Ok(okm)
}

fn cipher(key: &[u8; 32]) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key))
}

fn decode(value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| Error::Decoding(e.to_string()))
}

fn decode_iv(value: &str) -> Result<[u8; 12]> {
    decode(value)?
        .try_into()
        .map_err(|_| Error::Decoding("nonce has wrong length".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_for_each_recipient() {
        let sender = LocalKey::generate();
        let alice = LocalKey::generate();
        let bob = LocalKey::generate();

        let sealed = seal(&sender, &[alice.verkey(), bob.verkey()], b"payload").unwrap();

        for local in [&alice, &bob] {
            let opened = open(&sealed, |k| (*k == local.verkey()).then_some(local)).unwrap();
            assert_eq!(opened.plaintext, b"payload");
            assert_eq!(opened.sender_verkey, Some(sender.verkey()));
            assert_eq!(opened.recipient_verkey, local.verkey());
        }
    }

    #[test]
    fn test_open_without_matching_key_fails() {
        let sender = LocalKey::generate();
        let alice = LocalKey::generate();
        let mallory = LocalKey::generate();

        let sealed = seal(&sender, &[alice.verkey()], b"payload").unwrap();
        let err = open(&sealed, |k| (*k == mallory.verkey()).then_some(&mallory)).unwrap_err();
        assert!(matches!(err, Error::NotAddressed));
    }

    #[test]
    fn test_tampered_header_rejected() {
        let sender = LocalKey::generate();
        let alice = LocalKey::generate();

        let sealed = seal(&sender, &[alice.verkey()], b"payload").unwrap();
        let mut envelope: EncryptedEnvelope = serde_json::from_slice(&sealed).unwrap();
        let (_, mut header) = parse(&sealed).unwrap();
        header.typ = "other".into();
        envelope.protected = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
        let tampered = serde_json::to_vec(&envelope).unwrap();

        assert!(open(&tampered, |k| (*k == alice.verkey()).then_some(&alice)).is_err());
    }

    #[test]
    fn test_no_recipients() {
        let sender = LocalKey::generate();
        assert!(matches!(
            seal(&sender, &[], b"payload"),
            Err(Error::RecipientKey)
        ));
    }
}
