//! Content encryption for JWE.
//!
//! Two families are implemented:
//! - AES-CBC with HMAC-SHA2 (`A128CBC-HS256`, `A192CBC-HS384`, `A256CBC-HS512`)
//! - AES-GCM (`A128GCM`, `A192GCM`, `A256GCM`)
//!
//! # Security Considerations
//!
//! - Tags are verified in constant time before any plaintext is produced
//! - Every failure in [`open`] is the same `Error::Integrity`
//! - A key, IV or tag of the wrong length is replaced by a placeholder of the
//!   right length and the full computation still runs before failing

use aes::cipher::consts::{U12, U16};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{Block, BlockDecrypt, BlockEncrypt, BlockSizeUser, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use super::ContentEncryptionAlgorithm;
use crate::error::{Error, Result};
use crate::utils::random_bytes;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Output of [`seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AeadResult {
    /// The ciphertext
    pub ciphertext: Vec<u8>,
    /// The initialization vector
    pub iv: Vec<u8>,
    /// The authentication tag
    pub tag: Vec<u8>,
}

/// Encrypts `plaintext` under `cek` with a fresh random IV.
///
/// # Errors
/// * `Error::KeyType` - If `cek` has the wrong length for `enc`
/// * `Error::Random` - If the random source fails
pub fn seal(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<AeadResult> {
    let iv = random_bytes(enc.iv_len())?;
    seal_with_iv(enc, cek, &iv, plaintext, aad)
}

/// Encrypts `plaintext` under `cek` with a caller-supplied IV.
///
/// Reusing an IV under the same key breaks AES-GCM; prefer [`seal`].
///
/// # Errors
/// * `Error::KeyType` - If `cek` has the wrong length for `enc`
/// * `Error::Format` - If `iv` has the wrong length for `enc`
pub fn seal_with_iv(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<AeadResult> {
    if cek.len() != enc.cek_len() {
        return Err(Error::KeyType(format!(
            "{enc} requires a {} byte content encryption key",
            enc.cek_len()
        )));
    }
    if iv.len() != enc.iv_len() {
        return Err(Error::Format(format!(
            "{enc} requires a {} byte initialization vector",
            enc.iv_len()
        )));
    }

    use ContentEncryptionAlgorithm::*;
    let sealed = match enc {
        A128CbcHs256 | A192CbcHs384 | A256CbcHs512 => {
            cbc_hmac_seal(enc, cek, iv, plaintext, aad)
        }
        A128Gcm => gcm_seal::<Aes128Gcm>(cek, iv, plaintext, aad),
        A192Gcm => gcm_seal::<Aes192Gcm>(cek, iv, plaintext, aad),
        A256Gcm => gcm_seal::<Aes256Gcm>(cek, iv, plaintext, aad),
    };
    let (ciphertext, tag) =
        sealed.ok_or_else(|| Error::Format(format!("{enc} encryption failed")))?;

    Ok(AeadResult {
        ciphertext,
        iv: iv.to_vec(),
        tag,
    })
}

/// Decrypts and authenticates `ciphertext`.
///
/// # Errors
/// * `Error::Integrity` - On any failure, whatever its cause
pub fn open(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    ciphertext: &[u8],
    iv: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let well_formed =
        cek.len() == enc.cek_len() && iv.len() == enc.iv_len() && tag.len() == enc.tag_len();

    let placeholder_key = Zeroizing::new(vec![0u8; enc.cek_len()]);
    let placeholder_iv = vec![0u8; enc.iv_len()];
    let placeholder_tag = vec![0u8; enc.tag_len()];
    let cek: &[u8] = if cek.len() == enc.cek_len() { cek } else { &placeholder_key };
    let iv: &[u8] = if iv.len() == enc.iv_len() { iv } else { &placeholder_iv };
    let tag: &[u8] = if tag.len() == enc.tag_len() { tag } else { &placeholder_tag };

    use ContentEncryptionAlgorithm::*;
    let opened = match enc {
        A128CbcHs256 | A192CbcHs384 | A256CbcHs512 => {
            cbc_hmac_open(enc, cek, ciphertext, iv, tag, aad)
        }
        A128Gcm => gcm_open::<Aes128Gcm>(cek, ciphertext, iv, tag, aad),
        A192Gcm => gcm_open::<Aes192Gcm>(cek, ciphertext, iv, tag, aad),
        A256Gcm => gcm_open::<Aes256Gcm>(cek, ciphertext, iv, tag, aad),
    };

    match opened {
        Some(plaintext) if well_formed => Ok(plaintext),
        _ => Err(Error::Integrity),
    }
}

fn gcm_seal<A: AeadInPlace + KeyInit>(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Option<(Vec<u8>, Vec<u8>)> {
    let cipher = A::new_from_slice(key).ok()?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(iv), aad, &mut buffer)
        .ok()?;
    Some((buffer, tag.to_vec()))
}

fn gcm_open<A: AeadInPlace + KeyInit>(
    key: &[u8],
    ciphertext: &[u8],
    iv: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Option<Vec<u8>> {
    let cipher = A::new_from_slice(key).ok()?;
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(iv),
            aad,
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .ok()?;
    Some(buffer)
}

/// `HMAC(MAC_KEY, AAD || IV || C || AL)` truncated to the tag length.
fn cbc_hmac_mac(
    enc: ContentEncryptionAlgorithm,
    mac_key: &[u8],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Option<HmacState> {
    let al = (aad.len() as u64).wrapping_mul(8).to_be_bytes();
    let mut state = match enc {
        ContentEncryptionAlgorithm::A128CbcHs256 => {
            HmacState::Sha256(<Hmac<Sha256> as Mac>::new_from_slice(mac_key).ok()?)
        }
        ContentEncryptionAlgorithm::A192CbcHs384 => {
            HmacState::Sha384(<Hmac<Sha384> as Mac>::new_from_slice(mac_key).ok()?)
        }
        _ => HmacState::Sha512(<Hmac<Sha512> as Mac>::new_from_slice(mac_key).ok()?),
    };
    for part in [aad, iv, ciphertext, &al[..]] {
        state.update(part);
    }
    Some(state)
}

enum HmacState {
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
    Sha512(Hmac<Sha512>),
}

impl HmacState {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(mac) => mac.update(data),
            Self::Sha384(mac) => mac.update(data),
            Self::Sha512(mac) => mac.update(data),
        }
    }

    fn tag(self, len: usize) -> Vec<u8> {
        let full = match self {
            Self::Sha256(mac) => mac.finalize().into_bytes().to_vec(),
            Self::Sha384(mac) => mac.finalize().into_bytes().to_vec(),
            Self::Sha512(mac) => mac.finalize().into_bytes().to_vec(),
        };
        full[..len].to_vec()
    }

    fn verify(self, tag: &[u8]) -> bool {
        match self {
            Self::Sha256(mac) => mac.verify_truncated_left(tag).is_ok(),
            Self::Sha384(mac) => mac.verify_truncated_left(tag).is_ok(),
            Self::Sha512(mac) => mac.verify_truncated_left(tag).is_ok(),
        }
    }
}

fn cbc_hmac_seal(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Option<(Vec<u8>, Vec<u8>)> {
    let (mac_key, enc_key) = cek.split_at(cek.len() / 2);
    let ciphertext = match enc {
        ContentEncryptionAlgorithm::A128CbcHs256 => cbc_encrypt::<Aes128>(enc_key, iv, plaintext),
        ContentEncryptionAlgorithm::A192CbcHs384 => cbc_encrypt::<Aes192>(enc_key, iv, plaintext),
        _ => cbc_encrypt::<Aes256>(enc_key, iv, plaintext),
    }?;
    let tag = cbc_hmac_mac(enc, mac_key, aad, iv, &ciphertext)?.tag(enc.tag_len());
    Some((ciphertext, tag))
}

fn cbc_hmac_open(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    ciphertext: &[u8],
    iv: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Option<Vec<u8>> {
    let (mac_key, enc_key) = cek.split_at(cek.len() / 2);
    if !cbc_hmac_mac(enc, mac_key, aad, iv, ciphertext)?.verify(tag) {
        return None;
    }
    match enc {
        ContentEncryptionAlgorithm::A128CbcHs256 => cbc_decrypt::<Aes128>(enc_key, iv, ciphertext),
        ContentEncryptionAlgorithm::A192CbcHs384 => cbc_decrypt::<Aes192>(enc_key, iv, ciphertext),
        _ => cbc_decrypt::<Aes256>(enc_key, iv, ciphertext),
    }
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Option<Vec<u8>>
where
    C: BlockEncrypt + KeyInit + BlockSizeUser<BlockSize = U16>,
{
    let cipher = C::new_from_slice(key).ok()?;

    // PKCS#7
    let padding_len = 16 - (plaintext.len() % 16);
    let mut padded = plaintext.to_vec();
    padded.extend(std::iter::repeat(padding_len as u8).take(padding_len));

    let mut ciphertext = Vec::with_capacity(padded.len());
    let mut prev_block = Block::<C>::clone_from_slice(iv);
    for chunk in padded.chunks(16) {
        let mut block = Block::<C>::clone_from_slice(chunk);
        for (b, p) in block.iter_mut().zip(prev_block.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(&mut block);
        ciphertext.extend_from_slice(&block);
        prev_block = block;
    }
    Some(ciphertext)
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>>
where
    C: BlockDecrypt + KeyInit + BlockSizeUser<BlockSize = U16>,
{
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return None;
    }
    let cipher = C::new_from_slice(key).ok()?;

    let mut plaintext = Vec::with_capacity(ciphertext.len());
    let mut prev_block = Block::<C>::clone_from_slice(iv);
    for chunk in ciphertext.chunks(16) {
        let encrypted = Block::<C>::clone_from_slice(chunk);
        let mut block = encrypted.clone();
        cipher.decrypt_block(&mut block);
        for (b, p) in block.iter_mut().zip(prev_block.iter()) {
            *b ^= p;
        }
        plaintext.extend_from_slice(&block);
        prev_block = encrypted;
    }

    let padding_len = usize::from(*plaintext.last()?);
    if padding_len == 0 || padding_len > 16 {
        return None;
    }
    let body_len = plaintext.len() - padding_len;
    if plaintext[body_len..].iter().any(|&b| usize::from(b) != padding_len) {
        return None;
    }
    plaintext.truncate(body_len);
    Some(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{b64_decode, b64_encode};
    use pretty_assertions::assert_eq;

    const AAD: &[u8] = b"additional data";

    #[test]
    fn test_round_trip_all_algorithms() {
        for enc in ContentEncryptionAlgorithm::ALL {
            let cek = random_bytes(enc.cek_len()).unwrap();
            let sealed = seal(enc, &cek, b"test message", AAD).unwrap();
            assert_eq!(sealed.iv.len(), enc.iv_len());
            assert_eq!(sealed.tag.len(), enc.tag_len());

            let opened = open(enc, &cek, &sealed.ciphertext, &sealed.iv, &sealed.tag, AAD).unwrap();
            assert_eq!(opened, b"test message");
        }
    }

    #[test]
    fn test_a128cbc_hs256_known_answer() {
        let cek: [u8; 32] = [
            4, 211, 31, 197, 84, 157, 252, 254, 11, 100, 157, 250, 63, 170, 106, 206, 107, 124,
            212, 45, 111, 107, 9, 219, 200, 177, 0, 240, 143, 156, 44, 207,
        ];
        let iv = b64_decode("AxY8DCtDaGlsbGljb3RoZQ", "iv").unwrap();
        let aad = b"eyJhbGciOiJBMTI4S1ciLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0";

        let sealed = seal_with_iv(
            ContentEncryptionAlgorithm::A128CbcHs256,
            &cek,
            &iv,
            b"Live long and prosper.",
            aad,
        )
        .unwrap();

        assert_eq!(
            b64_encode(&sealed.ciphertext),
            "KDlTtXchhZTGufMYmOYGS4HffxPSUrfmqCHXaI9wOGY"
        );
        assert_eq!(b64_encode(&sealed.tag), "U0m_YmjN04DJvceFICbCVQ");
    }

    #[test]
    fn test_cbc_padding_lengths() {
        let enc = ContentEncryptionAlgorithm::A256CbcHs512;
        let cek = random_bytes(enc.cek_len()).unwrap();
        for len in 0..=33 {
            let plaintext = vec![0x42; len];
            let sealed = seal(enc, &cek, &plaintext, AAD).unwrap();
            assert_eq!(sealed.ciphertext.len(), (len / 16 + 1) * 16);
            let opened = open(enc, &cek, &sealed.ciphertext, &sealed.iv, &sealed.tag, AAD).unwrap();
            assert_eq!(opened, plaintext);
        }
    }

    #[test]
    fn test_tamper_detection() {
        for enc in ContentEncryptionAlgorithm::ALL {
            let cek = random_bytes(enc.cek_len()).unwrap();
            let sealed = seal(enc, &cek, b"test message", AAD).unwrap();

            let mut ciphertext = sealed.ciphertext.clone();
            ciphertext[0] ^= 1;
            assert!(matches!(
                open(enc, &cek, &ciphertext, &sealed.iv, &sealed.tag, AAD),
                Err(Error::Integrity)
            ));

            let mut tag = sealed.tag.clone();
            tag[0] ^= 0x80;
            assert!(matches!(
                open(enc, &cek, &sealed.ciphertext, &sealed.iv, &tag, AAD),
                Err(Error::Integrity)
            ));

            assert!(matches!(
                open(enc, &cek, &sealed.ciphertext, &sealed.iv, &sealed.tag, b"other"),
                Err(Error::Integrity)
            ));
        }
    }

    #[test]
    fn test_malformed_lengths_are_integrity_errors() {
        let enc = ContentEncryptionAlgorithm::A128Gcm;
        let cek = random_bytes(enc.cek_len()).unwrap();
        let sealed = seal(enc, &cek, b"test message", AAD).unwrap();

        let short_tag = &sealed.tag[..8];
        let long_iv = [sealed.iv.as_slice(), &[0]].concat();
        let cases: [(&[u8], &[u8], &[u8]); 3] = [
            (&cek[..8], &sealed.iv, &sealed.tag),
            (&cek, &long_iv, &sealed.tag),
            (&cek, &sealed.iv, short_tag),
        ];
        for (key, iv, tag) in cases {
            assert!(matches!(
                open(enc, key, &sealed.ciphertext, iv, tag, AAD),
                Err(Error::Integrity)
            ));
        }
    }

    #[test]
    fn test_seal_rejects_wrong_key_length() {
        let result = seal(ContentEncryptionAlgorithm::A256Gcm, &[0; 16], b"x", AAD);
        assert!(matches!(result, Err(Error::KeyType(_))));
    }
}
