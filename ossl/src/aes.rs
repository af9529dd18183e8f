//! AES implementation based on OpenSSL.

use crate::{openssl_err, ossl};
use dkm_common::crypto::{aes, EmittingOperation, SymmetricOperation};
use dkm_common::{crypto, km_err, vec_try, Error};
use openssl::symm::{Cipher, Crypter};

/// [`crypto::Aes`] implementation based on OpenSSL.
pub struct OsslAes;

impl crypto::Aes for OsslAes {
    fn begin(
        &self,
        key: aes::Key,
        mode: aes::CipherMode,
        dir: SymmetricOperation,
    ) -> Result<Box<dyn EmittingOperation>, Error> {
        let dir_mode = match dir {
            SymmetricOperation::Encrypt => openssl::symm::Mode::Encrypt,
            SymmetricOperation::Decrypt => openssl::symm::Mode::Decrypt,
        };
        let crypter = match mode {
            aes::CipherMode::EcbNoPadding | aes::CipherMode::EcbPkcs7Padding => {
                let cipher = match &key {
                    aes::Key::Aes128(_) => Cipher::aes_128_ecb(),
                    aes::Key::Aes192(_) => Cipher::aes_192_ecb(),
                    aes::Key::Aes256(_) => Cipher::aes_256_ecb(),
                };
                let mut crypter = Crypter::new(cipher, dir_mode, key.bytes(), None)
                    .map_err(openssl_err!("failed to create ECB Crypter"))?;
                crypter.pad(matches!(mode, aes::CipherMode::EcbPkcs7Padding));
                crypter
            }
            aes::CipherMode::CbcNoPadding { nonce: n }
            | aes::CipherMode::CbcPkcs7Padding { nonce: n } => {
                let cipher = match &key {
                    aes::Key::Aes128(_) => Cipher::aes_128_cbc(),
                    aes::Key::Aes192(_) => Cipher::aes_192_cbc(),
                    aes::Key::Aes256(_) => Cipher::aes_256_cbc(),
                };
                let mut crypter = Crypter::new(cipher, dir_mode, key.bytes(), Some(&n[..]))
                    .map_err(openssl_err!("failed to create CBC Crypter"))?;
                crypter.pad(matches!(mode, aes::CipherMode::CbcPkcs7Padding { nonce: _ }));
                crypter
            }
            aes::CipherMode::Cfb { nonce: n } => {
                let cipher = match &key {
                    aes::Key::Aes128(_) => Cipher::aes_128_cfb128(),
                    aes::Key::Aes192(_) => Cipher::aes_192_cfb128(),
                    aes::Key::Aes256(_) => Cipher::aes_256_cfb128(),
                };
                Crypter::new(cipher, dir_mode, key.bytes(), Some(&n[..]))
                    .map_err(openssl_err!("failed to create CFB Crypter"))?
            }
            aes::CipherMode::Ofb { nonce: n } => {
                let cipher = match &key {
                    aes::Key::Aes128(_) => Cipher::aes_128_ofb(),
                    aes::Key::Aes192(_) => Cipher::aes_192_ofb(),
                    aes::Key::Aes256(_) => Cipher::aes_256_ofb(),
                };
                Crypter::new(cipher, dir_mode, key.bytes(), Some(&n[..]))
                    .map_err(openssl_err!("failed to create OFB Crypter"))?
            }
        };

        Ok(Box::new(OsslAesOperation { crypter }))
    }

    fn ocb_seal(
        &self,
        key: &aes::Key,
        nonce: &[u8; aes::OCB_NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
        tag_len: usize,
    ) -> Result<Vec<u8>, Error> {
        let mut crypter =
            Crypter::new(ocb_cipher(key), openssl::symm::Mode::Encrypt, key.bytes(), Some(&nonce[..]))
                .map_err(openssl_err!("failed to create OCB Crypter"))?;
        if tag_len != aes::OCB_MAX_TAG_SIZE {
            ossl!(crypter.set_tag_len(tag_len))?;
        }
        if !aad.is_empty() {
            ossl!(crypter.aad_update(aad))?;
        }

        let mut output = vec_try![0; plaintext.len() + aes::BLOCK_SIZE + tag_len]?;
        let mut offset = ossl!(crypter.update(plaintext, &mut output))?;
        offset += ossl!(crypter.finalize(&mut output[offset..]))?;
        crypter
            .get_tag(&mut output[offset..offset + tag_len])
            .map_err(openssl_err!("failed to get {} byte OCB tag", tag_len))?;
        output.truncate(offset + tag_len);
        Ok(output)
    }

    fn ocb_open(
        &self,
        key: &aes::Key,
        nonce: &[u8; aes::OCB_NONCE_SIZE],
        aad: &[u8],
        ct_and_tag: &[u8],
        tag_len: usize,
    ) -> Result<Vec<u8>, Error> {
        if ct_and_tag.len() < tag_len {
            return Err(km_err!(InvalidInputLength, "{} bytes too short for OCB", ct_and_tag.len()));
        }
        let (ct, tag) = ct_and_tag.split_at(ct_and_tag.len() - tag_len);

        let mut crypter =
            Crypter::new(ocb_cipher(key), openssl::symm::Mode::Decrypt, key.bytes(), Some(&nonce[..]))
                .map_err(openssl_err!("failed to create OCB Crypter"))?;
        crypter.set_tag(tag).map_err(openssl_err!("failed to set {} byte OCB tag", tag_len))?;
        if !aad.is_empty() {
            ossl!(crypter.aad_update(aad))?;
        }

        let mut output = vec_try![0; ct.len() + aes::BLOCK_SIZE]?;
        let mut offset = ossl!(crypter.update(ct, &mut output))?;
        offset += crypter
            .finalize(&mut output[offset..])
            .map_err(|e| km_err!(VerificationFailed, "OCB tag mismatch: {:?}", e))?;
        output.truncate(offset);
        Ok(output)
    }
}

fn ocb_cipher(key: &aes::Key) -> Cipher {
    match key {
        aes::Key::Aes128(_) => Cipher::aes_128_ocb(),
        aes::Key::Aes192(_) => Cipher::aes_192_ocb(),
        aes::Key::Aes256(_) => Cipher::aes_256_ocb(),
    }
}

/// [`EmittingOperation`] for the streaming AES modes.
pub struct OsslAesOperation {
    crypter: Crypter,
}

impl EmittingOperation for OsslAesOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut output = vec_try![0; data.len() + aes::BLOCK_SIZE]?;
        let out_len = self
            .crypter
            .update(data, &mut output)
            .map_err(openssl_err!("update {} bytes from input failed", data.len()))?;
        output.truncate(out_len);
        Ok(output)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, Error> {
        let mut output = vec_try![0; aes::BLOCK_SIZE]?;
        let out_len = ossl!(self.crypter.finalize(&mut output))?;
        output.truncate(out_len);
        Ok(output)
    }
}
