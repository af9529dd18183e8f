//! AES operations: the chunked OCB mode and the streaming block modes.

use super::{resolve_padding, Operation, OperationFactory};
use crate::keys::Key;
use alloc::boxed::Box;
use alloc::vec::Vec;
use dkm_common::crypto::{self, aes, EmittingOperation, KeyMaterial, SymmetricOperation};
use dkm_common::{
    get_bool_tag_value, get_opt_tag_value, get_tag_value, km_err, vec_try, Error,
    FallibleAllocExt,
};
use dkm_wire::{AuthorizationSet, BlockMode, ErrorCode, KeyParam, PaddingMode, Purpose};

/// Factory for AES encrypt and decrypt operations.
pub(crate) struct AesFactory {
    pub(crate) purpose: Purpose,
}

impl OperationFactory for AesFactory {
    fn supported_block_modes(&self) -> &'static [BlockMode] {
        &[BlockMode::Ocb, BlockMode::Ecb, BlockMode::Cbc, BlockMode::Cfb, BlockMode::Ofb]
    }
    fn supported_paddings(&self) -> &'static [PaddingMode] {
        &[PaddingMode::None, PaddingMode::Pkcs7]
    }

    fn create_operation(
        &self,
        imp: &mut crypto::Implementation<'_>,
        key: &Key,
        params: &AuthorizationSet,
        out_params: &mut AuthorizationSet,
    ) -> Result<Box<dyn Operation>, Error> {
        let aes_key = match &key.material {
            KeyMaterial::Aes(k) => k.clone(),
            _ => return Err(km_err!(IncompatibleAlgorithm, "not an AES key")),
        };
        let block_mode = get_tag_value!(params, BlockMode, ErrorCode::UnsupportedBlockMode)?;
        if !self.supported_block_modes().contains(&block_mode) {
            return Err(km_err!(UnsupportedBlockMode, "block mode {:?} not supported", block_mode));
        }
        if !dkm_common::contains_tag_value!(&key.characteristics, BlockMode, block_mode) {
            return Err(km_err!(
                UnsupportedBlockMode,
                "block mode {:?} not authorized by key",
                block_mode
            ));
        }
        let padding = resolve_padding(self, key, params)?;
        let dir = match self.purpose {
            Purpose::Encrypt => SymmetricOperation::Encrypt,
            _ => SymmetricOperation::Decrypt,
        };

        let caller_nonce = get_opt_tag_value!(params, Nonce)?;
        if caller_nonce.is_some()
            && dir == SymmetricOperation::Encrypt
            && !get_bool_tag_value!(&key.characteristics, CallerNonce)?
        {
            return Err(km_err!(InvalidArgument, "caller nonce not authorized by key"));
        }

        match block_mode {
            BlockMode::Ocb => {
                build_ocb(imp, key, aes_key, params, padding, dir, caller_nonce, out_params)
            }
            _ => build_cipher(imp, aes_key, block_mode, padding, dir, caller_nonce, out_params),
        }
    }
}

/// Construct one of the streaming cipher operations (ECB/CBC/CFB/OFB).
fn build_cipher(
    imp: &mut crypto::Implementation<'_>,
    aes_key: aes::Key,
    block_mode: BlockMode,
    padding: PaddingMode,
    dir: SymmetricOperation,
    caller_nonce: Option<&Vec<u8>>,
    out_params: &mut AuthorizationSet,
) -> Result<Box<dyn Operation>, Error> {
    let mode = if block_mode == BlockMode::Ecb {
        if caller_nonce.is_some() {
            return Err(km_err!(InvalidArgument, "nonce unexpectedly provided for AES-ECB"));
        }
        match padding {
            PaddingMode::Pkcs7 => aes::CipherMode::EcbPkcs7Padding,
            _ => aes::CipherMode::EcbNoPadding,
        }
    } else {
        let iv: [u8; aes::BLOCK_SIZE] = match dir {
            SymmetricOperation::Encrypt => {
                let iv = crypto::nonce(aes::BLOCK_SIZE, caller_nonce, &mut *imp.rng)?;
                if caller_nonce.is_none() {
                    // Return the generated IV for the caller to persist.
                    out_params.push_back(KeyParam::Nonce(iv.clone()))?;
                }
                iv.try_into()
                    .map_err(|_e| km_err!(UnknownError, "generated IV of wrong size"))?
            }
            SymmetricOperation::Decrypt => {
                let iv = caller_nonce
                    .ok_or_else(|| km_err!(InvalidArgument, "IV required for decrypt"))?;
                iv.as_slice()
                    .try_into()
                    .map_err(|_e| km_err!(InvalidArgument, "want {} byte IV", aes::BLOCK_SIZE))?
            }
        };
        match (block_mode, padding) {
            (BlockMode::Cbc, PaddingMode::Pkcs7) => aes::CipherMode::CbcPkcs7Padding { nonce: iv },
            (BlockMode::Cbc, _) => aes::CipherMode::CbcNoPadding { nonce: iv },
            (BlockMode::Cfb, _) => aes::CipherMode::Cfb { nonce: iv },
            _ => aes::CipherMode::Ofb { nonce: iv },
        }
    };

    // The cipher itself handles PKCS7 for the block modes; for the stream
    // modes the padding is applied here.
    let stream_pkcs7 = matches!(block_mode, BlockMode::Cfb | BlockMode::Ofb)
        && padding == PaddingMode::Pkcs7;

    let inner = imp.aes.begin(aes_key, mode, dir)?;
    Ok(Box::new(AesCipherOperation {
        inner,
        block_mode,
        padding,
        dir,
        stream_pkcs7,
        total_input: 0,
        pending_tail: Vec::new(),
    }))
}

/// Streaming cipher operation over one of ECB/CBC/CFB/OFB.
struct AesCipherOperation {
    inner: Box<dyn EmittingOperation>,
    block_mode: BlockMode,
    padding: PaddingMode,
    dir: SymmetricOperation,
    stream_pkcs7: bool,
    total_input: usize,
    // Held-back tail for PKCS7 stripping in the stream modes.
    pending_tail: Vec<u8>,
}

impl Operation for AesCipherOperation {
    fn update(
        &mut self,
        _imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        self.total_input += input.len();
        if self.stream_pkcs7 && self.dir == SymmetricOperation::Decrypt {
            // Keep a final block in hand so the padding can be stripped once
            // the input ends.
            self.pending_tail.try_extend_from_slice(input)?;
            if self.pending_tail.len() > aes::BLOCK_SIZE {
                let feed = self.pending_tail.len() - aes::BLOCK_SIZE;
                let out = self.inner.update(&self.pending_tail[..feed])?;
                self.pending_tail.copy_within(feed.., 0);
                self.pending_tail.truncate(aes::BLOCK_SIZE);
                return Ok((input.len(), out));
            }
            return Ok((input.len(), Vec::new()));
        }
        let out = self.inner.update(input)?;
        Ok((input.len(), out))
    }

    fn finish(
        self: Box<Self>,
        _imp: &crypto::Implementation<'_>,
        _signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let this = *self;
        if this.stream_pkcs7 {
            return finish_stream_pkcs7(this);
        }

        if this.padding == PaddingMode::None
            && matches!(this.block_mode, BlockMode::Ecb | BlockMode::Cbc)
            && this.total_input % aes::BLOCK_SIZE != 0
        {
            return Err(km_err!(
                InvalidInputLength,
                "{} bytes not a multiple of the block size",
                this.total_input
            ));
        }
        let padding = this.padding;
        let dir = this.dir;
        this.inner.finish().map_err(|e| {
            if padding == PaddingMode::Pkcs7 && dir == SymmetricOperation::Decrypt {
                km_err!(InvalidArgument, "corrupt PKCS7 padding: {:?}", e)
            } else {
                e
            }
        })
    }
}

/// Apply or strip PKCS7 at the end of a stream-mode (CFB/OFB) operation.
fn finish_stream_pkcs7(mut op: AesCipherOperation) -> Result<Vec<u8>, Error> {
    match op.dir {
        SymmetricOperation::Encrypt => {
            let pad_len = aes::BLOCK_SIZE - (op.total_input % aes::BLOCK_SIZE);
            let pad = vec_try![pad_len as u8; pad_len]?;
            let mut output = op.inner.update(&pad)?;
            output.try_extend_from_slice(&op.inner.finish()?)?;
            Ok(output)
        }
        SymmetricOperation::Decrypt => {
            if op.total_input % aes::BLOCK_SIZE != 0 || op.pending_tail.len() != aes::BLOCK_SIZE {
                return Err(km_err!(
                    InvalidArgument,
                    "{} byte ciphertext cannot carry PKCS7 padding",
                    op.total_input
                ));
            }
            let mut tail = op.inner.update(&op.pending_tail)?;
            tail.try_extend_from_slice(&op.inner.finish()?)?;
            let pad_len = *tail.last().unwrap(/* safe: full block */) as usize;
            if pad_len == 0
                || pad_len > aes::BLOCK_SIZE
                || !tail[tail.len() - pad_len..].iter().all(|b| *b as usize == pad_len)
            {
                return Err(km_err!(InvalidArgument, "corrupt PKCS7 padding"));
            }
            tail.truncate(tail.len() - pad_len);
            Ok(tail)
        }
    }
}

/// Resolve the OCB chunk length: required, bounded, and consistent with the
/// key's own value when it carries one.
fn get_chunk_length(key: &Key, params: &AuthorizationSet) -> Result<usize, Error> {
    let param_value = get_opt_tag_value!(params, ChunkLength)?.copied();
    let key_value = get_opt_tag_value!(&key.characteristics, ChunkLength)?.copied();
    let chunk_length = match (param_value, key_value) {
        (Some(p), Some(k)) if p != k => {
            return Err(km_err!(InvalidArgument, "chunk length {} not authorized by key", p));
        }
        (Some(p), _) => p,
        (None, Some(k)) => k,
        (None, None) => {
            return Err(km_err!(InvalidArgument, "no CHUNK_LENGTH for AES-OCB"));
        }
    };
    if chunk_length < 1 || chunk_length > aes::MAX_CHUNK_LENGTH {
        return Err(km_err!(InvalidArgument, "chunk length {} out of range", chunk_length));
    }
    Ok(chunk_length as usize)
}

/// Resolve the OCB tag length (in bytes): required and in 12..=16.
fn get_mac_length(key: &Key, params: &AuthorizationSet) -> Result<usize, Error> {
    let param_value = get_opt_tag_value!(params, MacLength)?.copied();
    let key_value = get_opt_tag_value!(&key.characteristics, MacLength)?.copied();
    let mac_length = match (param_value, key_value) {
        (Some(p), Some(k)) if p != k => {
            return Err(km_err!(UnsupportedMacLength, "MAC length {} not authorized by key", p));
        }
        (Some(p), _) => p,
        (None, Some(k)) => k,
        (None, None) => return Err(km_err!(InvalidArgument, "no MAC_LENGTH for AES-OCB")),
    };
    if !(12..=16).contains(&mac_length) {
        return Err(km_err!(InvalidArgument, "OCB MAC length {} out of range", mac_length));
    }
    Ok(mac_length as usize)
}

/// Construct an OCB operation.
#[allow(clippy::too_many_arguments)]
fn build_ocb(
    imp: &mut crypto::Implementation<'_>,
    key: &Key,
    aes_key: aes::Key,
    params: &AuthorizationSet,
    padding: PaddingMode,
    dir: SymmetricOperation,
    caller_nonce: Option<&Vec<u8>>,
    out_params: &mut AuthorizationSet,
) -> Result<Box<dyn Operation>, Error> {
    if padding != PaddingMode::None {
        return Err(km_err!(UnsupportedPaddingMode, "AES-OCB takes no padding"));
    }
    let chunk_length = get_chunk_length(key, params)?;
    let tag_length = get_mac_length(key, params)?;

    Ok(match dir {
        SymmetricOperation::Encrypt => {
            let nonce_vec = crypto::nonce(aes::OCB_NONCE_SIZE, caller_nonce, &mut *imp.rng)?;
            if caller_nonce.is_none() {
                out_params.push_back(KeyParam::Nonce(nonce_vec.clone()))?;
            }
            let nonce: [u8; aes::OCB_NONCE_SIZE] = nonce_vec
                .try_into()
                .map_err(|_e| km_err!(UnknownError, "generated nonce of wrong size"))?;
            Box::new(AesOcbEncryptOperation {
                key: aes_key,
                nonce,
                chunk_length,
                tag_length,
                buffer: Vec::new(),
                nonce_emitted: false,
                chunks_sealed: false,
            })
        }
        SymmetricOperation::Decrypt => {
            // The chunked ciphertext leads with its own nonce.
            Box::new(AesOcbDecryptOperation {
                key: aes_key,
                nonce: [0; aes::OCB_NONCE_SIZE],
                have_nonce: false,
                chunk_length,
                tag_length,
                buffer: Vec::new(),
                chunks_opened: false,
            })
        }
    })
}

fn increment_nonce(nonce: &mut [u8; aes::OCB_NONCE_SIZE]) {
    for i in (1..aes::OCB_NONCE_SIZE).rev() {
        nonce[i] = nonce[i].wrapping_add(1);
        if nonce[i] != 0 {
            break;
        }
    }
}

/// Chunked AES-OCB encryption.  The ciphertext is
/// `nonce ‖ (chunk_ct ‖ tag)*` with one tag per chunk and the nonce
/// incremented between chunks.  A chunk is only sealed once input beyond it
/// arrives, so the final (possibly short or empty) chunk is sealed at
/// `finish`.
struct AesOcbEncryptOperation {
    key: aes::Key,
    nonce: [u8; aes::OCB_NONCE_SIZE],
    chunk_length: usize,
    tag_length: usize,
    buffer: Vec<u8>,
    nonce_emitted: bool,
    chunks_sealed: bool,
}

impl AesOcbEncryptOperation {
    fn seal_chunk(
        &mut self,
        imp: &crypto::Implementation<'_>,
        out: &mut Vec<u8>,
    ) -> Result<(), Error> {
        if self.chunks_sealed {
            increment_nonce(&mut self.nonce);
        }
        let ct_and_tag =
            imp.aes.ocb_seal(&self.key, &self.nonce, &[], &self.buffer, self.tag_length)?;
        out.try_extend_from_slice(&ct_and_tag)?;
        self.buffer.clear();
        self.chunks_sealed = true;
        Ok(())
    }
}

impl Operation for AesOcbEncryptOperation {
    fn update(
        &mut self,
        imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        let mut out = Vec::new();
        if !input.is_empty() && !self.nonce_emitted {
            out.try_extend_from_slice(&self.nonce)?;
            self.nonce_emitted = true;
        }
        let mut data = input;
        while !data.is_empty() {
            if self.buffer.len() == self.chunk_length {
                self.seal_chunk(imp, &mut out)?;
            }
            let take = core::cmp::min(self.chunk_length - self.buffer.len(), data.len());
            self.buffer.try_extend_from_slice(&data[..take])?;
            data = &data[take..];
        }
        Ok((input.len(), out))
    }

    fn finish(
        self: Box<Self>,
        imp: &crypto::Implementation<'_>,
        _signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let mut this = *self;
        let mut out = Vec::new();
        if !this.nonce_emitted {
            out.try_extend_from_slice(&this.nonce)?;
        }
        // The final chunk is sealed even when empty, so the shortest
        // ciphertext is nonce plus tag.
        this.seal_chunk(imp, &mut out)?;
        Ok(out)
    }
}

/// Chunked AES-OCB decryption, the inverse of [`AesOcbEncryptOperation`].
/// Every chunk's tag is verified; any mismatch fails the operation.
struct AesOcbDecryptOperation {
    key: aes::Key,
    nonce: [u8; aes::OCB_NONCE_SIZE],
    have_nonce: bool,
    chunk_length: usize,
    tag_length: usize,
    buffer: Vec<u8>,
    chunks_opened: bool,
}

impl AesOcbDecryptOperation {
    fn open_chunk(
        &mut self,
        imp: &crypto::Implementation<'_>,
        out: &mut Vec<u8>,
    ) -> Result<(), Error> {
        if self.chunks_opened {
            increment_nonce(&mut self.nonce);
        }
        let plaintext =
            imp.aes.ocb_open(&self.key, &self.nonce, &[], &self.buffer, self.tag_length)?;
        out.try_extend_from_slice(&plaintext)?;
        self.buffer.clear();
        self.chunks_opened = true;
        Ok(())
    }
}

impl Operation for AesOcbDecryptOperation {
    fn update(
        &mut self,
        imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        let mut out = Vec::new();
        let mut data = input;
        if !self.have_nonce {
            let need = aes::OCB_NONCE_SIZE - self.buffer.len();
            let take = core::cmp::min(need, data.len());
            self.buffer.try_extend_from_slice(&data[..take])?;
            data = &data[take..];
            if self.buffer.len() == aes::OCB_NONCE_SIZE {
                self.nonce =
                    self.buffer.as_slice().try_into().unwrap(/* safe: length checked */);
                self.buffer.clear();
                self.have_nonce = true;
            }
        }
        let unit = self.chunk_length + self.tag_length;
        while !data.is_empty() {
            if self.buffer.len() == unit {
                self.open_chunk(imp, &mut out)?;
            }
            let take = core::cmp::min(unit - self.buffer.len(), data.len());
            self.buffer.try_extend_from_slice(&data[..take])?;
            data = &data[take..];
        }
        Ok((input.len(), out))
    }

    fn finish(
        self: Box<Self>,
        imp: &crypto::Implementation<'_>,
        _signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let mut this = *self;
        if !this.have_nonce || this.buffer.len() < this.tag_length {
            return Err(km_err!(
                InvalidInputLength,
                "ciphertext shorter than nonce plus tag"
            ));
        }
        let mut out = Vec::new();
        this.open_chunk(imp, &mut out)?;
        Ok(out)
    }
}
