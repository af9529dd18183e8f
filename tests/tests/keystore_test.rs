//! End-to-end tests driving the keystore through its public operations.

use dkm_common::{get_opt_tag_value, Error};
use dkm_core::Keystore;
use dkm_tests::{params, with_keystore};
use dkm_wire::{
    Algorithm, AuthorizationSet, BlockMode, Digest, ErrorCode, KeyFormat, KeyOrigin, KeyParam,
    KeySizeInBits, PaddingMode, Purpose, RsaExponent,
};

fn code(e: Error) -> ErrorCode {
    e.into()
}

fn has_param(set: &AuthorizationSet, param: &KeyParam) -> bool {
    set.params().contains(param)
}

/// Drive a full operation: begin, update (split across two calls), finish.
fn run_op(
    keystore: &mut Keystore,
    purpose: Purpose,
    key_blob: &[u8],
    begin_params: &AuthorizationSet,
    data: &[u8],
    signature: Option<&[u8]>,
) -> Result<(Vec<u8>, AuthorizationSet), Error> {
    let no_params = params(&[]);
    let (handle, out_params) = keystore.begin(purpose, key_blob, begin_params)?;
    let mut output = Vec::new();
    let (first, second) = data.split_at(data.len() / 2);
    for piece in [first, second] {
        if piece.is_empty() {
            continue;
        }
        let (consumed, out) = keystore.update(handle, &no_params, piece)?;
        assert_eq!(consumed, piece.len());
        output.extend_from_slice(&out);
    }
    let out = keystore.finish(handle, &no_params, signature)?;
    output.extend_from_slice(&out);
    Ok((output, out_params))
}

fn rsa_key_desc(key_size: u32) -> AuthorizationSet {
    params(&[
        KeyParam::Algorithm(Algorithm::Rsa),
        KeyParam::KeySize(KeySizeInBits(key_size)),
        KeyParam::RsaPublicExponent(RsaExponent(65537)),
        KeyParam::Purpose(Purpose::Sign),
        KeyParam::Purpose(Purpose::Verify),
        KeyParam::Purpose(Purpose::Encrypt),
        KeyParam::Purpose(Purpose::Decrypt),
        KeyParam::Digest(Digest::None),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::Padding(PaddingMode::None),
        KeyParam::Padding(PaddingMode::RsaPkcs115Sign),
        KeyParam::Padding(PaddingMode::RsaPss),
        KeyParam::Padding(PaddingMode::RsaOaep),
        KeyParam::Padding(PaddingMode::RsaPkcs115Encrypt),
    ])
}

#[test]
fn test_rsa_sign_verify_pss_sha256() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&rsa_key_desc(2048)).unwrap();
        assert!(has_param(&key.unenforced, &KeyParam::Origin(KeyOrigin::Generated)));

        let begin_params = params(&[
            KeyParam::Digest(Digest::Sha256),
            KeyParam::Padding(PaddingMode::RsaPss),
        ]);
        let message = vec![b'a'; 1024];
        let (signature, _) =
            run_op(keystore, Purpose::Sign, &key.key_blob, &begin_params, &message, None).unwrap();
        assert_eq!(signature.len(), 256);

        run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &begin_params,
            &message,
            Some(&signature),
        )
        .unwrap();

        // A corrupted signature must fail verification.
        let mut bad_signature = signature.clone();
        bad_signature[signature.len() / 2] ^= 0x01;
        let err = run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &begin_params,
            &message,
            Some(&bad_signature),
        )
        .unwrap_err();
        assert_eq!(code(err), ErrorCode::VerificationFailed);

        // So must a corrupted message.
        let mut bad_message = message.clone();
        bad_message[100] ^= 0x80;
        let err = run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &begin_params,
            &bad_message,
            Some(&signature),
        )
        .unwrap_err();
        assert_eq!(code(err), ErrorCode::VerificationFailed);
    });
}

#[test]
fn test_rsa_sign_raw_lengths() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&rsa_key_desc(1024)).unwrap();
        let begin_params = params(&[
            KeyParam::Digest(Digest::None),
            KeyParam::Padding(PaddingMode::None),
        ]);

        // Raw signing takes exactly one modulus worth of data.  Use a message
        // below the modulus value so the RSA operation is well-defined.
        let mut message = vec![0xa5u8; 128];
        message[0] = 0x00;
        let (signature, _) =
            run_op(keystore, Purpose::Sign, &key.key_blob, &begin_params, &message, None).unwrap();
        assert_eq!(signature.len(), 128);
        run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &begin_params,
            &message,
            Some(&signature),
        )
        .unwrap();

        let err =
            run_op(keystore, Purpose::Sign, &key.key_blob, &begin_params, &message[..100], None)
                .unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidInputLength);
    });
}

#[test]
fn test_rsa_sign_pkcs1() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&rsa_key_desc(2048)).unwrap();

        // Digested PKCS#1 v1.5.
        let begin_params = params(&[
            KeyParam::Digest(Digest::Sha256),
            KeyParam::Padding(PaddingMode::RsaPkcs115Sign),
        ]);
        let message = b"PKCS1 signing test message".as_slice().to_vec();
        let (signature, _) =
            run_op(keystore, Purpose::Sign, &key.key_blob, &begin_params, &message, None).unwrap();
        run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &begin_params,
            &message,
            Some(&signature),
        )
        .unwrap();

        // Undigested PKCS#1 v1.5 is limited by the padding overhead.
        let begin_params = params(&[
            KeyParam::Digest(Digest::None),
            KeyParam::Padding(PaddingMode::RsaPkcs115Sign),
        ]);
        let (signature, _) =
            run_op(keystore, Purpose::Sign, &key.key_blob, &begin_params, &message, None).unwrap();
        run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &begin_params,
            &message,
            Some(&signature),
        )
        .unwrap();

        let oversize = vec![b'x'; 256 - 10];
        let err =
            run_op(keystore, Purpose::Sign, &key.key_blob, &begin_params, &oversize, None)
                .unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidInputLength);
    });
}

#[test]
fn test_rsa_pss_requires_digest() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&rsa_key_desc(2048)).unwrap();
        let begin_params = params(&[
            KeyParam::Digest(Digest::None),
            KeyParam::Padding(PaddingMode::RsaPss),
        ]);
        let err = keystore.begin(Purpose::Sign, &key.key_blob, &begin_params).unwrap_err();
        assert_eq!(code(err), ErrorCode::UnsupportedDigest);
    });
}

#[test]
fn test_rsa_encrypt_decrypt() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&rsa_key_desc(2048)).unwrap();
        let message = b"RSA encryption test message".as_slice().to_vec();

        for padding in [PaddingMode::RsaOaep, PaddingMode::RsaPkcs115Encrypt] {
            let begin_params = params(&[KeyParam::Padding(padding)]);
            let (ciphertext, _) =
                run_op(keystore, Purpose::Encrypt, &key.key_blob, &begin_params, &message, None)
                    .unwrap();
            assert_eq!(ciphertext.len(), 256);
            let (plaintext, _) =
                run_op(keystore, Purpose::Decrypt, &key.key_blob, &begin_params, &ciphertext, None)
                    .unwrap();
            assert_eq!(plaintext, message);

            // Plaintext beyond the per-padding maximum is rejected at finish.
            let oversize = vec![b'y'; 256];
            let err =
                run_op(keystore, Purpose::Encrypt, &key.key_blob, &begin_params, &oversize, None)
                    .unwrap_err();
            assert_eq!(code(err), ErrorCode::InvalidInputLength);

            // A structurally impossible ciphertext reveals nothing specific.
            let garbage = vec![0xffu8; 256];
            let err =
                run_op(keystore, Purpose::Decrypt, &key.key_blob, &begin_params, &garbage, None)
                    .unwrap_err();
            assert_eq!(code(err), ErrorCode::UnknownError);
        }
    });
}

fn ec_key_desc(key_size: u32) -> AuthorizationSet {
    params(&[
        KeyParam::Algorithm(Algorithm::Ec),
        KeyParam::KeySize(KeySizeInBits(key_size)),
        KeyParam::Purpose(Purpose::Sign),
        KeyParam::Purpose(Purpose::Verify),
        KeyParam::Digest(Digest::None),
    ])
}

#[test]
fn test_ecdsa_key_sizes() {
    with_keystore(|keystore| {
        for key_size in [192, 224, 256, 384, 521] {
            keystore
                .generate_key(&ec_key_desc(key_size))
                .unwrap_or_else(|e| panic!("EC-{} generation failed: {:?}", key_size, e));
        }
        let err = keystore.generate_key(&ec_key_desc(190)).unwrap_err();
        assert_eq!(code(err), ErrorCode::UnsupportedKeySize);
    });
}

#[test]
fn test_ecdsa_sign_verify() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&ec_key_desc(256)).unwrap();
        let begin_params = params(&[KeyParam::Digest(Digest::None)]);
        let message = b"ECDSA message digest stand-in".as_slice().to_vec();

        let (signature, _) =
            run_op(keystore, Purpose::Sign, &key.key_blob, &begin_params, &message, None).unwrap();
        run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &begin_params,
            &message,
            Some(&signature),
        )
        .unwrap();

        let mut bad_message = message.clone();
        bad_message[4] ^= 0x20;
        let err = run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &begin_params,
            &bad_message,
            Some(&signature),
        )
        .unwrap_err();
        assert_eq!(code(err), ErrorCode::VerificationFailed);
    });
}

fn aes_key_desc() -> AuthorizationSet {
    params(&[
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::KeySize(KeySizeInBits(128)),
        KeyParam::Purpose(Purpose::Encrypt),
        KeyParam::Purpose(Purpose::Decrypt),
        KeyParam::BlockMode(BlockMode::Ocb),
        KeyParam::BlockMode(BlockMode::Ecb),
        KeyParam::BlockMode(BlockMode::Cbc),
        KeyParam::BlockMode(BlockMode::Cfb),
        KeyParam::BlockMode(BlockMode::Ofb),
        KeyParam::Padding(PaddingMode::None),
        KeyParam::Padding(PaddingMode::Pkcs7),
    ])
}

#[test]
fn test_aes_ocb_single_chunk() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&aes_key_desc()).unwrap();
        let begin_params = params(&[
            KeyParam::BlockMode(BlockMode::Ocb),
            KeyParam::Padding(PaddingMode::None),
            KeyParam::ChunkLength(4096),
            KeyParam::MacLength(16),
        ]);

        let message = b"Hello World!".as_slice().to_vec();
        let (ciphertext, _) =
            run_op(keystore, Purpose::Encrypt, &key.key_blob, &begin_params, &message, None)
                .unwrap();
        // nonce (12) + one chunk of ciphertext (12) + tag (16)
        assert_eq!(ciphertext.len(), 40);

        let (plaintext, _) =
            run_op(keystore, Purpose::Decrypt, &key.key_blob, &begin_params, &ciphertext, None)
                .unwrap();
        assert_eq!(plaintext, message);

        // Any flipped ciphertext bit fails authentication.
        let mut bad = ciphertext.clone();
        let flip = bad.len() / 2;
        bad[flip] ^= 0x01;
        let err = run_op(keystore, Purpose::Decrypt, &key.key_blob, &begin_params, &bad, None)
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::VerificationFailed);

        // Anything shorter than nonce plus tag cannot be a ciphertext.
        let err = run_op(
            keystore,
            Purpose::Decrypt,
            &key.key_blob,
            &begin_params,
            &ciphertext[..20],
            None,
        )
        .unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidInputLength);

        // Missing chunk length is rejected up front.
        let bad_params = params(&[
            KeyParam::BlockMode(BlockMode::Ocb),
            KeyParam::Padding(PaddingMode::None),
            KeyParam::MacLength(16),
        ]);
        let err = keystore.begin(Purpose::Encrypt, &key.key_blob, &bad_params).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidArgument);

        // As is a tag length outside 12..=16.
        let bad_params = params(&[
            KeyParam::BlockMode(BlockMode::Ocb),
            KeyParam::Padding(PaddingMode::None),
            KeyParam::ChunkLength(4096),
            KeyParam::MacLength(8),
        ]);
        let err = keystore.begin(Purpose::Encrypt, &key.key_blob, &bad_params).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidArgument);
    });
}

#[test]
fn test_aes_ocb_multi_chunk() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&aes_key_desc()).unwrap();
        let begin_params = params(&[
            KeyParam::BlockMode(BlockMode::Ocb),
            KeyParam::Padding(PaddingMode::None),
            KeyParam::ChunkLength(16),
            KeyParam::MacLength(12),
        ]);

        let message = vec![b'm'; 40];
        let (ciphertext, _) =
            run_op(keystore, Purpose::Encrypt, &key.key_blob, &begin_params, &message, None)
                .unwrap();
        // nonce + two full chunks and a final 8-byte chunk, each with a tag
        assert_eq!(ciphertext.len(), 12 + (16 + 12) + (16 + 12) + (8 + 12));

        let (plaintext, _) =
            run_op(keystore, Purpose::Decrypt, &key.key_blob, &begin_params, &ciphertext, None)
                .unwrap();
        assert_eq!(plaintext, message);

        // Corrupt the first chunk: with all the data fed in one update call,
        // the failure surfaces mid-stream and retires the operation.
        let mut bad = ciphertext.clone();
        bad[14] ^= 0x40;
        let no_params = params(&[]);
        let (handle, _) = keystore.begin(Purpose::Decrypt, &key.key_blob, &begin_params).unwrap();
        let err = keystore
            .update(handle, &no_params, &bad)
            .and_then(|_| keystore.finish(handle, &no_params, None))
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::VerificationFailed);
        // The operation is gone whichever call reported the failure.
        let err = keystore.abort(handle).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidOperationHandle);
    });
}

#[test]
fn test_aes_cbc_pkcs7_lengths() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&aes_key_desc()).unwrap();
        let begin_params = params(&[
            KeyParam::BlockMode(BlockMode::Cbc),
            KeyParam::Padding(PaddingMode::Pkcs7),
        ]);

        for i in 0..32usize {
            let message = vec![b'a'; i];
            let no_params = params(&[]);
            let (handle, out_params) =
                keystore.begin(Purpose::Encrypt, &key.key_blob, &begin_params).unwrap();
            let iv = get_opt_tag_value!(&out_params, Nonce).unwrap().unwrap().clone();
            assert_eq!(iv.len(), 16);
            let (_, mut ciphertext) = keystore.update(handle, &no_params, &message).unwrap();
            ciphertext.extend_from_slice(&keystore.finish(handle, &no_params, None).unwrap());

            // IV plus padded data.
            assert_eq!(iv.len() + ciphertext.len(), 16 + (i + 16 - (i % 16)));

            let decrypt_params = params(&[
                KeyParam::BlockMode(BlockMode::Cbc),
                KeyParam::Padding(PaddingMode::Pkcs7),
                KeyParam::Nonce(iv),
            ]);
            let (plaintext, _) = run_op(
                keystore,
                Purpose::Decrypt,
                &key.key_blob,
                &decrypt_params,
                &ciphertext,
                None,
            )
            .unwrap();
            assert_eq!(plaintext, message);
        }

        // Without padding, a partial block cannot be finished.
        let unpadded_params = params(&[
            KeyParam::BlockMode(BlockMode::Cbc),
            KeyParam::Padding(PaddingMode::None),
        ]);
        let message = vec![b'a'; 31];
        let err =
            run_op(keystore, Purpose::Encrypt, &key.key_blob, &unpadded_params, &message, None)
                .unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidInputLength);
    });
}

#[test]
fn test_aes_cbc_corrupt_padding() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&aes_key_desc()).unwrap();
        let begin_params = params(&[
            KeyParam::BlockMode(BlockMode::Cbc),
            KeyParam::Padding(PaddingMode::Pkcs7),
        ]);
        let message = vec![b'p'; 20];
        let no_params = params(&[]);
        let (handle, out_params) =
            keystore.begin(Purpose::Encrypt, &key.key_blob, &begin_params).unwrap();
        let iv = get_opt_tag_value!(&out_params, Nonce).unwrap().unwrap().clone();
        let (_, mut ciphertext) = keystore.update(handle, &no_params, &message).unwrap();
        ciphertext.extend_from_slice(&keystore.finish(handle, &no_params, None).unwrap());

        // Corrupt the final block, where the padding lives.
        let len = ciphertext.len();
        ciphertext[len - 1] ^= 0xff;
        let decrypt_params = params(&[
            KeyParam::BlockMode(BlockMode::Cbc),
            KeyParam::Padding(PaddingMode::Pkcs7),
            KeyParam::Nonce(iv),
        ]);
        let err = run_op(
            keystore,
            Purpose::Decrypt,
            &key.key_blob,
            &decrypt_params,
            &ciphertext,
            None,
        )
        .unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidArgument);
    });
}

#[test]
fn test_aes_caller_nonce() {
    with_keystore(|keystore| {
        // A key without CALLER_NONCE refuses a supplied IV on encrypt.
        let key = keystore.generate_key(&aes_key_desc()).unwrap();
        let begin_params = params(&[
            KeyParam::BlockMode(BlockMode::Cbc),
            KeyParam::Padding(PaddingMode::Pkcs7),
            KeyParam::Nonce(vec![0x42; 16]),
        ]);
        let err = keystore.begin(Purpose::Encrypt, &key.key_blob, &begin_params).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidArgument);

        // With CALLER_NONCE authorized the supplied IV is used as-is.
        let mut desc = aes_key_desc();
        desc.push_back(KeyParam::CallerNonce).unwrap();
        let key = keystore.generate_key(&desc).unwrap();
        let message = b"caller nonce round trip".as_slice().to_vec();
        let (ciphertext, out_params) =
            run_op(keystore, Purpose::Encrypt, &key.key_blob, &begin_params, &message, None)
                .unwrap();
        // No generated IV to report.
        assert!(get_opt_tag_value!(&out_params, Nonce).unwrap().is_none());

        let (plaintext, _) =
            run_op(keystore, Purpose::Decrypt, &key.key_blob, &begin_params, &ciphertext, None)
                .unwrap();
        assert_eq!(plaintext, message);

        // Decrypt with no IV at all cannot start.
        let bare_params = params(&[
            KeyParam::BlockMode(BlockMode::Cbc),
            KeyParam::Padding(PaddingMode::Pkcs7),
        ]);
        let err = keystore.begin(Purpose::Decrypt, &key.key_blob, &bare_params).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidArgument);
    });
}

#[test]
fn test_aes_block_mode_round_trips() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&aes_key_desc()).unwrap();
        let no_params = params(&[]);
        for (mode, padding, msg_len) in [
            (BlockMode::Ecb, PaddingMode::None, 32usize),
            (BlockMode::Ecb, PaddingMode::Pkcs7, 21),
            (BlockMode::Cbc, PaddingMode::None, 48),
            (BlockMode::Cfb, PaddingMode::None, 17),
            (BlockMode::Cfb, PaddingMode::Pkcs7, 17),
            (BlockMode::Ofb, PaddingMode::None, 23),
            (BlockMode::Ofb, PaddingMode::Pkcs7, 32),
        ] {
            let message = vec![0x5au8; msg_len];
            let begin_params =
                params(&[KeyParam::BlockMode(mode), KeyParam::Padding(padding)]);
            let (handle, out_params) =
                keystore.begin(Purpose::Encrypt, &key.key_blob, &begin_params).unwrap();
            let iv = get_opt_tag_value!(&out_params, Nonce).unwrap().cloned();
            let (_, mut ciphertext) = keystore.update(handle, &no_params, &message).unwrap();
            ciphertext.extend_from_slice(&keystore.finish(handle, &no_params, None).unwrap());

            if padding == PaddingMode::Pkcs7 {
                assert_eq!(ciphertext.len(), msg_len + 16 - (msg_len % 16));
            }

            let mut decrypt_params = begin_params.clone();
            if let Some(iv) = iv {
                decrypt_params.push_back(KeyParam::Nonce(iv)).unwrap();
            } else {
                assert_eq!(mode, BlockMode::Ecb);
            }
            let (plaintext, _) = run_op(
                keystore,
                Purpose::Decrypt,
                &key.key_blob,
                &decrypt_params,
                &ciphertext,
                None,
            )
            .unwrap();
            assert_eq!(plaintext, message, "round trip failed for {:?}/{:?}", mode, padding);
        }
    });
}

fn hmac_key_desc(digest: Digest) -> AuthorizationSet {
    params(&[
        KeyParam::Algorithm(Algorithm::Hmac),
        KeyParam::KeySize(KeySizeInBits(256)),
        KeyParam::Purpose(Purpose::Sign),
        KeyParam::Purpose(Purpose::Verify),
        KeyParam::Digest(digest),
    ])
}

#[test]
fn test_hmac_sha256() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&hmac_key_desc(Digest::Sha256)).unwrap();
        let sign_params = params(&[KeyParam::MacLength(32)]);
        let message = b"HMAC test message".as_slice().to_vec();

        let (mac, _) =
            run_op(keystore, Purpose::Sign, &key.key_blob, &sign_params, &message, None).unwrap();
        assert_eq!(mac.len(), 32);

        let verify_params = params(&[]);
        run_op(keystore, Purpose::Verify, &key.key_blob, &verify_params, &message, Some(&mac))
            .unwrap();

        // An oversize signature cannot be an HMAC tag.
        let mut oversize = mac.clone();
        oversize.push(0x00);
        let err = run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &verify_params,
            &message,
            Some(&oversize),
        )
        .unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidInputLength);

        // A flipped tag bit fails verification.
        let mut bad = mac.clone();
        bad[16] ^= 0x04;
        let err =
            run_op(keystore, Purpose::Verify, &key.key_blob, &verify_params, &message, Some(&bad))
                .unwrap_err();
        assert_eq!(code(err), ErrorCode::VerificationFailed);

        // A truncated tag still verifies against the prefix.
        run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &verify_params,
            &message,
            Some(&mac[..16]),
        )
        .unwrap();

        // Requesting more MAC than the digest provides fails at finish.
        let sign_params = params(&[KeyParam::MacLength(64)]);
        let err = run_op(keystore, Purpose::Sign, &key.key_blob, &sign_params, &message, None)
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::UnsupportedMacLength);
    });
}

#[test]
fn test_hmac_digests() {
    with_keystore(|keystore| {
        for (digest, digest_len) in [
            (Digest::Sha1, 20usize),
            (Digest::Sha224, 28),
            (Digest::Sha256, 32),
            (Digest::Sha384, 48),
            (Digest::Sha512, 64),
        ] {
            let key = keystore.generate_key(&hmac_key_desc(digest)).unwrap();
            let sign_params = params(&[KeyParam::MacLength(digest_len as u32)]);
            let message = b"digest coverage".as_slice().to_vec();
            let (mac, _) =
                run_op(keystore, Purpose::Sign, &key.key_blob, &sign_params, &message, None)
                    .unwrap();
            assert_eq!(mac.len(), digest_len);
            run_op(keystore, Purpose::Verify, &key.key_blob, &params(&[]), &message, Some(&mac))
                .unwrap();
        }
    });
}

#[test]
fn test_import_export_rsa() {
    with_keystore(|keystore| {
        let rsa = openssl::rsa::Rsa::generate(1024).unwrap();
        let pkey = openssl::pkey::PKey::from_rsa(rsa).unwrap();
        let pkcs8 = pkey.private_key_to_pkcs8().unwrap();

        // Import with the algorithm left implicit in the key material.
        let desc = params(&[
            KeyParam::Purpose(Purpose::Sign),
            KeyParam::Purpose(Purpose::Verify),
            KeyParam::Digest(Digest::Sha256),
            KeyParam::Padding(PaddingMode::RsaPkcs115Sign),
        ]);
        let key = keystore.import_key(&desc, KeyFormat::Pkcs8, &pkcs8).unwrap();
        assert!(has_param(&key.unenforced, &KeyParam::Algorithm(Algorithm::Rsa)));
        assert!(has_param(&key.unenforced, &KeyParam::KeySize(KeySizeInBits(1024))));
        assert!(has_param(&key.unenforced, &KeyParam::RsaPublicExponent(RsaExponent(65537))));
        assert!(has_param(&key.unenforced, &KeyParam::Origin(KeyOrigin::Imported)));

        // The imported key is usable.
        let begin_params = params(&[
            KeyParam::Digest(Digest::Sha256),
            KeyParam::Padding(PaddingMode::RsaPkcs115Sign),
        ]);
        let message = b"imported key signing".as_slice().to_vec();
        let (signature, _) =
            run_op(keystore, Purpose::Sign, &key.key_blob, &begin_params, &message, None).unwrap();
        run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &begin_params,
            &message,
            Some(&signature),
        )
        .unwrap();

        // Export the public half as SubjectPublicKeyInfo.
        let spki =
            keystore.export_key(KeyFormat::X509, &key.key_blob, &params(&[])).unwrap();
        let exported = openssl::pkey::PKey::public_key_from_der(&spki).unwrap();
        assert_eq!(exported.bits(), 1024);

        // Private formats are not exportable.
        let err =
            keystore.export_key(KeyFormat::Pkcs8, &key.key_blob, &params(&[])).unwrap_err();
        assert_eq!(code(err), ErrorCode::UnsupportedKeyFormat);

        // A tampered blob fails before anything else happens.
        let mut bad_blob = key.key_blob.clone();
        let flip = bad_blob.len() / 2;
        bad_blob[flip] ^= 0x01;
        let err = keystore.export_key(KeyFormat::X509, &bad_blob, &params(&[])).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidKeyBlob);

        // Mismatched explicit parameters are rejected.
        let mismatch = params(&[
            KeyParam::Algorithm(Algorithm::Rsa),
            KeyParam::KeySize(KeySizeInBits(2048)),
        ]);
        let err = keystore.import_key(&mismatch, KeyFormat::Pkcs8, &pkcs8).unwrap_err();
        assert_eq!(code(err), ErrorCode::ImportParameterMismatch);
    });
}

#[test]
fn test_import_aes_raw() {
    with_keystore(|keystore| {
        let key_bytes = vec![0x11u8; 16];
        let desc = params(&[
            KeyParam::Algorithm(Algorithm::Aes),
            KeyParam::Purpose(Purpose::Encrypt),
            KeyParam::Purpose(Purpose::Decrypt),
            KeyParam::BlockMode(BlockMode::Ecb),
            KeyParam::Padding(PaddingMode::Pkcs7),
        ]);
        let key = keystore.import_key(&desc, KeyFormat::Raw, &key_bytes).unwrap();
        assert!(has_param(&key.unenforced, &KeyParam::KeySize(KeySizeInBits(128))));
        assert!(has_param(&key.unenforced, &KeyParam::Origin(KeyOrigin::Imported)));

        let begin_params = params(&[
            KeyParam::BlockMode(BlockMode::Ecb),
            KeyParam::Padding(PaddingMode::Pkcs7),
        ]);
        let message = b"imported AES key".as_slice().to_vec();
        let (ciphertext, _) =
            run_op(keystore, Purpose::Encrypt, &key.key_blob, &begin_params, &message, None)
                .unwrap();
        let (plaintext, _) =
            run_op(keystore, Purpose::Decrypt, &key.key_blob, &begin_params, &ciphertext, None)
                .unwrap();
        assert_eq!(plaintext, message);

        // Declared size disagreeing with the material is a mismatch.
        let mut mismatch_desc = desc.clone();
        mismatch_desc.push_back(KeyParam::KeySize(KeySizeInBits(256))).unwrap();
        let err = keystore.import_key(&mismatch_desc, KeyFormat::Raw, &key_bytes).unwrap_err();
        assert_eq!(code(err), ErrorCode::ImportParameterMismatch);

        // And material of no valid AES size is rejected outright.
        let err = keystore.import_key(&desc, KeyFormat::Raw, &[0u8; 17]).unwrap_err();
        assert_eq!(code(err), ErrorCode::UnsupportedKeySize);
    });
}

#[test]
fn test_import_ec_pkcs8() {
    with_keystore(|keystore| {
        let group =
            openssl::ec::EcGroup::from_curve_name(openssl::nid::Nid::SECP384R1).unwrap();
        let ec_key = openssl::ec::EcKey::generate(&group).unwrap();
        let pkey = openssl::pkey::PKey::from_ec_key(ec_key).unwrap();
        let pkcs8 = pkey.private_key_to_pkcs8().unwrap();

        let desc = params(&[
            KeyParam::Purpose(Purpose::Sign),
            KeyParam::Purpose(Purpose::Verify),
            KeyParam::Digest(Digest::None),
        ]);
        let key = keystore.import_key(&desc, KeyFormat::Pkcs8, &pkcs8).unwrap();
        assert!(has_param(&key.unenforced, &KeyParam::Algorithm(Algorithm::Ec)));
        assert!(has_param(&key.unenforced, &KeyParam::KeySize(KeySizeInBits(384))));

        let begin_params = params(&[KeyParam::Digest(Digest::None)]);
        let message = b"imported EC key".as_slice().to_vec();
        let (signature, _) =
            run_op(keystore, Purpose::Sign, &key.key_blob, &begin_params, &message, None).unwrap();
        run_op(
            keystore,
            Purpose::Verify,
            &key.key_blob,
            &begin_params,
            &message,
            Some(&signature),
        )
        .unwrap();
    });
}

#[test]
fn test_client_binding() {
    with_keystore(|keystore| {
        // P8: client-binding tags never show up in the characteristics.
        let mut desc = aes_key_desc();
        desc.push_back(KeyParam::ApplicationId(b"client-a".as_slice().to_vec())).unwrap();
        desc.push_back(KeyParam::ApplicationData(b"context".as_slice().to_vec())).unwrap();
        let key = keystore.generate_key(&desc).unwrap();
        for set in [&key.enforced, &key.unenforced] {
            assert!(!set.contains_tag(dkm_wire::Tag::RootOfTrust));
            assert!(!set.contains_tag(dkm_wire::Tag::ApplicationId));
            assert!(!set.contains_tag(dkm_wire::Tag::ApplicationData));
        }

        // The blob only unseals in the client context it was minted for.
        let client = params(&[
            KeyParam::ApplicationId(b"client-a".as_slice().to_vec()),
            KeyParam::ApplicationData(b"context".as_slice().to_vec()),
        ]);
        keystore.get_key_characteristics(&key.key_blob, &client).unwrap();

        let err = keystore.get_key_characteristics(&key.key_blob, &params(&[])).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidKeyBlob);

        let other_client = params(&[
            KeyParam::ApplicationId(b"client-b".as_slice().to_vec()),
            KeyParam::ApplicationData(b"context".as_slice().to_vec()),
        ]);
        let err = keystore.get_key_characteristics(&key.key_blob, &other_client).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidKeyBlob);

        let begin_params = params(&[
            KeyParam::BlockMode(BlockMode::Cbc),
            KeyParam::Padding(PaddingMode::Pkcs7),
        ]);
        let err = keystore.begin(Purpose::Encrypt, &key.key_blob, &begin_params).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidKeyBlob);
    });
}

#[test]
fn test_get_key_characteristics() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&hmac_key_desc(Digest::Sha256)).unwrap();
        let (enforced, unenforced) =
            keystore.get_key_characteristics(&key.key_blob, &params(&[])).unwrap();
        assert_eq!(enforced, key.enforced);
        assert_eq!(unenforced, key.unenforced);
        // The software profile enforces nothing itself.
        assert!(enforced.is_empty());
        assert!(unenforced.contains_tag(dkm_wire::Tag::CreationDatetime));

        let mut bad_blob = key.key_blob.clone();
        bad_blob[0] ^= 0x01;
        let err = keystore.get_key_characteristics(&bad_blob, &params(&[])).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidKeyBlob);
    });
}

#[test]
fn test_handle_uniqueness_and_exhaustion() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&hmac_key_desc(Digest::Sha256)).unwrap();
        let sign_params = params(&[KeyParam::MacLength(32)]);

        let mut handles = Vec::new();
        for _ in 0..dkm_core::MAX_OPERATIONS {
            let (handle, _) =
                keystore.begin(Purpose::Sign, &key.key_blob, &sign_params).unwrap();
            assert_ne!(handle, 0);
            assert!(!handles.contains(&handle));
            handles.push(handle);
        }

        // The table is full now.
        let err = keystore.begin(Purpose::Sign, &key.key_blob, &sign_params).unwrap_err();
        assert_eq!(code(err), ErrorCode::TooManyOperations);

        // Aborting one frees a slot.
        keystore.abort(handles[3]).unwrap();
        let (handle, _) = keystore.begin(Purpose::Sign, &key.key_blob, &sign_params).unwrap();
        assert_ne!(handle, 0);
    });
}

#[test]
fn test_finish_retires_operation() {
    with_keystore(|keystore| {
        let key = keystore.generate_key(&hmac_key_desc(Digest::Sha256)).unwrap();
        let no_params = params(&[]);

        // Successful finish retires the handle.
        let (handle, _) =
            keystore.begin(Purpose::Sign, &key.key_blob, &params(&[KeyParam::MacLength(32)]))
                .unwrap();
        keystore.update(handle, &no_params, b"msg").unwrap();
        keystore.finish(handle, &no_params, None).unwrap();
        let err = keystore.abort(handle).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidOperationHandle);

        // So does a failing finish.
        let (handle, _) = keystore.begin(Purpose::Verify, &key.key_blob, &no_params).unwrap();
        keystore.update(handle, &no_params, b"msg").unwrap();
        let err = keystore.finish(handle, &no_params, Some(&[0u8; 32])).unwrap_err();
        assert_eq!(code(err), ErrorCode::VerificationFailed);
        let err = keystore.abort(handle).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidOperationHandle);
    });
}

#[test]
fn test_unauthorized_parameters() {
    with_keystore(|keystore| {
        // Key authorizes CBC only.
        let desc = params(&[
            KeyParam::Algorithm(Algorithm::Aes),
            KeyParam::KeySize(KeySizeInBits(128)),
            KeyParam::Purpose(Purpose::Encrypt),
            KeyParam::BlockMode(BlockMode::Cbc),
            KeyParam::Padding(PaddingMode::None),
        ]);
        let key = keystore.generate_key(&desc).unwrap();

        let err = keystore
            .begin(
                Purpose::Encrypt,
                &key.key_blob,
                &params(&[
                    KeyParam::BlockMode(BlockMode::Ecb),
                    KeyParam::Padding(PaddingMode::None),
                ]),
            )
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::UnsupportedBlockMode);

        let err = keystore
            .begin(
                Purpose::Encrypt,
                &key.key_blob,
                &params(&[
                    KeyParam::BlockMode(BlockMode::Cbc),
                    KeyParam::Padding(PaddingMode::Pkcs7),
                ]),
            )
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::UnsupportedPaddingMode);

        // Decrypt was never authorized for this key.
        let err = keystore
            .begin(
                Purpose::Decrypt,
                &key.key_blob,
                &params(&[
                    KeyParam::BlockMode(BlockMode::Cbc),
                    KeyParam::Padding(PaddingMode::None),
                ]),
            )
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::IncompatiblePurpose);
    });
}

#[test]
fn test_process_envelope() {
    use dkm_wire::Message;
    with_keystore(|keystore| {
        // GetVersion over the wire.
        let req = dkm_wire::GetVersionRequest {};
        let rsp_data = keystore.process(dkm_wire::GET_VERSION, &req.to_vec().unwrap());
        let rsp: Result<dkm_wire::GetVersionResponse, ErrorCode> =
            dkm_wire::deserialize_response(&rsp_data).unwrap();
        let version = rsp.unwrap();
        assert_eq!(version.major_ver, 1);
        assert_eq!(
            dkm_wire::message_version(
                version.major_ver,
                version.minor_ver,
                version.subminor_ver
            ),
            Some(dkm_wire::MAX_MESSAGE_VERSION)
        );

        // Generate a key and run an HMAC operation purely through serialized
        // messages.
        let req = dkm_wire::GenerateKeyRequest { key_description: hmac_key_desc(Digest::Sha256) };
        let rsp_data = keystore.process(dkm_wire::GENERATE_KEY, &req.to_vec().unwrap());
        let rsp: Result<dkm_wire::GenerateKeyResponse, ErrorCode> =
            dkm_wire::deserialize_response(&rsp_data).unwrap();
        let generated = rsp.unwrap();
        assert!(!generated.key_blob.is_empty());

        let req = dkm_wire::BeginOperationRequest {
            purpose: Purpose::Sign,
            key_blob: generated.key_blob.clone(),
            additional_params: params(&[KeyParam::MacLength(32)]),
        };
        let rsp_data = keystore.process(dkm_wire::BEGIN_OPERATION, &req.to_vec().unwrap());
        let rsp: Result<dkm_wire::BeginOperationResponse, ErrorCode> =
            dkm_wire::deserialize_response(&rsp_data).unwrap();
        let begun = rsp.unwrap();
        assert_ne!(begun.op_handle, 0);

        let req = dkm_wire::UpdateOperationRequest {
            op_handle: begun.op_handle,
            input: b"wire message data".as_slice().to_vec(),
            additional_params: params(&[]),
        };
        let rsp_data = keystore.process(dkm_wire::UPDATE_OPERATION, &req.to_vec().unwrap());
        let rsp: Result<dkm_wire::UpdateOperationResponse, ErrorCode> =
            dkm_wire::deserialize_response(&rsp_data).unwrap();
        assert_eq!(rsp.unwrap().consumed, 17);

        let req = dkm_wire::FinishOperationRequest {
            op_handle: begun.op_handle,
            signature: Vec::new(),
            additional_params: params(&[]),
        };
        let rsp_data = keystore.process(dkm_wire::FINISH_OPERATION, &req.to_vec().unwrap());
        let rsp: Result<dkm_wire::FinishOperationResponse, ErrorCode> =
            dkm_wire::deserialize_response(&rsp_data).unwrap();
        assert_eq!(rsp.unwrap().output.len(), 32);

        // A bad key blob produces an error envelope.
        let req = dkm_wire::BeginOperationRequest {
            purpose: Purpose::Sign,
            key_blob: vec![0u8; 8],
            additional_params: params(&[KeyParam::MacLength(32)]),
        };
        let rsp_data = keystore.process(dkm_wire::BEGIN_OPERATION, &req.to_vec().unwrap());
        let rsp: Result<dkm_wire::BeginOperationResponse, ErrorCode> =
            dkm_wire::deserialize_response(&rsp_data).unwrap();
        assert_eq!(rsp, Err(ErrorCode::InvalidKeyBlob));
    });
}

#[test]
fn test_add_entropy() {
    with_keystore(|keystore| {
        keystore.add_entropy(b"some external entropy");
        // The pool keeps producing distinct handles afterwards.
        let key = keystore.generate_key(&hmac_key_desc(Digest::Sha256)).unwrap();
        let (h1, _) =
            keystore.begin(Purpose::Sign, &key.key_blob, &params(&[KeyParam::MacLength(32)]))
                .unwrap();
        let (h2, _) =
            keystore.begin(Purpose::Sign, &key.key_blob, &params(&[KeyParam::MacLength(32)]))
                .unwrap();
        assert_ne!(h1, h2);
    });
}
