//! Key blob sealing properties: every bit of a blob is authenticated, and
//! the hidden set participates in that authentication.

use dkm_common::crypto::aes;
use dkm_common::{keyblob, Error};
use dkm_ossl::aes::OsslAes;
use dkm_tests::params;
use dkm_wire::{Algorithm, AuthorizationSet, ErrorCode, KeyParam, KeySizeInBits, Purpose};

fn code(e: Error) -> ErrorCode {
    e.into()
}

fn master_key() -> aes::Key {
    aes::Key::Aes128(*b"0123456789abcdef")
}

fn visible_sets() -> (AuthorizationSet, AuthorizationSet) {
    let enforced = params(&[KeyParam::NoAuthRequired]);
    let unenforced = params(&[
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::KeySize(KeySizeInBits(128)),
        KeyParam::Purpose(Purpose::Encrypt),
        KeyParam::Purpose(Purpose::Decrypt),
    ]);
    (enforced, unenforced)
}

fn hidden_set() -> AuthorizationSet {
    params(&[
        KeyParam::ApplicationId(b"app-id".as_slice().to_vec()),
        KeyParam::ApplicationData(b"app-data".as_slice().to_vec()),
        KeyParam::RootOfTrust(b"SW".as_slice().to_vec()),
    ])
}

fn seal_fixture() -> (Vec<u8>, Vec<u8>) {
    let key_material = vec![0x42u8; 16];
    let (enforced, unenforced) = visible_sets();
    let blob = keyblob::seal(
        &OsslAes,
        &master_key(),
        *b"unique nonce",
        &key_material,
        &enforced,
        &unenforced,
        &hidden_set(),
    )
    .unwrap();
    (blob, key_material)
}

#[test]
fn test_seal_unseal_round_trip() {
    let (blob, key_material) = seal_fixture();
    let plaintext = keyblob::unseal(&OsslAes, &master_key(), &blob, &hidden_set()).unwrap();
    let (enforced, unenforced) = visible_sets();
    assert_eq!(plaintext.enforced, enforced);
    assert_eq!(plaintext.unenforced, unenforced);
    assert_eq!(plaintext.key_material, key_material);
}

#[test]
fn test_visible_sets_without_unsealing() {
    let (blob, _) = seal_fixture();
    // The visible sets parse without the master key or hidden set.
    let parsed = keyblob::KeyBlob::parse(&blob).unwrap();
    assert_eq!(parsed.algorithm().unwrap(), Algorithm::Aes);
    assert_eq!(parsed.key_size().unwrap(), KeySizeInBits(128));
}

#[test]
fn test_any_tampered_byte_is_detected() {
    let (blob, _) = seal_fixture();
    for idx in 0..blob.len() {
        let mut bad = blob.clone();
        bad[idx] ^= 0x01;
        let err = keyblob::unseal(&OsslAes, &master_key(), &bad, &hidden_set())
            .err()
            .unwrap_or_else(|| panic!("tampered byte {} of {} went undetected", idx, blob.len()));
        assert_eq!(code(err), ErrorCode::InvalidKeyBlob, "wrong error for byte {}", idx);
    }
}

#[test]
fn test_truncated_blob_is_detected() {
    let (blob, _) = seal_fixture();
    for len in 0..blob.len() {
        let err = keyblob::unseal(&OsslAes, &master_key(), &blob[..len], &hidden_set())
            .err()
            .unwrap_or_else(|| panic!("truncation to {} bytes went undetected", len));
        assert_eq!(code(err), ErrorCode::InvalidKeyBlob);
    }
}

#[test]
fn test_wrong_master_key_is_detected() {
    let (blob, _) = seal_fixture();
    let other_key = aes::Key::Aes128([0x13; 16]);
    let err = keyblob::unseal(&OsslAes, &other_key, &blob, &hidden_set()).unwrap_err();
    assert_eq!(code(err), ErrorCode::InvalidKeyBlob);
}

#[test]
fn test_hidden_set_binds_blob() {
    let (blob, _) = seal_fixture();

    // Only the exact hidden set unseals the blob.
    keyblob::unseal(&OsslAes, &master_key(), &blob, &hidden_set()).unwrap();

    let wrong_sets = [
        params(&[]),
        params(&[
            KeyParam::ApplicationId(b"app-id".as_slice().to_vec()),
            KeyParam::RootOfTrust(b"SW".as_slice().to_vec()),
        ]),
        params(&[
            KeyParam::ApplicationId(b"other-app".as_slice().to_vec()),
            KeyParam::ApplicationData(b"app-data".as_slice().to_vec()),
            KeyParam::RootOfTrust(b"SW".as_slice().to_vec()),
        ]),
        params(&[
            KeyParam::ApplicationId(b"app-id".as_slice().to_vec()),
            KeyParam::ApplicationData(b"app-data".as_slice().to_vec()),
            KeyParam::RootOfTrust(b"HW".as_slice().to_vec()),
        ]),
    ];
    for hidden in wrong_sets {
        let err = keyblob::unseal(&OsslAes, &master_key(), &blob, &hidden).unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidKeyBlob);
    }
}

#[test]
fn test_empty_key_material_seals() {
    let (enforced, unenforced) = visible_sets();
    let blob = keyblob::seal(
        &OsslAes,
        &master_key(),
        [0u8; keyblob::NONCE_SIZE],
        &[],
        &enforced,
        &unenforced,
        &hidden_set(),
    )
    .unwrap();
    let plaintext = keyblob::unseal(&OsslAes, &master_key(), &blob, &hidden_set()).unwrap();
    assert!(plaintext.key_material.is_empty());
}
