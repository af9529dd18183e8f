//! Property tests for the wire format: round-trip fidelity and parse safety.

use dkm_wire::{
    tag_type, Algorithm, AuthorizationSet, ErrorCode, KeyParam, KeySizeInBits, Message, Purpose,
    RsaExponent,
};
use proptest::prelude::*;

fn arb_purpose() -> impl Strategy<Value = Purpose> {
    prop_oneof![
        Just(Purpose::Encrypt),
        Just(Purpose::Decrypt),
        Just(Purpose::Sign),
        Just(Purpose::Verify),
    ]
}

fn arb_key_param() -> impl Strategy<Value = KeyParam> {
    let scalar = prop_oneof![
        arb_purpose().prop_map(KeyParam::Purpose),
        prop_oneof![
            Just(Algorithm::Rsa),
            Just(Algorithm::Ec),
            Just(Algorithm::Aes),
            Just(Algorithm::Hmac),
        ]
        .prop_map(KeyParam::Algorithm),
        any::<u32>().prop_map(|v| KeyParam::KeySize(KeySizeInBits(v))),
        any::<u32>().prop_map(KeyParam::MacLength),
        any::<u64>().prop_map(|v| KeyParam::RsaPublicExponent(RsaExponent(v))),
        any::<u64>().prop_map(KeyParam::CreationDatetime),
        Just(KeyParam::NoAuthRequired),
        Just(KeyParam::CallerNonce),
    ];
    let blob = prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..32).prop_map(KeyParam::ApplicationId),
        proptest::collection::vec(any::<u8>(), 0..32).prop_map(KeyParam::ApplicationData),
        proptest::collection::vec(any::<u8>(), 0..32).prop_map(KeyParam::DsaP),
        proptest::collection::vec(any::<u8>(), 0..32).prop_map(KeyParam::Nonce),
    ];
    prop_oneof![scalar, blob]
}

/// A legal authorization set: arbitrary parameters with duplicate
/// non-repeatable tags removed.
fn arb_auth_set() -> impl Strategy<Value = AuthorizationSet> {
    proptest::collection::vec(arb_key_param(), 0..12).prop_map(|params| {
        let mut seen: Vec<u32> = Vec::new();
        let mut result = Vec::new();
        for param in params {
            let raw = param.raw_tag();
            if tag_type(raw).is_repeatable() || !seen.contains(&raw) {
                seen.push(raw);
                result.push(param);
            }
        }
        AuthorizationSet::from(result)
    })
}

proptest! {
    // Round trip: every legal set deserializes to an equal set, consuming
    // exactly `serialized_size` bytes.
    #[test]
    fn prop_auth_set_round_trip(set in arb_auth_set()) {
        let data = set.to_vec().unwrap();
        prop_assert_eq!(data.len(), set.serialized_size());
        let (got, rest) = AuthorizationSet::deserialize(&data).unwrap();
        prop_assert!(rest.is_empty());
        prop_assert_eq!(got, set);
    }

    // Parse safety: every proper prefix of a valid encoding fails cleanly,
    // and trailing data is left unconsumed.
    #[test]
    fn prop_auth_set_prefix_safety(
        set in arb_auth_set(),
        extra in proptest::collection::vec(any::<u8>(), 1..16),
    ) {
        let data = set.to_vec().unwrap();
        for len in 0..data.len() {
            prop_assert!(AuthorizationSet::from_slice(&data[..len]).is_err());
        }
        let mut padded = data.clone();
        padded.extend_from_slice(&extra);
        let (got, rest) = AuthorizationSet::deserialize(&padded).unwrap();
        prop_assert_eq!(rest.len(), extra.len());
        prop_assert_eq!(got, set);
    }

    // Arbitrary input never crashes any of the deserializers.
    #[test]
    fn prop_arbitrary_bytes_fail_cleanly(
        data in proptest::collection::vec(any::<u8>(), 0..300),
    ) {
        let _ = AuthorizationSet::from_slice(&data);
        let _ = dkm_wire::GenerateKeyRequest::from_slice(&data);
        let _ = dkm_wire::ImportKeyRequest::from_slice(&data);
        let _ = dkm_wire::ExportKeyRequest::from_slice(&data);
        let _ = dkm_wire::BeginOperationRequest::from_slice(&data);
        let _ = dkm_wire::UpdateOperationRequest::from_slice(&data);
        let _ = dkm_wire::FinishOperationRequest::from_slice(&data);
        let _ = dkm_wire::AbortOperationRequest::from_slice(&data);
        let _ = dkm_wire::GetKeyCharacteristicsRequest::from_slice(&data);
        let _ = dkm_wire::deserialize_response::<dkm_wire::GenerateKeyResponse>(&data);
        let _ = dkm_wire::deserialize_response::<dkm_wire::BeginOperationResponse>(&data);
        let _ = dkm_wire::UpdateOperationResponse::deserialize_versioned(0, &data);
        let _ = dkm_wire::UpdateOperationResponse::deserialize_versioned(1, &data);
        let _ = dkm_common::keyblob::KeyBlob::parse(&data);
    }

    // Round trip of a composite request message.
    #[test]
    fn prop_begin_request_round_trip(
        purpose in arb_purpose(),
        key_blob in proptest::collection::vec(any::<u8>(), 0..64),
        additional_params in arb_auth_set(),
    ) {
        let msg = dkm_wire::BeginOperationRequest { purpose, key_blob, additional_params };
        let data = msg.to_vec().unwrap();
        prop_assert_eq!(data.len(), msg.serialized_size());
        let got = dkm_wire::BeginOperationRequest::from_slice(&data).unwrap();
        prop_assert_eq!(got, msg);
    }

    // Round trip of a response envelope, success and failure.
    #[test]
    fn prop_response_envelope_round_trip(
        output in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let body = dkm_wire::FinishOperationResponse { output };
        let data = dkm_wire::serialize_response(Ok(&body)).unwrap();
        let got: Result<dkm_wire::FinishOperationResponse, ErrorCode> =
            dkm_wire::deserialize_response(&data).unwrap();
        prop_assert_eq!(got, Ok(body));

        let data = dkm_wire::serialize_response::<dkm_wire::FinishOperationResponse>(
            Err(ErrorCode::TooManyOperations),
        )
        .unwrap();
        let got: Result<dkm_wire::FinishOperationResponse, ErrorCode> =
            dkm_wire::deserialize_response(&data).unwrap();
        prop_assert_eq!(got, Err(ErrorCode::TooManyOperations));
    }
}
