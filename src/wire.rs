// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Fixed-layout binary codec for every protocol message.
//!
//! All multi-byte integers are **little-endian**. Every `decode` validates
//! the byte count against the fixed field sizes and fails with
//! [`CodecError::Length`] on any disagreement; nothing is silently truncated
//! or padded.
//!
//! ## Message Layouts
//!
//! | Message | Layout (bytes) |
//! |---------|----------------|
//! | `TokenList` | `u32 token_len` + concatenated fixed-size elements |
//! | `HashPayload` | `sensor_id[16] ‖ data_hash[32]` |
//! | `SignedHashPayload` | `hash_payload[48] ‖ signature[64]` |
//! | `PredeliveryPayload` | `nonce[16] ‖ data_hash[32] ‖ encrypted_token[var]` |
//! | `SignedPredeliveryPayload` | `predelivery ‖ signature[64]` (tail) |
//! | `TokenPayload` | `nonce[16] ‖ token[64] ‖ data_hash[32]` |
//! | `SignedTokenPayload` | `token_payload[112] ‖ signature[64]` |
//! | `TokenRedemptionPayload` | `mule_id[16] ‖ TokenList` |
//! | `ComplaintPayload` | `complaint_token[64] ‖ blinded_token[160] ‖ appserver_id[16] ‖ type[1] ‖ record[var]` |
//! | `NewEpochRequest` | `mule_id[16] ‖ TokenList` |
//! | `NewEpochResponse` | `u32 sig_len ‖ u32 dup_len ‖ signed[sig_len] ‖ duplicates[dup_len]` |

/// Size of a sensor identifier.
pub const SENSOR_ID_BYTES: usize = 16;
/// Size of a mule identifier.
pub const MULE_ID_BYTES: usize = 16;
/// Size of an appserver identifier.
pub const APPSERVER_ID_BYTES: usize = 16;
/// Size of a SHA-256 data hash.
pub const DATA_HASH_BYTES: usize = 32;
/// Size of a per-delivery protocol nonce.
pub const NONCE_BYTES: usize = 16;
/// Size of a raw ECDSA P-256 signature (r ‖ s).
pub const SIGNATURE_BYTES: usize = 64;
/// Size of an unblinded single-use token.
pub const TOKEN_BYTES: usize = 64;
/// Size of a blinded (or blind-signed) token frame.
pub const BLINDED_TOKEN_BYTES: usize = 160;

const HASH_PAYLOAD_BYTES: usize = SENSOR_ID_BYTES + DATA_HASH_BYTES;
const TOKEN_PAYLOAD_BYTES: usize = NONCE_BYTES + TOKEN_BYTES + DATA_HASH_BYTES;
const COMPLAINT_HEADER_BYTES: usize = TOKEN_BYTES + BLINDED_TOKEN_BYTES + APPSERVER_ID_BYTES + 1;

/// Codec failure. Decoding never mutates state, so every error is safe to
/// surface directly to the caller.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("{message}: expected {expected} bytes, got {actual}")]
    Length {
        message: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{message}: body length {actual} is not a multiple of element width {width}")]
    Alignment {
        message: &'static str,
        width: usize,
        actual: usize,
    },

    #[error("{message}: invalid value {value}")]
    Value { message: &'static str, value: u8 },
}

fn take<const N: usize>(
    buf: &[u8],
    offset: usize,
    message: &'static str,
) -> Result<[u8; N], CodecError> {
    let end = offset + N;
    if buf.len() < end {
        return Err(CodecError::Length {
            message,
            expected: end,
            actual: buf.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..end]);
    Ok(out)
}

fn read_u32(buf: &[u8], offset: usize, message: &'static str) -> Result<u32, CodecError> {
    Ok(u32::from_le_bytes(take::<4>(buf, offset, message)?))
}

// =============================================================================
// TokenList
// =============================================================================

/// Concatenation of equal-width opaque token frames, prefixed with the
/// element width. An empty list encodes as a zero width and no body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenList {
    width: usize,
    items: Vec<Vec<u8>>,
}

impl TokenList {
    /// Build a list of `width`-byte elements. Every element must match the
    /// declared width.
    pub fn new(width: usize, items: Vec<Vec<u8>>) -> Result<Self, CodecError> {
        for item in &items {
            if item.len() != width {
                return Err(CodecError::Length {
                    message: "token list element",
                    expected: width,
                    actual: item.len(),
                });
            }
        }
        Ok(Self { width, items })
    }

    /// List of unblinded 64-byte tokens.
    pub fn from_tokens(tokens: impl IntoIterator<Item = [u8; TOKEN_BYTES]>) -> Self {
        Self {
            width: TOKEN_BYTES,
            items: tokens.into_iter().map(|t| t.to_vec()).collect(),
        }
    }

    /// List of 160-byte blinded (or blind-signed) token frames.
    pub fn from_blinded(tokens: impl IntoIterator<Item = [u8; BLINDED_TOKEN_BYTES]>) -> Self {
        Self {
            width: BLINDED_TOKEN_BYTES,
            items: tokens.into_iter().map(|t| t.to_vec()).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Vec<u8>] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Vec<u8>> {
        self.items
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.width * self.items.len());
        out.extend_from_slice(&(self.width as u32).to_le_bytes());
        for item in &self.items {
            out.extend_from_slice(item);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let width = read_u32(buf, 0, "token list width")? as usize;
        let body = &buf[4..];
        if width == 0 {
            if !body.is_empty() {
                return Err(CodecError::Alignment {
                    message: "token list",
                    width,
                    actual: body.len(),
                });
            }
            return Ok(Self::default());
        }
        if body.len() % width != 0 {
            return Err(CodecError::Alignment {
                message: "token list",
                width,
                actual: body.len(),
            });
        }
        let items = body.chunks_exact(width).map(<[u8]>::to_vec).collect();
        Ok(Self { width, items })
    }
}

// =============================================================================
// Delivery handshake payloads
// =============================================================================

/// Sensor commitment: `(sensor_id, SHA256(data))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashPayload {
    pub sensor_id: [u8; SENSOR_ID_BYTES],
    pub data_hash: [u8; DATA_HASH_BYTES],
}

impl HashPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HASH_PAYLOAD_BYTES);
        out.extend_from_slice(&self.sensor_id);
        out.extend_from_slice(&self.data_hash);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != HASH_PAYLOAD_BYTES {
            return Err(CodecError::Length {
                message: "hash payload",
                expected: HASH_PAYLOAD_BYTES,
                actual: buf.len(),
            });
        }
        Ok(Self {
            sensor_id: take(buf, 0, "hash payload")?,
            data_hash: take(buf, SENSOR_ID_BYTES, "hash payload")?,
        })
    }
}

/// [`HashPayload`] plus the sensor's ECDSA signature over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHashPayload {
    pub payload: HashPayload,
    pub signature: [u8; SIGNATURE_BYTES],
}

impl SignedHashPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.payload.encode();
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let expected = HASH_PAYLOAD_BYTES + SIGNATURE_BYTES;
        if buf.len() != expected {
            return Err(CodecError::Length {
                message: "signed hash payload",
                expected,
                actual: buf.len(),
            });
        }
        Ok(Self {
            payload: HashPayload::decode(&buf[..HASH_PAYLOAD_BYTES])?,
            signature: take(buf, HASH_PAYLOAD_BYTES, "signed hash payload")?,
        })
    }
}

/// AppServer commitment to a token: the token is encrypted under the
/// appserver's symmetric key, so the mule cannot spend it before delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredeliveryPayload {
    pub nonce: [u8; NONCE_BYTES],
    pub data_hash: [u8; DATA_HASH_BYTES],
    pub encrypted_token: Vec<u8>,
}

impl PredeliveryPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_BYTES + DATA_HASH_BYTES + self.encrypted_token.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.data_hash);
        out.extend_from_slice(&self.encrypted_token);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let fixed = NONCE_BYTES + DATA_HASH_BYTES;
        if buf.len() < fixed {
            return Err(CodecError::Length {
                message: "predelivery payload",
                expected: fixed,
                actual: buf.len(),
            });
        }
        Ok(Self {
            nonce: take(buf, 0, "predelivery payload")?,
            data_hash: take(buf, NONCE_BYTES, "predelivery payload")?,
            encrypted_token: buf[fixed..].to_vec(),
        })
    }
}

/// [`PredeliveryPayload`] plus the appserver's signature (tail 64 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPredeliveryPayload {
    pub payload: PredeliveryPayload,
    pub signature: [u8; SIGNATURE_BYTES],
}

impl SignedPredeliveryPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.payload.encode();
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let min = NONCE_BYTES + DATA_HASH_BYTES + SIGNATURE_BYTES;
        if buf.len() < min {
            return Err(CodecError::Length {
                message: "signed predelivery payload",
                expected: min,
                actual: buf.len(),
            });
        }
        let split = buf.len() - SIGNATURE_BYTES;
        Ok(Self {
            payload: PredeliveryPayload::decode(&buf[..split])?,
            signature: take(buf, split, "signed predelivery payload")?,
        })
    }
}

/// Cleartext token release: binds the token to the original nonce and hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub nonce: [u8; NONCE_BYTES],
    pub token: [u8; TOKEN_BYTES],
    pub data_hash: [u8; DATA_HASH_BYTES],
}

impl TokenPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TOKEN_PAYLOAD_BYTES);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.token);
        out.extend_from_slice(&self.data_hash);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != TOKEN_PAYLOAD_BYTES {
            return Err(CodecError::Length {
                message: "token payload",
                expected: TOKEN_PAYLOAD_BYTES,
                actual: buf.len(),
            });
        }
        Ok(Self {
            nonce: take(buf, 0, "token payload")?,
            token: take(buf, NONCE_BYTES, "token payload")?,
            data_hash: take(buf, NONCE_BYTES + TOKEN_BYTES, "token payload")?,
        })
    }
}

/// [`TokenPayload`] plus the appserver's signature (tail 64 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTokenPayload {
    pub payload: TokenPayload,
    pub signature: [u8; SIGNATURE_BYTES],
}

impl SignedTokenPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.payload.encode();
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let expected = TOKEN_PAYLOAD_BYTES + SIGNATURE_BYTES;
        if buf.len() != expected {
            return Err(CodecError::Length {
                message: "signed token payload",
                expected,
                actual: buf.len(),
            });
        }
        Ok(Self {
            payload: TokenPayload::decode(&buf[..TOKEN_PAYLOAD_BYTES])?,
            signature: take(buf, TOKEN_PAYLOAD_BYTES, "signed token payload")?,
        })
    }
}

// =============================================================================
// Redemption
// =============================================================================

/// Redemption batch: the submitting mule plus its collected tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRedemptionPayload {
    pub mule_id: [u8; MULE_ID_BYTES],
    pub tokens: TokenList,
}

impl TokenRedemptionPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.mule_id.to_vec();
        out.extend_from_slice(&self.tokens.encode());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < MULE_ID_BYTES {
            return Err(CodecError::Length {
                message: "token redemption payload",
                expected: MULE_ID_BYTES,
                actual: buf.len(),
            });
        }
        Ok(Self {
            mule_id: take(buf, 0, "token redemption payload")?,
            tokens: TokenList::decode(&buf[MULE_ID_BYTES..])?,
        })
    }
}

// =============================================================================
// Complaints
// =============================================================================

/// Evidence for a Type-0 complaint: the appserver completed the handshake
/// but the released token was wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncorrectComplaintRecord {
    pub signed_predelivery: SignedPredeliveryPayload,
    pub signed_token: SignedTokenPayload,
}

impl IncorrectComplaintRecord {
    pub fn encode(&self) -> Vec<u8> {
        let pre = self.signed_predelivery.encode();
        let mut out = Vec::with_capacity(4 + pre.len());
        out.extend_from_slice(&(pre.len() as u32).to_le_bytes());
        out.extend_from_slice(&pre);
        out.extend_from_slice(&self.signed_token.encode());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let pre_len = read_u32(buf, 0, "incorrect complaint record")? as usize;
        let rest = &buf[4..];
        if rest.len() < pre_len {
            return Err(CodecError::Length {
                message: "incorrect complaint record",
                expected: pre_len,
                actual: rest.len(),
            });
        }
        Ok(Self {
            signed_predelivery: SignedPredeliveryPayload::decode(&rest[..pre_len])?,
            signed_token: SignedTokenPayload::decode(&rest[pre_len..])?,
        })
    }
}

/// Evidence for a Type-1 complaint: the appserver committed but never
/// completed delivery; the raw data is attached so the provider can force
/// completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingComplaintRecord {
    pub signed_predelivery: SignedPredeliveryPayload,
    pub raw_data: Vec<u8>,
}

impl MissingComplaintRecord {
    pub fn encode(&self) -> Vec<u8> {
        let pre = self.signed_predelivery.encode();
        let mut out = Vec::with_capacity(4 + pre.len() + self.raw_data.len());
        out.extend_from_slice(&(pre.len() as u32).to_le_bytes());
        out.extend_from_slice(&pre);
        out.extend_from_slice(&self.raw_data);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let pre_len = read_u32(buf, 0, "missing complaint record")? as usize;
        let rest = &buf[4..];
        if rest.len() < pre_len {
            return Err(CodecError::Length {
                message: "missing complaint record",
                expected: pre_len,
                actual: rest.len(),
            });
        }
        Ok(Self {
            signed_predelivery: SignedPredeliveryPayload::decode(&rest[..pre_len])?,
            raw_data: rest[pre_len..].to_vec(),
        })
    }
}

/// Complaint evidence, discriminated by the wire type byte (0 or 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComplaintRecord {
    /// Type 0: the delivered token was incorrect.
    Incorrect(IncorrectComplaintRecord),
    /// Type 1: the delivery was never completed.
    Missing(MissingComplaintRecord),
}

impl ComplaintRecord {
    pub fn type_byte(&self) -> u8 {
        match self {
            ComplaintRecord::Incorrect(_) => 0,
            ComplaintRecord::Missing(_) => 1,
        }
    }
}

/// Full complaint: a single-use complaint token, a fresh blinded
/// replacement token, the accused appserver, and the evidence record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplaintPayload {
    pub complaint_token: [u8; TOKEN_BYTES],
    pub blinded_token: [u8; BLINDED_TOKEN_BYTES],
    pub appserver_id: [u8; APPSERVER_ID_BYTES],
    pub record: ComplaintRecord,
}

impl ComplaintPayload {
    pub fn encode(&self) -> Vec<u8> {
        let record = match &self.record {
            ComplaintRecord::Incorrect(r) => r.encode(),
            ComplaintRecord::Missing(r) => r.encode(),
        };
        let mut out = Vec::with_capacity(COMPLAINT_HEADER_BYTES + record.len());
        out.extend_from_slice(&self.complaint_token);
        out.extend_from_slice(&self.blinded_token);
        out.extend_from_slice(&self.appserver_id);
        out.push(self.record.type_byte());
        out.extend_from_slice(&record);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < COMPLAINT_HEADER_BYTES {
            return Err(CodecError::Length {
                message: "complaint payload",
                expected: COMPLAINT_HEADER_BYTES,
                actual: buf.len(),
            });
        }
        let complaint_token = take(buf, 0, "complaint payload")?;
        let blinded_token = take(buf, TOKEN_BYTES, "complaint payload")?;
        let appserver_id = take(buf, TOKEN_BYTES + BLINDED_TOKEN_BYTES, "complaint payload")?;
        let type_byte = buf[COMPLAINT_HEADER_BYTES - 1];
        let body = &buf[COMPLAINT_HEADER_BYTES..];
        let record = match type_byte {
            0 => ComplaintRecord::Incorrect(IncorrectComplaintRecord::decode(body)?),
            1 => ComplaintRecord::Missing(MissingComplaintRecord::decode(body)?),
            value => {
                return Err(CodecError::Value {
                    message: "complaint record type",
                    value,
                })
            }
        };
        Ok(Self {
            complaint_token,
            blinded_token,
            appserver_id,
            record,
        })
    }
}

// =============================================================================
// Epoch rotation
// =============================================================================

/// Request for a fresh batch of blind-signed complaint tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEpochRequest {
    pub mule_id: [u8; MULE_ID_BYTES],
    pub blinded_tokens: TokenList,
}

impl NewEpochRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.mule_id.to_vec();
        out.extend_from_slice(&self.blinded_tokens.encode());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < MULE_ID_BYTES {
            return Err(CodecError::Length {
                message: "new epoch request",
                expected: MULE_ID_BYTES,
                actual: buf.len(),
            });
        }
        Ok(Self {
            mule_id: take(buf, 0, "new epoch request")?,
            blinded_tokens: TokenList::decode(&buf[MULE_ID_BYTES..])?,
        })
    }
}

/// Epoch response: the blind-signed complaint tokens and the mule's drained
/// duplicate-fraud evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEpochResponse {
    pub signed_tokens: TokenList,
    pub duplicate_tokens: TokenList,
}

impl NewEpochResponse {
    pub fn encode(&self) -> Vec<u8> {
        let signed = self.signed_tokens.encode();
        let duplicates = self.duplicate_tokens.encode();
        let mut out = Vec::with_capacity(8 + signed.len() + duplicates.len());
        out.extend_from_slice(&(signed.len() as u32).to_le_bytes());
        out.extend_from_slice(&(duplicates.len() as u32).to_le_bytes());
        out.extend_from_slice(&signed);
        out.extend_from_slice(&duplicates);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let sig_len = read_u32(buf, 0, "new epoch response")? as usize;
        let dup_len = read_u32(buf, 4, "new epoch response")? as usize;
        let body = &buf[8..];
        if body.len() != sig_len + dup_len {
            return Err(CodecError::Length {
                message: "new epoch response",
                expected: sig_len + dup_len,
                actual: body.len(),
            });
        }
        Ok(Self {
            signed_tokens: TokenList::decode(&body[..sig_len])?,
            duplicate_tokens: TokenList::decode(&body[sig_len..])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled<const N: usize>(value: u8) -> [u8; N] {
        [value; N]
    }

    #[test]
    fn token_list_round_trip() {
        let list = TokenList::from_tokens([filled::<TOKEN_BYTES>(1), filled::<TOKEN_BYTES>(2)]);
        let decoded = TokenList::decode(&list.encode()).unwrap();
        assert_eq!(decoded, list);
        assert_eq!(decoded.width(), TOKEN_BYTES);
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn token_list_empty_round_trip() {
        let list = TokenList::default();
        let encoded = list.encode();
        assert_eq!(encoded, 0u32.to_le_bytes().to_vec());
        assert_eq!(TokenList::decode(&encoded).unwrap(), list);
    }

    #[test]
    fn token_list_rejects_misaligned_body() {
        let mut encoded = TokenList::from_tokens([filled::<TOKEN_BYTES>(7)]).encode();
        encoded.push(0xAA);
        assert!(matches!(
            TokenList::decode(&encoded),
            Err(CodecError::Alignment { .. })
        ));
    }

    #[test]
    fn token_list_rejects_zero_width_with_body() {
        let mut encoded = 0u32.to_le_bytes().to_vec();
        encoded.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            TokenList::decode(&encoded),
            Err(CodecError::Alignment { .. })
        ));
    }

    #[test]
    fn token_list_rejects_ragged_elements() {
        assert!(TokenList::new(4, vec![vec![0; 4], vec![0; 3]]).is_err());
    }

    #[test]
    fn hash_payload_round_trip() {
        let payload = HashPayload {
            sensor_id: filled(0x11),
            data_hash: filled(0x22),
        };
        assert_eq!(HashPayload::decode(&payload.encode()).unwrap(), payload);
    }

    #[test]
    fn signed_hash_payload_round_trip_and_length_check() {
        let signed = SignedHashPayload {
            payload: HashPayload {
                sensor_id: filled(3),
                data_hash: filled(4),
            },
            signature: filled(5),
        };
        let encoded = signed.encode();
        assert_eq!(encoded.len(), 112);
        assert_eq!(SignedHashPayload::decode(&encoded).unwrap(), signed);
        assert!(matches!(
            SignedHashPayload::decode(&encoded[..111]),
            Err(CodecError::Length { .. })
        ));
    }

    #[test]
    fn predelivery_round_trip_minimal_and_large() {
        for token_len in [0usize, 1, 92, 512] {
            let payload = PredeliveryPayload {
                nonce: filled(9),
                data_hash: filled(8),
                encrypted_token: vec![0x5A; token_len],
            };
            assert_eq!(
                PredeliveryPayload::decode(&payload.encode()).unwrap(),
                payload
            );
        }
    }

    #[test]
    fn signed_predelivery_splits_tail_signature() {
        let signed = SignedPredeliveryPayload {
            payload: PredeliveryPayload {
                nonce: filled(1),
                data_hash: filled(2),
                encrypted_token: vec![0xCC; 92],
            },
            signature: filled(0xEE),
        };
        let decoded = SignedPredeliveryPayload::decode(&signed.encode()).unwrap();
        assert_eq!(decoded, signed);
        assert_eq!(decoded.signature, [0xEE; SIGNATURE_BYTES]);
    }

    #[test]
    fn signed_predelivery_rejects_short_input() {
        assert!(matches!(
            SignedPredeliveryPayload::decode(&[0u8; 100]),
            Err(CodecError::Length { .. })
        ));
    }

    #[test]
    fn token_payload_round_trip_and_exact_length() {
        let payload = TokenPayload {
            nonce: filled(1),
            token: filled(2),
            data_hash: filled(3),
        };
        let encoded = payload.encode();
        assert_eq!(encoded.len(), 112);
        assert_eq!(TokenPayload::decode(&encoded).unwrap(), payload);

        let mut long = encoded.clone();
        long.push(0);
        assert!(matches!(
            TokenPayload::decode(&long),
            Err(CodecError::Length { .. })
        ));
    }

    #[test]
    fn signed_token_payload_round_trip() {
        let signed = SignedTokenPayload {
            payload: TokenPayload {
                nonce: filled(0xA1),
                token: filled(0xB2),
                data_hash: filled(0xC3),
            },
            signature: filled(0xD4),
        };
        assert_eq!(
            SignedTokenPayload::decode(&signed.encode()).unwrap(),
            signed
        );
    }

    #[test]
    fn redemption_payload_round_trip() {
        let payload = TokenRedemptionPayload {
            mule_id: filled(0x77),
            tokens: TokenList::from_tokens([filled::<TOKEN_BYTES>(0x10)]),
        };
        assert_eq!(
            TokenRedemptionPayload::decode(&payload.encode()).unwrap(),
            payload
        );
    }

    fn sample_signed_predelivery() -> SignedPredeliveryPayload {
        SignedPredeliveryPayload {
            payload: PredeliveryPayload {
                nonce: filled(0x21),
                data_hash: filled(0x22),
                encrypted_token: vec![0x23; 92],
            },
            signature: filled(0x24),
        }
    }

    #[test]
    fn incorrect_complaint_record_round_trip() {
        let record = IncorrectComplaintRecord {
            signed_predelivery: sample_signed_predelivery(),
            signed_token: SignedTokenPayload {
                payload: TokenPayload {
                    nonce: filled(0x21),
                    token: filled(0x31),
                    data_hash: filled(0x22),
                },
                signature: filled(0x32),
            },
        };
        assert_eq!(
            IncorrectComplaintRecord::decode(&record.encode()).unwrap(),
            record
        );
    }

    #[test]
    fn missing_complaint_record_round_trip() {
        let record = MissingComplaintRecord {
            signed_predelivery: sample_signed_predelivery(),
            raw_data: vec![0x42; 512],
        };
        assert_eq!(
            MissingComplaintRecord::decode(&record.encode()).unwrap(),
            record
        );
    }

    #[test]
    fn complaint_payload_round_trip_both_types() {
        let incorrect = ComplaintPayload {
            complaint_token: filled(1),
            blinded_token: filled(2),
            appserver_id: filled(3),
            record: ComplaintRecord::Incorrect(IncorrectComplaintRecord {
                signed_predelivery: sample_signed_predelivery(),
                signed_token: SignedTokenPayload {
                    payload: TokenPayload {
                        nonce: filled(0x21),
                        token: filled(0x31),
                        data_hash: filled(0x22),
                    },
                    signature: filled(0x32),
                },
            }),
        };
        assert_eq!(
            ComplaintPayload::decode(&incorrect.encode()).unwrap(),
            incorrect
        );

        let missing = ComplaintPayload {
            complaint_token: filled(4),
            blinded_token: filled(5),
            appserver_id: filled(6),
            record: ComplaintRecord::Missing(MissingComplaintRecord {
                signed_predelivery: sample_signed_predelivery(),
                raw_data: vec![7; 64],
            }),
        };
        assert_eq!(ComplaintPayload::decode(&missing.encode()).unwrap(), missing);
    }

    #[test]
    fn complaint_payload_rejects_unknown_type() {
        let mut encoded = ComplaintPayload {
            complaint_token: filled(1),
            blinded_token: filled(2),
            appserver_id: filled(3),
            record: ComplaintRecord::Missing(MissingComplaintRecord {
                signed_predelivery: sample_signed_predelivery(),
                raw_data: vec![],
            }),
        }
        .encode();
        encoded[COMPLAINT_HEADER_BYTES - 1] = 9;
        assert!(matches!(
            ComplaintPayload::decode(&encoded),
            Err(CodecError::Value { value: 9, .. })
        ));
    }

    #[test]
    fn new_epoch_request_round_trip() {
        let request = NewEpochRequest {
            mule_id: filled(0x55),
            blinded_tokens: TokenList::from_blinded([filled::<BLINDED_TOKEN_BYTES>(0x66)]),
        };
        assert_eq!(NewEpochRequest::decode(&request.encode()).unwrap(), request);
    }

    #[test]
    fn new_epoch_response_round_trip() {
        let response = NewEpochResponse {
            signed_tokens: TokenList::from_blinded([
                filled::<BLINDED_TOKEN_BYTES>(1),
                filled::<BLINDED_TOKEN_BYTES>(2),
            ]),
            duplicate_tokens: TokenList::from_tokens([filled::<TOKEN_BYTES>(3)]),
        };
        assert_eq!(
            NewEpochResponse::decode(&response.encode()).unwrap(),
            response
        );
    }

    #[test]
    fn new_epoch_response_rejects_length_mismatch() {
        let mut encoded = NewEpochResponse {
            signed_tokens: TokenList::default(),
            duplicate_tokens: TokenList::default(),
        }
        .encode();
        encoded.push(0);
        assert!(matches!(
            NewEpochResponse::decode(&encoded),
            Err(CodecError::Length { .. })
        ));
    }
}
