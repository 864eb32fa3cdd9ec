// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Blind-token credential primitive.
//!
//! Wraps a verifiable OPRF (P-256, SHA-256) in the Privacy-Pass
//! construction. A client blinds a fresh random seed, the provider evaluates
//! it blind, and the client finalizes to obtain the token
//! `seed[32] ‖ output[32]`. At redemption the provider recomputes the OPRF
//! output for the seed and compares. Issuance and redemption are unlinkable:
//! the provider only ever sees the blinded group element at signing time.
//!
//! ## Wire frames
//!
//! All frames are fixed-width so they can ride the binary codec:
//!
//! - `Token` (64): `seed[32] ‖ output[32]`
//! - `BlindedToken` (160): `blinded_element[33] ‖ zero padding`
//! - `SignedBlindedToken` (160): `evaluation_element[33] ‖ proof[64] ‖ zero padding`
//!
//! Padding must decode as all zeroes; anything else is a malformed frame.

use p256::NistP256;
use rand::{rngs::OsRng, RngCore};
use voprf::{BlindedElement, EvaluationElement, Group, Proof, VoprfClient, VoprfServer};

use crate::wire::{BLINDED_TOKEN_BYTES, TOKEN_BYTES};

type Suite = NistP256;
type SuiteGroup = <Suite as voprf::CipherSuite>::Group;

/// Size of the random token seed.
const SEED_BYTES: usize = 32;
/// Size of the OPRF output (SHA-256).
const OUTPUT_BYTES: usize = 32;
/// Compressed SEC1 P-256 point.
const ELEMENT_BYTES: usize = 33;
/// DLEQ proof: two P-256 scalars.
const PROOF_BYTES: usize = 64;

/// Domain-separation info for keypair derivation from a stored seed.
const KEY_INFO: &[u8] = b"mulepay-token-keypair";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential frame is malformed")]
    MalformedFrame,

    #[error("OPRF failure: {0}")]
    Oprf(String),
}

impl From<voprf::Error> for CredentialError {
    fn from(e: voprf::Error) -> Self {
        CredentialError::Oprf(format!("{e:?}"))
    }
}

/// An unblinded single-use token.
pub type Token = [u8; TOKEN_BYTES];
/// A blinded token frame, as carried on the wire.
pub type BlindedToken = [u8; BLINDED_TOKEN_BYTES];
/// A blind-signed token frame, as carried on the wire.
pub type SignedBlindedToken = [u8; BLINDED_TOKEN_BYTES];

fn framed(content: &[u8]) -> [u8; BLINDED_TOKEN_BYTES] {
    let mut frame = [0u8; BLINDED_TOKEN_BYTES];
    frame[..content.len()].copy_from_slice(content);
    frame
}

fn unframed(frame: &[u8; BLINDED_TOKEN_BYTES], content_len: usize) -> Result<&[u8], CredentialError> {
    if frame[content_len..].iter().any(|&b| b != 0) {
        return Err(CredentialError::MalformedFrame);
    }
    Ok(&frame[..content_len])
}

// =============================================================================
// Public parameters
// =============================================================================

/// The provider's OPRF public key, serialized. Idempotent to fetch and safe
/// to cache for the lifetime of the keypair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicParams(Vec<u8>);

impl PublicParams {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CredentialError> {
        if bytes.len() != ELEMENT_BYTES {
            return Err(CredentialError::MalformedFrame);
        }
        // Reject off-curve encodings up front.
        SuiteGroup::deserialize_elem(bytes)?;
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// =============================================================================
// Keypair
// =============================================================================

/// A provider-side OPRF keypair. The provider holds two of these: one for
/// delivery tokens and one for complaint tokens, in separate namespaces.
pub struct Keypair {
    server: VoprfServer<Suite>,
    seed: [u8; SEED_BYTES],
}

impl Keypair {
    pub fn generate() -> Result<Self, CredentialError> {
        let mut seed = [0u8; SEED_BYTES];
        OsRng.fill_bytes(&mut seed);
        Self::from_bytes(&seed)
    }

    /// Rebuild a keypair from its stored 32-byte seed (the key file format).
    pub fn from_bytes(seed: &[u8]) -> Result<Self, CredentialError> {
        let seed: [u8; SEED_BYTES] = seed
            .try_into()
            .map_err(|_| CredentialError::MalformedFrame)?;
        let server = VoprfServer::new_from_seed(&seed, KEY_INFO)?;
        Ok(Self { server, seed })
    }

    /// The stored form of this keypair.
    pub fn to_bytes(&self) -> [u8; SEED_BYTES] {
        self.seed
    }

    pub fn public_params(&self) -> PublicParams {
        let pk = self.server.get_public_key();
        PublicParams(SuiteGroup::serialize_elem(pk).to_vec())
    }

    /// Blind-sign one blinded token frame. Stateless per-element transform;
    /// the provider never sees the underlying seed.
    pub fn sign_token(&self, blinded: &BlindedToken) -> Result<SignedBlindedToken, CredentialError> {
        let element = BlindedElement::<Suite>::deserialize(unframed(blinded, ELEMENT_BYTES)?)?;
        let evaluated = self.server.blind_evaluate(&mut OsRng, &element);
        let mut content = Vec::with_capacity(ELEMENT_BYTES + PROOF_BYTES);
        content.extend_from_slice(&evaluated.message.serialize());
        content.extend_from_slice(&evaluated.proof.serialize());
        Ok(framed(&content))
    }

    /// Check a token: recompute the OPRF output for its seed and compare.
    pub fn verify_token(&self, token: &Token) -> bool {
        let (seed, output) = token.split_at(SEED_BYTES);
        match self.server.evaluate(seed) {
            Ok(expected) => expected.as_slice() == output,
            Err(_) => false,
        }
    }
}

// =============================================================================
// Client side
// =============================================================================

/// Client-side state for one in-flight token: the blinding factor and the
/// seed, held until the signed response arrives.
pub struct PendingToken {
    seed: [u8; SEED_BYTES],
    client: VoprfClient<Suite>,
}

/// Blind a fresh seed under the provider's public parameters.
///
/// Returns the retained client state and the 160-byte blinded frame to send.
pub fn generate_token(
    _params: &PublicParams,
) -> Result<(PendingToken, BlindedToken), CredentialError> {
    // Blinding needs no key material; the public key is only consulted at
    // unblinding time, when the DLEQ proof is checked.
    let mut seed = [0u8; SEED_BYTES];
    OsRng.fill_bytes(&mut seed);
    let blinded = VoprfClient::<Suite>::blind(&seed, &mut OsRng)?;
    let frame = framed(&blinded.message.serialize());
    Ok((
        PendingToken {
            seed,
            client: blinded.state,
        },
        frame,
    ))
}

impl PendingToken {
    /// Finalize a signed response into a spendable token, checking the DLEQ
    /// proof against the provider's public parameters.
    pub fn unblind(
        self,
        params: &PublicParams,
        signed: &SignedBlindedToken,
    ) -> Result<Token, CredentialError> {
        let content = unframed(signed, ELEMENT_BYTES + PROOF_BYTES)?;
        let element = EvaluationElement::<Suite>::deserialize(&content[..ELEMENT_BYTES])?;
        let proof = Proof::<Suite>::deserialize(&content[ELEMENT_BYTES..])?;
        let pk = SuiteGroup::deserialize_elem(params.as_bytes())?;
        let output = self.client.finalize(&self.seed, &element, &proof, pk)?;

        let mut token = [0u8; TOKEN_BYTES];
        token[..SEED_BYTES].copy_from_slice(&self.seed);
        token[SEED_BYTES..SEED_BYTES + OUTPUT_BYTES].copy_from_slice(&output);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_one(keypair: &Keypair) -> Token {
        let params = keypair.public_params();
        let (pending, blinded) = generate_token(&params).unwrap();
        let signed = keypair.sign_token(&blinded).unwrap();
        pending.unblind(&params, &signed).unwrap()
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let keypair = Keypair::generate().unwrap();
        let token = issue_one(&keypair);
        assert!(keypair.verify_token(&token));
    }

    #[test]
    fn tokens_are_distinct() {
        let keypair = Keypair::generate().unwrap();
        assert_ne!(issue_one(&keypair), issue_one(&keypair));
    }

    #[test]
    fn tampered_token_fails_verification() {
        let keypair = Keypair::generate().unwrap();
        let mut token = issue_one(&keypair);
        token[40] ^= 1;
        assert!(!keypair.verify_token(&token));
    }

    #[test]
    fn token_from_other_keypair_fails_verification() {
        let keypair = Keypair::generate().unwrap();
        let other = Keypair::generate().unwrap();
        let token = issue_one(&other);
        assert!(!keypair.verify_token(&token));
    }

    #[test]
    fn keypair_round_trips_through_bytes() {
        let keypair = Keypair::generate().unwrap();
        let restored = Keypair::from_bytes(&keypair.to_bytes()).unwrap();
        assert_eq!(keypair.public_params(), restored.public_params());
        let token = issue_one(&keypair);
        assert!(restored.verify_token(&token));
    }

    #[test]
    fn nonzero_padding_is_rejected() {
        let keypair = Keypair::generate().unwrap();
        let (_, mut blinded) = generate_token(&keypair.public_params()).unwrap();
        blinded[BLINDED_TOKEN_BYTES - 1] = 1;
        assert!(matches!(
            keypair.sign_token(&blinded),
            Err(CredentialError::MalformedFrame)
        ));
    }

    #[test]
    fn proof_binds_to_keypair() {
        // Signing under one key and unblinding against another's parameters
        // must fail the DLEQ proof check.
        let keypair = Keypair::generate().unwrap();
        let other = Keypair::generate().unwrap();
        let (pending, blinded) = generate_token(&keypair.public_params()).unwrap();
        let signed = other.sign_token(&blinded).unwrap();
        assert!(pending.unblind(&keypair.public_params(), &signed).is_err());
    }

    #[test]
    fn public_params_reject_garbage() {
        assert!(PublicParams::from_bytes(&[0xFF; 33]).is_err());
        assert!(PublicParams::from_bytes(&[1, 2, 3]).is_err());
    }
}
