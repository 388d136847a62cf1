//! Single-layer time-lock engine and its armored envelope format.
//!
//! A layer is hybrid: a random 32-byte file key is IBE-wrapped to the target
//! round, the payload itself goes through ChaCha20Poly1305 under that key.
//! The result is serialized and base64-armored so every other component can
//! treat it as an opaque text blob, and so a decrypted inner layer (which
//! arrives as raw bytes) can be re-read as an envelope.
//!
//! Layout inside the armor, all lengths fixed except the body:
//!
//! ```text
//! magic "TVLT" | version 1 | round u64 BE | chain hash 32 |
//! ibe.u 96 | ibe.v 32 | ibe.w 32 | nonce 12 | aead body
//! ```

use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use zeroize::Zeroize;

use super::ibe::{self, IbeCiphertext, FILE_KEY_LEN, G2_COMPRESSED_LEN};
use super::CipherError;
use crate::beacon::ChainInfo;

const MAGIC: &[u8; 4] = b"TVLT";
const VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const CHAIN_HASH_LEN: usize = 32;
const HEADER_LEN: usize =
    4 + 1 + 8 + CHAIN_HASH_LEN + G2_COMPRESSED_LEN + FILE_KEY_LEN + FILE_KEY_LEN + NONCE_LEN;

const ARMOR_BEGIN: &str = "-----BEGIN TIMEVAULT PAYLOAD-----";
const ARMOR_END: &str = "-----END TIMEVAULT PAYLOAD-----";
const ARMOR_COLUMNS: usize = 64;

/// One parsed encryption layer.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub round: u64,
    pub chain_hash: [u8; CHAIN_HASH_LEN],
    ibe: IbeCiphertext,
    nonce: [u8; NONCE_LEN],
    body: Vec<u8>,
}

/// Quick structural probe: does this text carry our armor markers? Used by
/// the layer codec to tell "another envelope" apart from recovered plaintext
/// without treating plaintext as corruption.
pub fn is_armored(text: &str) -> bool {
    text.trim_start().starts_with(ARMOR_BEGIN)
}

fn armor(raw: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / ARMOR_COLUMNS + 80);
    out.push_str(ARMOR_BEGIN);
    out.push('\n');
    for chunk in encoded.as_bytes().chunks(ARMOR_COLUMNS) {
        // chunks of an ASCII string are valid UTF-8
        out.push_str(std::str::from_utf8(chunk).expect("base64 is ASCII"));
        out.push('\n');
    }
    out.push_str(ARMOR_END);
    out
}

fn dearmor(text: &str) -> Result<Vec<u8>, CipherError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix(ARMOR_BEGIN)
        .and_then(|rest| rest.strip_suffix(ARMOR_END))
        .ok_or_else(|| CipherError::Malformed("missing armor markers".to_string()))?;

    let compact: String = inner.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| CipherError::Malformed(format!("invalid armor base64: {e}")))
}

/// Time-lock encrypt one layer to the given round. Pure given the chain
/// parameters; no beacon round needs to exist yet.
pub fn encrypt_layer(
    plaintext: &[u8],
    round: u64,
    chain: &ChainInfo,
) -> Result<String, CipherError> {
    let chain_hash = decode_chain_hash(&chain.hash)?;

    let mut file_key = [0u8; FILE_KEY_LEN];
    rand::thread_rng().fill_bytes(&mut file_key);

    let ibe_ct = ibe::encrypt(&chain.public_key, round, &file_key)?;

    let cipher = ChaCha20Poly1305::new_from_slice(&file_key)
        .map_err(|e| CipherError::Backend(format!("cipher init: {e}")))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let body = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &round.to_be_bytes(),
            },
        )
        .map_err(|e| CipherError::Backend(format!("body encryption: {e}")))?;

    file_key.zeroize();

    let mut raw = Vec::with_capacity(HEADER_LEN + body.len());
    raw.extend_from_slice(MAGIC);
    raw.push(VERSION);
    raw.extend_from_slice(&round.to_be_bytes());
    raw.extend_from_slice(&chain_hash);
    raw.extend_from_slice(&ibe_ct.u);
    raw.extend_from_slice(&ibe_ct.v);
    raw.extend_from_slice(&ibe_ct.w);
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&body);

    Ok(armor(&raw))
}

/// Structural validation of an armored layer. Fails hard on damage; never
/// consults the beacon.
pub fn parse_envelope(armored: &str) -> Result<Envelope, CipherError> {
    let raw = dearmor(armored)?;

    if raw.len() <= HEADER_LEN {
        return Err(CipherError::Malformed(format!(
            "envelope too short: {} bytes",
            raw.len()
        )));
    }
    if &raw[0..4] != MAGIC {
        return Err(CipherError::Malformed("bad magic".to_string()));
    }
    if raw[4] != VERSION {
        return Err(CipherError::Malformed(format!(
            "unsupported envelope version {}",
            raw[4]
        )));
    }

    let mut offset = 5;
    let round = u64::from_be_bytes(raw[offset..offset + 8].try_into().expect("fixed slice"));
    offset += 8;

    let chain_hash: [u8; CHAIN_HASH_LEN] =
        raw[offset..offset + CHAIN_HASH_LEN].try_into().expect("fixed slice");
    offset += CHAIN_HASH_LEN;

    let u = raw[offset..offset + G2_COMPRESSED_LEN].to_vec();
    offset += G2_COMPRESSED_LEN;

    let v: [u8; FILE_KEY_LEN] =
        raw[offset..offset + FILE_KEY_LEN].try_into().expect("fixed slice");
    offset += FILE_KEY_LEN;

    let w: [u8; FILE_KEY_LEN] =
        raw[offset..offset + FILE_KEY_LEN].try_into().expect("fixed slice");
    offset += FILE_KEY_LEN;

    let nonce: [u8; NONCE_LEN] =
        raw[offset..offset + NONCE_LEN].try_into().expect("fixed slice");
    offset += NONCE_LEN;

    let body = raw[offset..].to_vec();

    Ok(Envelope {
        round,
        chain_hash,
        ibe: IbeCiphertext { u, v, w },
        nonce,
        body,
    })
}

/// Decrypt one layer using the published signature for its round.
pub fn decrypt_layer(envelope: &Envelope, round_signature: &[u8]) -> Result<Vec<u8>, CipherError> {
    let mut file_key = ibe::decrypt(&envelope.ibe, round_signature)?;

    let cipher = ChaCha20Poly1305::new_from_slice(&file_key)
        .map_err(|e| CipherError::Backend(format!("cipher init: {e}")))?;

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&envelope.nonce),
            Payload {
                msg: &envelope.body,
                aad: &envelope.round.to_be_bytes(),
            },
        )
        .map_err(|_| CipherError::Authentication);

    file_key.zeroize();
    plaintext
}

fn decode_chain_hash(hash_hex: &str) -> Result<[u8; CHAIN_HASH_LEN], CipherError> {
    let bytes = hex::decode(hash_hex)
        .map_err(|e| CipherError::Backend(format!("invalid chain hash hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CipherError::Backend("chain hash must be 32 bytes".to_string()))
}
