//! Boneh-Franklin identity-based encryption over BLS12-381.
//!
//! Identities are beacon round numbers, laid out drand-quicknet style: round
//! signatures live in G1, the chain public key in G2. Encrypting to a future
//! round needs only the chain public key; the round's BLS signature, once
//! published, is the decryption key. The Fujisaki-Okamoto transform below
//! makes decryption reject any ciphertext that was not honestly produced for
//! the supplied signature.

use ark_bls12_381::{g1, Bls12_381, Fr, G1Affine, G2Affine, G2Projective};
use ark_ec::hashing::curve_maps::wb::WBMap;
use ark_ec::hashing::map_to_curve_hasher::MapToCurveBasedHasher;
use ark_ec::hashing::HashToCurve;
use ark_ec::pairing::{Pairing, PairingOutput};
use ark_ec::{AffineRepr, CurveGroup, Group};
use ark_ff::field_hashers::DefaultFieldHasher;
use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};

use super::CipherError;

/// RFC 9380 domain separation tag used by drand's unchained G1 scheme.
const H1_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

pub const FILE_KEY_LEN: usize = 32;
pub const G1_COMPRESSED_LEN: usize = 48;
pub const G2_COMPRESSED_LEN: usize = 96;

/// IBE ciphertext for one 32-byte file key.
///
/// `u` is the ephemeral G2 point, `v` masks the FO seed, `w` masks the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IbeCiphertext {
    pub u: Vec<u8>,
    pub v: [u8; FILE_KEY_LEN],
    pub w: [u8; FILE_KEY_LEN],
}

/// drand identity for a round: sha256 of the big-endian round number.
fn round_identity(round: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(round.to_be_bytes());
    hasher.finalize().into()
}

fn hash_to_g1(message: &[u8]) -> Result<G1Affine, CipherError> {
    let hasher = MapToCurveBasedHasher::<
        ark_bls12_381::G1Projective,
        DefaultFieldHasher<Sha256, 128>,
        WBMap<g1::Config>,
    >::new(H1_DST)
    .map_err(|e| CipherError::Backend(format!("hash-to-curve setup: {e}")))?;

    hasher
        .hash(message)
        .map_err(|e| CipherError::Backend(format!("hash-to-curve: {e}")))
}

fn deserialize_g1(bytes: &[u8]) -> Result<G1Affine, CipherError> {
    G1Affine::deserialize_compressed(bytes)
        .map_err(|e| CipherError::Malformed(format!("invalid G1 point: {e}")))
}

fn deserialize_g2(bytes: &[u8]) -> Result<G2Affine, CipherError> {
    G2Affine::deserialize_compressed(bytes)
        .map_err(|e| CipherError::Malformed(format!("invalid G2 point: {e}")))
}

fn serialize_point<P: CanonicalSerialize>(point: &P) -> Result<Vec<u8>, CipherError> {
    let mut bytes = Vec::with_capacity(point.compressed_size());
    point
        .serialize_compressed(&mut bytes)
        .map_err(|e| CipherError::Backend(format!("point serialization: {e}")))?;
    Ok(bytes)
}

/// H2: GT element -> mask for the FO seed.
fn hash_gt(gt: &PairingOutput<Bls12_381>) -> Result<[u8; FILE_KEY_LEN], CipherError> {
    let mut hasher = Sha256::new();
    hasher.update(b"tv-tlock-h2");
    hasher.update(serialize_point(gt)?);
    Ok(hasher.finalize().into())
}

/// H3: (seed, message) -> ephemeral scalar.
fn hash_to_scalar(sigma: &[u8; FILE_KEY_LEN], message: &[u8; FILE_KEY_LEN]) -> Fr {
    let mut hasher = Sha512::new();
    hasher.update(b"tv-tlock-h3");
    hasher.update(sigma);
    hasher.update(message);
    Fr::from_le_bytes_mod_order(&hasher.finalize())
}

/// H4: seed -> mask for the message.
fn hash_sigma(sigma: &[u8; FILE_KEY_LEN]) -> [u8; FILE_KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(b"tv-tlock-h4");
    hasher.update(sigma);
    hasher.finalize().into()
}

fn xor(a: &[u8; FILE_KEY_LEN], b: &[u8; FILE_KEY_LEN]) -> [u8; FILE_KEY_LEN] {
    let mut out = [0u8; FILE_KEY_LEN];
    for i in 0..FILE_KEY_LEN {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Encrypt a file key to a round identity. Needs only the chain public key;
/// the round does not have to exist yet.
pub fn encrypt(
    chain_public_key: &[u8],
    round: u64,
    file_key: &[u8; FILE_KEY_LEN],
) -> Result<IbeCiphertext, CipherError> {
    let pk = deserialize_g2(chain_public_key)?;
    let qid = hash_to_g1(&round_identity(round))?;
    let gid = Bls12_381::pairing(qid, pk);

    let mut sigma = [0u8; FILE_KEY_LEN];
    rand::thread_rng().fill_bytes(&mut sigma);

    let r = hash_to_scalar(&sigma, file_key);
    let u = (G2Projective::generator() * r).into_affine();
    let gid_r = gid * r;

    let v = xor(&sigma, &hash_gt(&gid_r)?);
    let w = xor(file_key, &hash_sigma(&sigma));

    Ok(IbeCiphertext {
        u: serialize_point(&u)?,
        v,
        w,
    })
}

/// Recover the file key using the round's published signature. Rejects the
/// ciphertext when the FO check fails, which covers both tampering and a
/// signature for the wrong round.
pub fn decrypt(
    ciphertext: &IbeCiphertext,
    round_signature: &[u8],
) -> Result<[u8; FILE_KEY_LEN], CipherError> {
    let u = deserialize_g2(&ciphertext.u)?;
    let sig = deserialize_g1(round_signature)?;

    let gid_r = Bls12_381::pairing(sig, u);
    let sigma = xor(&ciphertext.v, &hash_gt(&gid_r)?);
    let file_key = xor(&ciphertext.w, &hash_sigma(&sigma));

    let r = hash_to_scalar(&sigma, &file_key);
    if (G2Projective::generator() * r).into_affine() != u {
        return Err(CipherError::Authentication);
    }

    Ok(file_key)
}

/// Verify a round signature against the chain public key:
/// e(sig, g2) == e(H1(round), pk).
pub fn verify_round_signature(
    chain_public_key: &[u8],
    round: u64,
    signature: &[u8],
) -> Result<bool, CipherError> {
    let pk = deserialize_g2(chain_public_key)?;
    let sig = deserialize_g1(signature)?;
    let qid = hash_to_g1(&round_identity(round))?;

    let lhs = Bls12_381::pairing(sig, G2Affine::generator());
    let rhs = Bls12_381::pairing(qid, pk);
    Ok(lhs == rhs)
}

/// Derive a deterministic beacon keypair from a seed. Test beacons use this
/// to stand in for a real drand chain.
pub fn derive_keypair(seed: &[u8]) -> Result<(Fr, Vec<u8>), CipherError> {
    let mut hasher = Sha512::new();
    hasher.update(b"tv-beacon-sk");
    hasher.update(seed);
    let sk = Fr::from_le_bytes_mod_order(&hasher.finalize());

    let pk = (G2Projective::generator() * sk).into_affine();
    Ok((sk, serialize_point(&pk)?))
}

/// BLS-sign a round identity with a beacon secret key.
pub fn sign_round(sk: &Fr, round: u64) -> Result<Vec<u8>, CipherError> {
    let qid = hash_to_g1(&round_identity(round))?;
    let sig = (qid.into_group() * sk).into_affine();
    serialize_point(&sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (Fr, Vec<u8>) {
        derive_keypair(b"ibe-tests").unwrap()
    }

    #[test]
    fn file_key_round_trips_with_round_signature() {
        let (sk, pk) = keypair();
        let file_key = [7u8; FILE_KEY_LEN];

        let ct = encrypt(&pk, 42, &file_key).unwrap();
        let sig = sign_round(&sk, 42).unwrap();

        assert_eq!(decrypt(&ct, &sig).unwrap(), file_key);
    }

    #[test]
    fn wrong_round_signature_is_rejected() {
        let (sk, pk) = keypair();
        let ct = encrypt(&pk, 42, &[7u8; FILE_KEY_LEN]).unwrap();

        let wrong_sig = sign_round(&sk, 43).unwrap();
        assert!(matches!(
            decrypt(&ct, &wrong_sig),
            Err(CipherError::Authentication)
        ));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let (sk, pk) = keypair();
        let mut ct = encrypt(&pk, 42, &[7u8; FILE_KEY_LEN]).unwrap();
        ct.w[0] ^= 1;

        let sig = sign_round(&sk, 42).unwrap();
        assert!(matches!(decrypt(&ct, &sig), Err(CipherError::Authentication)));
    }

    #[test]
    fn signature_verification() {
        let (sk, pk) = keypair();
        let sig = sign_round(&sk, 7).unwrap();

        assert!(verify_round_signature(&pk, 7, &sig).unwrap());
        assert!(!verify_round_signature(&pk, 8, &sig).unwrap());
    }

    #[test]
    fn garbage_points_are_malformed_not_panics() {
        let (_, pk) = keypair();
        let ct = encrypt(&pk, 1, &[0u8; FILE_KEY_LEN]).unwrap();

        assert!(matches!(
            decrypt(&ct, &[0u8; G1_COMPRESSED_LEN]),
            Err(CipherError::Malformed(_))
        ));
    }
}
