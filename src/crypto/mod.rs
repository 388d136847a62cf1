//! Time-lock encryption.
//!
//! `ibe` wraps a 32-byte file key to a beacon round identity over BLS12-381;
//! `tle` is the single-layer engine producing the armored text envelope that
//! everything else treats as opaque; `layers` peels nested envelopes produced
//! by repeated extends.

pub mod ibe;
pub mod layers;
pub mod tle;

pub use layers::{unwrap_all, Unwrapped, UnwrapError};
pub use tle::{decrypt_layer, encrypt_layer, is_armored, parse_envelope, Envelope};

use thiserror::Error;

/// Structural cipher failures. "Round not yet produced" is never one of
/// these; that outcome belongs to the beacon.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("malformed ciphertext envelope: {0}")]
    Malformed(String),

    /// The envelope parsed but its contents do not authenticate, e.g. the
    /// body was tampered with or the supplied round value is wrong.
    #[error("ciphertext failed authentication")]
    Authentication,

    #[error("crypto backend failure: {0}")]
    Backend(String),
}
