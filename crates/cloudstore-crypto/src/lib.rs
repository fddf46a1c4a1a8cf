//! cloudstore-crypto: client-side envelope encryption for CloudStore uploads
//!
//! Key hierarchy:
//! ```text
//! Wallet address (lowercased)
//!   └── Wrapping Key (256-bit, PBKDF2-HMAC-SHA256, fixed salt, 1000 rounds)
//!       └── Content Key (per-file, 256-bit random, AES-256-GCM wrapped)
//!           └── Payload: AES-256-GCM (key=content_key, nonce=random_96bit)
//! ```
//!
//! Sharing never touches the payload: the content key is unwrapped with the
//! owner's wrapping key and re-wrapped with the recipient's.
//!
//! # Secrecy
//!
//! The wrapping key is a pure function of the wallet address and a salt that
//! every account shares. Anyone who knows an address can recompute its
//! wrapping key, so this scheme only keeps payloads private from parties that
//! never learn the owner's or a recipient's address. Changing the derivation
//! orphans every wrapped key already stored.
//!
//! The KDF input is the address exactly as given, lowercased. It is not
//! trimmed: `"0xabc "` and `"0xabc"` derive different keys. Session code
//! passes addresses through `WalletAddress::parse`, which does the trimming.

pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod payload;

pub use envelope::{decrypt_payload, encrypt_payload, reshare_key, EnvelopeKeyManager};
pub use error::EnvelopeError;
pub use kdf::{canonical_address, derive_wrapping_key, KdfParams, WrappingKey};
pub use keys::{generate_content_key, unwrap_key, wrap_key, ContentKey, WrappedKey};
pub use payload::EncryptedPayload;

/// Size of every symmetric key in the hierarchy (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Leading byte of every serialized wrapped key and payload
pub const FORMAT_VERSION: u8 = 1;
