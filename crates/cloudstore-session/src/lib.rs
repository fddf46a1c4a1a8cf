//! cloudstore-session: the per-account workflows around envelope encryption
//!
//! A [`Session`] is bound to one wallet address. It reads a file, checks it is
//! not obviously corrupted, optionally envelope-encrypts it, uploads it
//! through the ranked blob stores, records it in the [`FileRegistry`], and
//! keeps the wrapped content key in the injected [`KeyStore`].

pub mod error;
pub mod input;
pub mod keystore;
pub mod registry;
pub mod session;
pub mod sniff;
pub mod usage;

pub use error::SessionError;
pub use input::{read_all, FileInput};
pub use keystore::{JsonKeyDirectory, JsonKeyStore, KeyDelivery, KeyStore, MemoryKeyStore};
pub use registry::{FileRegistry, LocalRegistry, NewFile};
pub use session::{RetrievedFile, Session, SessionContext, UploadOutcome};
pub use sniff::check_corruption;
pub use usage::{UsageStats, UsageTracker};
