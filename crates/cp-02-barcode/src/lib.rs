//! # Barcode Lifecycle Subsystem
//!
//! Owns the physical letter artifact from code issuance to terminal state:
//!
//! ```text
//! unactivated --bind--> bound --scan--> in_transit --scan--> delivered
//!      \                   \               \--scan--> failed
//!       \--cancel--> cancelled (from unactivated, bound, or in_transit L3+)
//! ```
//!
//! All writes to a single barcode are serialized through a per-code lock
//! registry; transitions across different barcodes run in parallel. Nobody
//! else mutates barcode state; readers observe it through the event bus or
//! a consistent read from storage.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;

pub use domain::entities::{Barcode, BarcodeStatus, GenerationContext, QrPayload, ScanEvent};
pub use domain::errors::BarcodeError;
pub use domain::service::{BarcodeService, BindRequest};
pub use ports::outbound::{BarcodeStore, EnvelopeStore, LetterStore};

/// Length of generated barcode short codes.
pub const CODE_LEN: usize = 8;

/// QR payload format version.
pub const QR_VERSION: u8 = 1;

/// How many generation attempts before giving up on a saturated code space.
pub const MAX_GENERATION_ATTEMPTS: u32 = 16;
