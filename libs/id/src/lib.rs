//! # rebal-id
//!
//! Identifier types for the bus rebalancing advisor.
//!
//! Two families of identifiers live here:
//!
//! - **System-generated IDs** (`ActionId`, `PassId`): prefixed ULIDs in the
//!   form `{prefix}_{ulid}`, e.g. `act_01HV4Z2WQXKJNM8GPQY6VBKC3D`. They sort
//!   by creation time and carry their resource type in the prefix.
//! - **Fleet-assigned IDs** (`BusId`): opaque labels taken from the fleet
//!   source. Spreadsheets and JSON files store them as numbers or strings, so
//!   both forms are accepted and normalized to a trimmed string.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
