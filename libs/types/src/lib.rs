//! Types library for the live site ranking feed
//!
//! This library provides the domain types shared between the feed service and
//! anything consuming its snapshots.
//!
//! # Modules
//! - `ids`: Identifiers (GeoId, SubscriptionId)
//! - `numeric`: Finite severity score
//! - `site`: Site record and severity update types
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod site;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "0.1.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::site::*;
    pub use crate::errors::*;
}
