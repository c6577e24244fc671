//! Safe SQL builder: identifiers from the catalog only, values as typed parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
