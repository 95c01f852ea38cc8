//! Provider-facing descriptors (data), profiles (behavior), and error classification.
//!
//! `profile` defines [`ProviderProfile`], the capability trait selected by [`ProviderKind`]
//! that replaces per-provider branching in the flows. `descriptor` exposes the resolved,
//! HTTPS-validated endpoint set a flow runs against after discovery. `strategy` maps token
//! endpoint failures onto the exchange error taxonomy.

pub mod descriptor;
pub mod profile;
pub mod strategy;

pub use descriptor::*;
pub use profile::*;
pub use strategy::*;
