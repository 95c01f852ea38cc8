//! Declarative configuration: the JSON document, per-provider attribute loading, and the
//! generation registry.
//!
//! A [`ConfigRegistry`] owns the active [`ConfigGeneration`]. Reconfiguration builds a new
//! generation from a fresh [`ConfigDocument`] and swaps it in atomically; flows already running
//! keep the generation they started with, including its discovery results and JWK sets.

pub mod attribute;
pub mod document;
pub mod filter;
pub mod password;
pub mod provider;
pub mod registry;

pub use attribute::Tracked;
pub use document::*;
pub use filter::*;
pub use provider::*;
pub use registry::*;
