//! Auth-domain identifiers, scope sets, secrets, token sets, claims, and subjects.

pub mod claims;
pub mod id;
pub mod scope;
pub mod secret;
pub mod subject;
pub mod token;

pub use claims::*;
pub use id::*;
pub use scope::*;
pub use secret::*;
pub use subject::*;
pub use token::*;
