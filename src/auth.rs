//! Service-principal identifiers and the token models that flow between broker and session.

pub mod id;
pub mod token;

pub use id::*;
pub use token::*;
