//! Access-token models and the providers the request pipeline resolves tokens from.

pub mod provider;
pub mod token;

pub use provider::*;
pub use token::{access::*, secret::*};
