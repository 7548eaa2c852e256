//! Token-request and token-handle models exchanged with the issuer.

pub mod grant;
pub mod request;
pub mod token;

pub use grant::*;
pub use request::*;
pub use token::{handle::*, secret::*};
