//! Webauthn relying party core.
//!
//! Webauthn is a standard allowing communication between servers, browsers and authenticators
//! to allow strong, passwordless, cryptographic authentication to be performed. This crate
//! is the server side of that exchange: it issues registration and authentication
//! challenges, and verifies the authenticator responses against the session they were
//! issued for and against the credential's stored public key.
//!
//! Build a [`Webauthn`] once at startup with [`WebauthnBuilder`], then for each ceremony
//! call the Begin function, keep the returned [`SessionData`] in your session store, and
//! hand it back to the matching Finish function with the browser's response.
//!
//! Transport, session storage and user storage are the caller's. The caller's user type
//! takes part through the [`WebauthnUser`] trait.

#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

mod constants;

pub mod attestation;
pub mod base64_data;
pub mod challenge;
pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod interface;
mod internals;
pub mod proto;
pub mod session;
pub mod tpm;
pub mod user;

pub use crate::config::{
    CounterPolicy, LoginOptions, RegistrationOptions, WebauthnBuilder, WebauthnConfig,
};
pub use crate::core::Webauthn;
pub use crate::error::{ErrorKind, WebauthnError, WebauthnResult};
pub use crate::session::{SessionData, SessionStore};
pub use crate::user::WebauthnUser;
