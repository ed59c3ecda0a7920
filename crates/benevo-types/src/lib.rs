//! Core data model for Benevo.
//!
//! This crate defines the values every other layer passes around:
//!
//! - **Identity** ([`UserId`], [`Role`]): who is logged in and what they
//!   are allowed to be.
//! - **Session data** ([`SessionRecord`], [`UserProfile`],
//!   [`ProfileCache`]): the durable "this device is logged in" record.
//! - **Time** ([`Timestamp`], [`Clock`]): wall-clock milliseconds, since
//!   records outlive the process that wrote them.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how records are turned
//!   into bytes for the storage tiers.
//!
//! # Architecture
//!
//! ```text
//! Route guards ─┐
//! Session coordinator ─┼─→ Types (this crate)
//! Storage tiers ─┘
//! ```
//!
//! Nothing here performs I/O.

mod clock;
mod codec;
mod error;
mod types;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::CodecError;
pub use types::{ProfileCache, Role, SessionRecord, UserId, UserProfile};
