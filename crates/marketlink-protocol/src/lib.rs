//! Wire protocol for marketlink.
//!
//! - **Identity** ([`UserId`], [`Role`], [`Credentials`]) — who a realtime
//!   connection authenticates as.
//! - **Frames** ([`ClientFrame`], [`ServerFrame`]) — what travels on the
//!   wire after the transport is up.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how frames become bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (frames) → Session (connection lifecycle)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ClientFrame, Credentials, PROTOCOL_VERSION, Role, ServerFrame, UserId,
};
