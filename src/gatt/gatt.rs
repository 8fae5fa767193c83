//! GATT service table construction and bring-up orchestration.
//!
//! [`Server`] owns the declared [`ServiceTable`]s and a handler registry, and
//! drives the vendor stack handshake: table creation, handle assignment,
//! service start, and advertising configuration/start. See `stack` for the
//! event delivery contract.

pub use {consts::*, registry::EventHandler, server::*, table::*};

use crate::stack;

mod consts;
mod registry;
mod server;
mod table;

/// Error type returned by the GATT layer.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no service declared")]
    NoService,
    #[error("service id {id} exceeds the handler key space")]
    ServiceLimit { id: u8 },
    #[error("unknown service id {id}")]
    UnknownService { id: u8 },
    #[error("attribute table full for {service}")]
    TableFull { service: ServiceId },
    #[error("client configuration descriptor requires a 2-byte value")]
    InvalidConfigValue,
    #[error("{service} reported {got} handles, expected {want}")]
    HandleCountMismatch {
        service: ServiceId,
        got: usize,
        want: usize,
    },
    #[error("{service} reported out-of-domain handle {raw:#06X}")]
    InvalidHandle { service: ServiceId, raw: u16 },
    #[error("{service} has no attribute at index {index}")]
    UnknownAttribute { service: ServiceId, index: u8 },
    #[error("{service} has no assigned handles")]
    NoHandles { service: ServiceId },
    #[error("server is not registered with the stack")]
    NotRegistered,
    #[error(transparent)]
    Stack(#[from] stack::Error),
}

/// Common GATT result type.
pub type Result<T> = std::result::Result<T, Error>;
