//! Vendor BLE stack boundary.
//!
//! The stack performs all radio and link-layer work. Requests submitted
//! through [`Stack`] return as soon as the stack accepts them; their effects
//! are observed later as [`GattEvent`] / [`GapEvent`] completions delivered
//! through the stack's callback mechanism. The two event channels must reach
//! one [`Server`](crate::gatt::Server) serially — route them through a single
//! consumer queue if the host platform delivers them from different execution
//! contexts.

use std::fmt::{Debug, Display, Formatter};

use crate::att::{Handle, Status};
use crate::gap::{Addr, AdvParams, ConnParams};
use crate::gatt::{AttrDef, ServiceId};

/// Error type returned by the stack boundary.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The stack rejected the request at submission time.
    #[error("stack request failed with code {code:#010X}")]
    Request { code: i32 },
    /// The stack cannot accept requests. Implementors return this when the
    /// controller is not initialized or has shut down, as opposed to
    /// [`Error::Request`], which carries the vendor code for a request that
    /// reached a running stack and was rejected.
    #[error("stack unavailable")]
    Unavailable,
}

/// Common stack result type.
pub type Result<T> = std::result::Result<T, Error>;

/// GATT interface identifier assigned by the stack at application
/// registration.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Iface(u8);

impl Iface {
    /// "No interface" sentinel, also used by stacks that broadcast an event
    /// to every registered application.
    pub const NONE: Self = Self(0xFF);

    /// Wraps a raw interface identifier.
    #[inline]
    #[must_use]
    pub const fn new(v: u8) -> Self {
        Self(v)
    }

    /// Returns whether this is the "no interface" sentinel.
    #[inline(always)]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl Debug for Iface {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            f.write_str("Iface(NONE)")
        } else {
            write!(f, "Iface({})", self.0)
        }
    }
}

impl Display for Iface {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Connection identifier assigned by the stack.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct ConnId(pub u16);

/// Request surface of the vendor BLE stack.
///
/// All methods submit a request and return once the stack has accepted it.
/// Table creation and advertising data configuration complete asynchronously
/// via [`GattEvent::TableCreated`], [`GapEvent::AdvDataSet`], and
/// [`GapEvent::ScanRspDataSet`]; the remaining calls are fire-and-forget with
/// completions that are logged only.
pub trait Stack: Debug + Send + Sync {
    /// Submits one service's full attribute table as a single atomic
    /// creation request.
    fn create_attr_table(&self, iface: Iface, id: ServiceId, attrs: &[AttrDef]) -> Result<()>;

    /// Starts a created service identified by its first attribute handle.
    fn start_service(&self, first: Handle) -> Result<()>;

    /// Sets the device name used by the stack's GAP layer.
    fn set_device_name(&self, name: &str) -> Result<()>;

    /// Configures the raw advertising payload.
    fn config_adv_data(&self, data: &[u8]) -> Result<()>;

    /// Configures the raw scan-response payload.
    fn config_scan_rsp_data(&self, data: &[u8]) -> Result<()>;

    /// Starts undirected connectable advertising.
    fn start_advertising(&self, params: &AdvParams) -> Result<()>;

    /// Stops advertising.
    fn stop_advertising(&self) -> Result<()>;

    /// Requests a connection parameter update from the peer.
    fn update_conn_params(&self, params: &ConnParams) -> Result<()>;

    /// Sends a notification (`confirm == false`) or indication
    /// (`confirm == true`) for a characteristic value handle.
    fn send_indication(
        &self,
        iface: Iface,
        conn: ConnId,
        handle: Handle,
        value: &[u8],
        confirm: bool,
    ) -> Result<()>;
}

/// Attribute-channel events delivered by the stack.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum GattEvent {
    /// Application registration completed; the accompanying interface
    /// identifier now belongs to this server.
    Registered { status: Status, app_id: u16 },
    /// Application unregistered; the interface identifier is stale.
    Unregistered,
    /// Attribute table creation completed for one service. `handles` are the
    /// raw stack-assigned values, one per declared attribute on success.
    TableCreated {
        status: Status,
        service_id: u8,
        handles: Vec<u16>,
    },
    /// Peer read request.
    Read {
        conn: ConnId,
        handle: Handle,
        offset: u16,
    },
    /// Peer write request or command.
    Write {
        conn: ConnId,
        handle: Handle,
        offset: u16,
        value: Vec<u8>,
        needs_rsp: bool,
    },
    /// Peer confirmed an indication.
    Confirm {
        conn: ConnId,
        handle: Handle,
        status: Status,
    },
    /// The stack finished sending an application-supplied response.
    Response { handle: Handle, status: Status },
    /// MTU negotiation completed.
    Mtu { conn: ConnId, mtu: u16 },
    /// A peer connected.
    Connected { conn: ConnId, peer: Addr },
    /// A peer disconnected.
    Disconnected { conn: ConnId, peer: Addr },
}

impl GattEvent {
    /// Returns the attribute handle for events that dispatch to a registered
    /// handler.
    #[must_use]
    pub const fn handle(&self) -> Option<Handle> {
        use GattEvent::*;
        match *self {
            Read { handle, .. }
            | Write { handle, .. }
            | Confirm { handle, .. }
            | Response { handle, .. } => Some(handle),
            _ => None,
        }
    }
}

/// Advertising and link events delivered by the stack.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum GapEvent {
    /// Advertising payload configuration completed.
    AdvDataSet { status: Status },
    /// Scan-response payload configuration completed.
    ScanRspDataSet { status: Status },
    /// Advertising start completed.
    AdvStarted { status: Status },
    /// Advertising stop completed.
    AdvStopped { status: Status },
    /// Connection parameter update completed.
    ConnParamsUpdated { status: Status },
}
