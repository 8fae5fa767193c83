//! Declarative GATT service table builder and bring-up orchestrator for
//! vendor BLE peripheral stacks.
//!
//! The application declares services, characteristics, and descriptors ahead
//! of time, and [`gatt::Server`] sequences the asynchronous bring-up handshake
//! against the vendor stack: table creation, handle assignment, service start,
//! advertising configuration, and advertising start. Post-registration read,
//! write, and confirmation events are routed back to application callbacks.
//!
//! The radio, link layer, and security belong to the vendor stack, which is
//! abstracted behind the [`stack::Stack`] trait. Events must be delivered to a
//! server instance serially; the lifecycle state is mutated without locking.

pub mod att;
#[path = "gap/gap.rs"]
pub mod gap;
#[path = "gatt/gatt.rs"]
pub mod gatt;
pub mod stack;

mod util;

pub(crate) use util::name_of;

/// Synchronous mutex types.
pub(crate) type SyncMutex<T> = parking_lot::Mutex<T>;
pub(crate) type SyncMutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;
