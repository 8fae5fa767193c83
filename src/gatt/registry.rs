use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use tracing::debug;

use crate::att::Handle;
use crate::name_of;
use crate::stack::{GattEvent, Iface};

use super::table::ServiceId;

/// Tag bit marking a pending (pre-assignment) key. Real handles never reach
/// this bit (`Handle` rejects values at or above it), so pending keys and
/// assigned handles can share one map.
const PENDING: u16 = 0x8000;

/// Handler registry key: either `(service, index)` packed under the tag bit
/// while the service awaits handle assignment, or the assigned handle after
/// rekeying. The key is never decomposed, only looked up.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
struct HandlerKey(u16);

impl HandlerKey {
    /// Packs a pending key. `ServiceId` construction guarantees the id fits
    /// in 7 bits, so the shift cannot reach the tag bit and the packing is
    /// injective over `(service, index)`.
    #[inline]
    #[must_use]
    fn pending(service: ServiceId, index: u8) -> Self {
        Self(PENDING | u16::from(service.raw()) << 8 | u16::from(index))
    }

    /// Returns the key of an assigned handle.
    #[inline(always)]
    #[must_use]
    const fn assigned(hdl: Handle) -> Self {
        Self(hdl.raw())
    }
}

impl Debug for HandlerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#06X})", name_of!(HandlerKey), self.0)
    }
}

/// Attribute event callback.
///
/// Invoked synchronously with the owning interface and the triggering event.
/// Closures may capture state; [`EventHandler::with`] adapts a method of a
/// shared service object.
#[derive(Clone)]
#[repr(transparent)]
pub struct EventHandler(Arc<dyn Fn(Iface, &GattEvent) + Send + Sync>);

impl EventHandler {
    /// Returns an event handler calling a method of `T`.
    #[inline(always)]
    pub fn with<T: Send + Sync + 'static>(
        this: &Arc<T>,
        f: impl Fn(&T, Iface, &GattEvent) + Send + Sync + 'static,
    ) -> Self {
        let this = Arc::clone(this);
        Self(Arc::new(move |iface, evt| f(&this, iface, evt)))
    }

    #[inline(always)]
    fn call(&self, iface: Iface, evt: &GattEvent) {
        (self.0)(iface, evt);
    }
}

impl Debug for EventHandler {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        #[allow(clippy::ptr_as_ptr)]
        (f.debug_tuple(name_of!(EventHandler)))
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

impl<T: Fn(Iface, &GattEvent) + Send + Sync + 'static> From<T> for EventHandler {
    #[inline(always)]
    fn from(f: T) -> Self {
        Self(Arc::new(f))
    }
}

/// Map of attribute event handlers, keyed by pending keys before handle
/// assignment and by the handles themselves afterwards.
#[derive(Debug, Default)]
pub(super) struct HandlerRegistry(BTreeMap<HandlerKey, EventHandler>);

impl HandlerRegistry {
    /// Registers `handler` for the attribute at `(service, index)`. Must
    /// happen before the service's table-creation completion is processed.
    pub fn register(&mut self, service: ServiceId, index: u8, handler: EventHandler) {
        self.0.insert(HandlerKey::pending(service, index), handler);
    }

    /// Migrates every pending entry of `service` to its assigned handle.
    /// Indices without a registered handler are skipped. The pending entries
    /// are consumed, so a repeated call finds nothing to move.
    pub fn rekey_service(&mut self, service: ServiceId, handles: &[Handle]) {
        for (i, &hdl) in handles.iter().enumerate() {
            // The table caps attribute counts at u8 range
            let Ok(i) = u8::try_from(i) else { break };
            if let Some(h) = self.0.remove(&HandlerKey::pending(service, i)) {
                debug!("Rekeyed handler for {service} attribute {i} to {hdl}");
                self.0.insert(HandlerKey::assigned(hdl), h);
            }
        }
    }

    /// Invokes the handler registered for `hdl`, returning whether one was
    /// found. Many attributes intentionally have no handler, so a miss is
    /// not an error.
    pub fn dispatch(&self, iface: Iface, hdl: Handle, evt: &GattEvent) -> bool {
        let Some(h) = self.0.get(&HandlerKey::assigned(hdl)) else {
            return false;
        };
        h.call(iface, evt);
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::SyncMutex;

    use super::*;

    fn sid(v: u8) -> ServiceId {
        ServiceId::new(v).unwrap()
    }

    fn hdl(v: u16) -> Handle {
        Handle::new(v).unwrap()
    }

    #[test]
    fn pending_keys_are_tagged_and_injective() {
        let mut seen = BTreeSet::new();
        for id in 0..=0x7F {
            for i in 0..=0xFF {
                let k = HandlerKey::pending(sid(id), i);
                assert_ne!(k.0 & PENDING, 0);
                assert!(seen.insert(k.0));
            }
        }
        assert_eq!(seen.len(), 128 * 256);
        // Disjoint from every possible assigned key
        assert!(*seen.iter().next().unwrap() > u16::from(Handle::MAX));
    }

    #[test]
    fn rekey_moves_entries_once() {
        let counts: Arc<SyncMutex<Vec<u8>>> = Arc::default();
        let mut reg = HandlerRegistry::default();
        for i in [2, 3] {
            let counts = Arc::clone(&counts);
            reg.register(
                sid(1),
                i,
                EventHandler::from(move |_: Iface, _: &GattEvent| counts.lock().push(i)),
            );
        }
        assert_eq!(reg.len(), 2);

        let handles = [hdl(40), hdl(41), hdl(42), hdl(43)];
        reg.rekey_service(sid(1), &handles);
        assert_eq!(reg.len(), 2);

        let evt = GattEvent::Read {
            conn: crate::stack::ConnId(0),
            handle: hdl(42),
            offset: 0,
        };
        assert!(reg.dispatch(Iface::new(3), hdl(42), &evt));
        assert!(reg.dispatch(Iface::new(3), hdl(43), &evt));
        assert!(!reg.dispatch(Iface::new(3), hdl(40), &evt));
        assert_eq!(&*counts.lock(), &[2, 3]);

        // A second rekey finds no pending entries and changes nothing
        reg.rekey_service(sid(1), &handles);
        assert_eq!(reg.len(), 2);
        assert!(reg.dispatch(Iface::new(3), hdl(42), &evt));
    }

    #[test]
    fn rekey_only_touches_one_service() {
        let mut reg = HandlerRegistry::default();
        reg.register(sid(0), 2, EventHandler::from(|_: Iface, _: &GattEvent| {}));
        reg.register(sid(1), 2, EventHandler::from(|_: Iface, _: &GattEvent| {}));
        reg.rekey_service(sid(0), &[hdl(10), hdl(11), hdl(12)]);
        let evt = GattEvent::Response {
            handle: hdl(12),
            status: crate::att::Status::Ok,
        };
        assert!(reg.dispatch(Iface::new(0), hdl(12), &evt));
        // Service 1 entry is still pending under its composite key
        assert!(!reg.dispatch(Iface::new(0), hdl(2), &evt));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn handler_identity_preserved_across_rekey() {
        let h = EventHandler::from(|_: Iface, _: &GattEvent| {});
        let mut reg = HandlerRegistry::default();
        reg.register(sid(0), 1, h.clone());
        reg.rekey_service(sid(0), &[hdl(1), hdl(2)]);
        let moved = reg.0.get(&HandlerKey::assigned(hdl(2))).unwrap();
        assert!(Arc::ptr_eq(&moved.0, &h.0));
    }
}
