use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, error, info};

use crate::att::{Handle, Perm};
use crate::gap::Uuid16;
use crate::stack::{Iface, Stack};
use crate::{name_of, SyncMutex, SyncMutexGuard};

use super::*;

/// Largest service id representable in the handler key packing (bit 7 must
/// stay clear so the pending-key tag bit can never be reached by the shift).
pub(super) const MAX_SERVICE_ID: u8 = 0x7F;

/// Identifier of a declared service, assigned in declaration order.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct ServiceId(u8);

impl ServiceId {
    /// Wraps a raw service id. Ids at or above 128 cannot be packed into a
    /// handler key and are a declaration-time programming error.
    #[inline]
    pub const fn new(v: u8) -> Result<Self> {
        if v > MAX_SERVICE_ID {
            return Err(Error::ServiceLimit { id: v });
        }
        Ok(Self(v))
    }

    /// Returns the raw service id.
    #[inline(always)]
    #[must_use]
    pub(crate) const fn raw(self) -> u8 {
        self.0
    }
}

impl Debug for ServiceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", name_of!(ServiceId), self.0)
    }
}

impl Display for ServiceId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "service {}", self.0)
    }
}

/// Attribute response mode: whether the stack answers reads/writes from the
/// table value or defers to the application.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RspMode {
    /// The stack responds automatically from the stored value.
    #[default]
    Auto,
    /// The application supplies the response.
    ByApp,
}

/// Attribute role within a service table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttrKind {
    PrimaryServiceDecl,
    CharacteristicDecl,
    CharacteristicValue,
    NameDescription,
    ClientConfig,
}

/// Externally-owned mutable attribute value storage.
///
/// The table aliases the buffer rather than copying it: the application may
/// update the contents out of band at any time (the attribute's shape is
/// fixed at declaration, only the bytes change). Cloning shares the storage.
#[derive(Clone, Default)]
#[repr(transparent)]
pub struct ValueBuf(Arc<SyncMutex<Vec<u8>>>);

impl ValueBuf {
    /// Creates value storage with the given initial contents.
    #[inline]
    #[must_use]
    pub fn new(v: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(SyncMutex::new(v.into())))
    }

    /// Creates zero-filled value storage of length `n`.
    #[inline]
    #[must_use]
    pub fn zeroed(n: usize) -> Self {
        Self::new(vec![0; n])
    }

    /// Locks the buffer for reading or in-place update.
    #[inline]
    pub fn lock(&self) -> SyncMutexGuard<'_, Vec<u8>> {
        self.0.lock()
    }

    /// Returns the current value length.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Returns whether the value is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

impl Debug for ValueBuf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_tuple(name_of!(ValueBuf)).field(&self.0.lock())).finish()
    }
}

impl From<&[u8]> for ValueBuf {
    #[inline]
    fn from(v: &[u8]) -> Self {
        Self::new(v)
    }
}

/// One attribute descriptor in declaration order. `uuid` is the attribute
/// *type*; for characteristic values it is the characteristic UUID.
#[derive(Clone, Debug)]
pub struct AttrDef {
    pub kind: AttrKind,
    pub uuid: Uuid16,
    pub perms: Perm,
    pub max_len: u16,
    pub value: ValueBuf,
    pub rsp: RspMode,
}

/// Per-service lifecycle state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ServiceState {
    /// Declared locally, not yet submitted to the stack.
    #[default]
    Declared,
    /// Table creation request submitted, completion pending.
    TableRequested,
    /// Handles assigned and service started.
    Active,
    /// Table creation failed; the service never activates and is not
    /// retried.
    Failed,
}

/// Ordered attribute table for one service, plus the stack-assigned handles
/// once table creation completes.
///
/// The first attribute is always the primary service declaration, inserted at
/// construction; `handles[i]` corresponds to `attrs[i]`.
#[derive(Clone, Debug)]
pub struct ServiceTable {
    uuid: Uuid16,
    id: ServiceId,
    attrs: Vec<AttrDef>,
    handles: SmallVec<[Handle; 8]>,
    state: ServiceState,
}

impl ServiceTable {
    /// Creates a service table for `uuid`, declaring the primary service
    /// attribute.
    #[must_use]
    pub(super) fn new(uuid: Uuid16, id: ServiceId) -> Self {
        let mut this = Self {
            uuid,
            id,
            attrs: Vec::with_capacity(8),
            handles: SmallVec::new(),
            state: ServiceState::Declared,
        };
        this.attrs.push(AttrDef {
            kind: AttrKind::PrimaryServiceDecl,
            uuid: PRIMARY_SERVICE,
            perms: Perm::READ,
            max_len: 2,
            value: ValueBuf::new(uuid.to_bytes()),
            rsp: RspMode::Auto,
        });
        this
    }

    /// Appends an attribute, returning its local index.
    pub fn push(&mut self, attr: AttrDef) -> Result<u8> {
        // u8::MAX stays unused so every index survives the key packing
        let i = u8::try_from(self.attrs.len())
            .ok()
            .filter(|&i| i < u8::MAX)
            .ok_or(Error::TableFull { service: self.id })?;
        self.attrs.push(attr);
        Ok(i)
    }

    /// Appends a read-only Characteristic User Description descriptor sized
    /// to `description`.
    pub fn add_name_description(&mut self, description: &str) -> Result<u8> {
        debug!(
            "Adding name description {description:?} ({USER_DESCRIPTION}) to {}",
            self.id
        );
        let max_len = u16::try_from(description.len()).unwrap_or(u16::MAX);
        self.push(AttrDef {
            kind: AttrKind::NameDescription,
            uuid: USER_DESCRIPTION,
            perms: Perm::READ,
            max_len,
            value: ValueBuf::new(description.as_bytes()),
            rsp: RspMode::Auto,
        })
    }

    /// Appends a 2-byte Client Characteristic Configuration descriptor
    /// aliasing `config`, which holds the notify/indicate subscription state.
    pub fn add_config_description(&mut self, config: ValueBuf) -> Result<u8> {
        if config.len() < 2 {
            return Err(Error::InvalidConfigValue);
        }
        debug!("Adding config description ({CLIENT_CONFIG}) to {}", self.id);
        self.push(AttrDef {
            kind: AttrKind::ClientConfig,
            uuid: CLIENT_CONFIG,
            perms: Perm::READ_WRITE,
            max_len: 2,
            value: config,
            rsp: RspMode::Auto,
        })
    }

    /// Appends a characteristic declaration followed by its value attribute
    /// and returns the index of the **value**, which is what handler
    /// registration and handle lookup must target.
    ///
    /// If the declaration cannot be appended the value is not appended
    /// either, and no dependent descriptor may be chained.
    pub fn add_characteristic(
        &mut self,
        uuid: Uuid16,
        props: Prop,
        perms: Perm,
        max_len: u16,
        value: ValueBuf,
        rsp: RspMode,
    ) -> Result<u8> {
        info!(
            "Adding characteristic {uuid} to {}, max_len={max_len}, pos={}",
            self.id,
            self.attrs.len()
        );
        self.push(AttrDef {
            kind: AttrKind::CharacteristicDecl,
            uuid: CHARACTERISTIC,
            perms: Perm::READ,
            max_len: 1,
            value: ValueBuf::new([props.bits()]),
            rsp: RspMode::Auto,
        })?;
        self.push(AttrDef {
            kind: AttrKind::CharacteristicValue,
            uuid,
            perms,
            max_len,
            value,
            rsp,
        })
    }

    /// Submits the full table as one atomic creation request. Completion
    /// arrives later as a `TableCreated` event; a submission failure leaves
    /// the service without handles, permanently.
    pub(super) fn register(&mut self, iface: Iface, stack: &dyn Stack) {
        info!(
            "Submitting {} attributes for {} with uuid={}",
            self.attrs.len(),
            self.id,
            self.uuid
        );
        match stack.create_attr_table(iface, self.id, &self.attrs) {
            Ok(()) => self.state = ServiceState::TableRequested,
            Err(e) => {
                error!("Table submission for {} failed: {e}", self.id);
                self.state = ServiceState::Failed;
            }
        }
    }

    /// Stores the stack-assigned handles. A count mismatch or an
    /// out-of-domain handle is fatal for this service: it transitions to
    /// [`ServiceState::Failed`] with no handles populated.
    pub(super) fn set_handles(&mut self, raw: &[u16]) -> Result<()> {
        if raw.len() != self.attrs.len() {
            self.state = ServiceState::Failed;
            return Err(Error::HandleCountMismatch {
                service: self.id,
                got: raw.len(),
                want: self.attrs.len(),
            });
        }
        let mut handles = SmallVec::with_capacity(raw.len());
        for &h in raw {
            let Some(h) = Handle::new(h) else {
                self.state = ServiceState::Failed;
                return Err(Error::InvalidHandle {
                    service: self.id,
                    raw: h,
                });
            };
            handles.push(h);
        }
        self.handles = handles;
        Ok(())
    }

    /// Returns the assigned handle of the attribute at `index`.
    pub fn handle(&self, index: u8) -> Result<Handle> {
        if self.handles.is_empty() {
            return Err(Error::NoHandles { service: self.id });
        }
        (self.handles.get(usize::from(index)).copied()).ok_or(Error::UnknownAttribute {
            service: self.id,
            index,
        })
    }

    /// Returns the primary UUID of this service.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid16 {
        self.uuid
    }

    /// Returns the service id.
    #[inline(always)]
    #[must_use]
    pub const fn id(&self) -> ServiceId {
        self.id
    }

    /// Returns the declared attribute count.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Returns whether the table is empty. It never is: the primary service
    /// declaration is inserted at construction.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Returns the current lifecycle state.
    #[inline(always)]
    #[must_use]
    pub const fn state(&self) -> ServiceState {
        self.state
    }

    #[inline(always)]
    pub(super) fn set_state(&mut self, state: ServiceState) {
        self.state = state;
    }

    #[inline(always)]
    pub(super) fn handles(&self) -> &[Handle] {
        &self.handles
    }
}
