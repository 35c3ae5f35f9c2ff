//! Attribute table composition and handle-addressed access.
//!
//! Services and characteristics are declared through builders and flattened
//! into one dense attribute table. Handles are positional: the first pushed
//! attribute gets handle 1, every following attribute the next handle, with
//! no gaps. The table never reorders or removes attributes, so handles stay
//! stable for the lifetime of the table.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::access::{AccessArgs, AccessResult};
use crate::attribute::{
    Attribute, AttributeData, CharacteristicProp, CharacteristicProps, PresentationFormat, Uuid,
    CHARACTERISTIC, CHARACTERISTIC_AGGREGATE_FORMAT, CHARACTERISTIC_EXTENDED_PROPERTIES,
    CHARACTERISTIC_PRESENTATION_FORMAT, CHARACTERISTIC_USER_DESCRIPTION,
    CLIENT_CHARACTERISTIC_CONFIGURATION, PRIMARY_SERVICE, SERVER_CHARACTERISTIC_CONFIGURATION,
};
use crate::cccd::{Cccd, ClientConfigs};
use crate::cursor::WriteCursor;
use crate::Error;

/// A primary service to be added to the table.
pub struct Service {
    /// Uuid of the service.
    pub uuid: Uuid,
}

impl Service {
    /// Create a new service with the given uuid.
    pub fn new<U: Into<Uuid>>(uuid: U) -> Self {
        Self { uuid: uuid.into() }
    }
}

/// A characteristic in the attribute table, addressed by its value handle.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Characteristic {
    /// Handle of the value attribute.
    pub handle: u16,
    /// Handle of the client configuration descriptor, when the
    /// characteristic supports notifications or indications.
    pub cccd_handle: Option<u16>,
}

/// A descriptor in the attribute table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHandle {
    /// Handle of the descriptor attribute.
    pub handle: u16,
}

/// Everything needed to send a notification for a characteristic value:
/// resolved from the storage the value is bound to.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationData {
    /// Handle of the value attribute.
    pub handle: u16,
    /// 16-bit attribute type of the value attribute.
    pub uuid: u16,
    /// Handle of the client configuration descriptor.
    pub cccd_handle: u16,
    /// Zero-based position of that descriptor among all client
    /// configuration descriptors in the table.
    pub config_index: usize,
}

/// Table of attributes for `MAX` attributes at most.
pub struct AttributeTable<'d, M: RawMutex, const MAX: usize> {
    inner: Mutex<M, RefCell<InnerTable<'d, MAX>>>,
}

pub(crate) struct InnerTable<'d, const MAX: usize> {
    attributes: Vec<Attribute<'d>, MAX>,
}

impl<'d, const MAX: usize> InnerTable<'d, MAX> {
    fn push(&mut self, mut attribute: Attribute<'d>) -> u16 {
        let handle = self.attributes.len() as u16 + 1;
        attribute.handle = handle;
        if self.attributes.push(attribute).is_err() {
            panic!("no space for more attributes");
        }
        trace!("[table] attribute added at handle {}", handle);
        handle
    }
}

impl<'d, M: RawMutex, const MAX: usize> Default for AttributeTable<'d, M, MAX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d, M: RawMutex, const MAX: usize> AttributeTable<'d, M, MAX> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(InnerTable { attributes: Vec::new() })),
        }
    }

    fn with_inner<F: FnOnce(&mut InnerTable<'d, MAX>) -> R, R>(&self, f: F) -> R {
        self.inner.lock(|inner| {
            let mut table = inner.borrow_mut();
            f(&mut table)
        })
    }

    /// Run `f` over a lending iterator of all attributes, in handle order.
    pub fn iterate<F: FnOnce(AttributeIterator<'_, 'd>) -> R, R>(&self, f: F) -> R {
        self.with_inner(|inner| {
            f(AttributeIterator {
                attributes: &mut inner.attributes[..],
                pos: 0,
            })
        })
    }

    fn push(&mut self, attribute: Attribute<'d>) -> u16 {
        self.with_inner(|inner| inner.push(attribute))
    }

    /// Number of attributes in the table.
    pub fn number_of_attributes(&self) -> usize {
        self.with_inner(|inner| inner.attributes.len())
    }

    /// Number of client configuration descriptors in the table.
    pub fn number_of_client_configs(&self) -> usize {
        self.with_inner(|inner| {
            inner
                .attributes
                .iter()
                .filter(|att| matches!(att.data, AttributeData::Cccd { .. }))
                .count()
        })
    }

    /// Add a primary service to the table. Attributes of the service are
    /// pushed through the returned builder; the service group is closed when
    /// the builder is dropped.
    pub fn add_service(&mut self, service: Service) -> ServiceBuilder<'_, 'd, M, MAX> {
        let start = self.number_of_attributes();
        self.push(Attribute::new(
            PRIMARY_SERVICE,
            AttributeData::Service { uuid: service.uuid },
        ));
        ServiceBuilder { start, table: self }
    }

    /// Run `f` on the attribute at zero-based `index`, or return `None` when
    /// the index is out of range.
    pub fn attribute_at<F: FnOnce(&mut Attribute<'d>) -> R, R>(&self, index: usize, f: F) -> Option<R> {
        self.with_inner(|inner| inner.attributes.get_mut(index).map(f))
    }

    /// Perform one access operation on the attribute at `handle`, or return
    /// `None` when no such attribute exists.
    pub fn access(&self, handle: u16, args: AccessArgs<'_>) -> Option<AccessResult> {
        self.iterate(|mut it| {
            while let Some(att) = it.next() {
                if att.handle == handle {
                    trace!("[table] access handle {}", handle);
                    return Some(att.access(args, handle));
                }
            }
            None
        })
    }

    /// Overwrite the storage bound to a characteristic value. The new value
    /// must match the storage length exactly.
    pub fn set(&self, characteristic: &Characteristic, input: &[u8]) -> Result<(), Error> {
        self.iterate(|mut it| {
            while let Some(att) = it.next() {
                if att.handle == characteristic.handle {
                    if let AttributeData::Data { value, .. } = &mut att.data {
                        if value.len() != input.len() {
                            return Err(Error::UnexpectedDataLength {
                                expected: value.len(),
                                actual: input.len(),
                            });
                        }
                        value.copy_from_slice(input);
                        return Ok(());
                    }
                }
            }
            Err(Error::NotFound)
        })
    }

    /// Run `f` on the bytes currently bound to a characteristic value.
    pub fn get<F: FnOnce(&[u8]) -> R, R>(&self, characteristic: &Characteristic, f: F) -> Result<R, Error> {
        self.iterate(|mut it| {
            while let Some(att) = it.next() {
                if att.handle == characteristic.handle {
                    match &att.data {
                        AttributeData::Data { value, .. } => return Ok(f(value)),
                        AttributeData::ReadOnlyData { value, .. } => return Ok(f(value)),
                        _ => {}
                    }
                }
            }
            Err(Error::NotFound)
        })
    }

    /// Look up the characteristic whose value attribute sits at `handle`.
    pub fn find_characteristic_by_value_handle(&self, handle: u16) -> Result<Characteristic, Error> {
        self.with_inner(|inner| {
            let attributes = &inner.attributes;
            for (i, att) in attributes.iter().enumerate() {
                if att.handle == handle
                    && matches!(
                        att.data,
                        AttributeData::Data { .. } | AttributeData::ReadOnlyData { .. }
                    )
                {
                    let cccd_handle = attributes
                        .get(i + 1)
                        .filter(|next| matches!(next.data, AttributeData::Cccd { .. }))
                        .map(|next| next.handle);
                    return Ok(Characteristic { handle, cccd_handle });
                }
            }
            Err(Error::NotFound)
        })
    }

    /// Resolve notification metadata for the characteristic whose value
    /// attribute is bound to the storage starting at `value`.
    ///
    /// Returns `None` when no value attribute is bound to that storage, or
    /// when the characteristic has no client configuration descriptor.
    pub fn find_notification_data(&self, value: *const u8) -> Option<NotificationData> {
        self.with_inner(|inner| {
            let attributes = &inner.attributes;
            let mut config_index = 0;
            for (i, att) in attributes.iter().enumerate() {
                let ptr = match &att.data {
                    AttributeData::Data { value, .. } => value.as_ptr(),
                    AttributeData::ReadOnlyData { value, .. } => value.as_ptr(),
                    AttributeData::Cccd { .. } => {
                        config_index += 1;
                        continue;
                    }
                    _ => continue,
                };
                if core::ptr::eq(ptr, value) {
                    let cccd = attributes
                        .get(i + 1)
                        .filter(|next| matches!(next.data, AttributeData::Cccd { .. }))?;
                    return Some(NotificationData {
                        handle: att.handle,
                        uuid: att.uuid,
                        cccd_handle: cccd.handle,
                        config_index,
                    });
                }
            }
            None
        })
    }

    /// Encode a read-by-group-type response entry,
    /// `[start handle LE][end handle LE][service uuid]`, for the first
    /// primary service declared at or after `start_handle` whose uuid width
    /// matches `long_uuid` (responses never mix uuid widths).
    ///
    /// Returns the number of bytes written, or 0 when no matching service
    /// exists or `dest` cannot hold the complete entry. Nothing is written
    /// on failure.
    pub fn read_primary_service_response(&self, start_handle: u16, long_uuid: bool, dest: &mut [u8]) -> usize {
        self.with_inner(|inner| {
            for att in inner.attributes.iter() {
                if att.handle < start_handle {
                    continue;
                }
                if let AttributeData::Service { uuid } = &att.data {
                    if uuid.is_long() != long_uuid {
                        continue;
                    }
                    if dest.len() < 4 + uuid.as_raw().len() {
                        return 0;
                    }
                    let mut w = WriteCursor::new(dest);
                    if w.write_u16(att.handle).is_err()
                        || w.write_u16(att.last_handle_in_group).is_err()
                        || w.append(uuid.as_raw()).is_err()
                    {
                        return 0;
                    }
                    return w.len();
                }
            }
            0
        })
    }

    /// Snapshot the current client configuration bits of every client
    /// configuration descriptor, for parking a connection.
    pub fn snapshot_client_configs<const N: usize>(&self) -> ClientConfigs<N> {
        self.with_inner(|inner| {
            let mut configs = ClientConfigs::default();
            for att in inner.attributes.iter() {
                if let Some(raw) = att.data.cccd_raw() {
                    if !configs.store(att.handle, Cccd::from(raw)) {
                        warn!("[table] client config snapshot full, dropping handle {}", att.handle);
                    }
                }
            }
            configs
        })
    }

    /// Load saved client configuration bits into the table, for resuming a
    /// connection. Descriptors without a saved entry are reset to zero.
    pub fn restore_client_configs<const N: usize>(&self, configs: &ClientConfigs<N>) {
        trace!("[table] restoring client configs");
        self.with_inner(|inner| {
            for att in inner.attributes.iter_mut() {
                if let AttributeData::Cccd { notify, indicate } = &mut att.data {
                    let saved = configs.get(att.handle).unwrap_or_default();
                    *notify = saved.notifications_enabled();
                    *indicate = saved.indications_enabled();
                }
            }
        })
    }
}

/// Lending iterator over the attributes of a table, in handle order.
pub struct AttributeIterator<'a, 'd> {
    attributes: &'a mut [Attribute<'d>],
    pos: usize,
}

impl<'a, 'd> AttributeIterator<'a, 'd> {
    /// The next attribute, borrowed mutably for the duration of the access.
    pub fn next(&mut self) -> Option<&mut Attribute<'d>> {
        if self.pos < self.attributes.len() {
            let att = &mut self.attributes[self.pos];
            self.pos += 1;
            Some(att)
        } else {
            None
        }
    }
}

/// Builder for the attributes of one service group.
pub struct ServiceBuilder<'r, 'd, M: RawMutex, const MAX: usize> {
    start: usize,
    table: &'r mut AttributeTable<'d, M, MAX>,
}

impl<'r, 'd, M: RawMutex, const MAX: usize> ServiceBuilder<'r, 'd, M, MAX> {
    /// Add a characteristic backed by mutable storage. The declaration and
    /// value attributes are pushed immediately; a client configuration
    /// descriptor follows when the properties include notify or indicate.
    pub fn add_characteristic<U: Into<Uuid>, P: Into<CharacteristicProps>>(
        &mut self,
        uuid: U,
        props: P,
        storage: &'d mut [u8],
    ) -> CharacteristicBuilder<'_, 'd, M, MAX> {
        let uuid = uuid.into();
        let props = props.into();
        self.table.push(Attribute::new(
            CHARACTERISTIC,
            AttributeData::Declaration {
                props,
                uuid: uuid.clone(),
            },
        ));
        let handle = self.table.push(Attribute::new(
            uuid.as_short(),
            AttributeData::Data { props, value: storage },
        ));
        self.characteristic_builder(handle, props)
    }

    /// Add a characteristic backed by immutable storage. Always readable,
    /// never writable.
    pub fn add_characteristic_ro<U: Into<Uuid>>(
        &mut self,
        uuid: U,
        value: &'d [u8],
    ) -> CharacteristicBuilder<'_, 'd, M, MAX> {
        let uuid = uuid.into();
        let props = [CharacteristicProp::Read].into();
        self.table.push(Attribute::new(
            CHARACTERISTIC,
            AttributeData::Declaration {
                props,
                uuid: uuid.clone(),
            },
        ));
        let handle = self.table.push(Attribute::new(
            uuid.as_short(),
            AttributeData::ReadOnlyData { props, value },
        ));
        self.characteristic_builder(handle, props)
    }

    fn characteristic_builder(
        &mut self,
        handle: u16,
        props: CharacteristicProps,
    ) -> CharacteristicBuilder<'_, 'd, M, MAX> {
        let cccd_handle = if props.any(&[CharacteristicProp::Notify, CharacteristicProp::Indicate]) {
            Some(self.table.push(Attribute::new(
                CLIENT_CHARACTERISTIC_CONFIGURATION,
                AttributeData::Cccd {
                    notify: false,
                    indicate: false,
                },
            )))
        } else {
            None
        };
        CharacteristicBuilder {
            handle,
            cccd_handle,
            table: &mut *self.table,
        }
    }
}

impl<'r, 'd, M: RawMutex, const MAX: usize> Drop for ServiceBuilder<'r, 'd, M, MAX> {
    fn drop(&mut self) {
        let start = self.start;
        self.table.with_inner(|inner| {
            let last = inner.attributes.len() as u16;
            for att in inner.attributes[start..].iter_mut() {
                att.last_handle_in_group = last;
            }
        });
    }
}

/// Builder for the descriptors of one characteristic.
pub struct CharacteristicBuilder<'r, 'd, M: RawMutex, const MAX: usize> {
    handle: u16,
    cccd_handle: Option<u16>,
    table: &'r mut AttributeTable<'d, M, MAX>,
}

impl<'r, 'd, M: RawMutex, const MAX: usize> CharacteristicBuilder<'r, 'd, M, MAX> {
    /// Add a descriptor backed by mutable storage.
    pub fn add_descriptor<U: Into<Uuid>, P: Into<CharacteristicProps>>(
        &mut self,
        uuid: U,
        props: P,
        storage: &'d mut [u8],
    ) -> DescriptorHandle {
        let uuid = uuid.into();
        let handle = self.table.push(Attribute::new(
            uuid.as_short(),
            AttributeData::Data {
                props: props.into(),
                value: storage,
            },
        ));
        DescriptorHandle { handle }
    }

    /// Add a descriptor backed by immutable storage.
    pub fn add_descriptor_ro<U: Into<Uuid>>(&mut self, uuid: U, value: &'d [u8]) -> DescriptorHandle {
        let uuid = uuid.into();
        let handle = self.table.push(Attribute::new(
            uuid.as_short(),
            AttributeData::ReadOnlyData {
                props: [CharacteristicProp::Read].into(),
                value,
            },
        ));
        DescriptorHandle { handle }
    }

    /// Add a user description descriptor.
    pub fn add_user_description(&mut self, name: &'d str) -> DescriptorHandle {
        let handle = self.table.push(Attribute::new(
            CHARACTERISTIC_USER_DESCRIPTION,
            AttributeData::UserDescription { name },
        ));
        DescriptorHandle { handle }
    }

    /// Add a presentation format descriptor.
    pub fn add_presentation_format(&mut self, format: PresentationFormat) -> DescriptorHandle {
        let handle = self.table.push(Attribute::new(
            CHARACTERISTIC_PRESENTATION_FORMAT,
            AttributeData::PresentationFormat { format },
        ));
        DescriptorHandle { handle }
    }

    /// Add an aggregate format descriptor listing the handles of the
    /// presentation format descriptors that make up the value.
    pub fn add_aggregate_format(&mut self, handles: &'d [u16]) -> DescriptorHandle {
        let handle = self.table.push(Attribute::new(
            CHARACTERISTIC_AGGREGATE_FORMAT,
            AttributeData::AggregateFormat { handles },
        ));
        DescriptorHandle { handle }
    }

    /// Add a server configuration descriptor.
    pub fn add_server_config(&mut self) -> DescriptorHandle {
        let handle = self.table.push(Attribute::new(
            SERVER_CHARACTERISTIC_CONFIGURATION,
            AttributeData::ServerConfig { broadcast: false },
        ));
        DescriptorHandle { handle }
    }

    /// Add an extended properties descriptor.
    pub fn add_extended_properties(&mut self, props: u16) -> DescriptorHandle {
        let handle = self.table.push(Attribute::new(
            CHARACTERISTIC_EXTENDED_PROPERTIES,
            AttributeData::ExtendedProperties { props },
        ));
        DescriptorHandle { handle }
    }

    /// Finish the characteristic.
    pub fn build(self) -> Characteristic {
        Characteristic {
            handle: self.handle,
            cccd_handle: self.cccd_handle,
        }
    }
}
