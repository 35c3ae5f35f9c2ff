//! Attribute model: type constants, characteristic properties and the
//! per-kind access policy.

use crate::access::{AccessArgs, AccessResult};
pub use crate::types::uuid::Uuid;

/// Attribute type of a primary service declaration.
pub const PRIMARY_SERVICE: u16 = 0x2800;

/// Attribute type of a secondary service declaration.
pub const SECONDARY_SERVICE: u16 = 0x2801;

/// Attribute type of an include declaration.
pub const INCLUDE_SERVICE: u16 = 0x2802;

/// Attribute type of a characteristic declaration.
pub const CHARACTERISTIC: u16 = 0x2803;

/// Characteristic Extended Properties descriptor type.
pub const CHARACTERISTIC_EXTENDED_PROPERTIES: u16 = 0x2900;

/// Characteristic User Description descriptor type.
pub const CHARACTERISTIC_USER_DESCRIPTION: u16 = 0x2901;

/// Client Characteristic Configuration descriptor type.
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: u16 = 0x2902;

/// Server Characteristic Configuration descriptor type.
pub const SERVER_CHARACTERISTIC_CONFIGURATION: u16 = 0x2903;

/// Characteristic Presentation Format descriptor type.
pub const CHARACTERISTIC_PRESENTATION_FORMAT: u16 = 0x2904;

/// Characteristic Aggregate Format descriptor type.
pub const CHARACTERISTIC_AGGREGATE_FORMAT: u16 = 0x2905;

/// Internal 16-bit attribute type carried by the value attribute of a
/// characteristic whose uuid is 128 bits wide. The full uuid is only visible
/// in the declaration payload.
pub const LONG_UUID_MARKER: u16 = 0x0001;

/// Characteristic properties
///
/// Ref: BLUETOOTH CORE SPECIFICATION Version 6.0, Vol 3, Part G, Section 3.3.1.1
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CharacteristicProp {
    /// Broadcast
    Broadcast = 0x01,
    /// Read
    Read = 0x02,
    /// Write without response
    WriteWithoutResponse = 0x04,
    /// Write
    Write = 0x08,
    /// Notify
    Notify = 0x10,
    /// Indicate
    Indicate = 0x20,
    /// Authenticated writes
    AuthenticatedWrite = 0x40,
    /// Extended properties
    Extended = 0x80,
}

/// Property bitmask of a characteristic, encoded as the first byte of its
/// declaration value.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicProps(pub(crate) u8);

impl<'a> From<&'a [CharacteristicProp]> for CharacteristicProps {
    fn from(props: &'a [CharacteristicProp]) -> Self {
        let mut val: u8 = 0;
        for prop in props {
            val |= *prop as u8;
        }
        CharacteristicProps(val)
    }
}

impl<const T: usize> From<[CharacteristicProp; T]> for CharacteristicProps {
    fn from(props: [CharacteristicProp; T]) -> Self {
        let mut val: u8 = 0;
        for prop in props {
            val |= prop as u8;
        }
        CharacteristicProps(val)
    }
}

impl CharacteristicProps {
    /// Check if any of the properties are set.
    pub fn any(&self, props: &[CharacteristicProp]) -> bool {
        for p in props {
            if (*p as u8) & self.0 != 0 {
                return true;
            }
        }
        false
    }

    /// The raw bitmask.
    pub fn raw(&self) -> u8 {
        self.0
    }
}

/// Characteristic presentation format descriptor payload.
///
/// Ref: BLUETOOTH CORE SPECIFICATION Version 6.0, Vol 3, Part G, Section 3.3.3.5
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationFormat {
    /// Format category of the value.
    pub format: u8,
    /// Base-10 exponent applied to the value.
    pub exponent: i8,
    /// Unit of the value (assigned number).
    pub unit: u16,
    /// Namespace of the description field.
    pub name_space: u8,
    /// Description of the value (namespace-relative).
    pub description: u16,
}

impl PresentationFormat {
    fn encode(&self) -> [u8; 7] {
        let unit = self.unit.to_le_bytes();
        let description = self.description.to_le_bytes();
        [
            self.format,
            self.exponent as u8,
            unit[0],
            unit[1],
            self.name_space,
            description[0],
            description[1],
        ]
    }
}

/// A single addressable attribute: a 16-bit type uuid plus its access
/// behavior. Immutable in shape once pushed into a table; only the bytes
/// behind bound values change.
pub struct Attribute<'d> {
    /// Attribute type. For characteristic value attributes this is the
    /// 16-bit characteristic uuid, or [`LONG_UUID_MARKER`] when the
    /// characteristic uuid is 128 bits wide.
    pub uuid: u16,
    pub(crate) handle: u16,
    pub(crate) last_handle_in_group: u16,
    pub(crate) data: AttributeData<'d>,
}

impl<'d> Attribute<'d> {
    pub(crate) fn new(uuid: u16, data: AttributeData<'d>) -> Attribute<'d> {
        Attribute {
            uuid,
            handle: 0,
            last_handle_in_group: 0xffff,
            data,
        }
    }

    /// Handle assigned at table composition time.
    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// Last handle of the enclosing service group.
    pub fn last_handle_in_group(&self) -> u16 {
        self.last_handle_in_group
    }

    /// Perform one access operation.
    ///
    /// `handle` is the attribute's own assigned handle; declaration
    /// attributes derive their value handle from it (`handle + 1`), so the
    /// encoding never has to be fixed up after table composition.
    pub fn access(&mut self, args: AccessArgs<'_>, handle: u16) -> AccessResult {
        match args {
            AccessArgs::Read { offset, buffer } => self.data.read(offset, buffer, handle),
            AccessArgs::Write { data } => self.data.write(data),
            AccessArgs::CompareValue { expected } => self.data.compare(expected, handle),
        }
    }
}

impl<'d> core::fmt::Debug for Attribute<'d> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Attribute")
            .field("uuid", &self.uuid)
            .field("handle", &self.handle)
            .field("last_handle_in_group", &self.last_handle_in_group)
            .field("readable", &self.data.readable())
            .field("writable", &self.data.writable())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<'d> defmt::Format for Attribute<'d> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", defmt::Debug2Format(self))
    }
}

/// The enumerated handler kinds behind an attribute. All access policy lives
/// here; [`Attribute`] itself holds no validation logic.
pub(crate) enum AttributeData<'d> {
    /// Service declaration value: the service uuid in wire order.
    Service { uuid: Uuid },
    /// Characteristic declaration value, computed on demand:
    /// `[props][value handle LE][uuid]`.
    Declaration {
        props: CharacteristicProps,
        uuid: Uuid,
    },
    /// Characteristic value or descriptor bound to mutable storage.
    Data {
        props: CharacteristicProps,
        value: &'d mut [u8],
    },
    /// Characteristic value or descriptor bound to immutable storage.
    ReadOnlyData {
        props: CharacteristicProps,
        value: &'d [u8],
    },
    /// User description descriptor, read only.
    UserDescription { name: &'d str },
    /// Client characteristic configuration, per the serialized connection
    /// currently served by the table.
    Cccd { notify: bool, indicate: bool },
    /// Server characteristic configuration.
    ServerConfig { broadcast: bool },
    /// Presentation format descriptor, read only.
    PresentationFormat { format: PresentationFormat },
    /// Aggregate format descriptor: presentation format attribute handles.
    AggregateFormat { handles: &'d [u16] },
    /// Extended properties descriptor, read only.
    ExtendedProperties { props: u16 },
}

/// Copy `value[offset..]` into `buffer` under the uniform read policy:
/// offsets past the end are invalid, a too-small buffer is filled completely
/// and reported as truncation.
fn copy_value(value: &[u8], offset: usize, buffer: &mut [u8]) -> AccessResult {
    if offset > value.len() {
        return AccessResult::InvalidOffset;
    }
    let remaining = value.len() - offset;
    let len = buffer.len().min(remaining);
    buffer[..len].copy_from_slice(&value[offset..offset + len]);
    if len < remaining {
        AccessResult::ReadTruncated { len }
    } else {
        AccessResult::Success { len }
    }
}

/// The declaration value for a characteristic whose declaration attribute
/// sits at `handle`. The value attribute always immediately follows it.
fn declaration_value(props: CharacteristicProps, uuid: &Uuid, handle: u16) -> ([u8; 19], usize) {
    let mut value = [0u8; 19];
    let len = 3 + uuid.as_raw().len();
    value[0] = props.0;
    value[1..3].copy_from_slice(&handle.wrapping_add(1).to_le_bytes());
    value[3..len].copy_from_slice(uuid.as_raw());
    (value, len)
}

impl<'d> AttributeData<'d> {
    pub(crate) fn readable(&self) -> bool {
        match self {
            Self::Data { props, .. } => props.0 & (CharacteristicProp::Read as u8) != 0,
            _ => true,
        }
    }

    pub(crate) fn writable(&self) -> bool {
        match self {
            Self::Data { props, .. } => {
                props.0
                    & (CharacteristicProp::Write as u8
                        | CharacteristicProp::WriteWithoutResponse as u8
                        | CharacteristicProp::AuthenticatedWrite as u8)
                    != 0
            }
            Self::Cccd { .. } | Self::ServerConfig { .. } => true,
            _ => false,
        }
    }

    fn read(&self, offset: usize, buffer: &mut [u8], handle: u16) -> AccessResult {
        if !self.readable() {
            return AccessResult::ReadNotPermitted;
        }
        match self {
            Self::Service { uuid } => copy_value(uuid.as_raw(), offset, buffer),
            Self::Data { value, .. } => copy_value(value, offset, buffer),
            Self::ReadOnlyData { value, .. } => copy_value(value, offset, buffer),
            Self::UserDescription { name } => copy_value(name.as_bytes(), offset, buffer),
            Self::Cccd { notify, indicate } => {
                let mut bits = 0;
                if *notify {
                    bits |= 0x01;
                }
                if *indicate {
                    bits |= 0x02;
                }
                copy_value(&[bits, 0], offset, buffer)
            }
            Self::ServerConfig { broadcast } => copy_value(&[*broadcast as u8, 0], offset, buffer),
            Self::PresentationFormat { format } => copy_value(&format.encode(), offset, buffer),
            Self::ExtendedProperties { props } => copy_value(&props.to_le_bytes(), offset, buffer),
            Self::Declaration { props, uuid } => {
                let (value, len) = declaration_value(*props, uuid, handle);
                copy_value(&value[..len], offset, buffer)
            }
            Self::AggregateFormat { handles } => {
                let total = 2 * handles.len();
                if offset > total {
                    return AccessResult::InvalidOffset;
                }
                let remaining = total - offset;
                let len = buffer.len().min(remaining);
                for (i, out) in buffer[..len].iter_mut().enumerate() {
                    let pos = offset + i;
                    *out = handles[pos / 2].to_le_bytes()[pos % 2];
                }
                if len < remaining {
                    AccessResult::ReadTruncated { len }
                } else {
                    AccessResult::Success { len }
                }
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> AccessResult {
        if !self.writable() {
            return AccessResult::WriteNotPermitted;
        }
        match self {
            Self::Data { value, .. } => {
                if data.len() > value.len() {
                    return AccessResult::WriteOverflow;
                }
                value[..data.len()].copy_from_slice(data);
                AccessResult::Success { len: data.len() }
            }
            Self::Cccd { notify, indicate } => {
                if data.len() > 2 {
                    return AccessResult::WriteOverflow;
                }
                let bits = data.first().copied().unwrap_or(0);
                *notify = bits & 0x01 != 0;
                *indicate = bits & 0x02 != 0;
                AccessResult::Success { len: data.len() }
            }
            Self::ServerConfig { broadcast } => {
                if data.len() > 2 {
                    return AccessResult::WriteOverflow;
                }
                *broadcast = data.first().copied().unwrap_or(0) & 0x01 != 0;
                AccessResult::Success { len: data.len() }
            }
            _ => AccessResult::WriteNotPermitted,
        }
    }

    fn compare(&self, expected: &[u8], handle: u16) -> AccessResult {
        let equal = match self {
            Self::Service { uuid } => uuid.as_raw() == expected,
            Self::Data { value, .. } => &value[..] == expected,
            Self::ReadOnlyData { value, .. } => *value == expected,
            Self::UserDescription { name } => name.as_bytes() == expected,
            Self::Declaration { props, uuid } => {
                let (value, len) = declaration_value(*props, uuid, handle);
                &value[..len] == expected
            }
            Self::AggregateFormat { handles } => {
                expected.len() == 2 * handles.len()
                    && handles
                        .iter()
                        .zip(expected.chunks(2))
                        .all(|(h, c)| h.to_le_bytes() == [c[0], c[1]])
            }
            // The remaining kinds have small fixed-size derived encodings.
            other => {
                let mut value = [0u8; 7];
                match other.read(0, &mut value, handle) {
                    AccessResult::Success { len } => &value[..len] == expected,
                    _ => false,
                }
            }
        };
        if equal {
            AccessResult::ValueEqual
        } else {
            AccessResult::ValueNotEqual
        }
    }

    /// Current raw CCCD bits, for per-connection slot snapshots.
    pub(crate) fn cccd_raw(&self) -> Option<u16> {
        match self {
            Self::Cccd { notify, indicate } => {
                let mut bits = 0;
                if *notify {
                    bits |= 0x01;
                }
                if *indicate {
                    bits |= 0x02;
                }
                Some(bits)
            }
            _ => None,
        }
    }
}
