//! End-to-end exercises of table composition and the access protocol
//! through the public API.

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use gatt_server::access::{AccessArgs, AccessResult};
use gatt_server::attribute::{CharacteristicProp, PresentationFormat};
use gatt_server::cccd::ClientConfigs;
use gatt_server::table::{AttributeTable, Service};
use gatt_server::Error;

const BATTERY_SERVICE: u16 = 0x180f;
const BATTERY_LEVEL: u16 = 0x2a19;

#[test]
fn battery_service_read_write_cycle() {
    let mut level = [61u8];
    let mut table: AttributeTable<'_, NoopRawMutex, 8> = AttributeTable::new();
    let characteristic = {
        let mut service = table.add_service(Service::new(BATTERY_SERVICE));
        service
            .add_characteristic(
                BATTERY_LEVEL,
                [CharacteristicProp::Read, CharacteristicProp::Write, CharacteristicProp::Notify],
                &mut level,
            )
            .build()
    };

    // Declaration at handle 2, value at 3, client configuration at 4.
    assert_eq!(characteristic.handle, 3);
    assert_eq!(characteristic.cccd_handle, Some(4));
    assert_eq!(table.number_of_attributes(), 4);

    // The declaration value carries props, value handle and uuid.
    let mut buffer = [0u8; 8];
    let result = table.access(2, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 5 }));
    assert_eq!(buffer[..5], [0x1a, 0x03, 0x00, 0x19, 0x2a][..]);

    // Reads go through the bound storage.
    let result = table.access(3, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 1 }));
    assert_eq!(buffer[0], 61);

    // Writes too.
    assert_eq!(
        table.access(3, AccessArgs::Write { data: &[59] }),
        Some(AccessResult::Success { len: 1 })
    );
    assert_eq!(table.get(&characteristic, |value| value[0]), Ok(59));

    // Local updates are visible to the next read.
    table.set(&characteristic, &[17]).unwrap();
    let result = table.access(3, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 1 }));
    assert_eq!(buffer[0], 17);

    // Length mismatches and unknown handles are rejected.
    assert_eq!(
        table.set(&characteristic, &[1, 2]),
        Err(Error::UnexpectedDataLength { expected: 1, actual: 2 })
    );
    let missing = table.find_characteristic_by_value_handle(9);
    assert_eq!(missing, Err(Error::NotFound));
    assert_eq!(table.access(9, AccessArgs::Write { data: &[0] }), None);

    let found = table.find_characteristic_by_value_handle(3).unwrap();
    assert_eq!(found, characteristic);
}

#[test]
fn second_service_group_entry_starts_where_the_first_ends() {
    const SECOND_SERVICE: u128 = 0xF00DBEEF_0001_4000_8000_00805F9B34FB;
    let mut storage = [[0u8; 2]; 8];
    let mut table: AttributeTable<'_, NoopRawMutex, 24> = AttributeTable::new();

    let mut chunks = storage.iter_mut();
    {
        let mut first = table.add_service(Service::new(0x1800u16));
        for uuid in [0x2a00u16, 0x2a01, 0x2a02, 0x2a03, 0x2a04] {
            first
                .add_characteristic(uuid, [CharacteristicProp::Read], chunks.next().unwrap())
                .build();
        }
    }
    {
        let mut second = table.add_service(Service::new(SECOND_SERVICE));
        for uuid in [0x0815u16, 0x0816, 0x0817] {
            second
                .add_characteristic(uuid, [CharacteristicProp::Read], chunks.next().unwrap())
                .build();
        }
    }

    // 1 + 5 * 2 attributes, then 1 + 3 * 2.
    assert_eq!(table.number_of_attributes(), 18);

    let mut dest = [0u8; 20];
    let len = table.read_primary_service_response(12, true, &mut dest);
    assert_eq!(len, 20);
    assert_eq!(dest[..4], [0x0c, 0x00, 0x12, 0x00][..]);
    assert_eq!(u128::from_le_bytes(dest[4..20].try_into().unwrap()), SECOND_SERVICE);

    // The scan skips services of the wrong uuid width.
    let len = table.read_primary_service_response(1, true, &mut dest);
    assert_eq!(len, 20);
    assert_eq!(dest[..4], [0x0c, 0x00, 0x12, 0x00][..]);

    // One byte short takes nothing.
    let mut short = [0u8; 19];
    assert_eq!(table.read_primary_service_response(12, true, &mut short), 0);
    assert_eq!(short, [0u8; 19]);

    // The first group ends right before the second begins.
    let len = table.read_primary_service_response(1, false, &mut dest);
    assert_eq!(len, 6);
    assert_eq!(dest[..6], [0x01, 0x00, 0x0b, 0x00, 0x00, 0x18][..]);
    assert_eq!(table.read_primary_service_response(13, false, &mut dest), 0);
}

#[test]
fn client_configs_survive_a_park_and_resume() {
    let mut heart_rate = [0u8; 2];
    let mut alert = [0u8; 2];
    let mut table: AttributeTable<'_, NoopRawMutex, 16> = AttributeTable::new();
    let (hr, al) = {
        let mut service = table.add_service(Service::new(0x180du16));
        let hr = service
            .add_characteristic(0x2a37u16, [CharacteristicProp::Notify], &mut heart_rate)
            .build();
        let al = service
            .add_characteristic(0x2a46u16, [CharacteristicProp::Notify, CharacteristicProp::Indicate], &mut alert)
            .build();
        (hr, al)
    };
    let hr_cccd = hr.cccd_handle.unwrap();
    let al_cccd = al.cccd_handle.unwrap();
    assert_eq!(table.number_of_client_configs(), 2);

    // Client subscribes to notifications on one, indications on the other.
    assert_eq!(
        table.access(hr_cccd, AccessArgs::Write { data: &[0x01, 0x00] }),
        Some(AccessResult::Success { len: 2 })
    );
    assert_eq!(
        table.access(al_cccd, AccessArgs::Write { data: &[0x02, 0x00] }),
        Some(AccessResult::Success { len: 2 })
    );

    let saved: ClientConfigs<2> = table.snapshot_client_configs();
    assert!(saved.get(hr_cccd).unwrap().notifications_enabled());
    assert!(saved.get(al_cccd).unwrap().indications_enabled());

    // A different client connects with everything off.
    table.restore_client_configs(&ClientConfigs::<2>::default());
    let mut buffer = [0u8; 2];
    let result = table.access(hr_cccd, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 2 }));
    assert_eq!(buffer, [0x00, 0x00]);

    // The first client comes back.
    table.restore_client_configs(&saved);
    let result = table.access(hr_cccd, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 2 }));
    assert_eq!(buffer, [0x01, 0x00]);
    let result = table.access(al_cccd, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 2 }));
    assert_eq!(buffer, [0x02, 0x00]);
}

#[test]
fn descriptors_follow_their_characteristic() {
    let mut measurement = [0u8; 2];
    let mut table: AttributeTable<'_, NoopRawMutex, 16> = AttributeTable::new();
    let (characteristic, description, format) = {
        let mut service = table.add_service(Service::new(0x1809u16));
        let mut builder = service.add_characteristic(
            0x2a1cu16,
            [CharacteristicProp::Read, CharacteristicProp::Indicate],
            &mut measurement,
        );
        let description = builder.add_user_description("Temperature");
        let format = builder.add_presentation_format(PresentationFormat {
            format: 0x0e,
            exponent: -1,
            unit: 0x272f,
            name_space: 0x01,
            description: 0x0000,
        });
        (builder.build(), description, format)
    };

    // Declaration 2, value 3, cccd 4, then the explicit descriptors.
    assert_eq!(characteristic.handle, 3);
    assert_eq!(characteristic.cccd_handle, Some(4));
    assert_eq!(description.handle, 5);
    assert_eq!(format.handle, 6);
    assert_eq!(table.number_of_attributes(), 6);

    let mut buffer = [0u8; 16];
    let result = table.access(5, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 11 }));
    assert_eq!(&buffer[..11], b"Temperature");
    assert_eq!(
        table.access(5, AccessArgs::Write { data: b"x" }),
        Some(AccessResult::WriteNotPermitted)
    );

    let result = table.access(6, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 7 }));
    assert_eq!(buffer[..7], [0x0e, 0xff, 0x2f, 0x27, 0x01, 0x00, 0x00][..]);
}

#[test]
fn read_only_characteristics_reject_writes() {
    let mut table: AttributeTable<'_, NoopRawMutex, 8> = AttributeTable::new();
    let characteristic = {
        let mut service = table.add_service(Service::new(0x180au16));
        service
            .add_characteristic_ro(0x2a29u16, b"ACME Sensors")
            .build()
    };

    let mut buffer = [0u8; 16];
    let result = table.access(characteristic.handle, AccessArgs::Read { offset: 5, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 7 }));
    assert_eq!(&buffer[..7], b"Sensors");

    assert_eq!(
        table.access(characteristic.handle, AccessArgs::Write { data: b"oops" }),
        Some(AccessResult::WriteNotPermitted)
    );
    assert_eq!(
        table.set(&characteristic, b"replacement!"),
        Err(Error::NotFound)
    );
    assert_eq!(table.get(&characteristic, |value| value.len()), Ok(12));
}

#[test]
fn aggregate_and_configuration_descriptors() {
    let aggregate_of = [4u16, 7];
    let mut first_value = [0u8; 2];
    let mut second_value = [0u8; 2];
    let mut scratch = [0u8; 4];
    let mut table: AttributeTable<'_, NoopRawMutex, 16> = AttributeTable::new();
    {
        let mut service = table.add_service(Service::new(0x1815u16));

        let mut first = service.add_characteristic(0x2a58u16, [CharacteristicProp::Read], &mut first_value);
        let first_format = first.add_presentation_format(PresentationFormat {
            format: 0x0e,
            exponent: 0,
            unit: 0x2700,
            name_space: 0x01,
            description: 0x0001,
        });
        first.build();

        let mut second = service.add_characteristic(0x2a58u16, [CharacteristicProp::Read], &mut second_value);
        let second_format = second.add_presentation_format(PresentationFormat {
            format: 0x0e,
            exponent: 0,
            unit: 0x2700,
            name_space: 0x01,
            description: 0x0002,
        });
        let aggregate = second.add_aggregate_format(&aggregate_of);
        let server_config = second.add_server_config();
        let extended = second.add_extended_properties(0x0001);
        let generic = second.add_descriptor(
            0xf508u16,
            [CharacteristicProp::Read, CharacteristicProp::Write],
            &mut scratch,
        );
        let fixed = second.add_descriptor_ro(0xf509u16, &[7, 8, 9]);
        second.build();

        assert_eq!(first_format.handle, 4);
        assert_eq!(second_format.handle, 7);
        assert_eq!(aggregate.handle, 8);
        assert_eq!(server_config.handle, 9);
        assert_eq!(extended.handle, 10);
        assert_eq!(generic.handle, 11);
        assert_eq!(fixed.handle, 12);
    }
    assert_eq!(table.number_of_attributes(), 12);

    // The aggregate lists both presentation format handles.
    let mut buffer = [0u8; 4];
    let result = table.access(8, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 4 }));
    assert_eq!(buffer, [0x04, 0x00, 0x07, 0x00]);

    // Server configuration is client-writable state.
    assert_eq!(
        table.access(9, AccessArgs::Write { data: &[0x01, 0x00] }),
        Some(AccessResult::Success { len: 2 })
    );
    let result = table.access(9, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 2 }));
    assert_eq!(buffer[..2], [0x01, 0x00][..]);

    // Extended properties are fixed.
    let result = table.access(10, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 2 }));
    assert_eq!(buffer[..2], [0x01, 0x00][..]);
    assert_eq!(
        table.access(10, AccessArgs::Write { data: &[0, 0] }),
        Some(AccessResult::WriteNotPermitted)
    );

    // Generic descriptors behave like values.
    assert_eq!(
        table.access(11, AccessArgs::Write { data: &[1, 2, 3, 4] }),
        Some(AccessResult::Success { len: 4 })
    );
    let result = table.access(11, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 4 }));
    assert_eq!(buffer, [1, 2, 3, 4]);

    let result = table.access(12, AccessArgs::Read { offset: 0, buffer: &mut buffer });
    assert_eq!(result, Some(AccessResult::Success { len: 3 }));
    assert_eq!(buffer[..3], [7, 8, 9][..]);
    assert_eq!(
        table.access(12, AccessArgs::Write { data: &[0] }),
        Some(AccessResult::WriteNotPermitted)
    );
}
