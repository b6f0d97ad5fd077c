use uuid::Uuid;

const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

pub(crate) const HEART_RATE_MEASUREMENT: Uuid = sig_uuid(0x2a37);
pub(crate) const BATTERY_LEVEL: Uuid = sig_uuid(0x2a19);

pub(crate) const MANUFACTURER_NAME: Uuid = sig_uuid(0x2a29);
pub(crate) const MODEL_NUMBER: Uuid = sig_uuid(0x2a24);
pub(crate) const SERIAL_NUMBER: Uuid = sig_uuid(0x2a25);
pub(crate) const HARDWARE_REVISION: Uuid = sig_uuid(0x2a27);
pub(crate) const FIRMWARE_REVISION: Uuid = sig_uuid(0x2a26);
pub(crate) const SOFTWARE_REVISION: Uuid = sig_uuid(0x2a28);

/// Device Information Service string characteristics, in reporting order.
pub(crate) const DEVICE_INFORMATION: [Uuid; 6] = [
    MANUFACTURER_NAME,
    MODEL_NUMBER,
    SERIAL_NUMBER,
    HARDWARE_REVISION,
    FIRMWARE_REVISION,
    SOFTWARE_REVISION,
];
