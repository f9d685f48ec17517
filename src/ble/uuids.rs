//! BLE Service and Characteristic UUIDs.
//!
//! Contains the UUID constants used for SBrick remote control.

use uuid::Uuid;

/// SBrick Remote Control Service UUID.
pub const REMOTE_CONTROL_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x4dc5_91b0_857c_41de_b5f1_15abda665b0c);

/// Remote Control Commands characteristic UUID (Write).
pub const REMOTE_CONTROL_COMMANDS_UUID: Uuid =
    Uuid::from_u128(0x02b8_cbcc_0e25_4bda_8790_a15f53e6010f);

/// Local name advertised by SBrick devices.
pub const SBRICK_LOCAL_NAME: &str = "SBrick";

/// Check if a service UUID is the SBrick remote control service.
pub fn is_remote_control_service(uuid: &Uuid) -> bool {
    *uuid == REMOTE_CONTROL_SERVICE_UUID
}
