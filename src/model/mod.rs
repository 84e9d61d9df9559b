mod challenge;
mod device_id;
mod mode;
mod status;

pub use challenge::{sha256, Challenge, KeyHandle};
pub use device_id::DeviceId;
pub use mode::SignMode;
pub use status::{HexCode, StatusCode, StatusParseError};
