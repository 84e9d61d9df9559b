use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Status reported by a security token or its transport.
///
/// Positive values are ISO 7816 status words returned by the token itself;
/// negative values originate in the transport layer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    #[error("ok")]
    Ok,

    #[error("wrong length")]
    WrongLength,

    #[error("invalid data")]
    InvalidData,

    /// User presence is required before the token will answer.
    #[error("waiting for touch")]
    WaitTouch,

    /// The key handle or app id does not belong to this token.
    #[error("wrong data")]
    WrongData,

    #[error("device timed out")]
    Timeout,

    #[error("device busy")]
    Busy,

    #[error("device gone")]
    Gone,

    #[error("device status {0:#x}")]
    Other(i32),
}

impl StatusCode {
    pub const OK: i32 = 0x0000;
    pub const WRONG_LENGTH: i32 = 0x6700;
    pub const INVALID_DATA: i32 = 0x6984;
    pub const WAIT_TOUCH: i32 = 0x6985;
    pub const WRONG_DATA: i32 = 0x6a80;
    pub const TIMEOUT: i32 = -5;
    pub const BUSY: i32 = -6;
    pub const GONE: i32 = -8;

    pub fn from_code(code: i32) -> Self {
        match code {
            Self::OK => Self::Ok,
            Self::WRONG_LENGTH => Self::WrongLength,
            Self::INVALID_DATA => Self::InvalidData,
            Self::WAIT_TOUCH => Self::WaitTouch,
            Self::WRONG_DATA => Self::WrongData,
            Self::TIMEOUT => Self::Timeout,
            Self::BUSY => Self::Busy,
            Self::GONE => Self::Gone,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Ok => Self::OK,
            Self::WrongLength => Self::WRONG_LENGTH,
            Self::InvalidData => Self::INVALID_DATA,
            Self::WaitTouch => Self::WAIT_TOUCH,
            Self::WrongData => Self::WRONG_DATA,
            Self::Timeout => Self::TIMEOUT,
            Self::Busy => Self::BUSY,
            Self::Gone => Self::GONE,
            Self::Other(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

impl From<StatusCode> for i32 {
    fn from(status: StatusCode) -> Self {
        status.code()
    }
}

/// Hex rendering of the raw code, as tokens and their logs print it.
pub struct HexCode(pub StatusCode);

impl fmt::Display for HexCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.0.code();
        if code < 0 {
            write!(f, "-{:#x}", code.unsigned_abs())
        } else {
            write!(f, "{:#06x}", code)
        }
    }
}

impl FromStr for StatusCode {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let named = match s.trim().to_ascii_lowercase().as_str() {
            "ok" => Some(Self::Ok),
            "wrong-length" => Some(Self::WrongLength),
            "invalid-data" => Some(Self::InvalidData),
            "touch" | "wait-touch" => Some(Self::WaitTouch),
            "wrong-data" => Some(Self::WrongData),
            "timeout" => Some(Self::Timeout),
            "busy" => Some(Self::Busy),
            "gone" => Some(Self::Gone),
            _ => None,
        };
        if let Some(status) = named {
            return Ok(status);
        }

        let literal = s.trim();
        let parsed = match literal.strip_prefix("0x") {
            Some(hex) => i32::from_str_radix(hex, 16),
            None => literal.parse::<i32>(),
        };
        parsed
            .map(Self::from_code)
            .map_err(|_| StatusParseError::Unknown {
                input: s.to_string(),
            })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusParseError {
    #[error("unknown device status: {input}")]
    Unknown { input: String },
}
