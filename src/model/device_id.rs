use std::fmt;

/// Identifies one physical token as enumerated by the device factory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub transport: String,
    pub index: u32,
}

impl DeviceId {
    pub fn new(transport: impl Into<String>, index: u32) -> Self {
        Self {
            transport: transport.into(),
            index,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transport, self.index)
    }
}
