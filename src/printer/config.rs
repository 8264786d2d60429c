use std::time::Duration;

/// USB Vendor ID for Dai Nippon Printing
pub const DNP_VENDOR_ID: u16 = 0x1452;

/// USB Product ID for the DNP QW410
pub const QW410_PRODUCT_ID: u16 = 0x9201;

/// The media command is always padded to this length.
pub const COMMAND_LEN: usize = 32;

/// Build the "installed media quantity" info command.
pub fn media_command() -> Vec<u8> {
    let mut command = Vec::with_capacity(COMMAND_LEN);
    command.push(0x1b);
    command.extend_from_slice(b"PINFO  MQTY");
    command.resize(COMMAND_LEN, b' ');
    command
}

/// Everything a single media query needs to know about the device and the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
    pub command: Vec<u8>,

    /// Pause between writing the command and reading the answer.
    pub settle_delay: Duration,
    pub read_attempts: usize,
    pub read_size: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,

    /// Pause between two successful reads.
    pub read_pause: Duration,

    /// Give the interface back to the kernel driver when the printer is dropped.
    pub reattach_kernel_driver: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            vendor_id: DNP_VENDOR_ID,
            product_id: QW410_PRODUCT_ID,
            interface: 0,
            command: media_command(),
            settle_delay: Duration::from_secs(1),
            read_attempts: 3,
            read_size: 64,
            read_timeout: Duration::from_millis(1000),
            write_timeout: Duration::from_millis(1000),
            read_pause: Duration::from_millis(100),
            reattach_kernel_driver: true,
        }
    }
}
