use super::Printer;

use std::time::Duration;

/// A USB session with one bulk OUT and one bulk IN endpoint.
/// The media query only talks to the printer through this.
pub trait Transport {
    fn write_out(&self, data: &[u8], timeout: Duration) -> Result<usize, rusb::Error>;

    fn read_in(&self, data: &mut [u8], timeout: Duration) -> Result<usize, rusb::Error>;
}

impl Transport for Printer {
    fn write_out(&self, data: &[u8], timeout: Duration) -> Result<usize, rusb::Error> {
        self.handle.write_bulk(self.out_addr, data, timeout)
    }

    fn read_in(&self, data: &mut [u8], timeout: Duration) -> Result<usize, rusb::Error> {
        self.handle.read_bulk(self.in_addr, data, timeout)
    }
}
