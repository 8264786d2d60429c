use rusb::{DeviceHandle, GlobalContext};

/// Device IDs, the media command and the timing of the exchange.
mod config;
pub use config::{media_command, QueryConfig, COMMAND_LEN, DNP_VENDOR_ID, QW410_PRODUCT_ID};

/// Search the list of available USB devices, find the DNP printer, attach it and perform IO.
mod attach;
pub use attach::{DetachOutcome, Error as AttachError};

/// A USB session with the bulk endpoints that the media query talks through.
mod io;
pub use io::Transport;

/// The printer answers with loosely formatted ASCII that has to be parsed defensively.
mod response;
pub use response::{filter_printable, parse_quantity, Error as ParseError, QUANTITY_MARKER};

/// Ask the printer how many prints are left on the installed media.
mod media;
pub use media::{query_media, Error as QueryError, MediaReport, ReadChunk};

pub struct Printer {
    handle: DeviceHandle<GlobalContext>,
    interface: u8,
    in_addr: u8,
    out_addr: u8,
    detach: DetachOutcome,
    reattach_kernel_driver: bool,
}

impl Printer {
    /// Send the media command to this printer and read the answer.
    pub fn query_media(&self, config: &QueryConfig) -> Result<MediaReport, QueryError> {
        query_media(self, config)
    }
}
