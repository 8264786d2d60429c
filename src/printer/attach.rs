use super::{Printer, QueryConfig};

use std::fmt::Display;

use log::{debug, info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    USBError(rusb::Error),
    NoPrinter { vendor_id: u16, product_id: u16 },
    ConfigurationFailed(rusb::Error),
    NoInterface(u8),
    NoInterfaceDescriptor(u8),
    NoInEndpoint,
    NoOutEndpoint,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Error::*;

        match self {
            USBError(inner) => write!(f, "An USB error has occurred: {}", inner),
            NoPrinter {
                vendor_id,
                product_id,
            } => write!(
                f,
                "No printer has been found ({:04x}:{:04x}).",
                vendor_id, product_id
            ),
            ConfigurationFailed(inner) => {
                write!(f, "Failed to set the USB configuration: {}", inner)
            }
            NoInterface(number) => write!(
                f,
                "The USB device for the printer offers no interface {}.",
                number
            ),
            NoInterfaceDescriptor(number) => write!(
                f,
                "The USB interface {} for the printer offers no default alternate setting.",
                number
            ),
            NoInEndpoint => write!(
                f,
                "The USB interface for the printer offers no bulk input endpoint. Try unplugging/replugging the printer or check permissions."
            ),
            NoOutEndpoint => write!(
                f,
                "The USB interface for the printer offers no bulk output endpoint. Try unplugging/replugging the printer or check permissions."
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<rusb::Error> for Error {
    fn from(err: rusb::Error) -> Self {
        Error::USBError(err)
    }
}

/// What happened to the kernel driver on the printer interface.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DetachOutcome {
    AlreadyFree,
    Detached,
    DetachFailed(rusb::Error),
}

fn select_device(
    vendor_id: u16,
    product_id: u16,
) -> Result<Option<rusb::Device<rusb::GlobalContext>>, rusb::Error> {
    let devices = rusb::DeviceList::new()?;
    let mut matching = devices.iter().filter(|device| {
        // Skip devices where the descriptor cannot be read.
        device.device_descriptor().map_or(false, |desc| {
            desc.vendor_id() == vendor_id && desc.product_id() == product_id
        })
    });

    let device = matching.next();

    for other in matching {
        info!(
            "Ignoring another matching printer on bus {:03} device {:03}.",
            other.bus_number(),
            other.address()
        );
    }

    Ok(device)
}

/// The kernel driver and interface calls made on an opened printer.
trait Session {
    fn kernel_driver_active(&self, interface: u8) -> Result<bool, rusb::Error>;

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), rusb::Error>;

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<(), rusb::Error>;

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;
}

impl Session for rusb::DeviceHandle<rusb::GlobalContext> {
    fn kernel_driver_active(&self, interface: u8) -> Result<bool, rusb::Error> {
        rusb::DeviceHandle::kernel_driver_active(self, interface)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), rusb::Error> {
        rusb::DeviceHandle::detach_kernel_driver(self, interface)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<(), rusb::Error> {
        rusb::DeviceHandle::attach_kernel_driver(self, interface)
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        rusb::DeviceHandle::release_interface(self, interface)
    }
}

fn detach_kernel_driver<S: Session>(session: &mut S, interface: u8) -> DetachOutcome {
    match session.kernel_driver_active(interface) {
        Ok(false) => DetachOutcome::AlreadyFree,
        Ok(true) => {
            info!("Detaching kernel driver...");

            match session.detach_kernel_driver(interface) {
                Ok(()) => DetachOutcome::Detached,
                Err(err) => DetachOutcome::DetachFailed(err),
            }
        }
        Err(err) => DetachOutcome::DetachFailed(err),
    }
}

/// Only a driver we detached ourselves is handed back.
fn reattach_wanted(detach: DetachOutcome, reattach_kernel_driver: bool) -> bool {
    detach == DetachOutcome::Detached && reattach_kernel_driver
}

/// Free the interface from the kernel driver, then run `configure`.
/// A failed detach is only logged. If `configure` fails, the session is restored.
fn establish<S, F>(
    session: &mut S,
    interface: u8,
    reattach_kernel_driver: bool,
    configure: F,
) -> Result<(DetachOutcome, (u8, u8)), Error>
where
    S: Session,
    F: FnOnce(&mut S) -> Result<(u8, u8), Error>,
{
    // If the driver keeps the interface, claiming it in `configure` fails.
    let detach = detach_kernel_driver(session, interface);

    if let DetachOutcome::DetachFailed(err) = detach {
        warn!("Could not detach kernel driver: {}", err);
    }

    match configure(&mut *session) {
        Ok(addrs) => Ok((detach, addrs)),
        Err(err) => {
            restore(session, interface, detach, reattach_kernel_driver);
            Err(err)
        }
    }
}

fn select_endpoints(
    device: &rusb::Device<rusb::GlobalContext>,
    interface_number: u8,
) -> Result<(u8, u8), Error> {
    let config_desc = device.active_config_descriptor()?;

    let interface = config_desc
        .interfaces()
        .find(|interface| interface.number() == interface_number)
        .ok_or(Error::NoInterface(interface_number))?;

    // Alternate setting 0 is the one active after set_configuration.
    let interface_desc = interface
        .descriptors()
        .find(|desc| desc.setting_number() == 0)
        .ok_or(Error::NoInterfaceDescriptor(interface_number))?;

    // Walk the endpoints provided by the interface to find input and output.
    // We are only interested in bulk endpoints. The first one of each direction wins.
    let (mut in_addr, mut out_addr) = (None, None);

    for endpoint_desc in interface_desc
        .endpoint_descriptors()
        .filter(|desc| desc.transfer_type() == rusb::TransferType::Bulk)
    {
        match endpoint_desc.direction() {
            rusb::Direction::In => {
                in_addr.get_or_insert(endpoint_desc.address());
            }
            rusb::Direction::Out => {
                out_addr.get_or_insert(endpoint_desc.address());
            }
        }
    }

    Ok((
        in_addr.ok_or(Error::NoInEndpoint)?,
        out_addr.ok_or(Error::NoOutEndpoint)?,
    ))
}

impl Printer {
    /// Try to find and attach the printer described by `config`.
    pub fn attach(config: &QueryConfig) -> Result<Self, Error> {
        info!(
            "Searching for printer {:04x}:{:04x}...",
            config.vendor_id, config.product_id
        );

        let device = select_device(config.vendor_id, config.product_id)?.ok_or(
            Error::NoPrinter {
                vendor_id: config.vendor_id,
                product_id: config.product_id,
            },
        )?;

        debug!(
            "Found printer on bus {:03} device {:03}.",
            device.bus_number(),
            device.address()
        );

        let mut handle = device.open()?;
        let interface = config.interface;

        let (detach, (in_addr, out_addr)) = establish(
            &mut handle,
            interface,
            config.reattach_kernel_driver,
            |handle| configure(&device, handle, interface),
        )?;

        Ok(Printer {
            handle,
            interface,
            in_addr,
            out_addr,
            detach,
            reattach_kernel_driver: config.reattach_kernel_driver,
        })
    }

    pub fn detach_outcome(&self) -> DetachOutcome {
        self.detach
    }
}

/// Activate the configuration, resolve the endpoints and claim the interface.
fn configure(
    device: &rusb::Device<rusb::GlobalContext>,
    handle: &mut rusb::DeviceHandle<rusb::GlobalContext>,
    interface: u8,
) -> Result<(u8, u8), Error> {
    // Select the first configuration, like a freshly plugged device would.
    let config_number = device
        .config_descriptor(0)
        .map_err(Error::ConfigurationFailed)?
        .number();

    handle
        .set_active_configuration(config_number)
        .map_err(Error::ConfigurationFailed)?;

    let (in_addr, out_addr) = select_endpoints(device, interface)?;
    debug!(
        "Using bulk endpoints in {:#04x}, out {:#04x}.",
        in_addr, out_addr
    );

    handle.claim_interface(interface)?;

    Ok((in_addr, out_addr))
}

/// Release the interface and hand it back to the kernel driver we took it from.
fn restore<S: Session>(
    session: &mut S,
    interface: u8,
    detach: DetachOutcome,
    reattach_kernel_driver: bool,
) {
    if let Err(err) = session.release_interface(interface) {
        debug!("Failed to release interface {}: {}", interface, err);
    }

    if reattach_wanted(detach, reattach_kernel_driver) {
        match session.attach_kernel_driver(interface) {
            Ok(()) => debug!("Reattached kernel driver."),
            Err(err) => warn!("Could not reattach kernel driver: {}", err),
        }
    } else if detach == DetachOutcome::Detached {
        info!("Leaving the kernel driver detached.");
    }
}

impl Drop for Printer {
    fn drop(&mut self) {
        restore(
            &mut self.handle,
            self.interface,
            self.detach,
            self.reattach_kernel_driver,
        );
    }
}
