//! Device link: reliable command/acknowledgement channel to the
//! input-injection device.

pub mod link;
pub mod transport;

pub use link::DeviceLink;
pub use transport::{SerialTransport, Transport};
