//! Host-side ADB transport over USB: framing, the CONNECT/AUTH handshake,
//! and a router that multiplexes many logical streams over one device link.
//!
//! Physical USB I/O and RSA signing are external collaborators behind the
//! [`LinkEndpoint`] and [`Signer`] traits; [`usb::UsbLink`] and
//! [`signer::RsaAdbSigner`] are the concrete implementations a real caller
//! wires up, gated behind the `usb-link`/`rsa-signer` features.

pub mod codec;
pub mod config;
pub mod error;
pub mod link;
pub mod router;
pub mod session;
pub mod signer;
pub mod stream;
pub mod transport;
#[cfg(feature = "usb-link")]
pub mod usb;
pub mod util;

pub use codec::{Frame, Tag};
pub use error::{AdbError, AuthError, LinkError, ProtocolError, Result, StreamError, UsageError};
pub use link::LinkEndpoint;
pub use session::{LinkFactory, SessionManager};
pub use signer::Signer;
pub use stream::{Chunk, Stream};
pub use transport::Transport;
