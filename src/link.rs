//! The `LinkEndpoint` abstraction: exact-length bulk read, bulk write, close.
//! Physical USB enumeration and transfer live in [`crate::usb`]; this trait is
//! what the transport actually talks to, so tests can swap in an in-memory fake.

use crate::error::LinkError;

/// A bidirectional bulk-transfer endpoint. Implementations own whatever
/// handle (USB device, socket, pipe) backs the link.
///
/// Methods take `&self`, not `&mut self`: a real device exposes independent
/// IN/OUT bulk endpoints, so a blocking read must never stand in the way of
/// a concurrent write (the router thread is typically blocked in `read`
/// while a caller thread wants to `write` a new `OPEN` or `WRTE`). Any
/// mutable state an implementation needs is its own business.
pub trait LinkEndpoint: Send + Sync {
    /// Reads up to `len` bytes. Returns a non-empty vector on success.
    fn read(&self, len: usize) -> Result<Vec<u8>, LinkError>;

    /// Writes all of `data`, or fails.
    fn write(&self, data: &[u8]) -> Result<(), LinkError>;

    /// Closes the link. Idempotent.
    fn close(&self);
}
