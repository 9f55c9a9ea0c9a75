//! Owns one `LinkEndpoint`; drives the CONNECT/AUTH handshake and frames
//! inbound/outbound traffic. Grounded on `py_adb.adb_commands.AdbUsbClient`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::codec::{self, Frame, Tag};
use crate::error::{AdbError, AuthError, LinkError, ProtocolError};
use crate::link::LinkEndpoint;
use crate::signer::Signer;

const VERSION: u32 = 0x0100_0000;
const DEFAULT_MAX_PAYLOAD: u32 = 4096;

const AUTH_TOKEN: u32 = 1;
const AUTH_SIGNATURE: u32 = 2;
const AUTH_RSAPUBLICKEY: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
enum TransportState {
    Fresh,
    Connected(Vec<u8>),
    Closed,
}

/// One connection to one device, multiplexing many logical streams.
///
/// `link` is read without any lock held across the blocking call: a real
/// device's bulk-IN endpoint is independent of bulk-OUT, and the router
/// thread spends most of its life blocked in a read. `write_lock` only
/// serializes the header+payload pair of one `send`, so two frames from
/// different threads never interleave on the wire.
pub struct Transport {
    link: Box<dyn LinkEndpoint>,
    write_lock: Mutex<()>,
    state: Mutex<TransportState>,
    max_payload: AtomicU32,
    host_banner: Vec<u8>,
}

fn host_banner() -> Vec<u8> {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    let mut banner = format!("host::{host}").into_bytes();
    banner.push(0);
    banner
}

impl Transport {
    pub fn new(link: Box<dyn LinkEndpoint>) -> Self {
        Self {
            link,
            write_lock: Mutex::new(()),
            state: Mutex::new(TransportState::Fresh),
            max_payload: AtomicU32::new(DEFAULT_MAX_PAYLOAD),
            host_banner: host_banner(),
        }
    }

    pub fn max_payload(&self) -> u32 {
        self.max_payload.load(Ordering::Acquire)
    }

    /// Writes a frame's header then its payload as two link writes. The
    /// payload write always happens, even when empty, mirroring the device's
    /// own framing. Serialized against other senders so two frames never
    /// interleave; never blocks a concurrent reader.
    pub fn send(&self, frame: &Frame) -> Result<(), AdbError> {
        debug!("sending {:?} arg0={} arg1={} len={}", frame.tag, frame.arg0, frame.arg1, frame.payload.len());
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        self.link.write(&frame.pack_header()).map_err(AdbError::from)?;
        self.link.write(&frame.payload).map_err(AdbError::from)?;
        Ok(())
    }

    fn read_exact(&self, len: usize) -> Result<Vec<u8>, LinkError> {
        let mut buf = Vec::with_capacity(len);
        while buf.len() < len {
            let chunk = self.link.read(len - buf.len())?;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    /// Reads one complete frame off the wire, auto-acking inbound `WRTE`
    /// before returning it to the caller.
    pub fn read_frame(&self) -> Result<Frame, AdbError> {
        let header = self.read_exact(codec::HEADER_LEN)?;
        let unpacked = codec::unpack_header(&header)?;
        let payload = if unpacked.data_len > 0 {
            let data = self.read_exact(unpacked.data_len as usize)?;
            codec::verify(&data, unpacked.checksum)?;
            data
        } else {
            Vec::new()
        };
        let frame = Frame::new(unpacked.tag, unpacked.arg0, unpacked.arg1, payload);
        if frame.tag == Tag::Wrte {
            let ack = Frame::new(Tag::Okay, frame.arg1, frame.arg0, Vec::new());
            self.send(&ack)?;
        }
        Ok(frame)
    }

    /// Drives the CONNECT handshake, falling back to AUTH with the given
    /// signers if the device demands authentication. Returns the device banner.
    pub fn connect(&self, signers: &[Box<dyn Signer>]) -> Result<Vec<u8>, AdbError> {
        info!("starting connect()");
        self.send(&Frame::new(Tag::Cnxn, VERSION, DEFAULT_MAX_PAYLOAD, self.host_banner.clone()))?;
        let reply = self.read_until(&[Tag::Cnxn, Tag::Auth])?;
        let banner = match reply.tag {
            Tag::Cnxn => {
                self.max_payload.store(reply.arg1, Ordering::Release);
                reply.payload
            }
            Tag::Auth => self.auth(reply, signers)?,
            _ => unreachable!("read_until only returns requested tags"),
        };
        *self.state.lock().expect("state mutex poisoned") = TransportState::Connected(banner.clone());
        info!("connected: {:?}", String::from_utf8_lossy(&banner));
        Ok(banner)
    }

    fn auth(&self, mut auth_frame: Frame, signers: &[Box<dyn Signer>]) -> Result<Vec<u8>, AdbError> {
        if signers.is_empty() {
            return Err(AuthError::NoSigners.into());
        }
        debug!("starting auth()");
        for signer in signers {
            if auth_frame.arg0 != AUTH_TOKEN {
                return Err(ProtocolError::BadAuthStep { expected: AUTH_TOKEN, got: auth_frame.arg0 }.into());
            }
            let signature = signer.sign(&auth_frame.payload);
            self.send(&Frame::new(Tag::Auth, AUTH_SIGNATURE, 0, signature))?;
            let reply = self.read_until(&[Tag::Cnxn, Tag::Auth])?;
            match reply.tag {
                Tag::Cnxn => {
                    self.max_payload.store(reply.arg1, Ordering::Release);
                    return Ok(reply.payload);
                }
                Tag::Auth => auth_frame = reply,
                _ => unreachable!(),
            }
        }

        warn!("all signers rejected, falling back to RSA public key");
        let mut pubkey = signers[0].public_key();
        pubkey.push(0);
        self.send(&Frame::new(Tag::Auth, AUTH_RSAPUBLICKEY, 0, pubkey))?;
        match self.read_until(&[Tag::Cnxn]) {
            Ok(reply) => {
                self.max_payload.store(reply.arg1, Ordering::Release);
                Ok(reply.payload)
            }
            Err(AdbError::Link(LinkError::Timeout)) => Err(AuthError::UserApprovalRequired.into()),
            Err(e) => Err(e),
        }
    }

    fn read_until(&self, tags: &[Tag]) -> Result<Frame, AdbError> {
        loop {
            let frame = self.read_frame()?;
            if tags.contains(&frame.tag) {
                return Ok(frame);
            }
            warn!("discarding unexpected {:?} while waiting for {:?}", frame.tag, tags);
        }
    }

    pub fn close(&self) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if *state == TransportState::Closed {
            return;
        }
        self.link.close();
        *state = TransportState::Closed;
    }
}
