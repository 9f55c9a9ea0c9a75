//! End-to-end scenarios S1-S6 against a simulated link, per the core's
//! testable properties: connect without auth, auth with a good key, auth
//! fallback to the RSA public key (both user-approves and user-times-out),
//! two interleaved streams, and a fatal checksum mismatch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use adb_transport::codec::{Frame, Tag};
use adb_transport::error::{AdbError, AuthError, LinkError};
use adb_transport::session::{LinkFactory, SessionManager};
use adb_transport::signer::Signer;
use adb_transport::stream::Chunk;
use adb_transport::{LinkEndpoint, Transport};

/// An in-memory `LinkEndpoint`: inbound bytes are supplied up front (or
/// pushed from the test thread), outbound writes are captured for assertion.
#[derive(Clone)]
struct FakeLink {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound: Arc<Mutex<Vec<u8>>>,
    out_of_data_is_timeout: Arc<AtomicBool>,
}

impl FakeLink {
    fn new(script: Vec<u8>) -> Self {
        Self {
            inbound: Arc::new(Mutex::new(script.into())),
            outbound: Arc::new(Mutex::new(Vec::new())),
            out_of_data_is_timeout: Arc::new(AtomicBool::new(true)),
        }
    }

    fn outbound_frames(&self) -> Vec<Frame> {
        parse_frames(&self.outbound.lock().unwrap())
    }

    /// Appends bytes to what `read` will hand out next, as a real device
    /// would push a reply onto the wire after observing our request.
    fn push_inbound(&self, bytes: &[u8]) {
        self.inbound.lock().unwrap().extend(bytes.iter().copied());
    }

    /// While there is nothing queued, block (polling) instead of returning
    /// `Timeout` immediately, so a writer on another thread has time to push
    /// a reply before the router gives up.
    fn block_when_empty(&self) {
        self.out_of_data_is_timeout.store(false, Ordering::Release);
    }
}

impl LinkEndpoint for FakeLink {
    fn read(&self, len: usize) -> Result<Vec<u8>, LinkError> {
        let deadline = Instant::now() + Duration::from_millis(500);
        loop {
            {
                let mut inbound = self.inbound.lock().unwrap();
                if !inbound.is_empty() {
                    let n = len.min(inbound.len());
                    return Ok(inbound.drain(..n).collect());
                }
            }
            if self.out_of_data_is_timeout.load(Ordering::Acquire) || Instant::now() > deadline {
                return Err(LinkError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn write(&self, data: &[u8]) -> Result<(), LinkError> {
        self.outbound.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn close(&self) {}
}

fn frame_bytes(frame: &Frame) -> Vec<u8> {
    let mut bytes = frame.pack_header().to_vec();
    bytes.extend_from_slice(&frame.payload);
    bytes
}

fn parse_frames(mut bytes: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    while bytes.len() >= 24 {
        let header = adb_transport::codec::unpack_header(&bytes[..24]).unwrap();
        let data_len = header.data_len as usize;
        let payload = bytes[24..24 + data_len].to_vec();
        frames.push(Frame::new(header.tag, header.arg0, header.arg1, payload));
        bytes = &bytes[24 + data_len..];
    }
    frames
}

struct StaticSigner {
    key_byte: u8,
    rejected_tokens: Vec<Vec<u8>>,
}

impl Signer for StaticSigner {
    fn sign(&self, challenge: &[u8]) -> Vec<u8> {
        if self.rejected_tokens.contains(&challenge.to_vec()) {
            vec![0xBA; 20]
        } else {
            challenge.iter().map(|b| b ^ self.key_byte).collect()
        }
    }

    fn public_key(&self) -> Vec<u8> {
        b"fake-pubkey".to_vec()
    }
}

#[test]
fn s1_no_auth_connect() {
    let device_cnxn = frame_bytes(&Frame::new(Tag::Cnxn, 0x0100_0000, 4096, b"device::x\0".to_vec()));
    let link = FakeLink::new(device_cnxn);
    let transport = Transport::new(Box::new(link));
    let banner = transport.connect(&[]).unwrap();
    assert_eq!(banner, b"device::x\0");
    assert_eq!(transport.max_payload(), 4096);
}

#[test]
fn s2_auth_with_one_good_key() {
    let token = vec![7u8; 20];
    let mut script = frame_bytes(&Frame::new(Tag::Auth, 1, 0, token.clone()));
    script.extend(frame_bytes(&Frame::new(Tag::Cnxn, 0x0100_0000, 4096, b"device::x\0".to_vec())));
    let link = FakeLink::new(script);
    let transport = Transport::new(Box::new(link.clone()));

    let signer: Box<dyn Signer> = Box::new(StaticSigner { key_byte: 0x5A, rejected_tokens: vec![] });
    let banner = transport.connect(&[signer]).unwrap();
    assert_eq!(banner, b"device::x\0");

    let sent = link.outbound_frames();
    assert_eq!(sent[0].tag, Tag::Cnxn);
    assert_eq!(sent[1].tag, Tag::Auth);
    assert_eq!(sent[1].arg0, 2);
    assert_eq!(sent[1].payload, StaticSigner { key_byte: 0x5A, rejected_tokens: vec![] }.sign(&token));
}

#[test]
fn s3_auth_fallback_to_public_key_user_approves() {
    let token_a = vec![1u8; 20];
    let token_b = vec![2u8; 20];
    let mut script = frame_bytes(&Frame::new(Tag::Auth, 1, 0, token_a.clone()));
    script.extend(frame_bytes(&Frame::new(Tag::Auth, 1, 0, token_b.clone())));
    script.extend(frame_bytes(&Frame::new(Tag::Cnxn, 0x0100_0000, 4096, b"device::x\0".to_vec())));
    let link = FakeLink::new(script);
    let transport = Transport::new(Box::new(link.clone()));

    let signer: Box<dyn Signer> = Box::new(StaticSigner { key_byte: 0x11, rejected_tokens: vec![token_a] });
    let banner = transport.connect(&[signer]).unwrap();
    assert_eq!(banner, b"device::x\0");

    let sent = link.outbound_frames();
    let last = sent.last().unwrap();
    assert_eq!(last.tag, Tag::Auth);
    assert_eq!(last.arg0, 3);
    assert_eq!(last.payload, [b"fake-pubkey".as_slice(), &[0]].concat());
}

#[test]
fn s4_auth_fallback_timeout() {
    let token_a = vec![1u8; 20];
    let token_b = vec![2u8; 20];
    // Device asks for a retry (second AUTH) after the lone signer's signature,
    // which exhausts the signer list; the subsequent public-key frame then
    // gets no reply at all, so the final CNXN read times out.
    let mut script = frame_bytes(&Frame::new(Tag::Auth, 1, 0, token_a.clone()));
    script.extend(frame_bytes(&Frame::new(Tag::Auth, 1, 0, token_b)));
    let link = FakeLink::new(script);
    let transport = Transport::new(Box::new(link));

    let signer: Box<dyn Signer> = Box::new(StaticSigner { key_byte: 0x11, rejected_tokens: vec![token_a] });
    let err = transport.connect(&[signer]).unwrap_err();
    assert!(matches!(err, AdbError::Auth(AuthError::UserApprovalRequired)));
}

#[test]
fn s5_two_interleaved_streams() {
    // Only the CNXN reply is queued up front; a real device would not emit
    // OKAY/WRTE for a stream before it has seen that stream's OPEN, so the
    // rest of the script is pushed from this thread only after both OPENs
    // have actually gone out.
    let script = frame_bytes(&Frame::new(Tag::Cnxn, 0x0100_0000, 4096, b"device::x\0".to_vec()));
    let link = FakeLink::new(script);
    link.block_when_empty();

    struct Factory(FakeLink);
    impl LinkFactory for Factory {
        fn connect(&self) -> Result<Box<dyn LinkEndpoint>, AdbError> {
            Ok(Box::new(self.0.clone()))
        }
    }

    let manager = SessionManager::new(Box::new(Factory(link.clone())), vec![]);
    let a = manager.open(b"shell:echo 1\0").unwrap();
    let b = manager.open(b"shell:echo 2\0").unwrap();
    assert_eq!(a.local_id(), 1);
    assert_eq!(b.local_id(), 2);

    let mut reply = frame_bytes(&Frame::new(Tag::Okay, 10, 1, Vec::new()));
    reply.extend(frame_bytes(&Frame::new(Tag::Okay, 20, 2, Vec::new())));
    reply.extend(frame_bytes(&Frame::new(Tag::Wrte, 10, 1, b"1\n".to_vec())));
    reply.extend(frame_bytes(&Frame::new(Tag::Wrte, 20, 2, b"2\n".to_vec())));
    link.push_inbound(&reply);

    let got_a = poll_until_data(&a);
    let got_b = poll_until_data(&b);
    assert_eq!(got_a, b"1\n");
    assert_eq!(got_b, b"2\n");

    let acks = link
        .outbound_frames()
        .into_iter()
        .filter(|f| f.tag == Tag::Okay)
        .count();
    assert_eq!(acks, 2);

    manager.shutdown();
}

fn poll_until_data(stream: &adb_transport::Stream) -> Vec<u8> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match stream.recv() {
            Some(Chunk::Data(data)) => return data,
            Some(Chunk::Empty) => {
                assert!(Instant::now() < deadline, "timed out waiting for data");
                std::thread::sleep(Duration::from_millis(5));
            }
            None => panic!("stream finished before yielding data"),
        }
    }
}

#[test]
fn s6_bad_checksum_is_fatal_and_finalizes_streams() {
    let script = frame_bytes(&Frame::new(Tag::Cnxn, 0x0100_0000, 4096, b"device::x\0".to_vec()));
    let link = FakeLink::new(script);
    link.block_when_empty();

    struct Factory(FakeLink);
    impl LinkFactory for Factory {
        fn connect(&self) -> Result<Box<dyn LinkEndpoint>, AdbError> {
            Ok(Box::new(self.0.clone()))
        }
    }

    let manager = SessionManager::new(Box::new(Factory(link.clone())), vec![]);
    let stream = manager.open(b"shell:echo 1\0").unwrap();

    // Hand-craft a WRTE frame whose header checksum doesn't match its payload.
    let bad = Frame::new(Tag::Wrte, 10, 1, b"oops".to_vec());
    let mut header = bad.pack_header();
    // Corrupt the checksum word (bytes 16..20) so it no longer matches the payload sum.
    header[16] ^= 0xFF;
    let mut reply = header.to_vec();
    reply.extend_from_slice(&bad.payload);
    link.push_inbound(&reply);

    let deadline = Instant::now() + Duration::from_secs(2);
    while !stream.is_finished() {
        assert!(Instant::now() < deadline, "stream never finished after fatal checksum error");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(stream.recv(), None);
}
