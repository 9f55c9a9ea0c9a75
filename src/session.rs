//! Orchestrates one device: lazily establishes the transport, starts the
//! router, allocates streams. Grounded on `py_adb.adb_commands.AdbSessionManager`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{info, warn};

use crate::error::{AdbError, UsageError};
use crate::link::LinkEndpoint;
use crate::router::{self, SessionTable};
use crate::signer::Signer;
use crate::stream::Stream;
use crate::transport::Transport;

/// Builds the `LinkEndpoint` for a device `source` identifier on first use.
pub trait LinkFactory: Send {
    fn connect(&self) -> Result<Box<dyn LinkEndpoint>, AdbError>;
}

impl<F> LinkFactory for F
where
    F: Fn() -> Result<Box<dyn LinkEndpoint>, AdbError> + Send,
{
    fn connect(&self) -> Result<Box<dyn LinkEndpoint>, AdbError> {
        self()
    }
}

struct Established {
    transport: Arc<Transport>,
    router: JoinHandle<()>,
}

/// Orchestrates exactly one device: one `Transport`, one `Router`, many `Stream`s.
pub struct SessionManager {
    link_factory: Box<dyn LinkFactory>,
    signers: Vec<Box<dyn Signer>>,
    established: Mutex<Option<Established>>,
    table: SessionTable,
    next_local_id: AtomicU32,
}

impl SessionManager {
    pub fn new(link_factory: Box<dyn LinkFactory>, signers: Vec<Box<dyn Signer>>) -> Self {
        Self {
            link_factory,
            signers,
            established: Mutex::new(None),
            table: router::new_table(),
            next_local_id: AtomicU32::new(0),
        }
    }

    fn ensure_connected(&self) -> Result<Arc<Transport>, AdbError> {
        let mut established = self.established.lock().expect("established mutex poisoned");
        if let Some(e) = established.as_ref() {
            return Ok(e.transport.clone());
        }
        info!("establishing connection");
        let link = self.link_factory.connect()?;
        let transport = Arc::new(Transport::new(link));
        transport.connect(&self.signers)?;
        let router = router::spawn(transport.clone(), self.table.clone());
        *established = Some(Established { transport: transport.clone(), router });
        Ok(transport)
    }

    /// Opens a new logical stream for `service` (e.g. `b"shell:echo hi"`).
    /// Establishes the transport and starts the router on first call.
    pub fn open(&self, service: &[u8]) -> Result<Arc<Stream>, AdbError> {
        let transport = self.ensure_connected()?;
        let local_id = self.next_local_id.fetch_add(1, Ordering::AcqRel) + 1;
        let stream = Stream::new_opening(transport, local_id);
        // Registered before OPEN is sent so the router can never observe an
        // OKAY for a stream the session table doesn't know about yet. If the
        // router already finalized the table (the link died concurrently),
        // bail out instead of leaving the stream registered nowhere.
        if !router::try_insert(&self.table, local_id, stream.clone()) {
            return Err(UsageError::NotConnected.into());
        }
        if let Err(e) = stream.send_open(service) {
            router::remove(&self.table, local_id);
            return Err(e);
        }
        Ok(stream)
    }

    /// Closes one stream by local id. A no-op (with a warning) if the id is
    /// unknown or the transport was never established.
    pub fn close(&self, local_id: u32) {
        let stream = self
            .table
            .lock()
            .expect("session table poisoned")
            .as_ref()
            .and_then(|m| m.get(&local_id).cloned());
        match stream {
            Some(stream) => {
                if let Err(e) = stream.close() {
                    warn!("close({local_id}): {e}");
                }
            }
            None => warn!("close({local_id}): {}", UsageError::NotConnected),
        }
    }

    /// Closes every open stream, stops the router, and closes the transport.
    pub fn shutdown(&self) {
        let streams: Vec<_> = self
            .table
            .lock()
            .expect("session table poisoned")
            .as_ref()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        for stream in streams {
            let _ = stream.close();
        }
        if let Some(established) = self.established.lock().expect("established mutex poisoned").take() {
            established.transport.close();
            let _ = established.router.join();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
