//! Background reader that demultiplexes inbound frames into per-stream
//! queues. Grounded on `py_adb.adb_commands.IncomingRouter`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{error, warn};

use crate::codec::{Frame, Tag};
use crate::error::{AdbError, ProtocolError};
use crate::stream::Stream;
use crate::transport::Transport;

/// `None` once the router has shut down: no further stream can be registered,
/// and any stream inserted concurrently with the shutdown must be caught by
/// the caller rather than left waiting on a table nobody will drain again.
pub type SessionTable = Arc<Mutex<Option<HashMap<u32, Arc<Stream>>>>>;

pub fn new_table() -> SessionTable {
    Arc::new(Mutex::new(Some(HashMap::new())))
}

/// Inserts `stream` under `local_id` if the table is still live. Returns
/// `false` if the router already finalized it, in which case the caller
/// must not treat the stream as registered.
pub fn try_insert(table: &SessionTable, local_id: u32, stream: Arc<Stream>) -> bool {
    match table.lock().expect("session table poisoned").as_mut() {
        Some(map) => {
            map.insert(local_id, stream);
            true
        }
        None => false,
    }
}

pub fn remove(table: &SessionTable, local_id: u32) {
    if let Some(map) = table.lock().expect("session table poisoned").as_mut() {
        map.remove(&local_id);
    }
}

/// Spawns the router thread bound to `transport`. Runs until the link fails
/// or a frame violates the post-handshake protocol, at which point every
/// stream still in `table` is finalized and the table is marked dead.
pub fn spawn(transport: Arc<Transport>, table: SessionTable) -> JoinHandle<()> {
    std::thread::spawn(move || run(&transport, &table))
}

fn run(transport: &Arc<Transport>, table: &SessionTable) {
    loop {
        match transport.read_frame() {
            Ok(frame) => {
                if let Err(e) = dispatch(frame, table) {
                    error!("router: fatal protocol violation: {e}");
                    break;
                }
            }
            Err(e) => {
                warn!("router: link failure, shutting down transport: {e}");
                break;
            }
        }
    }
    transport.close();
    finalize_all(table);
}

fn dispatch(frame: Frame, table: &SessionTable) -> Result<(), AdbError> {
    match frame.tag {
        Tag::Okay => {
            let table = table.lock().expect("session table poisoned");
            if let Some(stream) = table.as_ref().and_then(|m| m.get(&frame.arg1)) {
                if stream.is_opening() {
                    let _ = stream.register(frame.arg0);
                }
                // Established: acks a prior WRTE. No queue mutation; flow
                // control is implicit in Transport's synchronous auto-ack.
            }
            Ok(())
        }
        Tag::Wrte => {
            let table = table.lock().expect("session table poisoned");
            match table.as_ref().and_then(|m| m.get(&frame.arg1)) {
                Some(stream) if stream.is_established() => {
                    stream.enqueue(frame.payload);
                }
                Some(_) => {
                    warn!("router: dropping WRTE for stream {} not yet established", frame.arg1);
                }
                None => {
                    warn!("router: dropping WRTE for unknown stream {}", frame.arg1);
                }
            }
            Ok(())
        }
        Tag::Clse => {
            let mut table = table.lock().expect("session table poisoned");
            if let Some(stream) = table.as_mut().and_then(|m| m.remove(&frame.arg1)) {
                stream.mark_closed();
            }
            Ok(())
        }
        Tag::Auth | Tag::Cnxn | Tag::Open => Err(ProtocolError::UnexpectedTag(frame.tag).into()),
        Tag::Sync => {
            warn!("router: ignoring reserved SYNC frame");
            Ok(())
        }
    }
}

/// Drains and closes every stream still registered, then marks the table
/// dead so a racing `SessionManager::open()` can detect it instead of
/// inserting into a table nobody will ever drain again.
fn finalize_all(table: &SessionTable) {
    let mut table = table.lock().expect("session table poisoned");
    if let Some(map) = table.take() {
        for (_, stream) in map {
            stream.mark_closed();
        }
    }
}
