//! Asynchronous asset loading
//!
//! [`AssetLoader::start`] reads and parses an asset on a worker thread and
//! reports `(LoadTicket, LoadEvent)` pairs over a channel. Each start
//! supersedes the previous load: the old worker stops at its next chunk and
//! anything it still sends is dropped by [`AssetLoader::poll`].

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender};

use super::{
    fbx, obj,
    source::{ByteSource, MeshFormat},
};
use crate::{
    error::{panic_message, LoadError},
    gfx::scene::node::LoadedObject,
};

/// Default read granularity
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Progress of one load
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadProgress {
    /// Bytes consumed over the declared total, in [0, 1]
    Fraction(f32),
    /// The source did not declare a total
    Indeterminate { bytes_read: u64 },
}

#[derive(Debug)]
pub enum LoadEvent {
    Progress(LoadProgress),
    Loaded(LoadedObject),
    Failed(LoadError),
}

impl LoadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoadEvent::Progress(_))
    }
}

/// Identity of one load request; later tickets compare greater
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

/// Reads, parses and recenters an asset on the calling thread
///
/// The returned object's bounding-box center is at the origin.
pub fn load_blocking(
    source: ByteSource,
    format: MeshFormat,
    chunk_size: usize,
    mut progress: impl FnMut(LoadProgress),
) -> Result<LoadedObject, LoadError> {
    load_cancellable(source, format, chunk_size, &|| false, &mut progress)
}

fn load_cancellable(
    source: ByteSource,
    format: MeshFormat,
    chunk_size: usize,
    cancelled: &dyn Fn() -> bool,
    progress: &mut dyn FnMut(LoadProgress),
) -> Result<LoadedObject, LoadError> {
    let name = source.name().to_string();
    let bytes = source.read_all(chunk_size, cancelled, progress)?;
    if cancelled() {
        return Err(LoadError::Superseded);
    }

    let mut object = match format {
        MeshFormat::Fbx => fbx::parse(&bytes, &name)?,
        MeshFormat::Obj => obj::parse(&bytes, &name)?,
    };
    let center = object.recenter();
    log::debug!(
        "Recentered '{}' from ({:.3}, {:.3}, {:.3})",
        name,
        center.x,
        center.y,
        center.z
    );
    Ok(object)
}

pub struct AssetLoader {
    chunk_size: usize,
    sender: Sender<(LoadTicket, LoadEvent)>,
    receiver: Receiver<(LoadTicket, LoadEvent)>,
    /// Ticket of the load whose events are still wanted, 0 for none
    current: Arc<AtomicU64>,
    next_ticket: u64,
    discarded: usize,
}

impl AssetLoader {
    pub fn new(chunk_size: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            chunk_size: chunk_size.max(1),
            sender,
            receiver,
            current: Arc::new(AtomicU64::new(0)),
            next_ticket: 1,
            discarded: 0,
        }
    }

    /// Starts loading on a worker thread, superseding any load in flight
    pub fn start(&mut self, source: ByteSource, format: MeshFormat) -> Result<LoadTicket, LoadError> {
        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;
        self.current.store(ticket.0, Ordering::SeqCst);

        let sender = self.sender.clone();
        let current = Arc::clone(&self.current);
        let chunk_size = self.chunk_size;
        log::info!("Loading '{}' as {:?} (ticket {})", source.name(), format, ticket.0);

        thread::Builder::new()
            .name(format!("meshkiln-loader-{}", ticket.0))
            .spawn(move || {
                let cancelled = || current.load(Ordering::SeqCst) != ticket.0;
                let mut progress = |p: LoadProgress| {
                    let _ = sender.send((ticket, LoadEvent::Progress(p)));
                };
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    load_cancellable(source, format, chunk_size, &cancelled, &mut progress)
                }));
                let event = match outcome {
                    Ok(Ok(object)) => LoadEvent::Loaded(object),
                    Ok(Err(err)) => LoadEvent::Failed(err),
                    Err(payload) => LoadEvent::Failed(LoadError::Crashed(panic_message(payload.as_ref()))),
                };
                // The receiver may be gone after teardown
                let _ = sender.send((ticket, event));
            })
            .map_err(LoadError::from)?;
        Ok(ticket)
    }

    /// Supersedes the load in flight without starting another
    pub fn cancel(&mut self) {
        if self.current.swap(0, Ordering::SeqCst) != 0 {
            log::debug!("Load cancelled");
        }
    }

    pub fn current_ticket(&self) -> Option<LoadTicket> {
        match self.current.load(Ordering::SeqCst) {
            0 => None,
            ticket => Some(LoadTicket(ticket)),
        }
    }

    /// Drains the channel, keeping only events of the current ticket
    ///
    /// A terminal event ends the current load.
    pub fn poll(&mut self) -> Vec<LoadEvent> {
        let mut events = Vec::new();
        while let Ok((ticket, event)) = self.receiver.try_recv() {
            if Some(ticket) != self.current_ticket() {
                log::debug!("Discarding stale event from ticket {}", ticket.0);
                self.discarded += 1;
                continue;
            }
            if event.is_terminal() {
                self.current.store(0, Ordering::SeqCst);
            }
            events.push(event);
        }
        events
    }

    /// Number of stale events dropped so far
    pub fn discarded_events(&self) -> usize {
        self.discarded
    }

    pub fn is_loading(&self) -> bool {
        self.current_ticket().is_some()
    }
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Drop for AssetLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::assets::fbx::fixtures::ASCII_CUBE;

    fn wait_for_terminal(loader: &mut AssetLoader) -> Vec<LoadEvent> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            events.extend(loader.poll());
            if events.last().is_some_and(LoadEvent::is_terminal) {
                return events;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("load did not finish");
    }

    #[test]
    fn test_load_blocking_recenters() {
        let source = ByteSource::from_bytes("cube", ASCII_CUBE.as_bytes().to_vec());
        let object = load_blocking(source, MeshFormat::Fbx, 128, |_| {}).unwrap();
        let center = object.bounds().unwrap().center();
        assert!(center.x.abs() < 1e-5 && center.y.abs() < 1e-5 && center.z.abs() < 1e-5);
    }

    #[test]
    fn test_progress_then_exactly_one_terminal_event() {
        let mut loader = AssetLoader::new(256);
        loader
            .start(
                ByteSource::from_bytes("cube", ASCII_CUBE.as_bytes().to_vec()),
                MeshFormat::Fbx,
            )
            .unwrap();
        let events = wait_for_terminal(&mut loader);

        let terminal = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminal, 1);
        assert!(matches!(events.last(), Some(LoadEvent::Loaded(_))));

        let fractions: Vec<f32> = events
            .iter()
            .filter_map(|e| match e {
                LoadEvent::Progress(LoadProgress::Fraction(f)) => Some(*f),
                _ => None,
            })
            .collect();
        assert!(!fractions.is_empty());
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert!(!loader.is_loading());
    }

    #[test]
    fn test_truncated_asset_fails() {
        let mut loader = AssetLoader::default();
        let bytes = ASCII_CUBE.as_bytes().to_vec();
        let total = bytes.len() as u64;
        let short = bytes[..bytes.len() / 2].to_vec();
        loader
            .start(
                ByteSource::from_reader("short", std::io::Cursor::new(short), Some(total)),
                MeshFormat::Fbx,
            )
            .unwrap();
        let events = wait_for_terminal(&mut loader);
        assert!(matches!(
            events.last(),
            Some(LoadEvent::Failed(LoadError::IncompleteData(_)))
        ));
    }

    struct ExplodingReader;

    impl std::io::Read for ExplodingReader {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            panic!("reader exploded")
        }
    }

    #[test]
    fn test_worker_panic_is_reported_as_failure() {
        let mut loader = AssetLoader::default();
        loader
            .start(
                ByteSource::from_reader("boom", ExplodingReader, Some(16)),
                MeshFormat::Obj,
            )
            .unwrap();
        let events = wait_for_terminal(&mut loader);
        match events.last() {
            Some(LoadEvent::Failed(LoadError::Crashed(message))) => {
                assert_eq!(message, "reader exploded")
            }
            other => panic!("expected a crash report, got {other:?}"),
        }
        assert!(!loader.is_loading());
    }

    #[test]
    fn test_superseded_events_are_discarded() {
        let mut loader = AssetLoader::new(64);
        let first = loader
            .start(
                ByteSource::from_bytes("first", ASCII_CUBE.as_bytes().to_vec()),
                MeshFormat::Fbx,
            )
            .unwrap();
        let second = loader
            .start(
                ByteSource::from_bytes("second", ASCII_CUBE.as_bytes().to_vec()),
                MeshFormat::Fbx,
            )
            .unwrap();
        assert!(second > first);

        let events = wait_for_terminal(&mut loader);
        let loaded: Vec<&LoadedObject> = events
            .iter()
            .filter_map(|e| match e {
                LoadEvent::Loaded(object) => Some(object),
                _ => None,
            })
            .collect();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "second");
    }
}
