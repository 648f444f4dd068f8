//! Audio routing graph driver.
//!
//! Connects a decoded-but-not-yet-played source node to its destinations:
//! speakers plus a capture sink when the audio must stay audible while it is
//! recorded, or just a capture sink otherwise. Offline mixing schedules
//! buffers on its renderer directly and does not go through this graph.
//!
//! Source nodes are single-use. Once a node has played it is consumed and
//! can never be reconnected, so every play (including a resume after a seek)
//! creates a fresh node.

use std::path::PathBuf;

use clipforge_common::error::{ClipforgeError, ClipforgeResult};

/// Opaque handle to a node created by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// Where a source node can be connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Default real-time output.
    Speakers,
    /// Sink that turns the signal into a consumable track for an encoder.
    CaptureSink,
}

/// How a routed source reaches the encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOrigin {
    /// Produced live by the graph's capture sink.
    Live,
    /// Read directly from a media file, starting at an offset.
    File { path: PathBuf, offset_secs: f64 },
}

/// A consumable audio track yielded by a capture sink.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureTrack {
    pub id: u64,
    pub origin: TrackOrigin,
}

/// Which destinations a routed source is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// Speakers and capture sink at once.
    Monitored,
    /// Capture sink only.
    CaptureOnly,
}

impl RoutingMode {
    pub fn destinations(&self) -> &'static [Destination] {
        match self {
            RoutingMode::Monitored => &[Destination::Speakers, Destination::CaptureSink],
            RoutingMode::CaptureOnly => &[Destination::CaptureSink],
        }
    }

    pub fn captures(&self) -> bool {
        self.destinations().contains(&Destination::CaptureSink)
    }
}

/// Platform audio graph: node creation, connections and capture.
pub trait AudioGraphBackend: Send {
    /// Create a source node fed by the playing element.
    fn create_source_node(&mut self) -> ClipforgeResult<NodeId>;

    fn connect(&mut self, node: NodeId, destination: Destination) -> ClipforgeResult<()>;

    fn disconnect(&mut self, node: NodeId);

    /// The capture sink's track.
    fn capture_track(&mut self) -> ClipforgeResult<CaptureTrack>;

    /// Release the graph context. Called once.
    fn close(&mut self);
}

/// Owns one graph context for the lifetime of an operation.
pub struct AudioRouter {
    backend: Box<dyn AudioGraphBackend>,
    mode: RoutingMode,
    active: Option<NodeId>,
    consumed: Vec<NodeId>,
    closed: bool,
}

impl AudioRouter {
    pub fn new(backend: Box<dyn AudioGraphBackend>, mode: RoutingMode) -> Self {
        Self {
            backend,
            mode,
            active: None,
            consumed: Vec::new(),
            closed: false,
        }
    }

    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    /// Build the graph for a new play: retire the previous source node,
    /// create a fresh one and connect it to every destination of the mode.
    pub fn attach_for_play(&mut self) -> ClipforgeResult<NodeId> {
        self.ensure_open()?;
        self.retire_active();

        let node = self.backend.create_source_node()?;
        for &destination in self.mode.destinations() {
            self.backend.connect(node, destination)?;
        }
        self.active = Some(node);

        tracing::debug!(
            node = node.0,
            mode = ?self.mode,
            plays = self.consumed.len() + 1,
            "Audio source attached"
        );
        Ok(node)
    }

    /// Connect an already-created node to one extra destination.
    pub fn connect(&mut self, node: NodeId, destination: Destination) -> ClipforgeResult<()> {
        self.ensure_open()?;
        if self.consumed.contains(&node) {
            return Err(ClipforgeError::source_load(format!(
                "audio source node {} was already played and cannot be reconnected",
                node.0
            )));
        }
        self.backend.connect(node, destination)
    }

    /// Track to hand to the stream encoder, if this mode captures.
    pub fn capture_track(&mut self) -> ClipforgeResult<Option<CaptureTrack>> {
        self.ensure_open()?;
        if !self.mode.captures() {
            return Ok(None);
        }
        self.backend.capture_track().map(Some)
    }

    /// Number of source nodes created so far.
    pub fn plays(&self) -> usize {
        self.consumed.len() + usize::from(self.active.is_some())
    }

    /// Disconnect everything and close the context. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.retire_active();
        self.backend.close();
        self.closed = true;
        tracing::debug!(plays = self.consumed.len(), "Audio graph closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn retire_active(&mut self) {
        if let Some(node) = self.active.take() {
            self.backend.disconnect(node);
            self.consumed.push(node);
        }
    }

    fn ensure_open(&self) -> ClipforgeResult<()> {
        if self.closed {
            return Err(ClipforgeError::source_load("audio graph is already closed"));
        }
        Ok(())
    }
}

impl Drop for AudioRouter {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        created: u64,
        connections: Vec<(u64, Destination)>,
        disconnected: Vec<u64>,
        closes: usize,
    }

    struct FakeGraph(Arc<Mutex<Log>>);

    impl AudioGraphBackend for FakeGraph {
        fn create_source_node(&mut self) -> ClipforgeResult<NodeId> {
            let mut log = self.0.lock().unwrap();
            log.created += 1;
            Ok(NodeId(log.created))
        }

        fn connect(&mut self, node: NodeId, destination: Destination) -> ClipforgeResult<()> {
            self.0.lock().unwrap().connections.push((node.0, destination));
            Ok(())
        }

        fn disconnect(&mut self, node: NodeId) {
            self.0.lock().unwrap().disconnected.push(node.0);
        }

        fn capture_track(&mut self) -> ClipforgeResult<CaptureTrack> {
            Ok(CaptureTrack {
                id: 1,
                origin: TrackOrigin::Live,
            })
        }

        fn close(&mut self) {
            self.0.lock().unwrap().closes += 1;
        }
    }

    fn router(mode: RoutingMode) -> (AudioRouter, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        (
            AudioRouter::new(Box::new(FakeGraph(Arc::clone(&log))), mode),
            log,
        )
    }

    #[test]
    fn test_monitored_connects_speakers_and_capture() {
        let (mut router, log) = router(RoutingMode::Monitored);
        let node = router.attach_for_play().unwrap();
        let log = log.lock().unwrap();
        assert_eq!(
            log.connections,
            vec![
                (node.0, Destination::Speakers),
                (node.0, Destination::CaptureSink)
            ]
        );
    }

    #[test]
    fn test_new_node_per_play() {
        let (mut router, log) = router(RoutingMode::CaptureOnly);
        let first = router.attach_for_play().unwrap();
        let second = router.attach_for_play().unwrap();
        assert_ne!(first, second);
        assert_eq!(router.plays(), 2);
        assert_eq!(log.lock().unwrap().disconnected, vec![first.0]);

        let err = router.connect(first, Destination::Speakers).unwrap_err();
        assert!(err.to_string().contains("cannot be reconnected"));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let (mut router, log) = router(RoutingMode::CaptureOnly);
        router.attach_for_play().unwrap();
        router.teardown();
        router.teardown();
        drop(router);
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_closed_router_rejects_new_plays() {
        let (mut router, _log) = router(RoutingMode::CaptureOnly);
        router.teardown();
        assert!(router.attach_for_play().is_err());
    }
}
