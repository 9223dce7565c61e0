//! Replays JSON-lines position samples from a file or a stream.
//!
//! Each non-empty line that does not start with `#` is one
//! [`PositionSample`]. Malformed lines are reported as source errors and
//! skipped.
//!
//! A file is re-read from the start by every subscription, paced by a fixed
//! interval. A stream (stdin) can only be read once, so a single reader
//! thread owns it for the life of the process and forwards each line to
//! whichever subscription is attached at the time.

use super::types::{PositionSample, PositionSource, SourceError, SourceEvent, Subscription};
use crossbeam_channel::{bounded, Sender};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Where replayed samples come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayInput {
    File(PathBuf),
    Stdin,
    /// Any other line stream handed to [`ReplaySource::from_reader`]
    Reader,
}

#[derive(Default)]
struct StreamState {
    current: Option<(Sender<SourceEvent>, Arc<AtomicBool>)>,
    ended: bool,
}

/// A line stream shared by successive subscriptions.
struct SharedStream {
    state: Arc<Mutex<StreamState>>,
    // Taken by the reader thread on first subscribe
    reader: Option<Box<dyn BufRead + Send>>,
}

impl SharedStream {
    fn new(reader: Box<dyn BufRead + Send>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StreamState::default())),
            reader: Some(reader),
        }
    }
}

fn lock(state: &Mutex<StreamState>) -> MutexGuard<'_, StreamState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A position source backed by recorded or piped samples.
pub struct ReplaySource {
    input: ReplayInput,
    interval: Duration,
    stream: Option<SharedStream>,
}

impl ReplaySource {
    /// Replay a file, emitting one sample per `interval`.
    pub fn file(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            input: ReplayInput::File(path.into()),
            interval,
            stream: None,
        }
    }

    /// Forward samples from stdin as soon as they arrive.
    pub fn stdin() -> Self {
        Self {
            input: ReplayInput::Stdin,
            interval: Duration::ZERO,
            stream: Some(SharedStream::new(Box::new(BufReader::new(io::stdin())))),
        }
    }

    /// Forward samples from an arbitrary line stream as they arrive.
    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            input: ReplayInput::Reader,
            interval: Duration::ZERO,
            stream: Some(SharedStream::new(Box::new(reader))),
        }
    }

    pub fn input(&self) -> &ReplayInput {
        &self.input
    }

    fn subscribe_file(&self) -> Result<Subscription, SourceError> {
        let ReplayInput::File(path) = &self.input else {
            return Err(SourceError::Unavailable("not a file replay".to_string()));
        };
        let file = File::open(path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", path.display())))?;
        let reader: Box<dyn BufRead + Send> = Box::new(BufReader::new(file));

        // Bounded to keep a stalled consumer from growing memory
        let (sender, receiver) = bounded(10_000);
        let active = Arc::new(AtomicBool::new(true));
        let interval = self.interval;
        let worker_active = active.clone();
        let description = self.describe();

        let handle = thread::Builder::new()
            .name("position-replay".to_string())
            .spawn(move || {
                run_replay(reader, sender, &worker_active, interval);
                tracing::debug!(source = %description, "replay finished");
            })
            .map_err(|e| SourceError::Unavailable(format!("failed to spawn reader: {e}")))?;

        Ok(Subscription::new(receiver, active, Some(handle)))
    }

    fn subscribe_stream(&mut self) -> Result<Subscription, SourceError> {
        let description = self.describe();
        let Some(stream) = self.stream.as_mut() else {
            return Err(SourceError::Unavailable("no stream attached".to_string()));
        };

        let (sender, receiver) = bounded(10_000);
        let active = Arc::new(AtomicBool::new(true));

        {
            let mut state = lock(&stream.state);
            if state.ended {
                // Input already exhausted: hand out a closed stream
                drop(sender);
                return Ok(Subscription::new(receiver, active, None));
            }
            state.current = Some((sender, active.clone()));
        }

        if let Some(reader) = stream.reader.take() {
            let state = stream.state.clone();
            let spawned = thread::Builder::new()
                .name("position-stream".to_string())
                .spawn(move || {
                    pump_lines(reader, &state);
                    tracing::debug!(source = %description, "input ended");
                });
            if let Err(e) = spawned {
                let mut state = lock(&stream.state);
                state.current = None;
                state.ended = true;
                return Err(SourceError::Unavailable(format!("failed to spawn reader: {e}")));
            }
        }

        Ok(Subscription::new(receiver, active, None))
    }
}

impl PositionSource for ReplaySource {
    fn subscribe(&mut self) -> Result<Subscription, SourceError> {
        match self.input {
            ReplayInput::File(_) => self.subscribe_file(),
            ReplayInput::Stdin | ReplayInput::Reader => self.subscribe_stream(),
        }
    }

    fn describe(&self) -> String {
        match &self.input {
            ReplayInput::File(path) => format!("replay of {}", path.display()),
            ReplayInput::Stdin => "stdin".to_string(),
            ReplayInput::Reader => "line stream".to_string(),
        }
    }
}

fn run_replay(
    reader: Box<dyn BufRead + Send>,
    sender: Sender<SourceEvent>,
    active: &AtomicBool,
    interval: Duration,
) {
    let mut emitted_any = false;

    for (index, line) in reader.lines().enumerate() {
        if !active.load(Ordering::SeqCst) {
            return;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                let _ = sender.send(SourceEvent::Error(SourceError::Unavailable(e.to_string())));
                return;
            }
        };

        let Some(event) = parse_line(index + 1, &line) else {
            continue;
        };

        if emitted_any && !pace(interval, active) {
            return;
        }
        if sender.send(event).is_err() {
            // Receiver dropped
            return;
        }
        emitted_any = true;
    }
}

/// Read the stream to its end, forwarding each event to the attached
/// subscription. Lines arriving while nothing is attached are dropped.
fn pump_lines(reader: Box<dyn BufRead + Send>, state: &Mutex<StreamState>) {
    for (index, line) in reader.lines().enumerate() {
        let event = match line {
            Ok(line) => match parse_line(index + 1, &line) {
                Some(event) => event,
                None => continue,
            },
            Err(e) => {
                forward(state, SourceEvent::Error(SourceError::Unavailable(e.to_string())));
                break;
            }
        };
        forward(state, event);
    }

    let mut state = lock(state);
    state.ended = true;
    // Dropping the sender disconnects the attached subscription
    state.current = None;
}

fn forward(state: &Mutex<StreamState>, event: SourceEvent) {
    let target = match &lock(state).current {
        Some((sender, active)) if active.load(Ordering::SeqCst) => sender.clone(),
        _ => return,
    };
    // Sent outside the lock so a full channel cannot block subscribers
    let _ = target.send(event);
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line_number: usize, line: &str) -> Option<SourceEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    Some(match serde_json::from_str::<PositionSample>(trimmed) {
        Ok(sample) => SourceEvent::Sample(sample),
        Err(e) => SourceEvent::Error(SourceError::Malformed {
            line: line_number,
            message: e.to_string(),
        }),
    })
}

/// Sleep for `interval` in short slices. Returns false if cancelled.
fn pace(interval: Duration, active: &AtomicBool) -> bool {
    const SLICE: Duration = Duration::from_millis(50);

    let deadline = Instant::now() + interval;
    loop {
        if !active.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver};
    use std::io::{Read, Write};

    /// Blocking byte stream fed from a channel, like a pipe on stdin.
    struct ChannelReader {
        chunks: Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                match self.chunks.recv() {
                    Ok(chunk) => self.pending = chunk,
                    // Writer gone: end of input
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    fn piped_source() -> (ReplaySource, Sender<Vec<u8>>) {
        let (writer, chunks) = unbounded();
        let reader = BufReader::new(ChannelReader {
            chunks,
            pending: Vec::new(),
        });
        (ReplaySource::from_reader(reader), writer)
    }

    fn line(latitude: f64) -> Vec<u8> {
        format!("{{\"latitude\": {latitude}, \"longitude\": 0.0}}\n").into_bytes()
    }

    #[test]
    fn test_parse_line() {
        assert!(parse_line(1, "").is_none());
        assert!(parse_line(2, "   # comment").is_none());

        match parse_line(3, r#"{"latitude": 1.0, "longitude": 2.0, "heading": 45}"#) {
            Some(SourceEvent::Sample(sample)) => assert_eq!(sample.heading, Some(45.0)),
            other => panic!("unexpected: {other:?}"),
        }

        match parse_line(4, "not json") {
            Some(SourceEvent::Error(SourceError::Malformed { line, .. })) => assert_eq!(line, 4),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let mut source = ReplaySource::file("/definitely/not/here.jsonl", Duration::ZERO);
        assert!(matches!(
            source.subscribe(),
            Err(SourceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_replay_file_in_order_with_errors_inline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "# recorded drive").unwrap();
        writeln!(file, r#"{{"latitude": 1.0, "longitude": 1.0}}"#).unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, r#"{{"latitude": 2.0, "longitude": 2.0, "heading": 10}}"#).unwrap();
        drop(file);

        let mut source = ReplaySource::file(&path, Duration::ZERO);
        let subscription = source.subscribe().unwrap();

        let timeout = Duration::from_secs(2);
        let first = subscription.recv_timeout(timeout).unwrap();
        let second = subscription.recv_timeout(timeout).unwrap();
        let third = subscription.recv_timeout(timeout).unwrap();

        assert!(matches!(first, SourceEvent::Sample(ref s) if s.latitude == 1.0));
        assert!(matches!(
            second,
            SourceEvent::Error(SourceError::Malformed { line: 3, .. })
        ));
        assert!(matches!(third, SourceEvent::Sample(ref s) if s.heading == Some(10.0)));
    }

    #[test]
    fn test_cancel_interrupts_paced_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.jsonl");
        let mut file = File::create(&path).unwrap();
        for i in 0..5 {
            writeln!(file, r#"{{"latitude": {i}.0, "longitude": 0.0}}"#).unwrap();
        }
        drop(file);

        let mut source = ReplaySource::file(&path, Duration::from_secs(60));
        let mut subscription = source.subscribe().unwrap();

        // First sample is emitted immediately, the rest are paced
        assert!(subscription.recv_timeout(Duration::from_secs(2)).is_ok());
        subscription.cancel();
        assert!(subscription.try_recv().is_none());
    }

    #[test]
    fn test_stream_resubscribe_receives_next_line() {
        let (mut source, writer) = piped_source();
        let timeout = Duration::from_secs(2);

        let mut first = source.subscribe().unwrap();
        writer.send(line(1.0)).unwrap();
        assert!(matches!(
            first.recv_timeout(timeout),
            Ok(SourceEvent::Sample(ref s)) if s.latitude == 1.0
        ));
        first.cancel();
        drop(first);

        // Stop then start again: the next line goes to the new subscriber
        // whole, not to a reader left behind by the old one
        let second = source.subscribe().unwrap();
        writer.send(line(2.0)).unwrap();
        assert!(matches!(
            second.recv_timeout(timeout),
            Ok(SourceEvent::Sample(ref s)) if s.latitude == 2.0
        ));
    }

    #[test]
    fn test_stream_lines_without_subscriber_are_dropped() {
        let (mut source, writer) = piped_source();
        let timeout = Duration::from_secs(2);

        let mut first = source.subscribe().unwrap();
        first.cancel();
        writer.send(line(1.0)).unwrap();
        // Let the reader thread consume the orphaned line
        thread::sleep(Duration::from_millis(100));

        let second = source.subscribe().unwrap();
        writer.send(line(2.0)).unwrap();
        assert!(matches!(
            second.recv_timeout(timeout),
            Ok(SourceEvent::Sample(ref s)) if s.latitude == 2.0
        ));
    }

    #[test]
    fn test_stream_end_disconnects_current_and_later_subscribers() {
        let (mut source, writer) = piped_source();
        let timeout = Duration::from_secs(2);

        let subscription = source.subscribe().unwrap();
        writer.send(b"garbage\n".to_vec()).unwrap();
        drop(writer);

        assert!(matches!(
            subscription.recv_timeout(timeout),
            Ok(SourceEvent::Error(SourceError::Malformed { line: 1, .. }))
        ));
        assert!(matches!(
            subscription.recv_timeout(timeout),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        ));

        let late = source.subscribe().unwrap();
        assert!(matches!(
            late.recv_timeout(timeout),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        ));
    }
}
