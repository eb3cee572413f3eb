//! Per-key cancellable delay for coalescing rapid events.
//!
//! Every key owns at most one armed timer task. Sending a new value for a key
//! aborts that key's outstanding timer and arms a fresh one, so only the
//! latest value is ever emitted and earlier values are dropped, not merged.
//! Keys never delay each other.
//!
//! # Architecture
//!
//! A background task owns the pending map. For each incoming `(key, value)`:
//!
//! 1. The previous timer for `key` (if any) is aborted and its value dropped
//! 2. A new timer task is spawned that sleeps for the interval and then
//!    reports back with the generation it was armed for
//! 3. When a timer reports and its generation is still current, the value is
//!    emitted on the output channel
//!
//! The generation check covers the window where a timer already fired but
//! its report was still queued when a newer value superseded it.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use notetodo_monitor::utils::debounce::Debouncer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (output_tx, mut output_rx) = mpsc::channel(100);
//!     let debouncer = Debouncer::new(Duration::from_millis(100), output_tx);
//!
//!     let path = PathBuf::from("/notes/today.md");
//!     debouncer.send(path.clone(), "first save".to_string()).await.unwrap();
//!     debouncer.send(path.clone(), "second save".to_string()).await.unwrap();
//!
//!     // Only the latest value survives the window.
//!     if let Some((key, value)) = output_rx.recv().await {
//!         assert_eq!(key, path);
//!         assert_eq!(value, "second save");
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Default debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Error type for debouncer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebouncerError {
    /// The debouncer's input channel has been closed.
    #[error("debouncer channel closed")]
    ChannelClosed,
}

/// An armed timer and the value it will emit.
struct Pending<V> {
    value: V,
    generation: u64,
    timer: JoinHandle<()>,
}

/// Coalesces rapid events per key, emitting only the latest value once the
/// key has been quiet for the interval.
///
/// # Type Parameters
///
/// * `K` - Key grouping events (e.g. `PathBuf` for note files)
/// * `V` - Event value
#[derive(Debug)]
pub struct Debouncer<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    input_tx: mpsc::Sender<(K, V)>,
    #[allow(dead_code)]
    task_handle: JoinHandle<()>,
}

impl<K, V> Debouncer<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    V: Send + 'static,
{
    /// Creates a debouncer emitting on `output_tx` after `interval` of quiet.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(interval: Duration, output_tx: mpsc::Sender<(K, V)>) -> Self {
        let (input_tx, input_rx) = mpsc::channel(1000);

        let task_handle = tokio::spawn(async move {
            run_debounce_loop(interval, input_rx, output_tx).await;
        });

        Self {
            input_tx,
            task_handle,
        }
    }

    /// Schedules `value` for `key`, superseding any pending value for `key`.
    ///
    /// # Errors
    ///
    /// Returns `DebouncerError::ChannelClosed` if the background task has
    /// terminated.
    pub async fn send(&self, key: K, value: V) -> Result<(), DebouncerError> {
        self.input_tx
            .send((key, value))
            .await
            .map_err(|_| DebouncerError::ChannelClosed)
    }
}

async fn run_debounce_loop<K, V>(
    interval: Duration,
    mut input_rx: mpsc::Receiver<(K, V)>,
    output_tx: mpsc::Sender<(K, V)>,
) where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    V: Send + 'static,
{
    let mut pending: HashMap<K, Pending<V>> = HashMap::new();
    let mut next_generation: u64 = 0;
    let (fired_tx, mut fired_rx) = mpsc::unbounded_channel::<(K, u64)>();

    debug!(interval_ms = interval.as_millis(), "Starting debounce loop");

    loop {
        tokio::select! {
            event = input_rx.recv() => {
                let Some((key, value)) = event else {
                    debug!(pending = pending.len(), "Input channel closed, flushing pending events");
                    flush_all_pending(&mut pending, &output_tx).await;
                    break;
                };

                if let Some(previous) = pending.remove(&key) {
                    previous.timer.abort();
                    trace!(key = ?key, "Superseded pending event");
                }

                next_generation += 1;
                let generation = next_generation;
                let timer = {
                    let fired_tx = fired_tx.clone();
                    let key = key.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(interval).await;
                        let _ = fired_tx.send((key, generation));
                    })
                };

                pending.insert(key, Pending { value, generation, timer });
            }

            Some((key, generation)) = fired_rx.recv() => {
                let current = pending.get(&key).map(|p| p.generation);
                if current != Some(generation) {
                    trace!(key = ?key, "Ignoring stale timer");
                    continue;
                }
                if let Some(entry) = pending.remove(&key) {
                    trace!(key = ?key, "Emitting debounced event");
                    if let Err(e) = output_tx.send((key, entry.value)).await {
                        warn!(error = %e, "Failed to emit debounced event");
                    }
                }
            }
        }
    }

    debug!("Debounce loop terminated");
}

/// Emits every pending value immediately and disarms its timer.
async fn flush_all_pending<K, V>(
    pending: &mut HashMap<K, Pending<V>>,
    output_tx: &mpsc::Sender<(K, V)>,
) where
    K: std::fmt::Debug,
{
    for (key, entry) in pending.drain() {
        entry.timer.abort();
        trace!(key = ?key, "Flushing pending event");
        if let Err(e) = output_tx.send((key, entry.value)).await {
            warn!(error = %e, "Failed to flush pending event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::time::{sleep, timeout};

    fn test_debouncer<K, V>(interval_ms: u64) -> (Debouncer<K, V>, mpsc::Receiver<(K, V)>)
    where
        K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
        V: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(100);
        let debouncer = Debouncer::new(Duration::from_millis(interval_ms), tx);
        (debouncer, rx)
    }

    #[tokio::test]
    async fn test_single_event_emitted_after_interval() {
        let (debouncer, mut rx) = test_debouncer::<String, i32>(50);

        debouncer.send("a.md".to_string(), 42).await.unwrap();

        let (key, value) = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("event within timeout")
            .unwrap();
        assert_eq!(key, "a.md");
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_latest_value_supersedes_earlier_ones() {
        let (debouncer, mut rx) = test_debouncer::<String, i32>(50);

        for i in 0..100 {
            debouncer.send("a.md".to_string(), i).await.unwrap();
        }

        let (_, value) = timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, 99);

        let more = timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(more.is_err(), "superseded values must not be emitted");
    }

    #[tokio::test]
    async fn test_new_event_rearms_timer() {
        let (debouncer, mut rx) = test_debouncer::<String, i32>(100);

        debouncer.send("a.md".to_string(), 1).await.unwrap();
        sleep(Duration::from_millis(60)).await;
        debouncer.send("a.md".to_string(), 2).await.unwrap();
        sleep(Duration::from_millis(60)).await;

        // 120ms after the first send, but only 60ms after the second.
        assert!(rx.try_recv().is_err());

        let (_, value) = timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (debouncer, mut rx) = test_debouncer::<String, i32>(50);

        debouncer.send("a.md".to_string(), 1).await.unwrap();
        debouncer.send("b.md".to_string(), 10).await.unwrap();
        debouncer.send("a.md".to_string(), 2).await.unwrap();
        debouncer.send("b.md".to_string(), 20).await.unwrap();

        let mut received = HashMap::new();
        for _ in 0..2 {
            if let Ok(Some((key, value))) = timeout(Duration::from_millis(500), rx.recv()).await {
                received.insert(key, value);
            }
        }

        assert_eq!(received.len(), 2);
        assert_eq!(received.get("a.md"), Some(&2));
        assert_eq!(received.get("b.md"), Some(&20));
    }

    #[tokio::test]
    async fn test_busy_key_does_not_starve_quiet_key() {
        let (debouncer, mut rx) = test_debouncer::<String, i32>(80);

        debouncer.send("quiet.md".to_string(), 1).await.unwrap();
        for i in 0..6 {
            debouncer.send("busy.md".to_string(), i).await.unwrap();
            sleep(Duration::from_millis(30)).await;
        }

        let (key, _) = timeout(Duration::from_millis(50), rx.recv())
            .await
            .expect("quiet key should already be emitted")
            .unwrap();
        assert_eq!(key, "quiet.md");
    }

    #[tokio::test]
    async fn test_event_not_emitted_before_interval() {
        let (debouncer, mut rx) = test_debouncer::<PathBuf, String>(150);

        debouncer
            .send(PathBuf::from("/n/a.md"), "x".to_string())
            .await
            .unwrap();

        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
        assert!(timeout(Duration::from_millis(500), rx.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_sequential_windows_emit_twice() {
        let (debouncer, mut rx) = test_debouncer::<String, i32>(30);

        debouncer.send("a.md".to_string(), 1).await.unwrap();
        let first = timeout(Duration::from_millis(500), rx.recv()).await.unwrap();
        assert_eq!(first.unwrap().1, 1);

        debouncer.send("a.md".to_string(), 2).await.unwrap();
        let second = timeout(Duration::from_millis(500), rx.recv()).await.unwrap();
        assert_eq!(second.unwrap().1, 2);
    }

    #[tokio::test]
    async fn test_flush_on_drop() {
        let (tx, mut rx) = mpsc::channel(100);
        let debouncer: Debouncer<String, i32> = Debouncer::new(Duration::from_secs(10), tx);

        debouncer.send("a.md".to_string(), 42).await.unwrap();
        drop(debouncer);

        let (key, value) = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("pending events are flushed on close")
            .unwrap();
        assert_eq!(key, "a.md");
        assert_eq!(value, 42);

        // Output closes once the loop has terminated.
        let end = timeout(Duration::from_millis(500), rx.recv()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_default_interval_is_500ms() {
        assert_eq!(DEFAULT_DEBOUNCE_MS, 500);

        let (tx, mut rx) = mpsc::channel(100);
        let debouncer: Debouncer<String, i32> = Debouncer::new(Duration::from_millis(DEFAULT_DEBOUNCE_MS), tx);
        debouncer.send("a.md".to_string(), 1).await.unwrap();

        assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
        assert!(timeout(Duration::from_millis(700), rx.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_output_is_tolerated() {
        let (tx, rx) = mpsc::channel::<(String, i32)>(1);
        let debouncer = Debouncer::new(Duration::from_millis(10), tx);
        drop(rx);

        debouncer.send("a.md".to_string(), 1).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        // The loop logs and keeps accepting input.
        assert!(debouncer.send("a.md".to_string(), 2).await.is_ok());
    }

    #[test]
    fn test_debouncer_error_display() {
        assert_eq!(
            DebouncerError::ChannelClosed.to_string(),
            "debouncer channel closed"
        );
    }
}
