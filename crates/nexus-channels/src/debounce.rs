//! Key-partitioned inbound debouncer.
//!
//! Rapid bursts of items sharing a key coalesce into one batched callback:
//! each enqueue resets the key's timer, so a steady stream with gaps shorter
//! than the debounce window flushes exactly once, in enqueue order. Keys are
//! independent — each has its own buffer and timer. The flush callback runs
//! outside the buffer lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::ChannelError;

/// Receiving side of a debouncer: keys items, accepts flushed batches.
///
/// `on_flush` errors are routed to `on_error` and never re-raised — by the
/// time a batch flushes, the enqueue that created it has long returned.
#[async_trait]
pub trait DebounceSink<T: Send + 'static>: Send + Sync {
    /// Partition key for an item. Items with equal keys batch together; an
    /// empty key bypasses buffering entirely.
    fn key_for(&self, _item: &T) -> String {
        "default".to_string()
    }

    /// Whether this item may be buffered at all. Items answering `false`
    /// flush immediately (after any buffered predecessors on their key).
    fn should_debounce(&self, _item: &T) -> bool {
        true
    }

    /// Called with each flushed batch, in enqueue order within a key.
    async fn on_flush(&self, items: &[T]) -> Result<(), ChannelError>;

    /// Called when `on_flush` fails, with the failed batch.
    async fn on_error(&self, _error: ChannelError, _items: Vec<T>) {}
}

struct Buffer<T> {
    items: Vec<T>,
    /// Guards against a stale timer flushing a newer buffer: the timer only
    /// fires for the generation it was armed with.
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner<T> {
    debounce: Duration,
    sink: Arc<dyn DebounceSink<T>>,
    buffers: Mutex<HashMap<String, Buffer<T>>>,
    generation: AtomicU64,
    stopped: AtomicBool,
}

/// Generic debouncer over items of type `T`.
pub struct Debouncer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(debounce_ms: u64, sink: Arc<dyn DebounceSink<T>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                debounce: Duration::from_millis(debounce_ms),
                sink,
                buffers: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Add an item. Buffered items flush when their key's timer expires;
    /// unbufferable items (zero debounce, vetoed by the sink, or empty key)
    /// flush immediately, preceded by whatever is already buffered on their
    /// key so ordering holds.
    pub async fn enqueue(&self, item: T) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }

        let key = self.inner.sink.key_for(&item);
        let can_debounce =
            !self.inner.debounce.is_zero() && self.inner.sink.should_debounce(&item);

        if !can_debounce || key.is_empty() {
            let existing = {
                let mut buffers = self.inner.buffers.lock().unwrap();
                buffers.remove(&key)
            };
            if let Some(buffer) = existing {
                buffer.timer.abort();
                Inner::deliver(&self.inner, buffer.items).await;
            }
            Inner::deliver(&self.inner, vec![item]).await;
            return;
        }

        let mut buffers = self.inner.buffers.lock().unwrap();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let timer = Inner::arm_timer(self.inner.clone(), key.clone(), generation);
        match buffers.get_mut(&key) {
            Some(buffer) => {
                buffer.timer.abort();
                buffer.items.push(item);
                buffer.generation = generation;
                buffer.timer = timer;
            }
            None => {
                buffers.insert(
                    key,
                    Buffer {
                        items: vec![item],
                        generation,
                        timer,
                    },
                );
            }
        }
    }

    /// Flush a key's buffer now, cancelling its pending timer. Unknown or
    /// empty buffers do nothing.
    pub async fn flush_key(&self, key: &str) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        let buffer = {
            let mut buffers = self.inner.buffers.lock().unwrap();
            buffers.remove(key)
        };
        if let Some(buffer) = buffer {
            buffer.timer.abort();
            Inner::deliver(&self.inner, buffer.items).await;
        }
    }

    /// Drop all buffers and timers. Buffered items are discarded; later
    /// `enqueue`/`flush_key` calls are no-ops.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let drained: Vec<Buffer<T>> = {
            let mut buffers = self.inner.buffers.lock().unwrap();
            buffers.drain().map(|(_, b)| b).collect()
        };
        for buffer in drained {
            buffer.timer.abort();
        }
    }

    /// Number of keys with a pending buffer (diagnostics).
    pub fn pending_keys(&self) -> usize {
        self.inner.buffers.lock().unwrap().len()
    }
}

impl<T: Send + 'static> Inner<T> {
    /// Spawn the flush timer for `(key, generation)`. The timer removes the
    /// buffer itself only when the generation still matches — a newer
    /// enqueue supersedes it — and never aborts its own task handle.
    fn arm_timer(inner: Arc<Self>, key: String, generation: u64) -> JoinHandle<()> {
        let delay = inner.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let items = {
                let mut buffers = inner.buffers.lock().unwrap();
                match buffers.get(&key) {
                    Some(buffer) if buffer.generation == generation => {
                        buffers.remove(&key).map(|b| b.items)
                    }
                    _ => None,
                }
            };
            if let Some(items) = items {
                Inner::deliver(&inner, items).await;
            }
        })
    }

    async fn deliver(inner: &Arc<Self>, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        if let Err(e) = inner.sink.on_flush(&items).await {
            warn!(error = %e, count = items.len(), "debounce flush failed");
            inner.sink.on_error(e, items).await;
        }
    }
}
