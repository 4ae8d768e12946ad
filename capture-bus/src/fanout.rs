use std::{
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Registry of consumer streams. Every dispatched chunk is copied to each of them.
///
/// Clones share the same registry.
#[derive(Clone, Default)]
pub struct FanOut {
    consumers: Arc<Mutex<Vec<UnboundedSender<Bytes>>>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a consumer that receives every chunk dispatched from now on.
    pub fn register(&self) -> ConsumerStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        ConsumerStream { inner: rx }
    }

    /// Pushes `chunk` to every registered consumer.
    ///
    /// Consumers whose stream was dropped are forgotten.
    pub fn dispatch(&self, chunk: &Bytes) {
        let snapshot: Vec<UnboundedSender<Bytes>> = self.lock().clone();
        let mut gone = 0;
        for consumer in &snapshot {
            if consumer.send(chunk.clone()).is_err() {
                gone += 1;
            }
        }
        if gone > 0 {
            log::debug!("fanout: dropping {} closed consumer(s)", gone);
            self.lock().retain(|c| !c.is_closed());
        }
    }

    /// Ends every registered stream and empties the registry.
    pub fn close_all(&self) -> usize {
        let closed = std::mem::take(&mut *self.lock());
        closed.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UnboundedSender<Bytes>>> {
        // The vec stays consistent even if a holder panicked.
        self.consumers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Raw byte chunks from the capture process. Yields `None` once the session stops.
pub struct ConsumerStream {
    inner: UnboundedReceiver<Bytes>,
}

impl ConsumerStream {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inner.recv().await
    }
}

impl Stream for ConsumerStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_recv(cx)
    }
}

#[cfg(test)]
#[path = "fanout_test.rs"]
mod fanout_test;
