use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;

/// The scheduler's second execution context. Created suspended; resumed at
/// most once per host frame; runs until it yields or its body returns.
pub trait Coroutine: Send {
  /// Resume until the next yield. Returns false once the body has returned.
  fn resume(&mut self) -> bool;
  /// Drive the coroutine to completion and reclaim its resources. The body
  /// is expected to observe its stop flag and exit; this only loops resume.
  fn stop_and_join(&mut self);
}

/// Strategy for creating the coroutine; one implementation per backend,
/// selected and owned at engine construction.
pub trait CoroutineBackend {
  fn spawn(&self, name: &str, body: Box<dyn FnOnce(&Yielder) + Send>) -> Box<dyn Coroutine>;
}

enum CoroEvent {
  Yielded,
  Finished,
}

/// Hand-off endpoint given to the coroutine body; `yield_now` blocks the
/// body until the host resumes it.
pub struct Yielder {
  event_tx: Sender<CoroEvent>,
  resume_rx: Receiver<()>,
}

impl Yielder {
  pub fn yield_now(&self) {
    // If the host side is gone the engine is being torn down; parking the
    // body forever would leak the thread, so unwind instead.
    self.event_tx.send(CoroEvent::Yielded).expect("coroutine host vanished");
    self.resume_rx.recv().expect("coroutine host vanished");
  }
}

/// OS-thread coroutine gated by a two-channel hand-off. The host thread and
/// the body never run concurrently: `resume` blocks until the body yields.
pub struct ThreadCoroutine {
  resume_tx: Sender<()>,
  event_rx: Receiver<CoroEvent>,
  handle: Option<JoinHandle<()>>,
  finished: bool,
}

impl Coroutine for ThreadCoroutine {
  fn resume(&mut self) -> bool {
    if self.finished {
      return false;
    }
    if self.resume_tx.send(()).is_err() {
      self.finished = true;
      self.join();
      return false;
    }
    match self.event_rx.recv() {
      Ok(CoroEvent::Yielded) => true,
      Ok(CoroEvent::Finished) | Err(_) => {
        self.finished = true;
        self.join();
        false
      },
    }
  }

  fn stop_and_join(&mut self) {
    while self.resume() {}
  }
}

impl ThreadCoroutine {
  fn join(&mut self) {
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

impl Drop for ThreadCoroutine {
  fn drop(&mut self) {
    // Dropping resume_tx unblocks a body stuck in yield_now; it unwinds and
    // the join below reaps the thread.
    let (tx, _rx) = channel();
    drop(std::mem::replace(&mut self.resume_tx, tx));
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

#[derive(Debug, Default)]
pub struct ThreadCoroutineBackend;

impl CoroutineBackend for ThreadCoroutineBackend {
  fn spawn(&self, name: &str, body: Box<dyn FnOnce(&Yielder) + Send>) -> Box<dyn Coroutine> {
    let (event_tx, event_rx) = channel();
    let (resume_tx, resume_rx) = channel();
    let yielder = Yielder { event_tx, resume_rx };
    let handle = std::thread::Builder::new()
      .name(name.to_string())
      .spawn(move || {
        // Created suspended: wait for the first resume before running.
        if yielder.resume_rx.recv().is_err() {
          return;
        }
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(&yielder)));
        if result.is_err() {
          tracing::error!("test coroutine unwound");
        }
        let _ = yielder.event_tx.send(CoroEvent::Finished);
      })
      .expect("failed to spawn coroutine thread");
    Box::new(ThreadCoroutine { resume_tx, event_rx, handle: Some(handle), finished: false })
  }
}
