//! Main-context executor.
//!
//! Everything gate-shaped runs serialized on one designated context, the
//! way an editor pins engine access to its game thread. Socket threads
//! enqueue a closure and block until the result posts back. Remote
//! enforcement updates are the one deliberate exception; they go straight
//! to the policy store's mutex from the socket thread.

use crate::core::error::BridgeError;
use std::sync::mpsc;

type Job = Box<dyn FnOnce() + Send>;

pub struct MainLoop {
    receiver: mpsc::Receiver<Job>,
}

#[derive(Clone)]
pub struct MainLoopHandle {
    sender: mpsc::Sender<Job>,
}

impl MainLoop {
    pub fn new() -> (Self, MainLoopHandle) {
        let (sender, receiver) = mpsc::channel();
        (Self { receiver }, MainLoopHandle { sender })
    }

    /// Process jobs until every handle is dropped.
    pub fn run(self) {
        while let Ok(job) = self.receiver.recv() {
            job();
        }
    }
}

impl MainLoopHandle {
    /// Run a closure on the main context and block until it completes.
    pub fn call<R, F>(&self, f: F) -> Result<R, BridgeError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (reply, result) = mpsc::channel();
        self.sender
            .send(Box::new(move || {
                let _ = reply.send(f());
            }))
            .map_err(|_| BridgeError::Shutdown("main context is gone".to_string()))?;
        result
            .recv()
            .map_err(|_| BridgeError::Shutdown("main context dropped the job".to_string()))
    }
}
