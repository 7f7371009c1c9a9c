//! Serialized event queue.
//!
//! Connection threads never touch the monitor directly: each request is sent
//! to one consumer thread, which applies requests strictly in arrival order
//! and answers on a per-request reply channel.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use hallmonitor_daemon_protocol::{Request, Response};

pub const REPLY_TIMEOUT_SECS: u64 = 5;

struct Job {
    request: Request,
    reply: mpsc::Sender<Response>,
}

#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<Job>,
}

impl EventQueue {
    /// Starts the consumer thread running `handler` for every request.
    /// The handler is owned by that one thread, so it may keep state.
    pub fn spawn<F>(mut handler: F) -> std::io::Result<Self>
    where
        F: FnMut(Request) -> Response + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name("hall-event-queue".to_string())
            .spawn(move || {
                for job in rx {
                    let response = handler(job.request);
                    // The connection may have timed out and gone away.
                    let _ = job.reply.send(response);
                }
            })?;
        Ok(Self { tx })
    }

    /// Enqueues `request` and waits for its response.
    pub fn dispatch(&self, request: Request) -> Response {
        let id = request.id.clone();
        let (reply_tx, reply_rx) = mpsc::channel();
        if self
            .tx
            .send(Job {
                request,
                reply: reply_tx,
            })
            .is_err()
        {
            return Response::error(id, "queue_closed", "event queue is not running");
        }

        match reply_rx.recv_timeout(Duration::from_secs(REPLY_TIMEOUT_SECS)) {
            Ok(response) => response,
            Err(_) => Response::error(id, "queue_timeout", "event queue did not answer in time"),
        }
    }
}
