use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::domains::message::BtpPacketData;
use crate::error::{BtpError, Result};

type Outcome = Result<BtpPacketData>;

struct Waiter {
    token: u64,
    respond_to: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct Inner {
    calls: Mutex<HashMap<u32, Waiter>>,
    next_token: AtomicU64,
}

/// Outstanding outbound calls keyed by request id. Every entry leaves the map
/// exactly once: on a Response, an Error, its deadline, or its handle being
/// dropped.
#[derive(Clone, Default)]
pub struct PendingCalls {
    inner: Arc<Inner>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call and fixes its deadline immediately, before anything
    /// is written for it.
    pub fn register(&self, request_id: u32, timeout: Duration) -> Result<PendingCall> {
        let deadline = Instant::now() + timeout;
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let (respond_to, rx) = oneshot::channel();

        let mut calls = self.lock();
        if calls.contains_key(&request_id) {
            return Err(BtpError::DuplicateRequestId(request_id));
        }
        calls.insert(request_id, Waiter { token, respond_to });
        drop(calls);

        Ok(PendingCall {
            request_id,
            token,
            deadline,
            rx,
            registry: self.clone(),
        })
    }

    pub fn resolve(&self, request_id: u32, data: BtpPacketData) -> bool {
        self.complete(request_id, Ok(data))
    }

    pub fn fail(&self, request_id: u32, data: BtpPacketData) -> bool {
        let err = match data.error {
            Some(info) => BtpError::Remote {
                code: info.code,
                name: info.name,
                data: info.data,
            },
            None => BtpError::Remote {
                code: String::new(),
                name: String::new(),
                data: String::new(),
            },
        };
        self.complete(request_id, Err(err))
    }

    pub fn contains(&self, request_id: u32) -> bool {
        self.lock().contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn complete(&self, request_id: u32, outcome: Outcome) -> bool {
        let waiter = self.lock().remove(&request_id);
        match waiter {
            Some(waiter) => {
                if waiter.respond_to.send(outcome).is_err() {
                    tracing::debug!(request_id, "caller stopped waiting before completion");
                    return false;
                }
                true
            }
            None => {
                tracing::debug!(request_id, "no pending call for completion, dropping it");
                false
            }
        }
    }

    fn forget(&self, request_id: u32, token: u64) {
        let mut calls = self.lock();
        if calls.get(&request_id).is_some_and(|w| w.token == token) {
            calls.remove(&request_id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Waiter>> {
        self.inner
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct PendingCall {
    request_id: u32,
    token: u64,
    deadline: Instant,
    rx: oneshot::Receiver<Outcome>,
    registry: PendingCalls,
}

impl PendingCall {
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Resolves with the first of: the peer's Response, the peer's Error, or
    /// `Timeout` once the deadline passes.
    pub async fn wait(mut self) -> Result<BtpPacketData> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BtpError::Runtime(format!(
                "pending call {} was dropped",
                self.request_id
            ))),
            Err(_) => {
                tracing::debug!(request_id = self.request_id, "pending call timed out");
                Err(BtpError::Timeout(self.request_id))
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.registry.forget(self.request_id, self.token);
    }
}
