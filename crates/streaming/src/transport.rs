use std::collections::BTreeMap;

use serde_json::Value;

/// Identifies an outstanding fetch in a deterministic, stable way.
///
/// Intentionally a small, copyable handle: layers store it across the
/// suspension point and compare it against completions to drop stale ones.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Request(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Aborted,
    Failed { reason: String },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Aborted => write!(f, "request aborted"),
            TransportError::Failed { reason } => write!(f, "request failed: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub type FetchOutcome = Result<Value, TransportError>;

/// Non-blocking document fetch boundary.
///
/// `begin` only starts the request; the host event loop later hands the
/// outcome to whoever holds the matching `Request`. All processing stays on
/// the scene's own execution context.
pub trait Transport {
    fn begin(&mut self, url: &str, req: Request);

    /// Cancels a pending request. Returns `true` if it was still pending;
    /// aborting an unknown or finished request is a no-op.
    fn abort(&mut self, req: Request) -> bool;
}

/// Allocates unique request handles within one execution context.
#[derive(Debug, Default)]
pub struct RequestIds {
    next: u64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Request {
        let req = Request(self.next);
        self.next += 1;
        req
    }
}

/// In-memory transport serving canned documents.
///
/// Deterministic stand-in for HTTP used by the native shell's local mode
/// and by tests: `begin` queues, `take_ready` resolves queued requests
/// against the routed outcomes in submission order.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    routes: BTreeMap<String, FetchOutcome>,
    pending: Vec<(Request, String)>,
    aborted: Vec<Request>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&mut self, url: &str, outcome: FetchOutcome) {
        self.routes.insert(url.to_string(), outcome);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn aborted(&self) -> &[Request] {
        &self.aborted
    }

    /// Resolves every pending request. An unrouted URL fails with a
    /// transport error, mirroring an unreachable host.
    pub fn take_ready(&mut self) -> Vec<(Request, FetchOutcome)> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|(req, url)| {
                let outcome = self.routes.get(&url).cloned().unwrap_or_else(|| {
                    Err(TransportError::Failed {
                        reason: format!("no route for {url}"),
                    })
                });
                (req, outcome)
            })
            .collect()
    }
}

impl Transport for MemoryTransport {
    fn begin(&mut self, url: &str, req: Request) {
        self.pending.push((req, url.to_string()));
    }

    fn abort(&mut self, req: Request) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(r, _)| *r != req);
        if self.pending.len() != before {
            self.aborted.push(req);
            return true;
        }
        false
    }
}
