//! Connection session state
//!
//! A session tracks:
//! - Lifecycle (disconnected → open → closed)
//! - Session id offered by the peer's open frame
//! - Frame counters

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::packet::Handshake;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected yet
    Disconnected,
    
    /// Open frame sent, traffic flowing
    Open,
    
    /// Closed; never reopens
    Closed,
}

/// Session handle
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    state: RwLock<SessionState>,
    sid: RwLock<Option<String>>,
    closed: AtomicBool,
    frames_in: AtomicU64,
    frames_out: AtomicU64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: RwLock::new(SessionState::Disconnected),
                sid: RwLock::new(None),
                closed: AtomicBool::new(false),
                frames_in: AtomicU64::new(0),
                frames_out: AtomicU64::new(0),
            }),
        }
    }
    
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }
    
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }
    
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
    
    /// Mark the session open once the open frame is on the wire
    pub fn open(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        
        if *state != SessionState::Disconnected {
            return Err(Error::InvalidSessionState(format!(
                "Cannot open from state: {:?}",
                *state
            )));
        }
        
        *state = SessionState::Open;
        Ok(())
    }
    
    /// Record the parameters of the peer's open frame
    pub fn handshake(&self, handshake: &Handshake) {
        if let Some(sid) = &handshake.sid {
            *self.inner.sid.write() = Some(sid.clone());
        }
    }
    
    /// Session id assigned by the peer, if it sent one
    pub fn sid(&self) -> Option<String> {
        self.inner.sid.read().clone()
    }
    
    /// Note an inbound frame
    pub fn touch(&self) {
        self.inner.frames_in.fetch_add(1, Ordering::Relaxed);
    }
    
    /// Note an outbound frame
    pub fn record_outbound(&self) {
        self.inner.frames_out.fetch_add(1, Ordering::Relaxed);
    }
    
    pub fn frames_in(&self) -> u64 {
        self.inner.frames_in.load(Ordering::Relaxed)
    }
    
    pub fn frames_out(&self) -> u64 {
        self.inner.frames_out.load(Ordering::Relaxed)
    }
    
    /// Close the session
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.inner.state.write() = SessionState::Closed;
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
