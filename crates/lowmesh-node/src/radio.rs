//! Radio driver boundary.
//!
//! The stack calls [`RadioDriver::transmit`] and is fed received frames as
//! [`RxFrame`]s; the driver owning the hardware is an external collaborator.
//! The drivers here are the in-process ones used by tests and the binary.

use std::collections::VecDeque;

use lowmesh_core::Channel;
use tokio::sync::mpsc;

/// Transmit failures reported by a driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RadioError {
    #[error("channel busy")]
    ChannelBusy,
    #[error("no acknowledgement")]
    NoAck,
    #[error("radio down: {0}")]
    Down(String),
}

impl RadioError {
    /// Busy channels and missing acks are link noise and worth another try.
    pub fn is_retriable(&self) -> bool {
        matches!(self, RadioError::ChannelBusy | RadioError::NoAck)
    }
}

pub trait RadioDriver: Send {
    /// Put one MAC frame on the air on `channel`. Returns once the driver
    /// knows whether a unicast frame was acknowledged.
    fn transmit(&mut self, frame: &[u8], channel: Channel) -> Result<(), RadioError>;
}

/// A frame handed over by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    pub bytes: Vec<u8>,
    pub channel: Channel,
}

// ---------------------------------------------------------------------------
// In-process drivers
// ---------------------------------------------------------------------------

/// Records every transmitted frame. Queued failures are returned, one per
/// attempt, before anything is recorded.
#[derive(Debug, Default)]
pub struct MemoryRadio {
    sent: Vec<RxFrame>,
    failures: VecDeque<RadioError>,
    attempts: usize,
}

impl MemoryRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next transmit attempt with `err`.
    pub fn fail_next(&mut self, err: RadioError) {
        self.failures.push_back(err);
    }

    /// Frames sent since the last call.
    pub fn take_sent(&mut self) -> Vec<RxFrame> {
        std::mem::take(&mut self.sent)
    }

    pub fn sent(&self) -> &[RxFrame] {
        &self.sent
    }

    /// Transmit calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

impl RadioDriver for MemoryRadio {
    fn transmit(&mut self, frame: &[u8], channel: Channel) -> Result<(), RadioError> {
        self.attempts += 1;
        if let Some(err) = self.failures.pop_front() {
            return Err(err);
        }
        self.sent.push(RxFrame {
            bytes: frame.to_vec(),
            channel,
        });
        Ok(())
    }
}

/// Accepts and drops every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRadio;

impl RadioDriver for NullRadio {
    fn transmit(&mut self, frame: &[u8], channel: Channel) -> Result<(), RadioError> {
        tracing::trace!(len = frame.len(), %channel, "radio: null transmit");
        Ok(())
    }
}

/// Delivers frames straight into another interface's receive queue.
#[derive(Debug, Clone)]
pub struct LoopbackRadio {
    peer: mpsc::Sender<RxFrame>,
}

impl LoopbackRadio {
    pub fn new(peer: mpsc::Sender<RxFrame>) -> Self {
        Self { peer }
    }
}

impl RadioDriver for LoopbackRadio {
    fn transmit(&mut self, frame: &[u8], channel: Channel) -> Result<(), RadioError> {
        let rx = RxFrame {
            bytes: frame.to_vec(),
            channel,
        };
        match self.peer.try_send(rx) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(RadioError::ChannelBusy),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RadioError::Down("loopback peer closed".into())),
        }
    }
}
