//! Message-passing seam between the coordinator and its workers
//!
//! Rank 0 is the coordinator. Every pair of ranks has two logically separate
//! channels so a shutdown notice is never queued behind in-flight results.

use crate::errors::CommError;

/// Logical channel between two ranks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Parameter count, candidates and fitness values
    Main,
    /// Shutdown requests and shutdown reasons
    Control,
}

impl Channel {
    pub(crate) fn index(self) -> usize {
        match self {
            Channel::Main => 0,
            Channel::Control => 1,
        }
    }
}

/// Payloads exchanged between ranks
///
/// Sending moves the payload, so a message in flight can never be modified by
/// its sender.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Number of parameters in every candidate, sent once per worker
    Count(usize),
    /// A candidate to evaluate
    Parameters(Vec<f64>),
    /// Fitness of the oldest candidate the worker received
    Value(f64),
    /// Coordinator asks the worker to stop
    Shutdown,
    /// Worker's reason for stopping
    ShutdownReport(String),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Count(_) => "count",
            Message::Parameters(_) => "parameters",
            Message::Value(_) => "value",
            Message::Shutdown => "shutdown",
            Message::ShutdownReport(_) => "shutdown report",
        }
    }
}

/// Non-blocking point-to-point transport
///
/// Messages from one source on one channel arrive in send order. Blocking
/// receives are written by callers as a poll loop over [`Comm::try_recv`].
pub trait Comm {
    fn rank(&self) -> usize;

    /// Number of ranks, coordinator included
    fn size(&self) -> usize;

    fn send(&self, dest: usize, channel: Channel, message: Message) -> Result<(), CommError>;

    /// Next message from `source` on `channel`, if one has arrived
    fn try_recv(&self, source: usize, channel: Channel) -> Result<Option<Message>, CommError>;
}
