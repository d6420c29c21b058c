//! Bounded channels carrying payloads and end-of-stream markers.
//!
//! Each compiled edge becomes one bounded FIFO with exactly one producing
//! port and one consuming port. Bounded capacity is the framework's sole
//! backpressure mechanism: a slow consumer blocks its producer, which
//! transitively throttles everything upstream. Termination flows in-band as
//! [`Message::Eos`]; a disconnected channel is read the same way, which is
//! what lets a failed execution drain (see the worker loops).

use crossbeam_channel::{bounded, Receiver, Sender};

/// The default bounded capacity of an allocated channel.
pub const DEFAULT_CAPACITY: usize = 16;

/// The unit of exchange between blocks: a payload or the terminal marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message<D> {
    /// An ordinary payload.
    Data(D),
    /// The in-band end-of-stream marker; receivers drain and exit.
    Eos,
}

/// Allocates a bounded channel carrying [`Message`]s.
pub(crate) fn channel<D>(capacity: usize) -> (Sender<Message<D>>, Receiver<Message<D>>) {
    bounded(capacity)
}
