//! Per-role run loops for leaf blocks.
//!
//! One worker thread runs each leaf block. The loops block only on channel
//! sends and receives (and on whatever the user logic itself does); the
//! runtime introduces no other suspension points. End-of-stream is handled
//! uniformly: receiving [`Message::Eos`] or observing a disconnected
//! channel ends the input, and a failed send means the consumer is gone and
//! is treated as end-of-stream at the sender.

use crossbeam_channel::{Receiver, Select, Sender};
use smallvec::SmallVec;

use crate::block::{Data, Logic};
use crate::channels::Message;

/// The channel endpoints bound to one leaf block, keyed by port name.
pub(crate) struct Bindings<D> {
    pub(crate) inputs: SmallVec<[(String, Receiver<Message<D>>); 2]>,
    pub(crate) outputs: SmallVec<[(String, Sender<Message<D>>); 2]>,
}

impl<D> Default for Bindings<D> {
    fn default() -> Self {
        Bindings {
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
        }
    }
}

/// Runs one leaf block to completion.
pub(crate) fn run<D: Data>(path: &str, logic: Logic<D>, bindings: Bindings<D>) {
    match logic {
        Logic::Source(logic) => run_source(logic, &bindings.outputs),
        Logic::Transform(logic) => run_transform(logic, &bindings),
        Logic::Sink(logic) => run_sink(logic, &bindings.inputs),
        Logic::Broadcast => run_broadcast(&bindings),
        Logic::Merge => run_merge(&bindings),
    }
    tracing::debug!(block = %path, "worker finished");
}

/// Sends `value` on every output, cloning for all but the last. Returns
/// false once any consumer has disconnected.
fn emit_all<D: Data>(outputs: &[(String, Sender<Message<D>>)], value: D) -> bool {
    let Some(((_, last), rest)) = outputs.split_last() else {
        return true;
    };
    for (_, sender) in rest {
        if sender.send(Message::Data(value.clone())).is_err() {
            return false;
        }
    }
    last.send(Message::Data(value)).is_ok()
}

/// Sends the end-of-stream marker on every output, ignoring disconnects.
fn emit_eos<D>(outputs: &[(String, Sender<Message<D>>)]) {
    for (_, sender) in outputs {
        let _ = sender.send(Message::Eos);
    }
}

fn run_source<D: Data>(
    mut logic: Box<dyn FnMut() -> Option<D> + Send>,
    outputs: &[(String, Sender<Message<D>>)],
) {
    while let Some(value) = logic() {
        if !emit_all(outputs, value) {
            break;
        }
    }
    emit_eos(outputs);
}

fn run_transform<D: Data>(mut logic: Box<dyn FnMut(D) -> Option<D> + Send>, bindings: &Bindings<D>) {
    debug_assert_eq!(bindings.inputs.len(), 1, "transformers take one input");
    let input = &bindings.inputs[0].1;
    loop {
        match input.recv() {
            Ok(Message::Data(value)) => {
                // `None` is the drop signal: nothing is forwarded.
                if let Some(value) = logic(value) {
                    if !emit_all(&bindings.outputs, value) {
                        break;
                    }
                }
            }
            Ok(Message::Eos) | Err(_) => break,
        }
    }
    emit_eos(&bindings.outputs);
}

fn run_sink<D>(mut logic: Box<dyn FnMut(D) + Send>, inputs: &[(String, Receiver<Message<D>>)]) {
    debug_assert_eq!(inputs.len(), 1, "sinks take one input");
    let input = &inputs[0].1;
    loop {
        match input.recv() {
            Ok(Message::Data(value)) => logic(value),
            Ok(Message::Eos) | Err(_) => break,
        }
    }
}

fn run_broadcast<D: Data>(bindings: &Bindings<D>) {
    debug_assert_eq!(bindings.inputs.len(), 1, "broadcasts take one input");
    let input = &bindings.inputs[0].1;
    loop {
        match input.recv() {
            Ok(Message::Data(value)) => {
                if !emit_all(&bindings.outputs, value) {
                    break;
                }
            }
            Ok(Message::Eos) | Err(_) => break,
        }
    }
    emit_eos(&bindings.outputs);
}

/// Forwards values from every input in arrival order, emitting end-of-stream
/// only once every input has signalled it.
fn run_merge<D: Data>(bindings: &Bindings<D>) {
    debug_assert_eq!(bindings.outputs.len(), 1, "merges have one output");
    let output = &bindings.outputs[0].1;
    let mut select = Select::new();
    for (_, receiver) in &bindings.inputs {
        select.recv(receiver);
    }
    let mut live = bindings.inputs.len();
    'forward: while live > 0 {
        let operation = select.select();
        let index = operation.index();
        match operation.recv(&bindings.inputs[index].1) {
            Ok(Message::Data(value)) => {
                if output.send(Message::Data(value)).is_err() {
                    break 'forward;
                }
            }
            Ok(Message::Eos) | Err(_) => {
                select.remove(index);
                live -= 1;
            }
        }
    }
    emit_eos(&bindings.outputs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::channel;

    #[test]
    fn merge_forwards_everything_before_eos() {
        let (tx_a, rx_a) = channel::<u32>(4);
        let (tx_b, rx_b) = channel::<u32>(4);
        let (tx_out, rx_out) = channel::<u32>(16);

        let bindings = Bindings {
            inputs: smallvec::smallvec![("in0".to_owned(), rx_a), ("in1".to_owned(), rx_b)],
            outputs: smallvec::smallvec![("out".to_owned(), tx_out)],
        };

        tx_a.send(Message::Data(1)).unwrap();
        tx_b.send(Message::Data(10)).unwrap();
        tx_a.send(Message::Data(2)).unwrap();
        tx_a.send(Message::Eos).unwrap();
        tx_b.send(Message::Eos).unwrap();

        run_merge(&bindings);

        let mut received = Vec::new();
        while let Ok(Message::Data(value)) = rx_out.recv() {
            received.push(value);
        }
        received.sort_unstable();
        assert_eq!(received, [1, 2, 10]);
    }

    #[test]
    fn broadcast_copies_to_every_output() {
        let (tx_in, rx_in) = channel::<u32>(4);
        let (tx_a, rx_a) = channel::<u32>(4);
        let (tx_b, rx_b) = channel::<u32>(4);

        let bindings = Bindings {
            inputs: smallvec::smallvec![("in".to_owned(), rx_in)],
            outputs: smallvec::smallvec![("out0".to_owned(), tx_a), ("out1".to_owned(), tx_b)],
        };

        tx_in.send(Message::Data(7)).unwrap();
        tx_in.send(Message::Eos).unwrap();

        run_broadcast(&bindings);

        assert_eq!(rx_a.recv(), Ok(Message::Data(7)));
        assert_eq!(rx_a.recv(), Ok(Message::Eos));
        assert_eq!(rx_b.recv(), Ok(Message::Data(7)));
        assert_eq!(rx_b.recv(), Ok(Message::Eos));
    }

    #[test]
    fn a_disconnected_input_reads_as_end_of_stream() {
        let (tx_in, rx_in) = channel::<u32>(4);
        let (tx_out, rx_out) = channel::<u32>(4);

        tx_in.send(Message::Data(3)).unwrap();
        drop(tx_in);

        let bindings = Bindings {
            inputs: smallvec::smallvec![("in".to_owned(), rx_in)],
            outputs: smallvec::smallvec![("out".to_owned(), tx_out)],
        };
        run_transform(Box::new(|x| Some(x + 1)), &bindings);

        assert_eq!(rx_out.recv(), Ok(Message::Data(4)));
        assert_eq!(rx_out.recv(), Ok(Message::Eos));
    }
}
