use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::error::Fault;
use crate::port::Port;

/// Channel-backed port. Input and output are rendezvous channels: a send
/// completes only when the other side receives.
#[derive(Debug)]
pub struct StreamPort {
    input: Receiver<i64>,
    output: Sender<i64>,
    wanted: Option<Sender<()>>,
}

/// Host end of a [`StreamPort`].
#[derive(Debug, Clone)]
pub struct Link {
    pub input: Sender<i64>,
    pub output: Receiver<i64>,
    pub wanted: Receiver<()>,
}

impl StreamPort {
    pub fn new(input: Receiver<i64>, output: Sender<i64>) -> Self {
        Self {
            input,
            output,
            wanted: None,
        }
    }

    pub fn with_signal(mut self, wanted: Sender<()>) -> Self {
        self.wanted = Some(wanted);
        self
    }
}

/// Builds a port and its host end. Without `signal_wanted` the host's
/// `wanted` receiver never delivers.
pub fn pair(signal_wanted: bool) -> (StreamPort, Link) {
    let (input_tx, input_rx) = channel::bounded(0);
    let (output_tx, output_rx) = channel::bounded(0);
    // One slot. A request still waiting in it already tells the host a value is due.
    let (wanted_tx, wanted_rx) = channel::bounded(1);

    let (port, wanted) = if signal_wanted {
        (StreamPort::new(input_rx, output_tx).with_signal(wanted_tx), wanted_rx)
    } else {
        (StreamPort::new(input_rx, output_tx), channel::never())
    };
    let link = Link {
        input: input_tx,
        output: output_rx,
        wanted,
    };
    (port, link)
}

impl Port for StreamPort {
    fn input_wanted(&mut self) -> Result<(), Fault> {
        match &self.wanted {
            Some(tx) => match tx.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => Ok(()),
                Err(TrySendError::Disconnected(())) => Err(Fault::Disconnected),
            },
            None => Ok(()),
        }
    }

    fn input(&mut self) -> Result<Option<i64>, Fault> {
        self.input.recv().map(Some).map_err(|_| Fault::Disconnected)
    }

    fn output(&mut self, value: i64) -> Result<(), Fault> {
        self.output.send(value).map_err(|_| Fault::Disconnected)
    }
}
