use crossbeam::channel::select;
use tracing::{debug, trace};

use crate::error::Fault;
use crate::program::Program;
use crate::stream;
use crate::vm::{State, Vm, VmConfig};

enum Exchange {
    Sent(bool),
    Replied(Option<i64>),
}

/// Beam probe. Every reading runs a brand-new instance of the program: the
/// drone program halts after one answer and cannot be reused.
pub struct Drone {
    program: Program,
    config: VmConfig,
}

impl Drone {
    pub fn new(program: Program) -> Self {
        Self::with_config(program, VmConfig::default())
    }

    pub fn with_config(program: Program, config: VmConfig) -> Self {
        Self { program, config }
    }

    /// Sends `x` then `y`; the single reply is 1 inside the beam. A program
    /// that answers after reading only `x` is taken at its word.
    pub fn probe(&self, x: i64, y: i64) -> Result<bool, Fault> {
        let (port, link) = stream::pair(false);
        let handle = Vm::new(&self.program, self.config).spawn(port);

        let reading = match link.input.send(x) {
            Err(_) => None,
            Ok(()) => {
                let exchange = select! {
                    send(link.input, y) -> res => Exchange::Sent(res.is_ok()),
                    recv(link.output) -> msg => Exchange::Replied(msg.ok()),
                };
                match exchange {
                    Exchange::Sent(true) => link.output.recv().ok(),
                    Exchange::Sent(false) => None,
                    Exchange::Replied(value) => value,
                }
            }
        };
        drop(link);

        let vm = handle.join().map_err(|_| Fault::Disconnected)?;
        trace!(x, y, ?reading, state = ?vm.state(), "probe");
        match (reading, vm.state()) {
            (_, State::Faulted(fault)) if fault != Fault::Disconnected => Err(fault),
            (Some(value), _) => Ok(value == 1),
            (None, State::Faulted(fault)) => Err(fault),
            (None, _) => Err(Fault::Disconnected),
        }
    }

    /// Number of cells in `[0, width) x [0, height)` that the beam reaches.
    pub fn scan(&self, width: i64, height: i64) -> Result<usize, Fault> {
        let mut affected = 0;
        for y in 0..height {
            for x in 0..width {
                if self.probe(x, y)? {
                    affected += 1;
                }
            }
        }
        debug!(width, height, affected, "scan finished");
        Ok(affected)
    }
}
