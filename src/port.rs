use std::collections::VecDeque;

use crate::error::Fault;

/// The executor's only view of the outside world: take one integer in,
/// publish one integer out. Either side may block.
pub trait Port {
    /// Fired right before an input is taken so interactive hosts know a
    /// value is due now.
    fn input_wanted(&mut self) -> Result<(), Fault> {
        Ok(())
    }

    /// `Ok(None)` means no value is available yet.
    fn input(&mut self) -> Result<Option<i64>, Fault>;

    fn output(&mut self, value: i64) -> Result<(), Fault>;
}

impl<P: Port + ?Sized> Port for &mut P {
    fn input_wanted(&mut self) -> Result<(), Fault> {
        (**self).input_wanted()
    }

    fn input(&mut self) -> Result<Option<i64>, Fault> {
        (**self).input()
    }

    fn output(&mut self, value: i64) -> Result<(), Fault> {
        (**self).output(value)
    }
}

/// Pre-supplied inputs consumed front to back, outputs collected in order.
#[derive(Debug, Clone, Default)]
pub struct BatchPort {
    inputs: VecDeque<i64>,
    outputs: Vec<i64>,
}

impl BatchPort {
    pub fn new<I: IntoIterator<Item = i64>>(inputs: I) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
            outputs: Vec::new(),
        }
    }

    pub fn push_input(&mut self, value: i64) {
        self.inputs.push_back(value);
    }

    pub fn pending_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn outputs(&self) -> &[i64] {
        &self.outputs
    }

    pub fn take_outputs(&mut self) -> Vec<i64> {
        std::mem::take(&mut self.outputs)
    }

    pub fn into_outputs(self) -> Vec<i64> {
        self.outputs
    }
}

impl Port for BatchPort {
    fn input(&mut self) -> Result<Option<i64>, Fault> {
        Ok(self.inputs.pop_front())
    }

    fn output(&mut self, value: i64) -> Result<(), Fault> {
        self.outputs.push(value);
        Ok(())
    }
}
