use std::collections::VecDeque;

use crossbeam::channel::{self, select};
use tracing::{debug, info};

use crate::error::Fault;
use crate::port::BatchPort;
use crate::program::Program;
use crate::stream::StreamPort;
use crate::vm::{State, Vm, VmConfig};

enum Relay {
    Received(Option<i64>),
    Forwarded(bool),
}

/// Runs one stage per phase setting, in sequence, each stage's first output
/// becoming the next stage's signal. The first stage gets signal 0. A stage
/// that halts without output fails the chain with `NoOutput`.
pub fn run_chain(program: &Program, phases: &[i64]) -> Result<i64, Fault> {
    run_chain_with(program, phases, VmConfig::default())
}

pub fn run_chain_with(program: &Program, phases: &[i64], config: VmConfig) -> Result<i64, Fault> {
    let mut signal = 0;
    for (stage, &phase) in phases.iter().enumerate() {
        let mut vm = Vm::new(program, config);
        let mut port = BatchPort::new([phase, signal]);
        if let State::Faulted(fault) = vm.run(&mut port) {
            return Err(fault);
        }
        signal = *port.outputs().first().ok_or(Fault::NoOutput)?;
        debug!(stage, phase, signal, "stage done");
    }
    info!(?phases, signal, "chain finished");
    Ok(signal)
}

/// Runs every stage on its own thread, wired in a ring: stage `i` feeds
/// stage `i + 1` and the last stage feeds the first. Returns the last value
/// the final stage emitted. The first fault from any stage aborts the
/// whole pipeline.
///
/// Phase settings travel over the same channels the stages talk on, so each
/// stage must read its phase before the stage behind it emits anything;
/// otherwise that early output is taken as the phase.
pub fn run_feedback(program: &Program, phases: &[i64]) -> Result<i64, Fault> {
    run_feedback_with(program, phases, VmConfig::default())
}

pub fn run_feedback_with(
    program: &Program,
    phases: &[i64],
    config: VmConfig,
) -> Result<i64, Fault> {
    if phases.is_empty() {
        return Err(Fault::NoOutput);
    }

    let stages = phases.len();
    let mut inputs = Vec::with_capacity(stages);
    let mut receivers = Vec::with_capacity(stages);
    for _ in 0..stages {
        let (tx, rx) = channel::bounded::<i64>(0);
        inputs.push(tx);
        receivers.push(rx);
    }
    // The last stage reports to the host, which relays into the first stage.
    let (tail_tx, tail_rx) = channel::bounded::<i64>(0);

    let mut handles = Vec::with_capacity(stages);
    for (stage, input) in receivers.into_iter().enumerate() {
        let output = if stage + 1 < stages {
            inputs[stage + 1].clone()
        } else {
            tail_tx.clone()
        };
        let vm = Vm::new(program, config);
        debug!(stage, id = %vm.id(), "stage spawned");
        handles.push(vm.spawn(StreamPort::new(input, output)));
    }
    drop(tail_tx);

    let head = inputs[0].clone();
    let mut delivered = true;
    for (stage, &phase) in phases.iter().enumerate() {
        if inputs[stage].send(phase).is_err() {
            delivered = false;
            break;
        }
    }
    // Only the head sender may stay open, or downstream stages could wait forever.
    drop(inputs);
    if delivered {
        let _ = head.send(0);
    }

    // Relay without ever blocking on the head alone, so a stage that emits
    // several values before reading cannot wedge the ring through the host.
    let mut pending = VecDeque::new();
    let mut head_open = true;
    let mut last = None;
    loop {
        let event = match pending.front() {
            Some(&next) if head_open => select! {
                recv(tail_rx) -> msg => Relay::Received(msg.ok()),
                send(head, next) -> res => Relay::Forwarded(res.is_ok()),
            },
            _ => Relay::Received(tail_rx.recv().ok()),
        };
        match event {
            Relay::Received(Some(value)) => {
                last = Some(value);
                if head_open {
                    pending.push_back(value);
                }
            }
            Relay::Received(None) => break,
            Relay::Forwarded(true) => {
                pending.pop_front();
            }
            Relay::Forwarded(false) => head_open = false,
        }
    }
    drop(head);

    let mut faults = Vec::new();
    for (stage, handle) in handles.into_iter().enumerate() {
        let vm = handle.join().map_err(|_| Fault::Disconnected)?;
        if let State::Faulted(fault) = vm.state() {
            debug!(stage, %fault, "stage faulted");
            faults.push(fault);
        }
    }
    // Hang-ups are knock-on effects; report the stage that actually broke.
    if let Some(fault) = faults
        .iter()
        .find(|f| **f != Fault::Disconnected)
        .or(faults.first())
    {
        return Err(*fault);
    }

    let signal = last.ok_or(Fault::NoOutput)?;
    info!(?phases, signal, "feedback loop finished");
    Ok(signal)
}
