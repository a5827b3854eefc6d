use std::collections::HashMap;
use std::thread;

use crossbeam::channel::{self, select};
use tracing::{debug, warn};

use crate::error::Fault;
use crate::program::Program;
use crate::stream;
use crate::vm::{State, Vm, VmConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tile {
    Empty,
    Wall,
    Block,
    Paddle,
    Ball,
}

impl Tile {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Tile::Empty),
            1 => Some(Tile::Wall),
            2 => Some(Tile::Block),
            3 => Some(Tile::Paddle),
            4 => Some(Tile::Ball),
            _ => None,
        }
    }
}

enum Signal {
    Output(Option<i64>),
    InputWanted(bool),
    Halted(Option<State>),
}

/// Interactive host. The program draws with `(x, y, tile)` triples and
/// reports the score with `(-1, 0, score)`; whenever it asks for input the
/// joystick callback decides the next value.
pub struct Cabinet {
    program: Program,
    config: VmConfig,
    free_play: bool,
    screen: HashMap<Point, Tile>,
    ball: Option<Point>,
    paddle: Option<Point>,
    score: i64,
}

impl Cabinet {
    pub fn new(program: Program) -> Self {
        Self::with_config(program, VmConfig::default())
    }

    pub fn with_config(program: Program, config: VmConfig) -> Self {
        Self {
            program,
            config,
            free_play: false,
            screen: HashMap::new(),
            ball: None,
            paddle: None,
            score: 0,
        }
    }

    /// Writes 2 at address 0 before the game starts.
    pub fn free_play(mut self) -> Self {
        self.free_play = true;
        self
    }

    pub fn screen(&self) -> &HashMap<Point, Tile> {
        &self.screen
    }

    pub fn ball(&self) -> Option<Point> {
        self.ball
    }

    pub fn paddle(&self) -> Option<Point> {
        self.paddle
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn count(&self, tile: Tile) -> usize {
        self.screen.values().filter(|t| **t == tile).count()
    }

    /// Runs one game on a fresh instance. The loop waits on output, input
    /// requests and halt at once; every input request is answered, so the
    /// program never blocks on a value that is not coming.
    pub fn play<F>(&mut self, mut joystick: F) -> Result<State, Fault>
    where
        F: FnMut(&Cabinet) -> i64,
    {
        self.screen.clear();
        self.ball = None;
        self.paddle = None;
        self.score = 0;

        let mut vm = Vm::new(&self.program, self.config);
        if self.free_play {
            vm.poke(0, 2)?;
        }
        let (mut port, link) = stream::pair(true);
        let (halt_tx, halt_rx) = channel::bounded::<State>(1);
        let worker = thread::spawn(move || {
            let state = vm.run(&mut port);
            let _ = halt_tx.send(state);
        });

        let finished = |halt_rx: &channel::Receiver<State>| {
            halt_rx
                .recv()
                .unwrap_or(State::Faulted(Fault::Disconnected))
        };

        let state = loop {
            let signal = select! {
                recv(link.output) -> msg => Signal::Output(msg.ok()),
                recv(link.wanted) -> msg => Signal::InputWanted(msg.is_ok()),
                recv(halt_rx) -> msg => Signal::Halted(msg.ok()),
            };
            match signal {
                Signal::Output(Some(x)) => {
                    let rest = link.output.recv().and_then(|y| Ok((y, link.output.recv()?)));
                    match rest {
                        Ok((y, id)) => self.draw(x, y, id),
                        Err(_) => break finished(&halt_rx),
                    }
                }
                Signal::InputWanted(true) => {
                    let tilt = joystick(&*self);
                    debug!(tilt, ball = ?self.ball, paddle = ?self.paddle, "joystick");
                    if link.input.send(tilt).is_err() {
                        break finished(&halt_rx);
                    }
                }
                Signal::Output(None) | Signal::InputWanted(false) => break finished(&halt_rx),
                Signal::Halted(state) => break state.unwrap_or(State::Faulted(Fault::Disconnected)),
            }
        };

        drop(link);
        let _ = worker.join();
        debug!(score = self.score, blocks = self.count(Tile::Block), ?state, "game over");
        match state {
            State::Faulted(fault) => Err(fault),
            state => Ok(state),
        }
    }

    fn draw(&mut self, x: i64, y: i64, id: i64) {
        if x == -1 && y == 0 {
            self.score = id;
            return;
        }
        let Some(tile) = Tile::from_id(id) else {
            warn!(x, y, id, "unknown tile id");
            return;
        };
        let point = Point::new(x, y);
        self.screen.insert(point, tile);
        match tile {
            Tile::Ball => self.ball = Some(point),
            Tile::Paddle => self.paddle = Some(point),
            _ => {}
        }
    }
}
