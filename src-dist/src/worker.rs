//! Worker: evaluates candidates until told to stop
//!
//! The first receive is the only real wait. After that the coordinator keeps
//! the next candidate queued, so each loop is evaluate, send, pick up the
//! next one. Every wait also watches the control channel for a shutdown
//! request.

use std::thread;
use std::time::Duration;

use ndarray::Array1;

use fitpop_env::SignalHandler;

use crate::comm::{Channel, Comm, Message};
use crate::errors::{CommError, WorkerError};

/// Rank the workers report to
pub const COORDINATOR: usize = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Sleep between polls while waiting for a message
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_micros(100),
        }
    }
}

/// How a worker's loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerExit {
    /// Stopped on request
    Shutdown,
    /// Stopped on an error, with the reason sent to the coordinator
    Failed(String),
}

impl WorkerExit {
    /// Text sent to the coordinator
    pub fn reason(&self) -> &str {
        match self {
            WorkerExit::Shutdown => "shutdown",
            WorkerExit::Failed(reason) => reason,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, WorkerExit::Shutdown)
    }
}

pub struct Worker<C, F>
where
    C: Comm,
    F: FnMut(&Array1<f64>) -> f64,
{
    comm: C,
    evaluator: F,
    config: WorkerConfig,
    signals: SignalHandler,
    num_evaluations: usize,
}

impl<C, F> Worker<C, F>
where
    C: Comm,
    F: FnMut(&Array1<f64>) -> f64,
{
    pub fn new(comm: C, evaluator: F, config: WorkerConfig) -> Self {
        Self {
            comm,
            evaluator,
            config,
            signals: SignalHandler::detached(),
            num_evaluations: 0,
        }
    }

    /// Poll `signals` while waiting; by default only the coordinator does
    pub fn with_signal_handler(mut self, signals: SignalHandler) -> Self {
        self.signals = signals;
        self
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn num_evaluations(&self) -> usize {
        self.num_evaluations
    }

    /// Serve candidates until shutdown or failure, then report the reason to
    /// the coordinator
    pub fn run(&mut self) -> WorkerExit {
        let exit = match self.serve() {
            Ok(()) => WorkerExit::Shutdown,
            Err(e) => {
                log::error!("worker {}: {e}", self.rank());
                WorkerExit::Failed(e.to_string())
            }
        };
        let report = Message::ShutdownReport(exit.reason().to_string());
        if let Err(e) = self.comm.send(COORDINATOR, Channel::Control, report) {
            log::debug!("worker {}: shutdown report not delivered: {e}", self.rank());
        }
        exit
    }

    fn serve(&mut self) -> Result<(), WorkerError> {
        let num_parameters = match self.wait()? {
            None => return Ok(()),
            Some(Message::Count(0)) => return Err(WorkerError::Protocol("parameter count is zero".into())),
            Some(Message::Count(n)) => n,
            Some(other) => return Err(unexpected("count", &other)),
        };
        let Some(mut parameters) = self.next_parameters(num_parameters)? else {
            return Ok(());
        };
        loop {
            let value = (self.evaluator)(&parameters);
            if value.is_nan() {
                return Err(WorkerError::NanValue {
                    parameters: parameters.to_vec(),
                });
            }
            self.num_evaluations += 1;
            self.comm.send(COORDINATOR, Channel::Main, Message::Value(value))?;
            match self.next_parameters(num_parameters)? {
                Some(next) => parameters = next,
                None => return Ok(()),
            }
        }
    }

    fn next_parameters(&mut self, num_parameters: usize) -> Result<Option<Array1<f64>>, WorkerError> {
        match self.wait()? {
            None => Ok(None),
            Some(Message::Parameters(values)) if values.len() == num_parameters => {
                Ok(Some(Array1::from(values)))
            }
            Some(Message::Parameters(values)) => Err(WorkerError::Protocol(format!(
                "expected {num_parameters} parameters, received {}",
                values.len()
            ))),
            Some(other) => Err(unexpected("parameters", &other)),
        }
    }

    /// Next message from the coordinator, or `None` once shutdown is
    /// requested
    fn wait(&mut self) -> Result<Option<Message>, WorkerError> {
        loop {
            if self.shutdown_requested()? {
                return Ok(None);
            }
            self.signals.check()?;
            if let Some(message) = self.comm.try_recv(COORDINATOR, Channel::Main)? {
                return Ok(Some(message));
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    fn shutdown_requested(&self) -> Result<bool, WorkerError> {
        match self.comm.try_recv(COORDINATOR, Channel::Control)? {
            None => Ok(false),
            Some(Message::Shutdown) => Ok(true),
            Some(other) => Err(unexpected("shutdown", &other)),
        }
    }
}

fn unexpected(expected: &'static str, found: &Message) -> WorkerError {
    WorkerError::Comm(CommError::Unexpected {
        rank: COORDINATOR,
        expected,
        found: found.kind().to_string(),
    })
}
