//! Coordinator: streams candidates to workers and folds results back in
//!
//! Each worker owns a small ring of in-flight slots. Per scheduling tick the
//! coordinator polls the oldest slot of one worker without blocking; a
//! finished slot is folded into the population and immediately refilled with
//! a new candidate. Results fold in completion order. Slots stay in flight
//! across generations, so every worker always has work queued.

use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use fitpop_de::{ParameterSet, Population, PopulationError, PopulationEvaluator};

use crate::comm::{Channel, Comm, Message};
use crate::errors::CommError;

/// Scheduling and shutdown settings
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Candidates kept in flight per worker
    pub slots_per_worker: usize,
    /// Sleep between scheduling rounds at start up
    pub initial_sleep: Duration,
    pub min_sleep: Duration,
    pub max_sleep: Duration,
    /// Sleep multiplier after a round without any result
    pub backoff_growth: f64,
    /// Sleep multiplier after a round with results
    pub backoff_decay: f64,
    /// Shutdown acknowledgements are awaited `sleep * workers * factor`
    pub shutdown_wait_factor: f64,
    pub min_shutdown_wait: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            slots_per_worker: 2,
            initial_sleep: Duration::from_micros(100),
            min_sleep: Duration::from_micros(1),
            max_sleep: Duration::from_millis(10),
            backoff_growth: 1.01,
            backoff_decay: 0.95,
            shutdown_wait_factor: 1000.0,
            min_shutdown_wait: Duration::from_millis(200),
        }
    }
}

/// What happened when the workers were told to stop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    /// Some worker never acknowledged; the owner of the job must abort it
    pub needs_abort: bool,
    /// Ranks that did not acknowledge in time
    pub unresponsive: Vec<usize>,
    /// Shutdown reason reported by each rank that answered
    pub reasons: Vec<(usize, String)>,
}

struct WorkerSlots {
    rank: usize,
    /// Candidates sent and not yet answered; `None` is an idle slot
    ring: Vec<Option<ParameterSet>>,
    next: usize,
    retired: Option<String>,
}

impl WorkerSlots {
    fn new(rank: usize, slots: usize) -> Self {
        Self {
            rank,
            ring: vec![None; slots],
            next: 0,
            retired: None,
        }
    }
}

pub struct Coordinator<C: Comm> {
    comm: C,
    config: CoordinatorConfig,
    rng: StdRng,
    workers: Vec<WorkerSlots>,
    assign: usize,
    sleep: Duration,
    last_num_evaluations: usize,
    first_eval: bool,
    report: Option<CleanupReport>,
}

fn comm_error(e: CommError) -> PopulationError {
    PopulationError::Evaluator(e.to_string())
}

/// Reason left behind by a worker whose endpoint is gone
fn departure_reason<C: Comm>(comm: &C, rank: usize) -> String {
    match comm.try_recv(rank, Channel::Control) {
        Ok(Some(Message::ShutdownReport(reason))) => reason,
        _ => "disconnected".to_string(),
    }
}

impl<C: Comm> Coordinator<C> {
    /// Coordinator over every other rank of `comm`; `seed` makes candidate
    /// generation reproducible
    pub fn new(comm: C, config: CoordinatorConfig, seed: Option<u64>) -> Self {
        let slots = config.slots_per_worker.max(1);
        let workers = (0..comm.size())
            .filter(|&rank| rank != comm.rank())
            .map(|rank| WorkerSlots::new(rank, slots))
            .collect();
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            sleep: config.initial_sleep,
            comm,
            config,
            rng,
            workers,
            assign: 0,
            last_num_evaluations: 0,
            first_eval: true,
            report: None,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Workers still taking candidates
    pub fn num_active_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.retired.is_none()).count()
    }

    /// Current sleep between scheduling rounds
    pub fn sleep_time(&self) -> Duration {
        self.sleep
    }

    /// Report of the last shutdown, once [`PopulationEvaluator::cleanup`] ran
    pub fn cleanup_report(&self) -> Option<&CleanupReport> {
        self.report.as_ref()
    }

    /// Tell every worker how long candidates are
    fn announce(&mut self, num_parameters: usize) -> Result<(), PopulationError> {
        for worker in &mut self.workers {
            match self
                .comm
                .send(worker.rank, Channel::Main, Message::Count(num_parameters))
            {
                Ok(()) => {}
                Err(CommError::Disconnected(rank)) => {
                    let reason = departure_reason(&self.comm, rank);
                    Self::retire(worker, reason);
                }
                Err(e) => return Err(comm_error(e)),
            }
        }
        self.last_num_evaluations = 0;
        self.assign = 0;
        Ok(())
    }

    /// Service the oldest slot of the current worker if its result is in
    fn assign_next(&mut self, population: &mut Population) -> Result<(), PopulationError> {
        let worker = &mut self.workers[self.assign];
        if worker.retired.is_some() {
            return Ok(());
        }
        let rank = worker.rank;
        let slot = worker.next;

        if worker.ring[slot].is_some() {
            match self.comm.try_recv(rank, Channel::Main) {
                Ok(None) => return Ok(()),
                Ok(Some(Message::Value(value))) => {
                    if let Some(mut set) = worker.ring[slot].take() {
                        set.value = value;
                        population.fold_in(set)?;
                    }
                }
                Ok(Some(other)) => {
                    return Err(comm_error(CommError::Unexpected {
                        rank,
                        expected: "value",
                        found: other.kind().to_string(),
                    }));
                }
                Err(CommError::Disconnected(_)) => {
                    Self::retire(worker, departure_reason(&self.comm, rank));
                    return Ok(());
                }
                Err(e) => return Err(comm_error(e)),
            }
        }

        let set = population.next_candidate(&mut self.rng)?;
        match self
            .comm
            .send(rank, Channel::Main, Message::Parameters(set.parameters.to_vec()))
        {
            Ok(()) => {}
            Err(CommError::Disconnected(_)) => {
                Self::retire(worker, departure_reason(&self.comm, rank));
                return Ok(());
            }
            Err(e) => return Err(comm_error(e)),
        }
        worker.ring[slot] = Some(set);
        worker.next = (slot + 1) % worker.ring.len();
        Ok(())
    }

    fn retire(worker: &mut WorkerSlots, reason: String) {
        log::warn!("worker {} stopped: {reason}", worker.rank);
        worker.ring.iter_mut().for_each(|slot| *slot = None);
        worker.retired = Some(reason);
    }

    /// Pick up shutdown reports sent by workers that stopped on their own
    fn poll_control(&mut self) -> Result<(), PopulationError> {
        for worker in self.workers.iter_mut().filter(|w| w.retired.is_none()) {
            match self.comm.try_recv(worker.rank, Channel::Control) {
                Ok(Some(Message::ShutdownReport(reason))) => Self::retire(worker, reason),
                Ok(_) => {}
                Err(CommError::Disconnected(_)) => Self::retire(worker, "disconnected".into()),
                Err(e) => return Err(comm_error(e)),
            }
        }
        Ok(())
    }

    /// Move to the next worker; after a full round poll signals and back off
    fn cycle(&mut self, population: &Population) -> Result<(), PopulationError> {
        self.assign += 1;
        if self.assign < self.workers.len() {
            return Ok(());
        }
        self.assign = 0;
        population.check_signals()?;
        self.poll_control()?;
        if self.num_active_workers() == 0 {
            let reasons: Vec<String> = self
                .workers
                .iter()
                .map(|w| format!("{}: {}", w.rank, w.retired.as_deref().unwrap_or("")))
                .collect();
            return Err(PopulationError::Evaluator(format!(
                "no workers left ({})",
                reasons.join("; ")
            )));
        }

        let factor = if population.num_evaluations() == self.last_num_evaluations {
            self.config.backoff_growth
        } else {
            self.config.backoff_decay
        };
        self.sleep = self
            .sleep
            .mul_f64(factor)
            .clamp(self.config.min_sleep, self.config.max_sleep);
        thread::sleep(self.sleep);
        self.last_num_evaluations = population.num_evaluations();
        Ok(())
    }

    /// Ask every worker to stop and wait a bounded time for their reasons
    pub fn shutdown(&mut self) -> &CleanupReport {
        if self.report.is_none() {
            let report = self.collect_shutdown();
            self.report = Some(report);
        }
        // set just above
        self.report.get_or_insert_with(CleanupReport::default)
    }

    fn collect_shutdown(&mut self) -> CleanupReport {
        log::info!("Shutting down {} workers...", self.workers.len());
        let mut report = CleanupReport::default();
        let mut waiting = Vec::new();
        for worker in &self.workers {
            if let Some(reason) = &worker.retired {
                report.reasons.push((worker.rank, reason.clone()));
                continue;
            }
            match self.comm.send(worker.rank, Channel::Control, Message::Shutdown) {
                Ok(()) => waiting.push(worker.rank),
                Err(e) => {
                    log::debug!("shutdown notice to {}: {e}", worker.rank);
                    report.reasons.push((worker.rank, "disconnected".into()));
                }
            }
        }

        let wait = self
            .sleep
            .mul_f64(self.workers.len() as f64 * self.config.shutdown_wait_factor)
            .max(self.config.min_shutdown_wait);
        let deadline = Instant::now() + wait;
        for rank in waiting {
            let reason = loop {
                match self.comm.try_recv(rank, Channel::Control) {
                    Ok(Some(Message::ShutdownReport(reason))) => break Some(reason),
                    Ok(Some(_)) => continue,
                    Ok(None) => {}
                    Err(_) => break Some("disconnected".to_string()),
                }
                if Instant::now() >= deadline {
                    break None;
                }
                thread::sleep(self.sleep);
            };
            match reason {
                Some(reason) => {
                    log::info!("  received from {rank}: {reason}");
                    report.reasons.push((rank, reason));
                }
                None => {
                    log::warn!("worker {rank} did not acknowledge shutdown within {wait:?}");
                    report.unresponsive.push(rank);
                }
            }
        }
        report.needs_abort = !report.unresponsive.is_empty();
        for worker in &mut self.workers {
            if worker.retired.is_none() {
                worker.retired = Some("shutdown".into());
            }
        }
        log::info!("\t...done.");
        report
    }
}

impl<C: Comm> PopulationEvaluator for Coordinator<C> {
    fn evaluate_population(&mut self, population: &mut Population) -> fitpop_de::Result<()> {
        population.initialize()?;
        if self.workers.is_empty() {
            return Err(PopulationError::Config("the coordinator has no workers".into()));
        }
        if self.report.is_some() {
            return Err(PopulationError::Evaluator("workers were already shut down".into()));
        }
        if self.first_eval {
            self.announce(population.parameter_descriptions().len())?;
            self.last_num_evaluations = population.num_evaluations();
            self.first_eval = false;
        }
        population.begin_generation();
        while population.generation_pending() {
            self.assign_next(population)?;
            self.cycle(population)?;
        }
        Ok(())
    }

    fn cleanup(&mut self) -> bool {
        self.shutdown().needs_abort
    }
}

impl<C: Comm> Drop for Coordinator<C> {
    fn drop(&mut self) {
        if self.report.is_none() && !self.first_eval {
            self.shutdown();
        }
    }
}
