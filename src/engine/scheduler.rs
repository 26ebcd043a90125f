//! The avalanche scheduler: maximizes intra-event task occupancy by
//! promoting algorithms through their state machine as soon as control and
//! data flow prerequisites are met, and dispatching them to a shared worker
//! arena.
//!
//! # Architecture
//!
//! A single activation task is the sole writer of slot state, algorithm
//! states and control flow decisions. Everything that mutates a slot does
//! so by enqueuing a closure onto the serialized actions channel, which the
//! activation task drains; worker tasks executing algorithm bodies in
//! parallel communicate their results the same way. This gives lock-free
//! correctness for the state transitions without giving up algorithm-body
//! parallelism.
//!
//! Dispatch runs through three rank-ordered queues:
//! * the normal queue, feeding tokio worker tasks gated by the arena
//!   semaphore (`thread_pool_size + max_parallelism_extra + 1` permits);
//! * the blocking queue, used when preemptive blocking scheduling is on and
//!   capped by `max_blocking_algos_in_flight`;
//! * the accelerated queue, feeding the offload pool
//!   (`num_offload_threads` permits). Accelerated tasks may suspend across
//!   `.await` points and hold no arena permit while doing so.
//!
//! An algorithm flagged both blocking and accelerated is routed to the
//! accelerated queue.
//!
//! # Lifecycle
//!
//! `push_new_event` reserves a slot, seeds its states and enqueues the root
//! cause; completions trigger `iterate`, which schedules DATAREADY work,
//! retries RESOURCELESS work, signs off slots whose root decision resolved
//! and fails slots that stalled (dumping their state first). Finished
//! events, failed or not, are published to the finished-events queue the
//! caller drains with `pop_finished_event`.

use crate::config::SchedulerOptions;
use crate::engine::occupancy::{OccupancyCallback, OccupancyRecorder, OccupancySnapshot};
use crate::engine::task_queue::{RankedTaskQueue, ScheduledTask, TaskSpec};
use crate::errors::{GraphError, ScheduleError};
use crate::graph::visitors::Cause;
use crate::graph::AlgIndex;
use crate::observability::messages::scheduler::{
    AlgorithmFailed, EventFinished, EventStarted, SimulationConverged, StallDetected,
    TaskCompleted, TaskDispatched,
};
use crate::observability::messages::StructuredLog;
use crate::precedence::PrecedenceService;
use crate::slot::{EventContext, EventSlot, SlotPath};
use crate::state::AlgState;
use crate::traits::{AlgHandle, AlgOutcome, AlgResourcePool, FixedAlgPool, Whiteboard};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

const STATE_INACTIVE: u8 = 0;
const STATE_ACTIVE: u8 = 1;
const STATE_FAILURE: u8 = 2;

/// Externally observable state of the activation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Inactive,
    Active,
    Failure,
}

/// A finished event as published to the caller. `failed` marks events that
/// stalled or had an algorithm error.
#[derive(Debug, Clone)]
pub struct FinishedEvent {
    pub context: EventContext,
    pub failed: bool,
}

type ActionFn = Box<dyn FnOnce(&mut SchedulerCore) -> Result<(), ScheduleError> + Send>;

enum Action {
    Invoke(ActionFn),
    Deactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskClass {
    Normal,
    Blocking,
    Accelerated,
}

/// The intra-event concurrent task scheduler.
pub struct AvalancheScheduler {
    actions: mpsc::UnboundedSender<Action>,
    free_slots: Arc<AtomicUsize>,
    finished: tokio::sync::Mutex<mpsc::UnboundedReceiver<FinishedEvent>>,
    activation: Arc<AtomicU8>,
    cancel: CancellationToken,
    handle: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    slot_count: usize,
}

impl AvalancheScheduler {
    /// Build and activate a scheduler over the given precedence service and
    /// whiteboard, with an instance pool derived from the graph.
    ///
    /// Must be called within a tokio runtime: the activation loop and the
    /// workers are spawned onto it.
    pub fn new(
        service: PrecedenceService,
        options: &SchedulerOptions,
        whiteboard: Arc<dyn Whiteboard>,
    ) -> Result<Self, ScheduleError> {
        let pool = Arc::new(FixedAlgPool::from_graph(service.graph()));
        Self::with_pool(service, options, whiteboard, pool)
    }

    /// As [`AvalancheScheduler::new`], with a caller-provided resource pool.
    pub fn with_pool(
        service: PrecedenceService,
        options: &SchedulerOptions,
        whiteboard: Arc<dyn Whiteboard>,
        pool: Arc<dyn AlgResourcePool>,
    ) -> Result<Self, ScheduleError> {
        let service = Arc::new(service);

        if options.show_control_flow {
            tracing::info!("\n{}", service.dump_control_flow());
        }
        if options.show_data_flow {
            tracing::info!("\n{}", service.dump_data_flow());
        }
        if options.show_data_dependencies {
            for alg in service.graph().algorithm_nodes() {
                tracing::debug!(
                    algorithm = %alg.name,
                    inputs = alg.inputs.len(),
                    outputs = alg.outputs.len(),
                    "registered data dependencies"
                );
            }
        }

        if options.simulate_execution {
            run_simulation(&service, options)?;
        }

        let slot_count = whiteboard.store_count().max(1);
        let graph = service.graph();
        let slots: Vec<EventSlot> = (0..slot_count)
            .map(|_| EventSlot::new(graph.alg_count(), graph.node_count()))
            .collect();

        let bypass_arena = options.thread_pool_size == -100;
        let pool_threads = match options.thread_pool_size {
            -100 => 0,
            -1 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            n => n.max(0) as usize,
        };
        let arena_permits = (pool_threads + options.max_parallelism_extra.max(0) as usize + 1).max(1);
        let offload_permits = options.num_offload_threads.max(1);

        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        // Backpressure is provided by the slot pool: a slot is reusable as
        // soon as its event is published, so this queue is not bounded.
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();

        let free_slots = Arc::new(AtomicUsize::new(slot_count));
        let activation = Arc::new(AtomicU8::new(STATE_ACTIVE));
        let cancel = CancellationToken::new();

        let core = SchedulerCore {
            service,
            pool,
            whiteboard,
            preemptive_blocking: options.preemptive_blocking_tasks,
            max_blocking: options.max_blocking_algos_in_flight,
            bypass_arena,
            verbose_sub_slots: options.verbose_sub_slots,
            slots,
            slot_store: vec![None; slot_count],
            slot_in_flight: vec![0; slot_count],
            slot_queued: vec![0; slot_count],
            free_slots: free_slots.clone(),
            finished_tx,
            actions_tx: actions_tx.clone(),
            normal_queue: RankedTaskQueue::new(),
            blocking_queue: RankedTaskQueue::new(),
            accelerated_queue: RankedTaskQueue::new(),
            arena: Arc::new(Semaphore::new(arena_permits)),
            offload: Arc::new(Semaphore::new(offload_permits)),
            algos_in_flight: 0,
            blocking_in_flight: 0,
            needs_update: false,
            activation: activation.clone(),
            occupancy: None,
        };

        tracing::info!(
            slots = slot_count,
            arena_permits,
            offload_permits,
            bypass_arena,
            "activating scheduler"
        );

        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(activate(core, actions_rx, loop_cancel));

        Ok(Self {
            actions: actions_tx,
            free_slots,
            finished: tokio::sync::Mutex::new(finished_rx),
            activation,
            cancel,
            handle: std::sync::Mutex::new(Some(handle)),
            slot_count,
        })
    }

    fn send_action(
        &self,
        action: impl FnOnce(&mut SchedulerCore) -> Result<(), ScheduleError> + Send + 'static,
    ) -> Result<(), ScheduleError> {
        self.actions
            .send(Action::Invoke(Box::new(action)))
            .map_err(|_| ScheduleError::SchedulerShutdown)
    }

    fn ensure_active(&self) -> Result<(), ScheduleError> {
        match self.activation.load(Ordering::SeqCst) {
            STATE_ACTIVE => Ok(()),
            STATE_FAILURE => Err(ScheduleError::SchedulerFailure),
            _ => Err(ScheduleError::SchedulerShutdown),
        }
    }

    fn reserve_slots(&self, requested: usize) -> Result<(), ScheduleError> {
        let mut available = self.free_slots.load(Ordering::SeqCst);
        loop {
            if available < requested {
                return Err(if requested == 1 {
                    ScheduleError::SlotUnavailable
                } else {
                    ScheduleError::BatchTooLarge {
                        requested,
                        available,
                    }
                });
            }
            match self.free_slots.compare_exchange(
                available,
                available - requested,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => available = actual,
            }
        }
    }

    /// Make an event available to the scheduler. Fails fast when no slot is
    /// free or the scheduler is no longer accepting work.
    pub fn push_new_event(&self, context: EventContext) -> Result<(), ScheduleError> {
        self.ensure_active()?;
        self.reserve_slots(1)?;
        let result = self.send_action(move |core| core.start_event(context));
        if result.is_err() {
            self.free_slots.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    /// Make a batch of events available. Fails atomically when fewer slots
    /// are free than the batch needs.
    pub fn push_new_events(&self, contexts: Vec<EventContext>) -> Result<(), ScheduleError> {
        self.ensure_active()?;
        let requested = contexts.len();
        if requested == 0 {
            return Ok(());
        }
        self.reserve_slots(requested)?;
        for (pushed, context) in contexts.into_iter().enumerate() {
            if let Err(error) = self.send_action(move |core| core.start_event(context)) {
                self.free_slots
                    .fetch_add(requested - pushed, Ordering::SeqCst);
                return Err(error);
            }
        }
        Ok(())
    }

    /// Block until a finished event is available and return it.
    pub async fn pop_finished_event(&self) -> Result<FinishedEvent, ScheduleError> {
        let mut finished = self.finished.lock().await;
        finished.recv().await.ok_or(ScheduleError::SchedulerShutdown)
    }

    /// Non-blocking variant of [`AvalancheScheduler::pop_finished_event`].
    pub fn try_pop_finished_event(&self) -> Result<Option<FinishedEvent>, ScheduleError> {
        match self.finished.try_lock() {
            Ok(mut finished) => match finished.try_recv() {
                Ok(event) => Ok(Some(event)),
                Err(mpsc::error::TryRecvError::Empty) => Ok(None),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    Err(ScheduleError::SchedulerShutdown)
                }
            },
            Err(_) => Ok(None),
        }
    }

    /// Current free slot count.
    pub fn free_slots(&self) -> usize {
        self.free_slots.load(Ordering::SeqCst)
    }

    /// Number of event slots the scheduler was built with.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn activation_state(&self) -> ActivationState {
        match self.activation.load(Ordering::SeqCst) {
            STATE_ACTIVE => ActivationState::Active,
            STATE_FAILURE => ActivationState::Failure,
            _ => ActivationState::Inactive,
        }
    }

    /// Create a sub-slot (event view) rooted at the named decision node of
    /// the slot processing `parent`.
    pub fn schedule_event_view(
        &self,
        parent: &EventContext,
        node_name: &str,
        view_context: EventContext,
    ) -> Result<(), ScheduleError> {
        self.ensure_active()?;
        let parent_event = parent.event_number;
        let node_name = node_name.to_string();
        self.send_action(move |core| core.create_event_view(parent_event, node_name, view_context))
    }

    /// Sample occupancy at the given interval (ms): 0 snapshots on every
    /// state change, a negative value deactivates sampling. Each sample is
    /// passed to `callback`.
    pub fn record_occupancy(
        &self,
        interval_ms: i64,
        callback: OccupancyCallback,
    ) -> Result<(), ScheduleError> {
        self.ensure_active()?;

        if interval_ms < 0 {
            drop(callback);
            return self.send_action(|core| {
                core.occupancy = None;
                Ok(())
            });
        }

        let interval = Duration::from_millis(interval_ms as u64);
        let ticker = self.cancel.child_token();
        let recorder = OccupancyRecorder::new(interval, callback, ticker.clone());

        if interval_ms > 0 {
            let actions = self.actions.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = ticker.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {
                            let sent = actions.send(Action::Invoke(Box::new(|core| {
                                core.sample_occupancy(true);
                                Ok(())
                            })));
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        self.send_action(move |core| {
            core.occupancy = Some(recorder);
            Ok(())
        })
    }

    /// Dump the scheduler state for all active slots through `tracing`.
    pub fn dump_state(&self) -> Result<(), ScheduleError> {
        self.send_action(|core| {
            core.dump_scheduler_state();
            Ok(())
        })
    }

    /// Deactivate the scheduler: in-flight tasks are awaited, the
    /// activation loop exits and further pushes are refused.
    pub async fn shutdown(&self) -> Result<(), ScheduleError> {
        let _ = self.actions.send(Action::Deactivate);
        let handle = {
            let mut guard = self.handle.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.cancel.cancel();
        Ok(())
    }
}

fn run_simulation(
    service: &Arc<PrecedenceService>,
    options: &SchedulerOptions,
) -> Result<(), ScheduleError> {
    let graph = service.graph();
    let mut scratch = EventSlot::new(graph.alg_count(), graph.node_count());
    scratch.reset(EventContext::new(0));

    let passes = service.simulate(&mut scratch).map_err(ScheduleError::Graph)?;
    SimulationConverged {
        passes: passes.len(),
        algorithms: passes.iter().sum(),
    }
    .log();

    if options.dump_intra_event_dynamics {
        use std::io::Write as _;
        let path = "intra_event_dynamics.csv";
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| {
                for (pass, resolved) in passes.iter().enumerate() {
                    writeln!(file, "{},{}", pass + 1, resolved)?;
                }
                Ok(())
            });
        if let Err(error) = result {
            tracing::warn!(path, %error, "failed to dump simulation convergence");
        }
    }
    Ok(())
}

/// State owned by the activation loop. Only the loop itself touches it;
/// workers reach it exclusively through completion closures.
struct SchedulerCore {
    service: Arc<PrecedenceService>,
    pool: Arc<dyn AlgResourcePool>,
    whiteboard: Arc<dyn Whiteboard>,
    preemptive_blocking: bool,
    max_blocking: u32,
    bypass_arena: bool,
    verbose_sub_slots: bool,
    slots: Vec<EventSlot>,
    slot_store: Vec<Option<usize>>,
    slot_in_flight: Vec<usize>,
    slot_queued: Vec<usize>,
    free_slots: Arc<AtomicUsize>,
    finished_tx: mpsc::UnboundedSender<FinishedEvent>,
    actions_tx: mpsc::UnboundedSender<Action>,
    normal_queue: RankedTaskQueue,
    blocking_queue: RankedTaskQueue,
    accelerated_queue: RankedTaskQueue,
    arena: Arc<Semaphore>,
    offload: Arc<Semaphore>,
    algos_in_flight: usize,
    blocking_in_flight: u32,
    needs_update: bool,
    activation: Arc<AtomicU8>,
    occupancy: Option<OccupancyRecorder>,
}

async fn activate(
    mut core: SchedulerCore,
    mut actions: mpsc::UnboundedReceiver<Action>,
    cancel: CancellationToken,
) {
    tracing::debug!("activation loop started");

    'main: while let Some(action) = actions.recv().await {
        match action {
            Action::Deactivate => {
                // await the in-flight tasks before leaving
                while core.algos_in_flight > 0 {
                    match actions.recv().await {
                        Some(Action::Invoke(run)) => {
                            if let Err(error) = run(&mut core) {
                                tracing::error!(%error, "action failed during drain");
                            }
                        }
                        Some(Action::Deactivate) => {}
                        None => break,
                    }
                }
                break 'main;
            }
            Action::Invoke(run) => {
                if let Err(error) = run(&mut core) {
                    tracing::error!(%error, "scheduler action failed");
                    core.activation.store(STATE_FAILURE, Ordering::SeqCst);
                    break 'main;
                }
            }
        }

        while core.needs_update {
            core.needs_update = false;
            if let Err(error) = core.iterate().await {
                tracing::error!(%error, "scheduler iteration failed");
                core.activation.store(STATE_FAILURE, Ordering::SeqCst);
                break 'main;
            }
        }
    }

    if core.activation.load(Ordering::SeqCst) != STATE_FAILURE {
        core.activation.store(STATE_INACTIVE, Ordering::SeqCst);
    }
    cancel.cancel();
    tracing::debug!("activation loop terminated");
}

impl SchedulerCore {
    fn slot_active(&self, slot: usize) -> bool {
        self.slots[slot].context.is_some() && !self.slots[slot].complete
    }

    fn start_event(&mut self, mut context: EventContext) -> Result<(), ScheduleError> {
        let Some(slot) = self.slots.iter().position(|s| s.context.is_none()) else {
            self.free_slots.fetch_add(1, Ordering::SeqCst);
            return Err(ScheduleError::SlotUnavailable);
        };
        let Some(store) = self.whiteboard.allocate_store(context.event_number) else {
            self.free_slots.fetch_add(1, Ordering::SeqCst);
            return Err(ScheduleError::SlotUnavailable);
        };
        self.whiteboard.select_store(store);
        self.slot_store[slot] = Some(store);

        context.slot = Some(slot);
        self.slots[slot].reset(context.clone());
        self.slot_in_flight[slot] = 0;
        self.slot_queued[slot] = 0;

        EventStarted {
            event: context.event_number,
            slot,
        }
        .log();

        let service = self.service.clone();
        service.iterate(&mut self.slots[slot], &Cause::Root)?;
        self.needs_update = true;
        self.sample_occupancy(false);
        Ok(())
    }

    fn create_event_view(
        &mut self,
        parent_event: u64,
        node_name: String,
        mut context: EventContext,
    ) -> Result<(), ScheduleError> {
        let service = self.service.clone();
        let node = service
            .graph()
            .hub_index(&node_name)
            .ok_or_else(|| GraphError::UnknownNode(node_name.clone()))?;

        let Some(slot) = self.slots.iter().position(|s| {
            !s.complete && s.context.as_ref().map(|c| c.event_number) == Some(parent_event)
        }) else {
            return Err(ScheduleError::UnknownEvent(parent_event));
        };

        context.slot = Some(slot);
        let view = self.slots[slot].make_sub_slot(node, context);
        tracing::debug!(
            event = parent_event,
            slot,
            view,
            node = %node_name,
            "created event view"
        );

        service.iterate(&mut self.slots[slot], &Cause::Root)?;
        self.needs_update = true;
        Ok(())
    }

    /// Loop on all slots to queue DATAREADY algorithms, retry RESOURCELESS
    /// ones, dispatch, and sign off ready events.
    async fn iterate(&mut self) -> Result<(), ScheduleError> {
        for slot in 0..self.slots.len() {
            if !self.slot_active(slot) || self.slots[slot].failed {
                continue;
            }
            for path in self.slots[slot].paths() {
                for alg in self.slots[slot].at(path).states.indices_in(AlgState::DataReady) {
                    self.try_queue(slot, path, alg)?;
                }
                for alg in self
                    .slots[slot]
                    .at(path)
                    .states
                    .indices_in(AlgState::Resourceless)
                {
                    self.try_queue(slot, path, alg)?;
                }
            }
        }

        self.dispatch().await?;

        for slot in 0..self.slots.len() {
            if !self.slot_active(slot) {
                continue;
            }
            let resolved = self.service.cf_rules_resolved(&self.slots[slot]);
            let failed = self.slots[slot].failed;

            if (resolved || failed)
                && self.slot_in_flight[slot] == 0
                && self.slot_queued[slot] == 0
            {
                self.signoff(slot, failed);
                continue;
            }

            if !resolved && !failed && self.is_stalled(slot) {
                let event = self.slots[slot]
                    .context
                    .as_ref()
                    .map(|c| c.event_number)
                    .unwrap_or(0);
                StallDetected { event, slot }.log();
                let report = self
                    .service
                    .print_state(&self.slots[slot], self.verbose_sub_slots);
                tracing::error!("\n{}", report);
                self.event_failed(slot);
            }
        }

        self.sample_occupancy(false);
        Ok(())
    }

    /// Try to move one DATAREADY / RESOURCELESS algorithm into a queue.
    fn try_queue(&mut self, slot: usize, path: SlotPath, alg: usize) -> Result<(), ScheduleError> {
        let (node, name, rank, blocking, accelerated) = {
            let service = self.service.clone();
            let graph = service.graph();
            let node = graph.node_for_alg(AlgIndex(alg));
            let Some(alg_node) = graph.algorithm(node) else {
                return Ok(());
            };
            (
                node,
                alg_node.name.clone(),
                alg_node.rank,
                alg_node.blocking,
                alg_node.accelerated,
            )
        };

        match self.pool.acquire(&name) {
            Some(handle) => {
                let Some(context) = self.slots[slot].at(path).context.clone() else {
                    self.pool.release(handle);
                    return Ok(());
                };
                self.slots[slot]
                    .at_mut(path)
                    .states
                    .set(alg, AlgState::Scheduled)?;
                self.slot_queued[slot] += 1;

                let task = ScheduledTask {
                    spec: TaskSpec {
                        alg_index: alg,
                        node_index: node,
                        alg_name: name,
                        rank,
                        blocking,
                        accelerated,
                        slot_index: slot,
                        path,
                        context,
                    },
                    handle,
                };

                if accelerated {
                    self.accelerated_queue.push(task);
                } else if blocking && self.preemptive_blocking {
                    self.blocking_queue.push(task);
                } else {
                    self.normal_queue.push(task);
                }
            }
            None => {
                // parked until instances free up; revisited next iteration
                let _ = self.slots[slot]
                    .at_mut(path)
                    .states
                    .set(alg, AlgState::Resourceless);
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self) -> Result<(), ScheduleError> {
        while let Some(task) = self.accelerated_queue.pop() {
            self.launch(task, TaskClass::Accelerated).await?;
        }

        loop {
            if self.max_blocking != 0 && self.blocking_in_flight >= self.max_blocking {
                break;
            }
            let Some(task) = self.blocking_queue.pop() else {
                break;
            };
            self.launch(task, TaskClass::Blocking).await?;
        }

        while let Some(task) = self.normal_queue.pop() {
            self.launch(task, TaskClass::Normal).await?;
        }
        Ok(())
    }

    async fn launch(&mut self, task: ScheduledTask, class: TaskClass) -> Result<(), ScheduleError> {
        let slot = task.spec.slot_index;
        self.slot_queued[slot] = self.slot_queued[slot].saturating_sub(1);

        // cancel dispatch for slots that failed or resolved in the meantime
        if self.slots[slot].failed
            || self.slots[slot].complete
            || self.service.cf_rules_resolved(&self.slots[slot])
        {
            self.pool.release(task.handle);
            return Ok(());
        }

        if class == TaskClass::Blocking {
            self.blocking_in_flight += 1;
        }
        self.algos_in_flight += 1;
        self.slot_in_flight[slot] += 1;

        TaskDispatched {
            algorithm: &task.spec.alg_name,
            event: task.spec.context.event_number,
            slot,
            rank: task.spec.rank,
            queue: match class {
                TaskClass::Normal => "normal",
                TaskClass::Blocking => "blocking",
                TaskClass::Accelerated => "accelerated",
            },
        }
        .log();

        let blocking = class == TaskClass::Blocking;
        if self.bypass_arena {
            let outcome = task.handle.algorithm.execute(&task.spec.context).await;
            let ScheduledTask { spec, handle } = task;
            self.complete_task(spec, handle, outcome, blocking)?;
        } else {
            let permits = match class {
                TaskClass::Accelerated => self.offload.clone(),
                _ => self.arena.clone(),
            };
            let actions = self.actions_tx.clone();
            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let outcome = task.handle.algorithm.execute(&task.spec.context).await;
                let ScheduledTask { spec, handle } = task;
                let _ = actions.send(Action::Invoke(Box::new(move |core| {
                    core.complete_task(spec, handle, outcome, blocking)
                })));
            });
        }
        Ok(())
    }

    /// Runs on the activation loop when a worker reports back: records the
    /// outcome, updates the decision realm and wakes the dispatcher.
    fn complete_task(
        &mut self,
        spec: TaskSpec,
        handle: AlgHandle,
        outcome: AlgOutcome,
        blocking: bool,
    ) -> Result<(), ScheduleError> {
        self.pool.release(handle);
        self.algos_in_flight = self.algos_in_flight.saturating_sub(1);
        if blocking {
            self.blocking_in_flight = self.blocking_in_flight.saturating_sub(1);
        }
        let slot = spec.slot_index;
        self.slot_in_flight[slot] = self.slot_in_flight[slot].saturating_sub(1);
        self.needs_update = true;

        if !self.slot_active(slot) {
            return Ok(());
        }

        let new_state = match &outcome {
            AlgOutcome::Accepted => AlgState::EvtAccepted,
            AlgOutcome::Rejected => AlgState::EvtRejected,
            AlgOutcome::Error(_) => AlgState::Error,
        };
        let transition = self.slots[slot]
            .at_mut(spec.path)
            .states
            .set(spec.alg_index, new_state);

        match &outcome {
            AlgOutcome::Error(message) => {
                AlgorithmFailed {
                    algorithm: &spec.alg_name,
                    event: spec.context.event_number,
                    error: message,
                }
                .log();
                self.slots[slot].failed = true;
            }
            _ => {
                let outputs = {
                    let service = self.service.clone();
                    service
                        .graph()
                        .algorithm_node(&spec.alg_name)
                        .map(|a| a.outputs.clone())
                        .unwrap_or_default()
                };
                for data in outputs {
                    self.slots[slot].at_mut(spec.path).produced.insert(data);
                }

                TaskCompleted {
                    algorithm: &spec.alg_name,
                    event: spec.context.event_number,
                    outcome: if outcome == AlgOutcome::Accepted {
                        "accepted"
                    } else {
                        "rejected"
                    },
                }
                .log();

                if transition.is_ok() {
                    let cause = Cause::Task {
                        algorithm: spec.alg_name.clone(),
                        path: spec.path,
                    };
                    let service = self.service.clone();
                    service.iterate(&mut self.slots[slot], &cause)?;
                }
            }
        }

        if transition.is_err() {
            self.slots[slot].failed = true;
        }
        self.sample_occupancy(false);
        Ok(())
    }

    /// A slot from which no algorithm can progress and with nothing queued
    /// or in flight.
    fn is_stalled(&self, slot: usize) -> bool {
        if self.slot_in_flight[slot] > 0 || self.slot_queued[slot] > 0 {
            return false;
        }
        let whole = &self.slots[slot];
        let mut has_candidates = false;
        let mut has_pending = false;
        for path in whole.paths() {
            let view = whole.at(path);
            if view.states.contains_any(&[
                AlgState::DataReady,
                AlgState::Resourceless,
                AlgState::Scheduled,
            ]) {
                has_candidates = true;
            }
            if view
                .states
                .contains_any(&[AlgState::Initial, AlgState::ControlReady])
            {
                has_pending = true;
            }
        }
        !has_candidates && has_pending
    }

    fn event_failed(&mut self, slot: usize) {
        self.slots[slot].failed = true;
        if self.slot_in_flight[slot] == 0 && self.slot_queued[slot] == 0 {
            self.signoff(slot, true);
        }
    }

    /// Publish the slot's context to the finished-events queue and free the
    /// slot for reuse.
    fn signoff(&mut self, slot: usize, failed: bool) {
        let Some(context) = self.slots[slot].context.clone() else {
            return;
        };

        {
            let service = self.service.clone();
            service.dump_precedence_trace(&mut self.slots[slot]);
        }

        self.slots[slot].complete = true;
        self.slots[slot].context = None;

        EventFinished {
            event: context.event_number,
            slot,
            failed,
        }
        .log();

        if let Some(store) = self.slot_store[slot].take() {
            self.whiteboard.clear_store(store);
            self.whiteboard.free_store(store);
        }

        if self
            .finished_tx
            .send(FinishedEvent { context, failed })
            .is_err()
        {
            tracing::warn!(slot, "finished-events queue is gone; event dropped");
        }
        self.free_slots.fetch_add(1, Ordering::SeqCst);
        self.sample_occupancy(false);
    }

    fn sample_occupancy(&mut self, forced: bool) {
        let Some(recorder) = self.occupancy.as_mut() else {
            return;
        };
        if !forced && !recorder.samples_every_change() {
            return;
        }
        let snapshot = OccupancySnapshot::capture(&self.slots);
        recorder.sample(snapshot, forced);
    }

    fn dump_scheduler_state(&self) {
        tracing::info!(
            free_slots = self.free_slots.load(Ordering::SeqCst),
            in_flight = self.algos_in_flight,
            blocking_in_flight = self.blocking_in_flight,
            queued_normal = self.normal_queue.len(),
            queued_blocking = self.blocking_queue.len(),
            queued_accelerated = self.accelerated_queue.len(),
            "scheduler state"
        );
        for slot in 0..self.slots.len() {
            if !self.slot_active(slot) {
                continue;
            }
            let report = self
                .service
                .print_state(&self.slots[slot], self.verbose_sub_slots);
            tracing::info!("slot {}:\n{}", slot, report);
        }
    }
}
