//! End-to-end scheduler scenarios over small precedence graphs.

use crate::algorithms::{ExecutionLog, StubAlgorithm};
use crate::config::SchedulerOptions;
use crate::engine::scheduler::{AvalancheScheduler, FinishedEvent};
use crate::errors::ScheduleError;
use crate::graph::builder::{BuildOptions, GraphBuilder, HubProps};
use crate::precedence::PrecedenceService;
use crate::slot::EventContext;
use crate::traits::{InMemoryWhiteboard, Whiteboard};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn whiteboard(slots: usize) -> Arc<dyn Whiteboard> {
    Arc::new(InMemoryWhiteboard::new(slots))
}

fn scheduler(builder: GraphBuilder, slots: usize) -> AvalancheScheduler {
    let graph = builder.build(&BuildOptions::default()).expect("valid graph");
    let service = PrecedenceService::new(graph);
    AvalancheScheduler::new(service, &SchedulerOptions::default(), whiteboard(slots))
        .expect("scheduler starts")
}

async fn pop(scheduler: &AvalancheScheduler) -> FinishedEvent {
    tokio::time::timeout(Duration::from_secs(5), scheduler.pop_finished_event())
        .await
        .expect("finished event within deadline")
        .expect("scheduler still alive")
}

#[tokio::test]
async fn diamond_dag_runs_in_dependency_order() {
    let log = ExecutionLog::new();
    let mut builder = GraphBuilder::new("diamond");
    builder
        .add_head(
            "head",
            HubProps {
                concurrent: true,
                ..HubProps::default()
            },
        )
        .unwrap();
    builder
        .add_algorithm(
            "head",
            Arc::new(StubAlgorithm::new("A").with_outputs(&["d1"]).with_log(log.clone())),
        )
        .unwrap();
    builder
        .add_algorithm(
            "head",
            Arc::new(
                StubAlgorithm::new("B")
                    .with_inputs(&["d1"])
                    .with_outputs(&["d2"])
                    .with_log(log.clone()),
            ),
        )
        .unwrap();
    builder
        .add_algorithm(
            "head",
            Arc::new(StubAlgorithm::new("C").with_inputs(&["d2"]).with_log(log.clone())),
        )
        .unwrap();

    let scheduler = scheduler(builder, 1);
    scheduler.push_new_event(EventContext::new(1)).unwrap();

    let finished = pop(&scheduler).await;
    assert_eq!(finished.context.event_number, 1);
    assert!(!finished.failed);
    assert_eq!(log.names(), vec!["A", "B", "C"]);

    // exactly one finished event
    assert!(scheduler.try_pop_finished_event().unwrap().is_none());
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn prompt_or_short_circuits_the_sibling() {
    let log = ExecutionLog::new();
    let mut builder = GraphBuilder::new("prompt-or");
    builder
        .add_head(
            "head",
            HubProps {
                concurrent: false,
                prompt_decision: true,
                mode_or: true,
                ..HubProps::default()
            },
        )
        .unwrap();
    builder
        .add_algorithm("head", Arc::new(StubAlgorithm::new("X").with_log(log.clone())))
        .unwrap();
    builder
        .add_algorithm("head", Arc::new(StubAlgorithm::new("Y").with_log(log.clone())))
        .unwrap();

    let scheduler = scheduler(builder, 1);
    scheduler.push_new_event(EventContext::new(7)).unwrap();

    let finished = pop(&scheduler).await;
    assert!(!finished.failed);
    // X accepted, so the OR resolved promptly and Y never ran
    assert_eq!(log.names(), vec!["X"]);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejected_branch_stalls_the_consumer() {
    let log = ExecutionLog::new();
    let mut builder = GraphBuilder::new("stall");
    builder
        .add_head(
            "head",
            HubProps {
                concurrent: true,
                ..HubProps::default()
            },
        )
        .unwrap();
    builder
        .add_decision_hub(
            "head",
            "branch",
            HubProps {
                prompt_decision: true,
                ..HubProps::default()
            },
        )
        .unwrap();
    builder
        .add_algorithm(
            "branch",
            Arc::new(StubAlgorithm::new("gate").rejecting().with_log(log.clone())),
        )
        .unwrap();
    builder
        .add_algorithm(
            "branch",
            Arc::new(StubAlgorithm::new("W").with_outputs(&["d"]).with_log(log.clone())),
        )
        .unwrap();
    builder
        .add_algorithm(
            "head",
            Arc::new(StubAlgorithm::new("Z").with_inputs(&["d"]).with_log(log.clone())),
        )
        .unwrap();

    let scheduler = scheduler(builder, 1);
    scheduler.push_new_event(EventContext::new(3)).unwrap();

    let finished = pop(&scheduler).await;
    assert!(finished.failed, "stalled event must be published as failed");
    assert_eq!(finished.context.event_number, 3);
    // the producer behind the rejected gate never ran, nor did the consumer
    assert!(!log.names().contains(&"W".to_string()));
    assert!(!log.names().contains(&"Z".to_string()));
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn guarded_multiple_producers_resolve_at_runtime() {
    let log = ExecutionLog::new();
    let mut builder = GraphBuilder::new("guarded");
    builder
        .add_head(
            "head",
            HubProps {
                concurrent: true,
                ..HubProps::default()
            },
        )
        .unwrap();
    for (branch, gate, producer, accepts) in [
        ("b1", "gate1", "P1", true),
        ("b2", "gate2", "P2", false),
    ] {
        builder
            .add_decision_hub(
                "head",
                branch,
                HubProps {
                    prompt_decision: true,
                    ..HubProps::default()
                },
            )
            .unwrap();
        let mut gate_alg = StubAlgorithm::new(gate).with_log(log.clone());
        if !accepts {
            gate_alg = gate_alg.rejecting();
        }
        builder.add_algorithm(branch, Arc::new(gate_alg)).unwrap();
        builder
            .add_algorithm(
                branch,
                Arc::new(StubAlgorithm::new(producer).with_outputs(&["D"]).with_log(log.clone())),
            )
            .unwrap();
    }
    builder
        .add_algorithm(
            "head",
            Arc::new(StubAlgorithm::new("consumer").with_inputs(&["D"]).with_log(log.clone())),
        )
        .unwrap();

    // initialization must accept the guarded double production
    let scheduler = scheduler(builder, 1);
    scheduler.push_new_event(EventContext::new(9)).unwrap();

    let finished = pop(&scheduler).await;
    assert!(!finished.failed);

    let names = log.names();
    assert!(names.contains(&"P1".to_string()));
    assert!(!names.contains(&"P2".to_string()), "rejected branch produced data");
    assert!(log.position_of("consumer").unwrap() > log.position_of("P1").unwrap());
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn event_views_aggregate_through_their_entry_point() {
    let log = ExecutionLog::new();
    let mut builder = GraphBuilder::new("views");
    builder
        .add_head(
            "head",
            HubProps {
                concurrent: false,
                ..HubProps::default()
            },
        )
        .unwrap();

    // The splitter spawns three views under "analysis" from inside its own
    // execution, before its completion is observed.
    let scheduler_cell: Arc<Mutex<Option<Arc<AvalancheScheduler>>>> =
        Arc::new(Mutex::new(None));
    let cell_for_hook = scheduler_cell.clone();
    builder
        .add_algorithm(
            "head",
            Arc::new(
                StubAlgorithm::new("splitter")
                    .with_log(log.clone())
                    .with_hook(move |ctx| {
                        let guard = cell_for_hook.lock().unwrap();
                        if let Some(scheduler) = guard.as_ref() {
                            for _ in 0..3 {
                                scheduler
                                    .schedule_event_view(
                                        ctx,
                                        "analysis",
                                        EventContext::new(ctx.event_number),
                                    )
                                    .expect("view scheduling");
                            }
                        }
                    }),
            ),
        )
        .unwrap();
    builder
        .add_decision_hub(
            "head",
            "analysis",
            HubProps {
                concurrent: true,
                ..HubProps::default()
            },
        )
        .unwrap();
    builder
        .add_algorithm(
            "analysis",
            Arc::new(
                StubAlgorithm::new("analyzer")
                    .with_cardinality(0)
                    .with_log(log.clone()),
            ),
        )
        .unwrap();

    let graph = builder.build(&BuildOptions::default()).unwrap();
    let service = PrecedenceService::new(graph);
    let scheduler = Arc::new(
        AvalancheScheduler::new(service, &SchedulerOptions::default(), whiteboard(1)).unwrap(),
    );
    *scheduler_cell.lock().unwrap() = Some(scheduler.clone());

    scheduler.push_new_event(EventContext::new(5)).unwrap();
    let finished = pop(&scheduler).await;
    assert!(!finished.failed);
    assert_eq!(log.count_of("splitter"), 1);
    assert_eq!(log.count_of("analyzer"), 3, "one run per event view");
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn backpressure_on_slot_exhaustion() {
    let log = ExecutionLog::new();
    let mut builder = GraphBuilder::new("backpressure");
    builder.add_head("head", HubProps::default()).unwrap();
    builder
        .add_algorithm(
            "head",
            Arc::new(
                StubAlgorithm::new("work")
                    .with_cardinality(0)
                    .sleeping(50)
                    .with_log(log.clone()),
            ),
        )
        .unwrap();

    let scheduler = scheduler(builder, 2);
    assert_eq!(scheduler.slot_count(), 2);
    scheduler.push_new_event(EventContext::new(1)).unwrap();
    scheduler.push_new_event(EventContext::new(2)).unwrap();
    assert!(matches!(
        scheduler.push_new_event(EventContext::new(3)),
        Err(ScheduleError::SlotUnavailable)
    ));
    assert_eq!(scheduler.free_slots(), 0);

    let _ = pop(&scheduler).await;
    scheduler.push_new_event(EventContext::new(3)).unwrap();

    let mut remaining = 2;
    while remaining > 0 {
        let _ = pop(&scheduler).await;
        remaining -= 1;
    }
    assert_eq!(log.count_of("work"), 3);
    assert_eq!(scheduler.free_slots(), 2);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn batch_push_is_atomic() {
    let mut builder = GraphBuilder::new("batch");
    builder.add_head("head", HubProps::default()).unwrap();
    builder
        .add_algorithm("head", Arc::new(StubAlgorithm::new("a").with_cardinality(0)))
        .unwrap();

    let scheduler = scheduler(builder, 2);
    let contexts: Vec<EventContext> = (1..=3).map(EventContext::new).collect();
    assert!(matches!(
        scheduler.push_new_events(contexts),
        Err(ScheduleError::BatchTooLarge {
            requested: 3,
            available: 2
        })
    ));
    // nothing was scheduled
    assert_eq!(scheduler.free_slots(), 2);

    scheduler
        .push_new_events((1..=2).map(EventContext::new).collect())
        .unwrap();
    let _ = pop(&scheduler).await;
    let _ = pop(&scheduler).await;
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn algorithm_error_fails_the_event() {
    let mut builder = GraphBuilder::new("erroring");
    builder.add_head("head", HubProps::default()).unwrap();
    builder
        .add_algorithm("head", Arc::new(StubAlgorithm::new("broken").failing()))
        .unwrap();

    let scheduler = scheduler(builder, 1);
    scheduler.push_new_event(EventContext::new(11)).unwrap();

    let finished = pop(&scheduler).await;
    assert!(finished.failed);
    assert_eq!(finished.context.event_number, 11);
    // the slot is reusable after the failure
    scheduler.push_new_event(EventContext::new(12)).unwrap();
    let finished = pop(&scheduler).await;
    assert!(finished.failed);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn scarce_instances_park_in_resourceless() {
    // one instance of "shared", two slots racing for it
    let log = ExecutionLog::new();
    let mut builder = GraphBuilder::new("scarce");
    builder.add_head("head", HubProps::default()).unwrap();
    builder
        .add_algorithm(
            "head",
            Arc::new(
                StubAlgorithm::new("shared")
                    .with_cardinality(1)
                    .sleeping(20)
                    .with_log(log.clone()),
            ),
        )
        .unwrap();

    let scheduler = scheduler(builder, 2);
    scheduler
        .push_new_events((1..=2).map(EventContext::new).collect())
        .unwrap();

    let first = pop(&scheduler).await;
    let second = pop(&scheduler).await;
    assert!(!first.failed && !second.failed);
    assert_eq!(log.count_of("shared"), 2);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn blocking_cap_drains_the_blocking_queue() {
    let log = ExecutionLog::new();
    let mut builder = GraphBuilder::new("blocking");
    builder
        .add_head(
            "head",
            HubProps {
                concurrent: true,
                ..HubProps::default()
            },
        )
        .unwrap();
    for name in ["io1", "io2", "io3"] {
        builder
            .add_algorithm(
                "head",
                Arc::new(
                    StubAlgorithm::new(name)
                        .blocking()
                        .sleeping(10)
                        .with_log(log.clone()),
                ),
            )
            .unwrap();
    }

    let graph = builder.build(&BuildOptions::default()).unwrap();
    let service = PrecedenceService::new(graph);
    let options = SchedulerOptions {
        preemptive_blocking_tasks: true,
        max_blocking_algos_in_flight: 1,
        ..SchedulerOptions::default()
    };
    let scheduler = AvalancheScheduler::new(service, &options, whiteboard(1)).unwrap();

    scheduler.push_new_event(EventContext::new(1)).unwrap();
    let finished = pop(&scheduler).await;
    assert!(!finished.failed);
    // the cap of one never deadlocks: all three blocking tasks complete
    assert_eq!(log.names().len(), 3);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn inline_mode_runs_everything_in_the_scheduler_loop() {
    let log = ExecutionLog::new();
    let mut builder = GraphBuilder::new("inline");
    builder
        .add_head(
            "head",
            HubProps {
                concurrent: true,
                ..HubProps::default()
            },
        )
        .unwrap();
    builder
        .add_algorithm(
            "head",
            Arc::new(StubAlgorithm::new("p").with_outputs(&["d"]).with_log(log.clone())),
        )
        .unwrap();
    builder
        .add_algorithm(
            "head",
            Arc::new(StubAlgorithm::new("c").with_inputs(&["d"]).with_log(log.clone())),
        )
        .unwrap();

    let graph = builder.build(&BuildOptions::default()).unwrap();
    let service = PrecedenceService::new(graph);
    let options = SchedulerOptions {
        thread_pool_size: -100,
        ..SchedulerOptions::default()
    };
    let scheduler = AvalancheScheduler::new(service, &options, whiteboard(1)).unwrap();

    scheduler.push_new_event(EventContext::new(1)).unwrap();
    let finished = pop(&scheduler).await;
    assert!(!finished.failed);
    assert_eq!(log.names(), vec!["p", "c"]);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn occupancy_sampling_reports_state_changes() {
    let samples = Arc::new(Mutex::new(Vec::new()));
    let sink = samples.clone();

    let mut builder = GraphBuilder::new("occupancy");
    builder.add_head("head", HubProps::default()).unwrap();
    builder
        .add_algorithm("head", Arc::new(StubAlgorithm::new("a")))
        .unwrap();

    let scheduler = scheduler(builder, 1);
    scheduler
        .record_occupancy(
            0,
            Box::new(move |snapshot| {
                sink.lock().unwrap().push(snapshot);
            }),
        )
        .unwrap();

    scheduler.push_new_event(EventContext::new(1)).unwrap();
    let _ = pop(&scheduler).await;

    let collected = samples.lock().unwrap().len();
    assert!(collected > 0, "per-change sampling produced nothing");
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn pre_run_simulation_accepts_a_sound_graph() {
    let mut builder = GraphBuilder::new("simulated");
    builder.add_head("head", HubProps::default()).unwrap();
    builder
        .add_algorithm("head", Arc::new(StubAlgorithm::new("p").with_outputs(&["d"])))
        .unwrap();
    builder
        .add_algorithm("head", Arc::new(StubAlgorithm::new("c").with_inputs(&["d"])))
        .unwrap();

    let graph = builder.build(&BuildOptions::default()).unwrap();
    let service = PrecedenceService::new(graph);
    let options = SchedulerOptions {
        simulate_execution: true,
        ..SchedulerOptions::default()
    };
    let scheduler = AvalancheScheduler::new(service, &options, whiteboard(1)).unwrap();

    scheduler.push_new_event(EventContext::new(1)).unwrap();
    assert!(!pop(&scheduler).await.failed);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn pre_run_simulation_rejects_unreachable_data() {
    let mut builder = GraphBuilder::new("unsound");
    builder.add_head("head", HubProps::default()).unwrap();
    builder
        .add_algorithm(
            "head",
            Arc::new(StubAlgorithm::new("c").with_inputs(&["never_produced"])),
        )
        .unwrap();

    let graph = builder.build(&BuildOptions::default()).unwrap();
    let service = PrecedenceService::new(graph);
    let options = SchedulerOptions {
        simulate_execution: true,
        ..SchedulerOptions::default()
    };
    assert!(AvalancheScheduler::new(service, &options, whiteboard(1)).is_err());
}

#[tokio::test]
async fn condition_data_is_requested_on_demand() {
    use crate::traits::ConditionsService;
    use std::collections::HashSet;

    #[derive(Default)]
    struct TestConditions {
        valid: Mutex<HashSet<String>>,
    }

    impl TestConditions {
        fn make_valid(&self, data_id: &str) {
            self.valid.lock().unwrap().insert(data_id.to_string());
        }
    }

    impl ConditionsService for TestConditions {
        fn is_valid(&self, _context: &EventContext, data_id: &str) -> bool {
            self.valid.lock().unwrap().contains(data_id)
        }

        fn valid_ranges(&self, _data_id: &str) -> Vec<(u64, u64)> {
            Vec::new()
        }
    }

    let conditions = Arc::new(TestConditions::default());
    let log = ExecutionLog::new();

    let mut builder = GraphBuilder::new("conditions");
    builder.with_conditions(conditions.clone());
    builder.add_head("head", HubProps::default()).unwrap();

    // the condition algorithm loads validity from inside its body
    let loader_conditions = conditions.clone();
    builder
        .add_condition_algorithm(Arc::new(
            StubAlgorithm::new("cond_loader")
                .with_outputs(&["cond/field"])
                .with_log(log.clone())
                .with_hook(move |_| loader_conditions.make_valid("cond/field")),
        ))
        .unwrap();
    builder
        .add_algorithm(
            "head",
            Arc::new(
                StubAlgorithm::new("user")
                    .with_inputs(&["cond/field"])
                    .with_log(log.clone()),
            ),
        )
        .unwrap();

    let scheduler = scheduler(builder, 1);
    scheduler.push_new_event(EventContext::new(21)).unwrap();

    let finished = pop(&scheduler).await;
    assert!(!finished.failed);
    // the requester strategy scheduled the condition algorithm first
    assert_eq!(log.names(), vec!["cond_loader", "user"]);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_refuses_further_events() {
    let mut builder = GraphBuilder::new("closed");
    builder.add_head("head", HubProps::default()).unwrap();
    builder
        .add_algorithm("head", Arc::new(StubAlgorithm::new("a")))
        .unwrap();

    let scheduler = scheduler(builder, 1);
    scheduler.shutdown().await.unwrap();
    assert!(matches!(
        scheduler.push_new_event(EventContext::new(1)),
        Err(ScheduleError::SchedulerShutdown)
    ));
}
