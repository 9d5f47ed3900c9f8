//! End-to-end saga runs: coordinator, pumps and participants under one supervisor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::SagaId;
use queue::{
    Command, InMemoryChannel, MessageChannel, MessageChannelExt, MessagePump, Processor,
    PumpConfig, QueueError, RESPONSES_QUEUE, Response,
};
use saga::{ParticipantSpec, SAMPLE_WORKFLOW, SagaCoordinator, WorkflowDefinition};
use state_store::{InMemoryStateStore, SagaStatus, StateStore};
use supervisor::{ExitStatus, TaskSupervisor};
use tokio::sync::watch;

/// A participant that answers every command with a fixed status.
struct ScriptedParticipant {
    name: String,
    responses: Arc<dyn MessageChannel>,
    fail: bool,
}

#[async_trait]
impl Processor<Command> for ScriptedParticipant {
    type Error = QueueError;

    async fn process(&self, command: Command) -> Result<(), QueueError> {
        let response = if self.fail {
            Response::error(command.saga_id, &self.name)
        } else {
            Response::done(command.saga_id, &self.name)
        };
        self.responses.send(&response).await
    }
}

struct TestHarness {
    store: InMemoryStateStore,
    coordinator: Arc<SagaCoordinator<InMemoryStateStore>>,
    responses: InMemoryChannel,
    command_queues: Vec<InMemoryChannel>,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryStateStore::new();
        let specs = ParticipantSpec::parse_list(SAMPLE_WORKFLOW).unwrap();
        let command_queues: Vec<_> = specs
            .iter()
            .map(|spec| InMemoryChannel::new(spec.queue.clone()))
            .collect();

        let mut queues = command_queues.iter();
        let workflow = WorkflowDefinition::build(&specs, |_| {
            let queue = queues.next().unwrap().clone();
            Arc::new(queue) as Arc<dyn MessageChannel>
        });
        let coordinator = Arc::new(SagaCoordinator::new(store.clone(), Arc::new(workflow)));

        Self {
            store,
            coordinator,
            responses: InMemoryChannel::new(RESPONSES_QUEUE),
            command_queues,
        }
    }

    fn pump_config() -> PumpConfig {
        PumpConfig {
            max_messages: 10,
            wait_time: Duration::from_millis(50),
        }
    }

    /// Builds a supervisor running the response pump plus one pump per
    /// participant. `failing` names the participant that answers `error`.
    fn supervisor(&self, failing: Option<&str>) -> TaskSupervisor {
        let mut supervisor = TaskSupervisor::without_signal_handling();

        let response_pump = MessagePump::new(
            Arc::new(self.responses.clone()),
            Arc::clone(&self.coordinator),
            Self::pump_config(),
        );
        supervisor.add("response-pump", move |shutdown| async move {
            response_pump.run(shutdown).await?;
            Ok(())
        });

        for (participant, queue) in self
            .coordinator
            .workflow()
            .participants()
            .iter()
            .zip(&self.command_queues)
        {
            let processor = Arc::new(ScriptedParticipant {
                name: participant.name().to_string(),
                responses: Arc::new(self.responses.clone()),
                fail: failing == Some(participant.name()),
            });
            let pump = MessagePump::new(Arc::new(queue.clone()), processor, Self::pump_config());
            supervisor.add(participant.name().to_string(), move |shutdown| async move {
                pump.run(shutdown).await?;
                Ok(())
            });
        }

        supervisor
    }

    async fn wait_for_status(&self, id: SagaId, status: SagaStatus) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let record = self.store.get_saga(id).await.unwrap();
            if record.as_ref().map(|r| r.status) == Some(status) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "saga {id} never reached {status:?}, last seen {record:?}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[tokio::test]
async fn saga_runs_through_every_participant() {
    let harness = TestHarness::new();
    let (cancel, parent) = watch::channel(false);
    let run = tokio::spawn(harness.supervisor(None).run(parent));

    let id = SagaId::new();
    harness.coordinator.start(id).await.unwrap();
    harness.wait_for_status(id, SagaStatus::Completed).await;

    let record = harness.store.get_saga(id).await.unwrap().unwrap();
    assert_eq!(record.current_service, "service3");

    cancel.send(true).unwrap();
    let report = run.await.unwrap();
    assert_eq!(report.status, ExitStatus::Success);

    assert_eq!(harness.responses.pending_count().await, 0);
    for queue in &harness.command_queues {
        assert_eq!(queue.pending_count().await, 0);
    }
}

#[tokio::test]
async fn many_sagas_complete_independently() {
    let harness = TestHarness::new();
    let (cancel, parent) = watch::channel(false);
    let run = tokio::spawn(harness.supervisor(None).run(parent));

    let ids: Vec<_> = (0..20).map(|_| SagaId::new()).collect();
    for id in &ids {
        harness.coordinator.start(*id).await.unwrap();
    }
    for id in &ids {
        harness.wait_for_status(*id, SagaStatus::Completed).await;
    }

    cancel.send(true).unwrap();
    assert_eq!(run.await.unwrap().status, ExitStatus::Success);
    assert_eq!(harness.store.saga_count().await, 20);
}

#[tokio::test]
async fn participant_error_fails_saga_and_stops_the_chain() {
    let harness = TestHarness::new();
    let (cancel, parent) = watch::channel(false);
    let run = tokio::spawn(harness.supervisor(Some("service2")).run(parent));

    let id = SagaId::new();
    harness.coordinator.start(id).await.unwrap();
    harness.wait_for_status(id, SagaStatus::Error).await;

    let record = harness.store.get_saga(id).await.unwrap().unwrap();
    assert_eq!(record.current_service, "service2");

    cancel.send(true).unwrap();
    assert_eq!(run.await.unwrap().status, ExitStatus::Success);

    // The error response is never acknowledged and service3 never heard of the saga
    assert_eq!(harness.responses.pending_count().await, 1);
    assert_eq!(harness.command_queues[2].pending_count().await, 0);
}

#[tokio::test]
async fn duplicate_response_is_absorbed_end_to_end() {
    let harness = TestHarness::new();
    let id = SagaId::new();
    harness.coordinator.start(id).await.unwrap();

    // Two deliveries of the same done before any pump runs
    harness
        .responses
        .send(&Response::done(id, "service1"))
        .await
        .unwrap();
    harness
        .responses
        .send(&Response::done(id, "service1"))
        .await
        .unwrap();

    let pump = MessagePump::new(
        Arc::new(harness.responses.clone()),
        Arc::clone(&harness.coordinator),
        TestHarness::pump_config(),
    );
    let (cancel, shutdown) = watch::channel(false);
    let running = tokio::spawn(async move { pump.run(shutdown).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while harness.responses.pending_count().await > 0 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.send(true).unwrap();
    running.await.unwrap().unwrap();

    let sent: Vec<Command> = harness.command_queues[1].messages().await.unwrap();
    assert_eq!(sent, vec![Command::start(id)]);
}

#[tokio::test]
async fn unknown_status_stays_on_the_queue() {
    let harness = TestHarness::new();
    let stuck = SagaId::new();
    let moving = SagaId::new();
    harness.coordinator.start(stuck).await.unwrap();
    harness.coordinator.start(moving).await.unwrap();

    let responses = InMemoryChannel::with_visibility_timeout(RESPONSES_QUEUE, Duration::from_millis(50));
    responses
        .send_raw(format!(
            r#"{{"saga_id":"{stuck}","service":"service1","status":"paused"}}"#
        ))
        .await
        .unwrap();
    // Queued behind the unknown status, so its progress proves the pump got past it
    responses
        .send(&Response::done(moving, "service1"))
        .await
        .unwrap();

    let pump = MessagePump::new(
        Arc::new(responses.clone()),
        Arc::clone(&harness.coordinator),
        TestHarness::pump_config(),
    );
    let (cancel, shutdown) = watch::channel(false);
    let running = tokio::spawn(async move { pump.run(shutdown).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = harness.store.get_saga(moving).await.unwrap().unwrap();
        if record.current_service == "service2" {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "pump never advanced {moving}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Let the unknown status be redelivered at least once more
    tokio::time::sleep(Duration::from_millis(150)).await;
    cancel.send(true).unwrap();
    running.await.unwrap().unwrap();

    let record = harness.store.get_saga(stuck).await.unwrap().unwrap();
    assert_eq!(record.current_service, "service1");
    assert_eq!(record.status, SagaStatus::Started);
    assert_eq!(responses.pending_count().await, 1);
    let sent: Vec<Command> = harness.command_queues[1].messages().await.unwrap();
    assert_eq!(sent, vec![Command::start(moving)]);
}
