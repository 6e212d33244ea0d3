use futures::StreamExt;
use redy_client::{NodeReading, Reading};

use crate::hosts::EntityHost;
use crate::pipeline::{Envelope, PipelineError, Sink};
use crate::registry::ReadingRegistry;

/// Folds each cycle's nodes into the reading registry and hands the result
/// to the host: refreshed state for known entities, then one registration
/// batch for the new ones.
///
/// Failed cycles are logged and skipped; they leave every reading as it was.
pub struct ReconcileSink<H> {
    host: H,
}

impl<H: EntityHost> ReconcileSink<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    #[cfg(test)]
    pub(crate) fn host(&self) -> &H {
        &self.host
    }

    async fn apply_cycle(&self, registry: &mut ReadingRegistry, env: Envelope<Vec<NodeReading>>) {
        let cycle = env.cycle;
        let outcome = registry.reconcile(env.payload);

        for reading in &outcome.updated {
            let entity = reading.to_entity();
            metrics::counter!("redy_entity_updates_total").increment(1);
            tracing::debug!(cycle, unique_id = %entity.unique_id, state = ?entity.state, "updating sensor");

            if let Err(e) = self.host.publish(&entity).await {
                metrics::counter!("redy_host_errors_total").increment(1);
                tracing::warn!(cycle, unique_id = %entity.unique_id, error = %e, "host refused state update");
            }
        }

        if !outcome.created.is_empty() {
            let entities = outcome.created.iter().map(Reading::to_entity).collect();
            match self.host.add_entities(entities).await {
                Ok(()) => {
                    metrics::counter!("redy_entities_created_total")
                        .increment(outcome.created.len() as u64);
                    for reading in &outcome.created {
                        tracing::info!(cycle, id = %reading.id, name = %reading.name, "registered sensor");
                    }
                }
                Err(e) => {
                    metrics::counter!("redy_host_errors_total").increment(1);
                    tracing::error!(
                        cycle,
                        count = outcome.created.len(),
                        error = %e,
                        "host refused new sensors; will retry next cycle"
                    );
                    registry.forget(outcome.created.iter().map(|r| r.id.as_str()));
                }
            }
        }

        metrics::gauge!("redy_entities").set(registry.len() as f64);
    }
}

#[async_trait::async_trait]
impl<H: EntityHost> Sink<Vec<NodeReading>> for ReconcileSink<H> {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Vec<NodeReading>>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        // Owned by this loop only; nothing else touches the readings.
        let mut registry = ReadingRegistry::new();

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(kind = e.kind(), error = %e, "poll cycle failed");
                    continue;
                }
            };

            self.apply_cycle(&mut registry, env).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::HostError;
    use pretty_assertions::assert_eq;
    use redy_client::{DeviceError, SensorEntity};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };
    use std::time::SystemTime;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Add(Vec<(String, Option<i64>)>),
        Publish(String, Option<i64>),
    }

    /// Records host calls; refuses the first `refuse_adds` registrations.
    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<Call>>,
        refuse_adds: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EntityHost for RecordingHost {
        async fn add_entities(&self, entities: Vec<SensorEntity>) -> Result<(), HostError> {
            if self
                .refuse_adds
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(HostError::Config("refused".to_string()));
            }
            let batch = entities.into_iter().map(|e| (e.unique_id, e.state)).collect();
            self.calls.lock().unwrap().push(Call::Add(batch));
            Ok(())
        }

        async fn publish(&self, entity: &SensorEntity) -> Result<(), HostError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Publish(entity.unique_id.clone(), entity.state));
            Ok(())
        }
    }

    fn cycle(n: u64, nodes: Vec<NodeReading>) -> Result<Envelope<Vec<NodeReading>>, PipelineError> {
        Ok(Envelope {
            payload: nodes,
            cycle: n,
            received_at: SystemTime::now(),
        })
    }

    fn plug(id: &str, kw: f64) -> NodeReading {
        NodeReading::power_only(id, "Plug", kw)
    }

    async fn run(host: RecordingHost, items: Vec<Result<Envelope<Vec<NodeReading>>, PipelineError>>) -> Vec<Call> {
        let sink = ReconcileSink::new(host);
        sink.run(futures::stream::iter(items)).await.unwrap();
        let calls = sink.host().calls.lock().unwrap().clone();
        calls
    }

    #[tokio::test]
    async fn new_nodes_are_registered_in_one_batch() {
        let calls = run(
            RecordingHost::default(),
            vec![cycle(1, vec![plug("n1", 0.5), plug("n2", 0.25)])],
        )
        .await;

        assert_eq!(
            calls,
            vec![Call::Add(vec![
                ("n1".to_string(), Some(500)),
                ("n2".to_string(), Some(250)),
            ])]
        );
    }

    #[tokio::test]
    async fn known_nodes_are_published_and_new_ones_batched_after() {
        let calls = run(
            RecordingHost::default(),
            vec![
                cycle(1, vec![plug("n1", 0.5)]),
                cycle(2, vec![plug("n2", 0.1), plug("n1", 0.6)]),
            ],
        )
        .await;

        assert_eq!(
            calls,
            vec![
                Call::Add(vec![("n1".to_string(), Some(500))]),
                Call::Publish("n1".to_string(), Some(600)),
                Call::Add(vec![("n2".to_string(), Some(100))]),
            ]
        );
    }

    #[tokio::test]
    async fn cycle_without_new_nodes_registers_nothing() {
        let calls = run(
            RecordingHost::default(),
            vec![cycle(1, vec![plug("n1", 0.5)]), cycle(2, vec![]), cycle(3, vec![plug("n1", 0.5)])],
        )
        .await;

        assert_eq!(
            calls,
            vec![
                Call::Add(vec![("n1".to_string(), Some(500))]),
                Call::Publish("n1".to_string(), Some(500)),
            ]
        );
    }

    #[tokio::test]
    async fn failed_cycles_leave_readings_untouched() {
        let calls = run(
            RecordingHost::default(),
            vec![
                cycle(1, vec![plug("n1", 0.5)]),
                Err(PipelineError::Source(DeviceError::MissingPayload)),
                Err(PipelineError::Transform("payload is not an object".to_string())),
                cycle(4, vec![plug("n1", 0.7)]),
            ],
        )
        .await;

        assert_eq!(
            calls,
            vec![
                Call::Add(vec![("n1".to_string(), Some(500))]),
                Call::Publish("n1".to_string(), Some(700)),
            ]
        );
    }

    #[tokio::test]
    async fn refused_registration_is_retried_next_cycle() {
        let host = RecordingHost {
            refuse_adds: AtomicUsize::new(1),
            ..RecordingHost::default()
        };

        let calls = run(
            host,
            vec![cycle(1, vec![plug("n1", 0.5)]), cycle(2, vec![plug("n1", 0.8)])],
        )
        .await;

        assert_eq!(calls, vec![Call::Add(vec![("n1".to_string(), Some(800))])]);
    }
}
