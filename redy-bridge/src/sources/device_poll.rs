use std::{sync::Arc, time::{Duration, SystemTime}};

use futures::Stream;
use redy_client::{DeviceClient, DevicePayload};
use tokio::time::Instant;

use crate::pipeline::{Envelope, PipelineError, Source};

/// Nominal due times of the poll cycles.
///
/// Each due time is the previous due time plus the interval, so time spent
/// fetching never pushes later cycles back.
#[derive(Debug, Clone)]
pub struct Schedule {
    next_due: Instant,
    interval: Duration,
}

impl Schedule {
    pub fn new(first_due: Instant, interval: Duration) -> Self {
        Self {
            next_due: first_due,
            interval,
        }
    }

    /// Due time of the upcoming cycle; advances the schedule by one interval.
    pub fn advance(&mut self) -> Instant {
        let due = self.next_due;
        self.next_due += self.interval;
        due
    }
}

/// Polls the device forever on a fixed schedule, first cycle immediately.
///
/// Failed fetches are yielded as errors and the schedule keeps going.
pub struct DevicePollSource {
    client: Arc<DeviceClient>,
    interval: Duration,
}

impl DevicePollSource {
    pub fn new(client: DeviceClient, interval: Duration) -> Self {
        Self {
            client: Arc::new(client),
            interval,
        }
    }
}

#[async_trait::async_trait]
impl Source<DevicePayload> for DevicePollSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<DevicePayload>, PipelineError>> + Send>>
    {
        let client = self.client.clone();
        let mut schedule = Schedule::new(Instant::now(), self.interval);

        let s = async_stream::stream! {
            let mut cycle: u64 = 0;
            loop {
                tokio::time::sleep_until(schedule.advance()).await;
                cycle += 1;
                metrics::counter!("redy_poll_cycles_total").increment(1);

                match client.fetch_payload().await {
                    Ok(payload) => {
                        yield Ok(Envelope {
                            payload,
                            cycle,
                            received_at: SystemTime::now(),
                        });
                    }
                    Err(e) => {
                        metrics::counter!("redy_poll_failures_total", "kind" => e.kind()).increment(1);
                        tracing::debug!(cycle, url = client.url(), "device fetch failed");
                        yield Err(PipelineError::Source(e));
                    }
                }
            }
        };

        Box::pin(s)
    }
}
