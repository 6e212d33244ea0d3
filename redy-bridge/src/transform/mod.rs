use redy_client::device::{extract_nodes, Extraction};
use redy_client::{DevicePayload, NodeReading};

use crate::pipeline::{Envelope, PipelineError, Transform};

/// Turn one device payload into the list of metering nodes it reports.
///
/// Per-node problems are logged and counted; only a document that is not a
/// JSON object fails the cycle.
pub fn extract(env: Envelope<DevicePayload>) -> Result<Envelope<Vec<NodeReading>>, PipelineError> {
    let cycle = env.cycle;
    let Extraction { nodes, issues } = extract_nodes(&env.payload)
        .map_err(|e| PipelineError::Transform(e.to_string()))?;

    metrics::counter!("redy_extract_issues_total").increment(issues.len() as u64);
    for issue in &issues {
        if issue.is_unexpected() {
            tracing::error!(cycle, error = %issue, "unexpected error reading smart meter");
        } else {
            tracing::warn!(cycle, issue = %issue, "skipping malformed node");
        }
    }

    tracing::debug!(cycle, nodes = nodes.len(), issues = issues.len(), "extracted nodes");
    Ok(env.map(|_| nodes))
}

#[derive(Clone, Default)]
pub struct NodeExtraction;

#[async_trait::async_trait]
impl Transform<DevicePayload, Vec<NodeReading>> for NodeExtraction {
    async fn apply(
        &self,
        input: Envelope<DevicePayload>,
    ) -> Result<Envelope<Vec<NodeReading>>, PipelineError> {
        match extract(input) {
            Ok(env) => {
                metrics::counter!("redy_nodes_extracted_total").increment(env.payload.len() as u64);
                Ok(env)
            }
            Err(e) => {
                metrics::counter!("redy_poll_failures_total", "kind" => e.kind()).increment(1);
                Err(e)
            }
        }
    }
}
