use std::{env, time::Duration};

use anyhow::{bail, Context, Result};
use redy_bridge::{observability, registry::ReadingRegistry};
use redy_client::{
    device::{extract_nodes, DEFAULT_PORT},
    DeviceClient, Reading,
};

/// One fetch-and-extract pass against a device, printed as JSON.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: redy_probe <host> [port]");
    }
    let host = &args[1];
    let port = match args.get(2) {
        Some(p) => p.parse().with_context(|| format!("invalid port {p}"))?,
        None => DEFAULT_PORT,
    };

    let client = DeviceClient::new(host, port, Duration::from_secs(10))?;
    let payload = client
        .fetch_payload()
        .await
        .with_context(|| format!("failed to get data from {}", client.url()))?;

    let extraction = extract_nodes(&payload)?;
    for issue in &extraction.issues {
        tracing::warn!(issue = %issue, "extraction issue");
    }

    // Same create-or-update rules as the bridge, so repeated ids collapse.
    let readings: Vec<Reading> = ReadingRegistry::new().reconcile(extraction.nodes).created;
    println!("{}", serde_json::to_string_pretty(&readings)?);

    Ok(())
}
