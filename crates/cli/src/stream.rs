//! `packetview events`: feed JSON-line events to the session list.

use anyhow::Result;
use packetview_api::{InboundEvent, OutboundEvent};
use packetview_core::{EventBus, SessionListController, ViewerBackend};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::output;

/// Parse one input line. Blank lines are skipped.
pub fn parse_event(line: &str) -> Option<Result<InboundEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Emit every event read from `input`, returning how many were accepted.
pub async fn pump_events<R: AsyncBufRead + Unpin>(input: R, bus: &EventBus) -> Result<usize> {
    let mut lines = input.lines();
    let mut accepted = 0;
    while let Some(line) = lines.next_line().await? {
        match parse_event(&line) {
            Some(Ok(event)) => {
                bus.emit(event);
                accepted += 1;
            }
            Some(Err(e)) => warn!("ignoring malformed event: {e}"),
            None => {}
        }
    }
    Ok(accepted)
}

async fn collect_outbound(mut rx: broadcast::Receiver<OutboundEvent>) -> Vec<OutboundEvent> {
    let mut seen = Vec::new();
    loop {
        match rx.recv().await {
            Ok(event) => seen.push(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "dropped rebroadcast events");
            }
            Err(broadcast::error::RecvError::Closed) => return seen,
        }
    }
}

/// Drive the controller from `input` until it is exhausted. Returns the
/// rebroadcast events and the final table.
pub async fn drive<B, R>(
    mut controller: SessionListController<B>,
    bus: EventBus,
    input: R,
) -> Result<(Vec<OutboundEvent>, String)>
where
    B: ViewerBackend,
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let outbound = tokio::spawn(collect_outbound(bus.subscribe_outbound()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reader_bus = bus.clone();
    let reader = tokio::spawn(async move {
        let result = pump_events(input, &reader_bus).await;
        let _ = shutdown_tx.send(true);
        result
    });

    controller.run(shutdown_rx).await;
    controller.teardown();
    controller.settle().await;
    let accepted = reader.await??;
    debug!(accepted, "event input exhausted");

    let table = output::render_table(&controller);
    drop(controller);
    drop(bus);
    let events = outbound.await?;
    Ok((events, table))
}

pub async fn run_events<B: ViewerBackend>(
    controller: SessionListController<B>,
    bus: EventBus,
) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let (events, table) = drive(controller, bus, stdin).await?;
    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }
    print!("{table}");
    Ok(())
}
