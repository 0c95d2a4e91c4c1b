use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use courier_core::{ConfirmConfig, InMemoryTransport, PublishOptions, Publisher};

/// Demo: an in-memory broker that acks the first two deliveries
/// cumulatively, nacks the third once, then accepts its resubmission.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let (transport, events) = InMemoryTransport::new();
    let transport = Arc::new(transport);

    let publisher = Publisher::spawn(
        transport.clone(),
        events,
        ConfirmConfig {
            max_in_flight: 8,
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            ..Default::default()
        },
    );

    // Play broker on the side.
    let broker = {
        let transport = transport.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            transport.ack(2, true).await;
            transport.nack(3, false, "queue overflow").await;
            // The resubmission of #3 arrives as delivery tag 4.
            sleep(Duration::from_millis(300)).await;
            transport.ack(4, false).await;
        })
    };

    let mut handles = Vec::new();
    for signal in ["buy", "hold", "sell"] {
        let payload = serde_json::json!({ "signal": signal });
        let handle = publisher
            .publish(
                serde_json::to_vec(&payload).unwrap(),
                "decisions.signals",
                PublishOptions::default(),
            )
            .await
            .expect("publish admitted");
        println!("published {signal:>4} as delivery #{}", handle.sequence());
        handles.push((signal, handle));
    }

    for (signal, handle) in handles {
        match handle.await_confirm().await {
            Ok(confirmation) => println!(
                "confirmed {signal:>4}: sequence={} attempts={}",
                confirmation.sequence, confirmation.attempts
            ),
            Err(err) => println!("failed {signal:>4}: {err}"),
        }
    }

    println!("counts: {:?}", publisher.counts().await);

    broker.await.unwrap();
    publisher
        .shutdown(Duration::from_secs(1))
        .await
        .expect("clean drain");
}
