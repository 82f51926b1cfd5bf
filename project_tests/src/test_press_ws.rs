//! Live end-to-end runner for a locally running relay.
//!
//! Connects a handful of WebSocket subscribers, produces a burst of press
//! cycles over `POST /data`, and verifies that every subscriber saw every
//! record in submission order. Run it against a server started with the
//! default configuration:
//!
//! ```text
//! cargo run --bin server_press
//! cargo run --bin test_press_ws -- --records 200 --subscribers 3
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Base HTTP address of the relay
    #[clap(long, default_value = "http://127.0.0.1:3000")]
    http: String,

    /// WebSocket URL of the relay
    #[clap(long, default_value = "ws://127.0.0.1:3000/ws")]
    ws: String,

    /// Number of records to produce
    #[clap(long, default_value_t = 100)]
    records: usize,

    /// Number of concurrent subscribers
    #[clap(long, default_value_t = 3)]
    subscribers: usize,

    /// Per-record receive timeout in seconds
    #[clap(long, default_value_t = 5)]
    recv_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // A unique topic per run lets subscribers tell this burst apart from
    // seeded last-state frames or records from other producers.
    let topic = format!("press-e2e-{}", chrono::Utc::now().timestamp_millis());

    // Connect all subscribers before producing anything.
    let mut sockets = Vec::with_capacity(args.subscribers);
    for i in 0..args.subscribers {
        let (socket, _) = connect_async(&args.ws)
            .await
            .with_context(|| format!("subscriber {i} failed to connect to {}", args.ws))?;
        sockets.push(socket);
    }
    println!("{} subscribers connected to {}", sockets.len(), args.ws);

    let http = reqwest::Client::new();
    let produce_url = format!("{}/data", args.http);
    let started = chrono::Utc::now();

    // t_ms doubles as the sequence number, so ordering is checkable on the
    // receiving end.
    for seq in 0..args.records {
        let event = if seq % 2 == 0 { "top" } else { "base" };
        let body = json!({
            "topic": topic,
            "event": event,
            "t_ms": seq as f64,
            "v_rms_g": 0.30 + (seq % 10) as f64 / 100.0,
        });
        let resp = http.post(&produce_url).json(&body).send().await?;
        if resp.status().as_u16() != 204 {
            bail!("POST /data returned {} for record {seq}", resp.status());
        }
    }
    let produced_in = chrono::Utc::now() - started;
    println!(
        "produced {} records in {} ms",
        args.records,
        produced_in.num_milliseconds()
    );

    // Every subscriber must see every record of this burst, in order.
    for (i, socket) in sockets.iter_mut().enumerate() {
        let mut expected = 0usize;
        while expected < args.records {
            let frame = timeout(Duration::from_secs(args.recv_timeout_secs), socket.next())
                .await
                .with_context(|| format!("subscriber {i} timed out waiting for t_ms {expected}"))?;

            let msg = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                other => bail!("subscriber {i} got unexpected frame: {other:?}"),
            };

            let value: Value = serde_json::from_str(&msg)?;
            if value.get("topic").and_then(Value::as_str) != Some(topic.as_str()) {
                // Seeded last state or someone else's record; ignore.
                continue;
            }
            let t_ms = value
                .get("t_ms")
                .and_then(Value::as_f64)
                .context("record without t_ms")?;
            if t_ms != expected as f64 {
                bail!("subscriber {i} saw t_ms {t_ms}, expected {expected}: order violated");
            }
            expected += 1;
        }
        println!("subscriber {i}: all {} records in order", args.records);
    }

    let last: Value = http
        .get(format!("{}/data/last", args.http))
        .send()
        .await?
        .json()
        .await?;
    println!("last state: {last}");

    let events: Vec<Value> = http
        .get(format!("{}/data/events?limit=5", args.http))
        .send()
        .await?
        .json()
        .await?;
    println!("history tail holds {} records", events.len());

    println!("OK");
    Ok(())
}
