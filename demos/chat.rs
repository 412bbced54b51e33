//! Chat room demo
//!
//! Run with: cargo run --example chat [PARTICIPANTS] [MESSAGES]
//!
//! Examples:
//!   cargo run --example chat            # 3 participants, 5 messages each
//!   cargo run --example chat 10 100     # 10 participants, 100 messages each
//!
//! Every participant joins the `lobby` stream, talks, and listens to the
//! others. Then every participant is kicked and leaves, and the last one out
//! gets the scribe's report. The logged history is printed at
//! the end.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rivers::{Participant, Rivers, Scribes, StoreLog};

const STREAM: &str = "lobby";

fn print_usage() {
    println!("Usage: chat [PARTICIPANTS] [MESSAGES]");
    println!();
    println!("  PARTICIPANTS  number of peers joining the lobby (default 3)");
    println!("  MESSAGES      messages sent by each peer (default 5)");
}

async fn listen(participant: Arc<Participant>) -> usize {
    let mut heard = 0;
    loop {
        match participant.recv().await {
            Ok(Some(msg)) => {
                heard += 1;
                tracing::debug!(
                    peer = participant.peer(),
                    msg = %String::from_utf8_lossy(&msg),
                    "Heard"
                );
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(peer = participant.peer(), error = %e, "Listener stopped");
                break;
            }
        }
    }
    heard
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    let participants: usize = args.get(1).map(|s| s.parse()).transpose()?.unwrap_or(3);
    let messages: usize = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(5);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rivers=info".parse()?)
                .add_directive("chat=debug".parse()?),
        )
        .init();

    let rivers = Rivers::new();
    let scribes = Arc::new(Scribes::new(rivers.clone()));

    let mut peers = Vec::with_capacity(participants);
    for i in 0..participants {
        let participant = Participant::join(&scribes, STREAM, &format!("user{}", i)).await?;
        peers.push(Arc::new(participant));
    }

    let listeners: Vec<_> = peers
        .iter()
        .map(|p| tokio::spawn(listen(Arc::clone(p))))
        .collect();

    for n in 0..messages {
        for peer in &peers {
            let line = format!("{} says hello #{}", peer.peer(), n);
            peer.send(Bytes::from(line)).await?;
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Kicking ends each listener with end-of-stream
    for peer in &peers {
        Participant::kick(&rivers, STREAM, peer.peer()).await?;
        tracing::info!(peer = peer.peer(), "Kicked");
    }

    for (peer, listener) in peers.iter().zip(listeners) {
        let heard = listener.await?;
        println!("{} heard {} messages", peer.peer(), heard);
    }

    for peer in peers {
        let Ok(participant) = Arc::try_unwrap(peer) else {
            continue;
        };
        if let Some(report) = participant.leave().await? {
            println!(
                "Scribe flushed {} messages in {} flushes ({:.1} per flush)",
                report.messages_flushed,
                report.flushes,
                report.average_batch()
            );
        }
    }

    let log = StoreLog::new(rivers.store().clone(), &rivers.config().namespaces.log);
    println!("History ({} messages):", log.len(STREAM)?);
    for msg in log.messages(STREAM)?.iter().take(10) {
        println!("  {}", String::from_utf8_lossy(msg));
    }
    Ok(())
}
