//! Scribe background loop
//!
//! Buffers the stream's bus traffic and writes it to the message log when
//! the buffer is full or the flush timer fires. Hangup ends the loop with one
//! final flush; a failed flush keeps the buffer for the next attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::log::MessageLog;
use crate::config::MIN_PERIOD;
use crate::error::{Error, Result};
use crate::hangup::{HangupRecver, HangupSender};
use crate::river::{Bus, River};
use crate::stats::ScribeReport;

pub(crate) struct Scribe {
    pub(crate) stream: String,
    pub(crate) recver: HangupRecver<Bus>,
    pub(crate) responder: Arc<HangupSender>,
    pub(crate) log: Arc<dyn MessageLog>,
    pub(crate) batch_size: usize,
    pub(crate) flush_interval: Duration,
}

impl Scribe {
    pub(crate) async fn run(self) -> Result<ScribeReport> {
        let started = Instant::now();
        let responder = Arc::clone(&self.responder);
        let answer = tokio::spawn(async move { responder.await_hangup().await });

        let mut buffer: Vec<Bytes> = Vec::with_capacity(self.batch_size);
        let mut report = ScribeReport::default();
        let mut ticker = tokio::time::interval(self.flush_interval.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        tracing::info!(stream = %self.stream, "Scribe started");

        loop {
            tokio::select! {
                msg = self.recver.recv() => match msg {
                    Ok(Some(msg)) => {
                        buffer.push(msg);
                        if buffer.len() >= self.batch_size {
                            let _ = self.flush(&mut buffer, &mut report);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(stream = %self.stream, error = %e, "Scribe bus failed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        let _ = self.flush(&mut buffer, &mut report);
                    }
                }
            }
        }

        // Anything delivered before the bus closed is still ours to keep
        let bus = self.recver.inner();
        let _ = bus.close();
        buffer.extend(bus.drain());

        let result = if buffer.is_empty() {
            Ok(())
        } else {
            self.flush(&mut buffer, &mut report)
                .map_err(|e| Error::Scribe {
                    stream: self.stream.clone(),
                    unflushed: buffer.len(),
                    source: Box::new(e),
                })
        };

        self.retire(answer).await;
        report.uptime = started.elapsed();

        tracing::info!(
            stream = %self.stream,
            messages = report.messages_flushed,
            flushes = report.flushes,
            failed_flushes = report.failed_flushes,
            "Scribe stopped"
        );
        result.map(|()| report)
    }

    fn flush(&self, buffer: &mut Vec<Bytes>, report: &mut ScribeReport) -> Result<()> {
        match self.log.append(&self.stream, buffer) {
            Ok(()) => {
                report.messages_flushed += buffer.len() as u64;
                report.flushes += 1;
                tracing::debug!(stream = %self.stream, count = buffer.len(), "Flushed");
                buffer.clear();
                Ok(())
            }
            Err(e) => {
                report.failed_flushes += 1;
                tracing::error!(
                    stream = %self.stream,
                    buffered = buffer.len(),
                    error = %e,
                    "Flush failed, keeping buffer"
                );
                Err(e)
            }
        }
    }

    async fn retire(&self, answer: JoinHandle<Result<()>>) {
        let hung_up = self.responder.is_hung_up();
        if !hung_up {
            // Wakes the answering task with a closed socket
            let _ = self.responder.responder().leave();
        }

        match answer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(stream = %self.stream, error = %e, "Hangup responder ended");
            }
            Err(e) => {
                tracing::warn!(stream = %self.stream, error = %e, "Hangup responder task failed");
            }
        }

        if hung_up {
            let _ = self.responder.responder().leave();
        }
        if let Err(e) = self.recver.inner().leave() {
            tracing::warn!(stream = %self.stream, error = %e, "Scribe bus deregistration failed");
        }
    }
}
