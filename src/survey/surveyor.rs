//! Surveyor role
//!
//! The responder set is a snapshot taken at creation: responders registered
//! later are not surveyed by this instance.

use std::collections::BTreeSet;

use bytes::Bytes;

use super::{Reply, Round, HUP};
use crate::config::MIN_PERIOD;
use crate::error::{Error, Result};
use crate::registry::PeerAddr;
use crate::river::River;
use crate::rivers::Rivers;
use crate::transport::{Protocol, Socket};

/// Survey initiator over one bucket path
#[derive(Debug)]
pub struct Surveyor {
    socket: Socket,
    path: Vec<String>,
    expected: BTreeSet<u64>,
    attempts: usize,
}

impl Surveyor {
    pub(crate) fn create(rivers: &Rivers, path: &[&str]) -> Result<Self> {
        let config = rivers.config();
        let registry = rivers.registry(&config.namespaces.hangup);
        let ids = registry.list_sequences(path)?;

        let socket = rivers.transport().socket(Protocol::Surveyor);
        // Fields set directly bypass the builder's clamping
        socket.set_survey_time(config.survey_timeout.max(MIN_PERIOD))?;

        for id in &ids {
            let target = PeerAddr::new(registry.namespace(), path, id.to_string());
            // Unreachable responders stay expected and surface as missing
            if let Err(e) = socket.dial(&target.endpoint()) {
                tracing::warn!(target = %target, error = %e, "Responder not reachable");
            }
        }

        Ok(Self {
            socket,
            path: path.iter().map(|s| s.to_string()).collect(),
            expected: ids.into_iter().collect(),
            attempts: config.survey_attempts.max(1),
        })
    }

    /// Responder ids this surveyor expects to hear from
    pub fn expected(&self) -> &BTreeSet<u64> {
        &self.expected
    }

    /// Run one survey round asking every expected responder to hang up
    ///
    /// Succeeds when every responder acknowledged. Fails with
    /// [`Error::Rejected`] when some answered `IDK`, and with
    /// [`Error::Missing`] when some stayed silent through every attempt.
    pub async fn survey(&self) -> Result<()> {
        let mut round = Round::new(self.expected.clone());
        if round.is_complete() {
            return Ok(());
        }

        for attempt in 1..=self.attempts {
            // Retries repeat the first survey, so late answers to it still count
            let hup = Bytes::from_static(HUP);
            if attempt == 1 {
                self.socket.send(hup).await?;
            } else {
                self.socket.resurvey(hup).await?;
            }

            loop {
                match self.socket.recv().await {
                    Ok(bytes) => match Reply::decode(&bytes) {
                        Ok(reply) => {
                            if !round.record(reply) {
                                tracing::debug!(id = reply.id(), "Ignoring stray survey reply");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Unattributable survey reply");
                        }
                    },
                    // Window closed with nothing more pending
                    Err(Error::Timeout) => break,
                    Err(e) => return Err(e),
                }
                if round.is_complete() {
                    return round.finish();
                }
            }

            tracing::debug!(
                path = ?self.path,
                attempt = attempt,
                outstanding = ?round.outstanding(),
                "Survey attempt incomplete"
            );
        }

        let err = round.give_up();
        tracing::warn!(path = ?self.path, error = %err, "Survey gave up");
        Err(err)
    }
}

impl River for Surveyor {
    async fn send(&self, payload: Bytes) -> Result<()> {
        self.socket.send(payload).await
    }

    async fn recv(&self) -> Result<Bytes> {
        self.socket.recv().await
    }

    fn close(&self) -> Result<()> {
        self.socket.close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::RiverConfig;
    use crate::hangup::{Hangup, HangupSender};
    use crate::survey::Responder;

    fn rivers() -> Rivers {
        Rivers::with_config(RiverConfig::default().survey_timeout(Duration::from_millis(30)))
    }

    fn answer(responder: Responder) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { responder.await_hangup().await })
    }

    #[tokio::test]
    async fn test_all_responders_ok() {
        let rivers = rivers();
        let handles: Vec<_> = (0..3)
            .map(|_| answer(rivers.create_responder(&["lobby"]).unwrap()))
            .collect();

        let surveyor = rivers.create_surveyor(&["lobby"]).unwrap();
        assert_eq!(surveyor.expected().len(), 3);
        surveyor.survey().await.unwrap();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_silent_responder_is_missing() {
        let rivers = rivers();
        let talker = rivers.create_responder(&["lobby"]).unwrap();
        let silent = rivers.create_responder(&["lobby"]).unwrap();
        let silent_id = silent.id();
        let _talker = answer(talker);

        let surveyor = rivers.create_surveyor(&["lobby"]).unwrap();
        match surveyor.survey().await {
            Err(Error::Missing(ids)) => assert_eq!(ids, vec![silent_id]),
            other => panic!("expected missing, got {:?}", other),
        }
        drop(silent);
    }

    #[tokio::test]
    async fn test_rejecting_responder() {
        let rivers = rivers();
        let rejecting = Arc::new(rivers.create_responder(&["lobby"]).unwrap());
        let rejecting_id = rejecting.id();
        let _ok = answer(rivers.create_responder(&["lobby"]).unwrap());

        // Answers every survey with IDK
        let r = Arc::clone(&rejecting);
        tokio::spawn(async move {
            while r.recv().await.is_ok() {
                let _ = r.send(Reply::Unknown(rejecting_id).encode()).await;
            }
        });

        let surveyor = rivers.create_surveyor(&["lobby"]).unwrap();
        match surveyor.survey().await {
            Err(Error::Rejected(errored)) => {
                assert_eq!(errored.keys().copied().collect::<Vec<_>>(), vec![rejecting_id]);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_path() {
        let rivers = rivers();
        assert!(matches!(
            rivers.create_surveyor(&["nowhere"]),
            Err(Error::StreamMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_group_succeeds() {
        let rivers = rivers();
        let responder = rivers.create_responder(&["lobby"]).unwrap();
        responder.leave().unwrap();

        let surveyor = rivers.create_surveyor(&["lobby"]).unwrap();
        assert!(surveyor.expected().is_empty());
        surveyor.survey().await.unwrap();
    }

    #[tokio::test]
    async fn test_late_responder_answers_retry() {
        let rivers = rivers();
        let slow = rivers.create_responder(&["lobby"]).unwrap();
        let surveyor = rivers.create_surveyor(&["lobby"]).unwrap();

        // Starts answering after the first window has closed and keeps
        // answering, so every copy of the survey gets a reply
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(45)).await;
            while slow.await_hangup().await.is_ok() {}
        });

        surveyor.survey().await.unwrap();
    }

    #[tokio::test]
    async fn test_late_one_shot_answer_counts() {
        let rivers = rivers();
        let hangup = Hangup::new();
        let sender = Arc::new(HangupSender::new(
            rivers.create_responder(&["lobby"]).unwrap(),
            hangup.clone(),
        ));

        // Answers exactly once, and only after the first window has closed.
        // The one reply it sends is to the first copy of the survey.
        let answering = Arc::clone(&sender);
        let answered = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            answering.await_hangup().await
        });

        let surveyor = rivers.create_surveyor(&["lobby"]).unwrap();
        surveyor.survey().await.unwrap();

        answered.await.unwrap().unwrap();
        assert!(hangup.is_closed());
    }

    #[tokio::test]
    async fn test_zero_timeout_field_is_clamped() {
        let mut config = RiverConfig::default();
        config.survey_timeout = Duration::ZERO;
        config.survey_attempts = 0;
        let rivers = Rivers::with_config(config);
        let _silent = rivers.create_responder(&["lobby"]).unwrap();

        let surveyor = rivers.create_surveyor(&["lobby"]).unwrap();
        assert!(matches!(surveyor.survey().await, Err(Error::Missing(_))));
    }

    #[tokio::test]
    async fn test_groups_are_independent() {
        let rivers = rivers();
        let _a = answer(rivers.create_responder(&["lobby", "alice"]).unwrap());
        let bob = rivers.create_responder(&["lobby", "bob"]).unwrap();

        let surveyor = rivers.create_surveyor(&["lobby", "alice"]).unwrap();
        surveyor.survey().await.unwrap();

        // Bob's responder was never surveyed
        let pending = tokio::time::timeout(Duration::from_millis(20), bob.recv()).await;
        assert!(pending.is_err());
    }
}
