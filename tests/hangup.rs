//! Survey rounds and hangup adapters end to end

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rivers::survey::Reply;
use rivers::{Error, Hangup, HangupRecver, HangupSender, Responder, River};
use tokio::task::JoinHandle;

fn acknowledge(responder: Responder) -> JoinHandle<Responder> {
    tokio::spawn(async move {
        responder.await_hangup().await.unwrap();
        responder
    })
}

fn reject(responder: Responder) -> JoinHandle<Responder> {
    tokio::spawn(async move {
        let _survey = responder.recv().await.unwrap();
        responder
            .send(Reply::Unknown(responder.id()).encode())
            .await
            .unwrap();
        responder
    })
}

#[tokio::test]
async fn test_survey_names_rejecting_and_silent_ids() {
    let rivers = common::rivers();
    let mut rejecting = BTreeSet::new();
    let mut handles = Vec::new();

    for i in 0..5 {
        let responder = rivers.create_responder(&["lobby"]).unwrap();
        if i < 2 {
            rejecting.insert(responder.id());
            handles.push(reject(responder));
        } else {
            handles.push(acknowledge(responder));
        }
    }

    let surveyor = rivers.create_surveyor(&["lobby"]).unwrap();
    match surveyor.survey().await {
        Err(Error::Rejected(errors)) => {
            assert_eq!(errors.keys().copied().collect::<BTreeSet<_>>(), rejecting);
            assert!(errors.values().all(|e| matches!(e, Error::UnknownSurvey(_))));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Silent responders are listed once the attempts run out
    let mut silent = Vec::new();
    let mut keep = Vec::new();
    for i in 0..4 {
        let responder = rivers.create_responder(&["room"]).unwrap();
        if i % 2 == 0 {
            silent.push(responder.id());
            keep.push(responder);
        } else {
            let _ = acknowledge(responder);
        }
    }

    let surveyor = rivers.create_surveyor(&["room"]).unwrap();
    match surveyor.survey().await {
        Err(Error::Missing(ids)) => assert_eq!(ids, silent),
        other => panic!("expected missing ids, got {:?}", other),
    }
    drop(keep);
}

#[tokio::test]
async fn test_survey_all_acknowledge() {
    let rivers = common::rivers();
    let handles: Vec<_> = (0..4)
        .map(|_| acknowledge(rivers.create_responder(&["lobby", "alice"]).unwrap()))
        .collect();

    let surveyor = rivers.create_surveyor(&["lobby", "alice"]).unwrap();
    assert_eq!(surveyor.expected().len(), 4);
    surveyor.survey().await.unwrap();

    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_hangup_unblocks_both_adapters() {
    let rivers = common::rivers();
    let _alice = rivers.create_bus("alice", "lobby").unwrap();

    let hangup = Hangup::new();
    let bus = rivers.create_bus("scribe", "lobby").unwrap();
    let recver = Arc::new(HangupRecver::new(bus, hangup.clone()));
    let responder = rivers.create_responder(&["lobby", "scribe"]).unwrap();
    let reader = rivers.create_bus("bob", "lobby").unwrap();
    let sender = Arc::new(HangupSender::new(responder, hangup).with_reader(reader));

    let r = Arc::clone(&recver);
    let recv = tokio::spawn(async move { r.recv().await });
    let s = Arc::clone(&sender);
    let read = tokio::spawn(async move { s.read().await });
    let s = Arc::clone(&sender);
    let answer = tokio::spawn(async move { s.await_hangup().await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    let surveyor = rivers.create_surveyor(&["lobby", "scribe"]).unwrap();
    surveyor.survey().await.unwrap();
    answer.await.unwrap().unwrap();

    for handle in [recv, read] {
        let got = tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("hangup should end the read promptly")
            .unwrap()
            .unwrap();
        assert!(got.is_none());
    }

    // Both readers closed their sockets on the way out
    assert!(matches!(recver.inner().recv().await, Err(Error::Closed)));
    assert!(matches!(sender.reader().send(Bytes::new()).await, Err(Error::Closed)));
}
