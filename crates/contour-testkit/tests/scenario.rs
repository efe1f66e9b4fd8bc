//! Two publishing nodes and one sending node over the in-memory cluster

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use contour_core::{HandlerIdentity, ProcessingUnitId};
use contour_predicate::XmlMessage;
use contour_testkit::{
    init_test_tracing, recorder, scenario_message, scenario_test1_patterns,
    scenario_test1_patterns_literal, scenario_test2_pattern, TestCluster,
};

fn unit(name: &str) -> ProcessingUnitId {
    ProcessingUnitId::new(name).unwrap()
}

fn id(s: &str) -> HandlerIdentity {
    HandlerIdentity::new(s).unwrap()
}

#[tokio::test]
async fn higher_score_is_primary_and_secondary_observes() {
    init_test_tracing();
    let cluster = TestCluster::<XmlMessage>::with_nodes(&["node1", "node2", "node3"]).unwrap();
    let (test1, mut test1_rx) = recorder();
    let (test2, mut test2_rx) = recorder();
    cluster
        .node(0)
        .register_patterns(scenario_test1_patterns(), test1, unit("test1"))
        .unwrap();
    cluster
        .node(1)
        .register(scenario_test2_pattern().secondary(), test2, unit("test2"))
        .unwrap();
    cluster.start_all().await.unwrap();
    cluster.converge();

    let sender = cluster.node(2);
    assert!(sender.wait_until_ready([id("node1_test1"), id("node2_test2")]).await);

    let report = sender.send(scenario_message(), None).await.unwrap();
    assert_eq!(report.primary, Some(id("node1_test1")));
    assert_eq!(report.secondaries, vec![id("node2_test2")]);

    let primary = test1_rx.recv().await.unwrap();
    assert_eq!(primary.receiver, "node1_test1");
    assert_eq!(primary.message, scenario_message());
    let secondary = test2_rx.recv().await.unwrap();
    assert_eq!(secondary.receiver, "node2_test2");

    // test1 matched through both of its patterns but runs once
    tokio::task::yield_now().await;
    assert!(test1_rx.try_recv().is_err());
}

#[tokio::test]
async fn lower_score_primary_is_not_delivered() {
    let cluster = TestCluster::<XmlMessage>::with_nodes(&["node1", "node2", "node3"]).unwrap();
    let (test1, mut test1_rx) = recorder();
    let (test2, mut test2_rx) = recorder();
    cluster
        .node(0)
        .register_patterns(scenario_test1_patterns(), test1, unit("test1"))
        .unwrap();
    cluster
        .node(1)
        .register(scenario_test2_pattern(), test2, unit("test2"))
        .unwrap();
    cluster.start_all().await.unwrap();
    cluster.converge();

    let decision = cluster.node(2).route(&scenario_message()).await.unwrap();
    assert_eq!(decision.primary, Some(id("node1_test1")));
    assert!(decision.secondaries.is_empty());

    cluster.node(2).send(scenario_message(), None).await.unwrap();
    assert!(test1_rx.recv().await.is_some());
    tokio::task::yield_now().await;
    assert!(test2_rx.try_recv().is_err());
}

#[tokio::test]
async fn fallback_pattern_ties_with_other_node() {
    let cluster = TestCluster::<XmlMessage>::with_nodes(&["node1", "node2", "node3"]).unwrap();
    let (test1, _test1_rx) = recorder();
    let (test2, _test2_rx) = recorder();
    cluster
        .node(0)
        .register_patterns(scenario_test1_patterns_literal(), test1, unit("test1"))
        .unwrap();
    cluster
        .node(1)
        .register(scenario_test2_pattern(), test2, unit("test2"))
        .unwrap();
    cluster.start_all().await.unwrap();
    cluster.converge();

    let mut seen = std::collections::BTreeSet::new();
    for _ in 0..64 {
        let decision = cluster.node(2).route(&scenario_message()).await.unwrap();
        seen.insert(decision.primary.unwrap());
    }
    assert_eq!(seen.len(), 2, "both score-1 candidates should win some draws");
}

#[tokio::test]
async fn unconverged_sender_sees_nothing() {
    let cluster = TestCluster::<XmlMessage>::with_nodes(&["node1", "node2"]).unwrap();
    let (test1, _rx) = recorder();
    cluster
        .node(0)
        .register_patterns(scenario_test1_patterns(), test1, unit("test1"))
        .unwrap();
    cluster.start_all().await.unwrap();

    assert!(cluster.node(1).route(&scenario_message()).await.is_err());
    assert!(cluster.node(0).route(&scenario_message()).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn background_gossip_makes_remote_handlers_ready() {
    let mut cluster = TestCluster::<XmlMessage>::with_nodes(&["node1", "node2"]).unwrap();
    let (test1, mut test1_rx) = recorder();
    cluster
        .node(0)
        .register_patterns(scenario_test1_patterns(), test1, unit("test1"))
        .unwrap();
    cluster.start_all().await.unwrap();
    cluster.start_gossip(Duration::from_millis(20));

    assert!(cluster.node(1).wait_until_ready([id("node1_test1")]).await);
    cluster.node(1).send(scenario_message(), None).await.unwrap();
    assert_eq!(test1_rx.recv().await.unwrap().receiver, "node1_test1");
    cluster.shutdown();
}
