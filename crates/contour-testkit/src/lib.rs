//! Contour Testkit - shared test infrastructure
//!
//! Deterministic effect handlers, an in-process multi-node cluster and the
//! fixtures of the routing scenarios. Cross-crate integration tests live in
//! this crate's `tests/` directory.
//!
//! ```rust,no_run
//! use contour_predicate::XmlMessage;
//! use contour_testkit::{init_test_tracing, TestCluster};
//!
//! # async fn demo() -> contour_core::ContourResult<()> {
//! init_test_tracing();
//! let cluster = TestCluster::<XmlMessage>::with_nodes(&["node1", "node2"])?;
//! cluster.start_all().await?;
//! cluster.converge();
//! # Ok(())
//! # }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![forbid(unsafe_code)]

pub mod cluster;
pub mod effects;
pub mod fixtures;
pub mod logging;

pub use cluster::{TestCluster, TestClusterBuilder, TEST_GOSSIP_TIME_FRAME_MS};
pub use effects::{ScriptedRandom, SeededRandom, SimulatedTime};
pub use fixtures::{
    pattern, recorder, responder, scenario_message, scenario_test1_patterns,
    scenario_test1_patterns_literal, scenario_test2_pattern, xml, Delivery, SCENARIO_MESSAGE,
};
pub use logging::init_test_tracing;
