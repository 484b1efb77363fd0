//! Result cache behaviour across callers.

mod common;

use common::harness;
use quarry_core::{CallerIdentity, Question, Role};
use quarry_test_utils::assertions::assert_succeeded;
use quarry_test_utils::fixtures::{admin_identity, count_row, staff_identity};

const COUNT: &str = "SELECT COUNT(*) FROM users";

#[tokio::test]
async fn repeated_question_is_served_from_cache() {
    let h = harness(&[COUNT, COUNT], count_row(12));
    let identity = admin_identity();

    let first = h.orchestrator.process(&Question::new("How many users are there?", identity.clone())).await;
    let second = h.orchestrator.process(&Question::new("How many users are there?", identity)).await;

    assert_succeeded(&first);
    assert_succeeded(&second);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.answer_payload, first.answer_payload);
    assert_eq!(h.db.execution_count(), 1);

    let stats = h.cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entry_count, 1);
}

#[tokio::test]
async fn equivalent_whitespace_shares_an_entry() {
    let h = harness(&[COUNT, "SELECT   COUNT(*)\n  FROM users;"], count_row(12));
    let identity = admin_identity();

    h.orchestrator.process(&Question::new("How many users are there?", identity.clone())).await;
    let second = h.orchestrator.process(&Question::new("Count the users", identity)).await;

    assert!(second.cached);
    assert_eq!(h.db.execution_count(), 1);
}

#[tokio::test]
async fn different_callers_never_share_results() {
    let h = harness(&[COUNT, COUNT, COUNT], count_row(12));

    let admin = h.orchestrator.process(&Question::new("How many users are there?", admin_identity())).await;
    let staff = h.orchestrator.process(&Question::new("How many users are there?", staff_identity("c-1"))).await;
    let other_staff = h.orchestrator.process(&Question::new("How many users are there?", staff_identity("c-2"))).await;

    assert!(!admin.cached);
    assert!(!staff.cached);
    assert!(!other_staff.cached);
    assert_eq!(h.db.execution_count(), 3);
    assert_eq!(h.cache.len(), 3);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let h = harness(&["SELECT * FROM users", "SELECT * FROM users"], count_row(1));
    h.db.set_unavailable(true);
    let identity = CallerIdentity::new(Role::Admin, "ops");

    h.orchestrator.process(&Question::new("List users", identity.clone())).await;
    assert!(h.cache.is_empty());

    h.db.set_unavailable(false);
    let response = h.orchestrator.process(&Question::new("List users", identity)).await;
    assert_succeeded(&response);
    assert!(!response.cached);
}
