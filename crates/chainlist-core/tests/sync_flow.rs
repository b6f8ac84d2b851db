use std::sync::Arc;

use chainlist_core::config::{ClientConfig, TimeoutPolicy};
use chainlist_core::mock::{MockLedger, MockOp};
use chainlist_core::{
    AccountAddress, LedgerError, ListPhase, LoadOutcome, MutationOutcome, SkipReason,
    SyncController, Task, TaskId,
};
use futures_util::FutureExt;

fn account(raw: &str) -> AccountAddress {
    AccountAddress::parse(raw).expect("account")
}

fn id(raw: u64) -> TaskId {
    TaskId::new(raw).expect("task id")
}

fn setup(cfg: ClientConfig) -> (Arc<MockLedger>, SyncController<Arc<MockLedger>>, AccountAddress) {
    let ledger = Arc::new(MockLedger::new(&cfg));
    let alice = account("0xa11ce");
    ledger.connect_wallet(Some(alice.clone()));
    let controller = SyncController::new(Arc::clone(&ledger), cfg);
    (ledger, controller, alice)
}

fn contents(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.content.as_str()).collect()
}

#[tokio::test]
async fn create_list_add_and_complete() {
    let (ledger, controller, alice) = setup(ClientConfig::default());

    assert_eq!(
        controller.select_account(Some(alice.clone())).await,
        LoadOutcome::Applied(ListPhase::NoList)
    );
    assert!(!controller.view().has_list);

    let created = controller.create_list().await.expect("create list");
    assert_eq!(created, MutationOutcome::Committed);
    let view = controller.view();
    assert_eq!(view.phase, ListPhase::Ready);
    assert!(view.has_list);
    assert!(view.tasks.is_empty());

    let added = controller.add_task("a").await.expect("add task");
    assert_eq!(added, MutationOutcome::Committed);
    assert_eq!(
        controller.view().tasks,
        vec![Task {
            task_id: id(1),
            address: alice.clone(),
            content: "a".to_string(),
            completed: false,
        }]
    );
    assert_eq!(ledger.stored_task(&alice, 1), controller.view().tasks.first().cloned());

    let completed = controller.complete_task(id(1)).await.expect("complete task");
    assert_eq!(completed, MutationOutcome::Committed);
    let task = controller.view().task(id(1)).cloned().expect("task 1");
    assert!(task.completed);
    assert_eq!(task.content, "a");
    assert_eq!(task.address, alice);
    assert!(!controller.view().pending_mutation);
}

#[tokio::test]
async fn optimistic_add_shows_then_rolls_back() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    ledger.seed_list(&alice, &[("one", false), ("two", true), ("three", false)]);
    controller.select_account(Some(alice.clone())).await;
    let before = controller.view().tasks;

    ledger.inject(MockOp::AwaitTransaction, LedgerError::rejected(None, "OUT_OF_GAS"));
    ledger.hold(&alice);

    let (result, during) = tokio::join!(controller.add_task("buy milk"), async {
        let view = controller.view();
        ledger.release(&alice);
        view
    });

    assert!(during.pending_mutation);
    let shown = during.tasks.first().expect("optimistic task");
    assert_eq!(shown.task_id, id(4));
    assert_eq!(shown.content, "buy milk");
    assert!(!shown.completed);
    assert_eq!(during.tasks.len(), 4);

    let err = result.expect_err("rejected");
    assert!(matches!(err, LedgerError::TransactionRejected { .. }));
    let after = controller.view();
    assert_eq!(after.tasks, before);
    assert!(!after.pending_mutation);
    assert!(after.last_error.is_some());
}

#[tokio::test]
async fn confirmed_add_stays_prepended_without_reread() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    ledger.seed_list(&alice, &[("one", false), ("two", false)]);
    controller.select_account(Some(alice.clone())).await;
    let reads = ledger.calls(MockOp::ReadResource);

    controller.add_task("three").await.expect("add task");
    assert_eq!(contents(&controller.view().tasks), ["three", "one", "two"]);
    assert_eq!(ledger.calls(MockOp::ReadResource), reads);

    // An authoritative read restores ascending id order.
    controller.refresh().await;
    assert_eq!(contents(&controller.view().tasks), ["one", "two", "three"]);
}

#[tokio::test]
async fn second_mutation_is_rejected_while_pending() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    ledger.seed_list(&alice, &[("a", false)]);
    controller.select_account(Some(alice.clone())).await;
    ledger.hold(&alice);

    let (first, (second, third, refresh, submits)) = tokio::join!(controller.add_task("first"), async {
        let second = controller.add_task("second").await.expect("no error");
        let third = controller.complete_task(id(1)).await.expect("no error");
        let refresh = controller.refresh().await;
        let submits = ledger.calls(MockOp::SubmitTransaction);
        ledger.release(&alice);
        (second, third, refresh, submits)
    });

    assert_eq!(first.expect("first add"), MutationOutcome::Committed);
    assert_eq!(second, MutationOutcome::Skipped(SkipReason::MutationPending));
    assert_eq!(third, MutationOutcome::Skipped(SkipReason::MutationPending));
    assert_eq!(refresh, LoadOutcome::Skipped(SkipReason::MutationPending));
    assert_eq!(submits, 1);
    assert_eq!(ledger.calls(MockOp::SubmitTransaction), 1);
    assert_eq!(contents(&controller.view().tasks), ["first", "a"]);
}

#[tokio::test]
async fn completing_completed_task_submits_nothing() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    ledger.seed_list(&alice, &[("done", true), ("open", false)]);
    controller.select_account(Some(alice.clone())).await;
    let before = controller.view();

    let outcome = controller.complete_task(id(1)).await.expect("no error");
    assert_eq!(outcome, MutationOutcome::Skipped(SkipReason::AlreadyCompleted(id(1))));
    let unknown = controller.complete_task(id(9)).await.expect("no error");
    assert_eq!(unknown, MutationOutcome::Skipped(SkipReason::UnknownTask(id(9))));

    assert_eq!(ledger.calls(MockOp::SubmitTransaction), 0);
    assert_eq!(controller.view(), before);
}

#[tokio::test]
async fn stale_read_is_not_applied() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    let bob = account("0xb0b");
    ledger.seed_list(&alice, &[("alice task", false)]);
    ledger.seed_list(&bob, &[("bob 1", false), ("bob 2", false)]);
    ledger.hold(&alice);

    let (stale, fresh) = tokio::join!(controller.select_account(Some(alice.clone())), async {
        let outcome = controller.select_account(Some(bob.clone())).await;
        ledger.release(&alice);
        outcome
    });

    assert_eq!(stale, LoadOutcome::Discarded);
    assert_eq!(fresh, LoadOutcome::Applied(ListPhase::Ready));
    let view = controller.view();
    assert_eq!(view.account, Some(bob));
    assert_eq!(contents(&view.tasks), ["bob 1", "bob 2"]);
}

#[tokio::test]
async fn mutation_result_for_previous_account_is_discarded() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    let bob = account("0xb0b");
    ledger.seed_list(&alice, &[]);
    ledger.seed_list(&bob, &[("bob 1", false)]);
    controller.select_account(Some(alice.clone())).await;
    ledger.hold(&alice);

    let (late, _) = tokio::join!(controller.add_task("late"), async {
        controller.select_account(Some(bob.clone())).await;
        ledger.release(&alice);
    });

    assert_eq!(late.expect("no error"), MutationOutcome::Discarded);
    let view = controller.view();
    assert_eq!(view.account, Some(bob));
    assert_eq!(contents(&view.tasks), ["bob 1"]);
    assert!(!view.pending_mutation);
}

#[tokio::test]
async fn failed_create_list_returns_to_no_list() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    controller.select_account(Some(alice.clone())).await;
    ledger.inject(MockOp::SubmitTransaction, LedgerError::rejected(None, "user declined"));

    let err = controller.create_list().await.expect_err("declined");
    assert!(matches!(err, LedgerError::TransactionRejected { .. }));
    let view = controller.view();
    assert_eq!(view.phase, ListPhase::NoList);
    assert!(!view.pending_mutation);
    assert!(view.last_error.is_some());
    assert_eq!(ledger.calls(MockOp::AwaitTransaction), 0);
}

#[tokio::test]
async fn degraded_read_shows_no_list_until_refresh() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    ledger.seed_list(&alice, &[("a", false), ("b", false)]);
    ledger.inject(MockOp::ReadTableItem, LedgerError::network("connection reset"));

    assert_eq!(
        controller.select_account(Some(alice.clone())).await,
        LoadOutcome::Applied(ListPhase::Error)
    );
    let view = controller.view();
    assert!(!view.has_list);
    assert!(view.tasks.is_empty());
    assert!(view.last_error.is_some());

    assert_eq!(controller.refresh().await, LoadOutcome::Applied(ListPhase::Ready));
    let view = controller.view();
    assert_eq!(contents(&view.tasks), ["a", "b"]);
    assert!(view.last_error.is_none());
}

#[tokio::test]
async fn timeout_rolls_back_by_default() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    ledger.seed_list(&alice, &[]);
    controller.select_account(Some(alice.clone())).await;
    ledger.inject(
        MockOp::AwaitTransaction,
        LedgerError::Timeout {
            hash: "0x1".to_string(),
            waited_ms: 30_000,
        },
    );

    let err = controller.add_task("maybe").await.expect_err("timeout");
    assert!(err.is_indeterminate());
    assert!(controller.view().tasks.is_empty());
    // The transaction landed anyway; local state stays behind until the next read.
    assert_eq!(ledger.task_counter(&alice), Some(1));
}

#[tokio::test]
async fn timeout_reconciles_when_configured() {
    let mut cfg = ClientConfig::default();
    cfg.on_timeout = TimeoutPolicy::Reconcile;
    let (ledger, controller, alice) = setup(cfg);
    ledger.seed_list(&alice, &[]);
    controller.select_account(Some(alice.clone())).await;
    ledger.inject(
        MockOp::AwaitTransaction,
        LedgerError::Timeout {
            hash: "0x1".to_string(),
            waited_ms: 30_000,
        },
    );

    let err = controller.add_task("maybe").await.expect_err("timeout");
    assert!(err.is_indeterminate());
    let view = controller.view();
    assert_eq!(view.phase, ListPhase::Ready);
    assert_eq!(contents(&view.tasks), ["maybe"]);
    assert!(!view.pending_mutation);
}

#[tokio::test]
async fn dropped_mutation_clears_pending() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    ledger.seed_list(&alice, &[("a", false)]);
    controller.select_account(Some(alice.clone())).await;
    ledger.hold(&alice);

    let mut pending = Box::pin(controller.add_task("abandoned"));
    assert!(pending.as_mut().now_or_never().is_none());
    assert!(controller.view().pending_mutation);
    assert_eq!(contents(&controller.view().tasks), ["abandoned", "a"]);

    drop(pending);
    ledger.release(&alice);
    let view = controller.view();
    assert!(!view.pending_mutation);
    assert_eq!(contents(&view.tasks), ["a"]);

    let retry = controller.complete_task(id(1)).await.expect("complete");
    assert_eq!(retry, MutationOutcome::Committed);
}

#[tokio::test]
async fn create_list_without_reload_trusts_confirmation() {
    let mut cfg = ClientConfig::default();
    cfg.reload_after_create_list = false;
    let (ledger, controller, alice) = setup(cfg);
    controller.select_account(Some(alice.clone())).await;
    let reads = ledger.calls(MockOp::ReadResource);

    controller.create_list().await.expect("create list");
    assert_eq!(controller.view().phase, ListPhase::Ready);
    assert_eq!(ledger.calls(MockOp::ReadResource), reads);
}

#[tokio::test]
async fn account_round_trip_keeps_mutation_exclusive() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    let bob = account("0xb0b");
    ledger.seed_list(&alice, &[("a", false)]);
    controller.select_account(Some(alice.clone())).await;
    ledger.hold_op(&alice, MockOp::SubmitTransaction);

    let (first, (second, refresh, submits)) = tokio::join!(controller.add_task("first"), async {
        controller.select_account(Some(bob.clone())).await;
        let back = controller.select_account(Some(alice.clone())).await;
        assert_eq!(back, LoadOutcome::Applied(ListPhase::Ready));
        let second = controller.add_task("second").await.expect("no error");
        let refresh = controller.refresh().await;
        let submits = ledger.calls(MockOp::SubmitTransaction);
        ledger.release(&alice);
        (second, refresh, submits)
    });

    assert_eq!(first.expect("no error"), MutationOutcome::Discarded);
    assert_eq!(second, MutationOutcome::Skipped(SkipReason::MutationPending));
    assert_eq!(refresh, LoadOutcome::Skipped(SkipReason::MutationPending));
    assert_eq!(submits, 1);

    // The superseded result is picked up by a fresh read, not by the stale view.
    let view = controller.view();
    assert_eq!(view.phase, ListPhase::Ready);
    assert_eq!(contents(&view.tasks), ["a", "first"]);

    let retry = controller.add_task("second").await.expect("add task");
    assert_eq!(retry, MutationOutcome::Committed);
    let view = controller.view();
    assert_eq!(view.task(id(3)).map(|t| t.content.as_str()), Some("second"));
    assert_eq!(
        ledger.stored_task(&alice, 3).map(|t| t.content),
        Some("second".to_string())
    );
    assert_eq!(
        ledger.stored_task(&alice, 2).map(|t| t.content),
        Some("first".to_string())
    );
}

#[tokio::test]
async fn lagging_read_after_create_list_keeps_ready() {
    let cfg = ClientConfig::default();
    let resource_type = cfg.list_resource_type();
    let (ledger, controller, alice) = setup(cfg);
    controller.select_account(Some(alice.clone())).await;
    ledger.inject(
        MockOp::ReadResource,
        LedgerError::ResourceNotFound {
            account: alice.to_string(),
            resource_type,
        },
    );

    let created = controller.create_list().await.expect("create list");
    assert_eq!(created, MutationOutcome::Committed);
    let view = controller.view();
    assert_eq!(view.phase, ListPhase::Ready);
    assert!(view.has_list);
    assert!(view.tasks.is_empty());
    assert_eq!(ledger.task_counter(&alice), Some(0));

    let added = controller.add_task("a").await.expect("add task");
    assert_eq!(added, MutationOutcome::Committed);
    assert_eq!(contents(&controller.view().tasks), ["a"]);
}

#[tokio::test]
async fn failed_completion_leaves_task_open() {
    let (ledger, controller, alice) = setup(ClientConfig::default());
    ledger.seed_list(&alice, &[("a", false)]);
    controller.select_account(Some(alice.clone())).await;
    ledger.inject(MockOp::AwaitTransaction, LedgerError::rejected(None, "OUT_OF_GAS"));

    let err = controller.complete_task(id(1)).await.expect_err("rejected");
    assert!(matches!(err, LedgerError::TransactionRejected { .. }));
    let view = controller.view();
    assert!(!view.task(id(1)).expect("task 1").completed);
    assert!(!view.pending_mutation);
    assert!(view.last_error.is_some());
    assert_eq!(
        ledger.stored_task(&alice, 1).map(|t| t.completed),
        Some(false)
    );

    let retry = controller.complete_task(id(1)).await.expect("complete task");
    assert_eq!(retry, MutationOutcome::Committed);
    let view = controller.view();
    assert!(view.task(id(1)).expect("task 1").completed);
    assert!(view.last_error.is_none());
}
