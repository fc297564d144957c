//! Property-based tests for task-list reconciliation.
//!
//! Uses proptest to verify:
//! 1. Any interleaving of optimistic operations, their outcomes, and
//!    change-feed events keeps task ids unique.
//! 2. An id deleted by the feed or by a confirmed removal never comes back.
//! 3. Once every operation has settled, nothing is left provisional or
//!    pending.
//! 4. Applying a change-feed event twice has the same effect as once.

use std::collections::HashSet;

use proptest::prelude::*;
use tasklist::tasks::{Compensation, TaskList};
use tasklist_proto::{
    Category, NewTask, RemoteEvent, SortOrder, Task, TaskId, Timestamp, UserId,
};

const POOL: usize = 6;

fn pool_id(k: usize) -> TaskId {
    TaskId::from_raw(format!("task-{k}"))
}

fn make_task(k: usize, is_complete: bool) -> Task {
    Task {
        id: pool_id(k),
        owner_id: UserId::new("alice"),
        title: format!("task {k}"),
        is_complete,
        category: Category::Other,
        duration_estimate: None,
        due_date: None,
        created_at: Timestamp::from_millis(k as u64 + 1),
        updated_at: None,
    }
}

fn provisional(n: usize) -> Task {
    let new_task = NewTask {
        owner_id: UserId::new("alice"),
        title: format!("new {n}"),
        category: Category::Work,
        duration_estimate: None,
        due_date: None,
    };
    Task::provisional(TaskId::placeholder(), &new_task, Timestamp::from_millis(1000))
}

// --- Strategies ---

#[derive(Debug, Clone)]
enum Step {
    Add,
    Toggle(usize),
    Remove(usize),
    /// Settles an in-flight operation: (which, succeeded, id for a create).
    Settle(usize, bool, usize),
    Remote(RemoteEvent),
}

fn arb_event() -> impl Strategy<Value = RemoteEvent> {
    prop_oneof![
        (0..POOL, any::<bool>()).prop_map(|(k, done)| RemoteEvent::Inserted(make_task(k, done))),
        (0..POOL, any::<bool>()).prop_map(|(k, done)| RemoteEvent::Updated(make_task(k, done))),
        (0..POOL).prop_map(|k| RemoteEvent::Deleted(pool_id(k))),
    ]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Add),
        (0..POOL).prop_map(Step::Toggle),
        (0..POOL).prop_map(Step::Remove),
        (any::<usize>(), any::<bool>(), 0..POOL).prop_map(|(i, ok, k)| Step::Settle(i, ok, k)),
        arb_event().prop_map(Step::Remote),
    ]
}

fn arb_loaded() -> impl Strategy<Value = TaskList> {
    prop::collection::vec((0..POOL, any::<bool>()), 0..POOL).prop_map(|rows| {
        let mut list = TaskList::new(SortOrder::CreatedAsc);
        list.replace_all(rows.into_iter().map(|(k, done)| make_task(k, done)).collect());
        list
    })
}

// --- Harness ---

fn assert_unique_ids(list: &TaskList) -> Result<(), TestCaseError> {
    let mut ids: Vec<&TaskId> = list.tasks().iter().map(|t| &t.id).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    prop_assert_eq!(ids.len(), total, "duplicate ids in {:?}", list.tasks());
    Ok(())
}

fn assert_deleted_stay_gone(
    list: &TaskList,
    deleted: &HashSet<TaskId>,
) -> Result<(), TestCaseError> {
    for task in list.tasks() {
        prop_assert!(
            !deleted.contains(&task.id),
            "deleted task {} is back in {:?}",
            task.id,
            list.tasks()
        );
    }
    Ok(())
}

/// Settles one in-flight operation. Returns the id it deleted, if any.
fn settle(list: &mut TaskList, compensation: Compensation, ok: bool, k: usize) -> Option<TaskId> {
    if !ok {
        list.rollback(compensation);
        return None;
    }
    match compensation {
        Compensation::DropProvisional { placeholder } => {
            list.confirm_add(&placeholder, make_task(k, false));
            None
        }
        Compensation::RestoreCompletion { id, .. } => {
            list.confirm_update(&id);
            None
        }
        Compensation::Reinsert { task, .. } => {
            list.confirm_remove(&task.id);
            Some(task.id)
        }
    }
}

fn run_steps(mut list: TaskList, steps: Vec<Step>) -> Result<TaskList, TestCaseError> {
    let mut in_flight: Vec<Compensation> = Vec::new();
    // Pool ids stay well under the tombstone cap, so every deletion is remembered.
    let mut deleted: HashSet<TaskId> = HashSet::new();
    let mut added = 0;

    for step in steps {
        match step {
            Step::Add => {
                added += 1;
                in_flight.push(list.begin_add(provisional(added)));
            }
            Step::Toggle(k) => {
                if let Ok(Some(pending)) = list.begin_toggle(&pool_id(k)) {
                    in_flight.push(pending.compensation);
                }
            }
            Step::Remove(k) => {
                if let Ok(Some(pending)) = list.begin_remove(&pool_id(k)) {
                    in_flight.push(pending.compensation);
                }
            }
            Step::Settle(i, ok, k) => {
                if !in_flight.is_empty() {
                    let compensation = in_flight.swap_remove(i % in_flight.len());
                    deleted.extend(settle(&mut list, compensation, ok, k));
                }
            }
            Step::Remote(event) => {
                if let RemoteEvent::Deleted(id) = &event {
                    deleted.insert(id.clone());
                }
                list.apply_remote_event(event);
            }
        }
        assert_unique_ids(&list)?;
        assert_deleted_stay_gone(&list, &deleted)?;
    }

    for compensation in in_flight {
        list.rollback(compensation);
        assert_unique_ids(&list)?;
        assert_deleted_stay_gone(&list, &deleted)?;
    }
    Ok(list)
}

// --- Property tests ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Interleaved operations and feed events never duplicate an id or
    /// bring back a deleted one.
    #[test]
    fn interleavings_keep_ids_unique_and_deletions_final(
        list in arb_loaded(),
        steps in prop::collection::vec(arb_step(), 0..40),
    ) {
        let settled = run_steps(list, steps)?;
        prop_assert_eq!(settled.pending_count(), 0);
        prop_assert!(settled.tasks().iter().all(|t| !t.is_provisional()));
    }

    /// Applying an event twice leaves the same list as applying it once.
    #[test]
    fn feed_events_are_idempotent(list in arb_loaded(), event in arb_event()) {
        let mut once = list;
        once.apply_remote_event(event.clone());
        let snapshot = once.tasks().to_vec();

        let changed = once.apply_remote_event(event);
        prop_assert!(!changed);
        prop_assert_eq!(once.tasks(), snapshot.as_slice());
    }

    /// Event sequences converge however often each event is repeated.
    #[test]
    fn repeated_sequences_converge(
        list in arb_loaded(),
        events in prop::collection::vec(arb_event(), 0..20),
    ) {
        let mut single = TaskList::new(SortOrder::CreatedAsc);
        single.replace_all(list.tasks().to_vec());
        let mut doubled = list;

        for event in events {
            single.apply_remote_event(event.clone());
            doubled.apply_remote_event(event.clone());
            doubled.apply_remote_event(event);
        }
        prop_assert_eq!(single.tasks(), doubled.tasks());
    }
}
