mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{drive, TestMatch, TestMsg, TestScheduler};
use rivulet::{
    FlowId, FlowTable, MetaMatch, QueryMode, RemovedReason, TableConfig, TaskStatus,
};

fn populated(max_entries: usize, flows: u64) -> FlowTable<TestMsg> {
    let mut ft = FlowTable::new(TableConfig { max_entries }).unwrap();
    for id in 1..=flows {
        ft.add(
            id,
            &TestMsg::new(TestMatch::exact(id)).with_priority(id as u16),
        )
        .unwrap();
    }
    ft
}

/// Spawns a task collecting the visited ids, returning the collector.
fn spawn_collector(
    ft: &FlowTable<TestMsg>,
    query: Option<MetaMatch<TestMatch>>,
    scheduler: &mut TestScheduler,
) -> Rc<RefCell<Vec<Option<FlowId>>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    ft.spawn_iter_task(
        query,
        move |entry| sink.borrow_mut().push(entry.map(|e| e.id())),
        scheduler,
        0,
    )
    .unwrap();
    seen
}

#[test]
fn test_full_walk() {
    let ft = populated(10, 6);
    let mut scheduler = TestScheduler::new(0);

    let seen = spawn_collector(&ft, None, &mut scheduler);
    let ticks = drive(&mut scheduler, &ft);

    // Never yielding finishes in a single tick.
    assert_eq!(ticks, 1);

    let seen = seen.borrow();
    let expected: Vec<Option<FlowId>> =
        (1..=6).map(Some).chain(std::iter::once(None)).collect();
    assert_eq!(*seen, expected);
}

#[test]
fn test_walk_yields_to_scheduler() {
    let ft = populated(10, 6);
    let mut scheduler = TestScheduler::new(2);

    let seen = spawn_collector(&ft, None, &mut scheduler);
    let ticks = drive(&mut scheduler, &ft);

    // Ten slots at two per slice: the yield oracle fired more than once.
    assert!(ticks > 1);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 7);
    assert_eq!(seen.last(), Some(&None));
}

#[test]
fn test_walk_skips_free_and_deleted() {
    let mut ft = populated(10, 6);
    ft.delete(2).unwrap();
    ft.mark_deleted(4, RemovedReason::Delete).unwrap();

    let mut scheduler = TestScheduler::new(3);
    let seen = spawn_collector(&ft, None, &mut scheduler);
    drive(&mut scheduler, &ft);

    let seen = seen.borrow();
    assert_eq!(*seen, vec![Some(1), Some(3), Some(5), Some(6), None]);
}

#[test]
fn test_walk_with_query() {
    let ft = populated(10, 6);

    let mut query = MetaMatch::new(QueryMode::NonStrict, TestMatch::masked(0, 0));
    query.priority = Some(3);

    let mut scheduler = TestScheduler::new(0);
    let seen = spawn_collector(&ft, Some(query), &mut scheduler);
    drive(&mut scheduler, &ft);

    let seen = seen.borrow();
    assert_eq!(*seen, vec![Some(3), None]);
}

#[test]
fn test_empty_table_walk() {
    let ft: FlowTable<TestMsg> = FlowTable::new(TableConfig { max_entries: 4 }).unwrap();
    let mut scheduler = TestScheduler::new(0);

    let seen = spawn_collector(&ft, None, &mut scheduler);
    let ticks = drive(&mut scheduler, &ft);

    assert_eq!(ticks, 1);
    assert_eq!(*seen.borrow(), vec![None]);
}

#[test]
fn test_tick_statuses() {
    let ft = populated(4, 2);
    let mut scheduler = TestScheduler::new(1);

    spawn_collector(&ft, None, &mut scheduler);
    let (mut task, priority) = scheduler.tasks.pop().unwrap();
    assert_eq!(priority, 0);

    // Four slots at one per tick, then the finishing tick.
    for _ in 0..4 {
        assert_eq!(task.tick(&ft, &scheduler), TaskStatus::Continue);
    }
    assert_eq!(task.tick(&ft, &scheduler), TaskStatus::Finished);
}
