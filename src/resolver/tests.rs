use super::*;
use chrono::NaiveDateTime;

fn open_resolver() -> Resolver {
    Resolver::new(Arc::new(Store::open(":memory:").unwrap()))
}

fn time(seconds: i64) -> NaiveDateTime {
    NaiveDateTime::from_timestamp(seconds, 0)
}

fn insert_file(resolver: &Resolver, id: Tuid, path: &str) -> Tuid {
    resolver.insert(id, path, time(0), time(0), 1).unwrap()
}

fn operations(resolver: &Resolver, id: Tuid) -> Vec<PatchOperation> {
    resolver
        .history(id)
        .unwrap()
        .into_iter()
        .map(|entry| entry.operation)
        .collect()
}

#[test]
fn insert_and_query_files() {
    let resolver = open_resolver();

    assert_eq!(insert_file(&resolver, 1, "foo.asset"), 1);

    let by_id = resolver.find_by_id(1, false).unwrap().unwrap();
    assert_eq!(by_id.path, "foo.asset");
    assert_eq!(by_id.user_id, 1);
    assert!(!by_id.was_deleted);

    let by_path = resolver.find_by_path("foo.asset", false).unwrap().unwrap();
    assert_eq!(by_path.file_id(), 1);

    assert!(resolver.contains(1, false).unwrap());
    assert!(!resolver.contains(2, false).unwrap());
}

#[test]
fn insert_is_idempotent() {
    let resolver = open_resolver();

    assert_eq!(insert_file(&resolver, 1, "foo.asset"), 1);
    assert_eq!(insert_file(&resolver, 1, "foo.asset"), 1);

    // Exactly one record and exactly one history entry.
    assert_eq!(resolver.all_files().unwrap().len(), 1);
    assert_eq!(operations(&resolver, 1), vec![PatchOperation::Insert]);
}

#[test]
fn insert_reports_hard_identity_conflicts() {
    let resolver = open_resolver();

    insert_file(&resolver, 1, "foo.asset");
    match resolver.insert(1, "bar.asset", time(1), time(1), 1) {
        Err(ResolverError::DuplicateEntry { existing_id, .. }) => assert_eq!(existing_id, 1),
        _ => panic!("Two files claiming one id must be a hard conflict!"),
    }
}

#[test]
fn colliding_ids_resolve_through_the_lookup_table() {
    let resolver = open_resolver();

    insert_file(&resolver, 1, "foo.asset");
    // A disconnected client minted id 2 for the same path.
    assert_eq!(
        resolver.insert(2, "foo.asset", time(1), time(1), 2).unwrap(),
        1
    );

    let resolved = resolver.find_by_id(2, false).unwrap().unwrap();
    assert_eq!(resolved.file_id(), 1);
    assert_eq!(resolved.path, "foo.asset");

    // The collision must not create a second record or history entry.
    assert_eq!(resolver.all_files().unwrap().len(), 1);
    assert_eq!(operations(&resolver, 1), vec![PatchOperation::Insert]);
}

#[test]
fn alias_chains_stay_flat() {
    let resolver = open_resolver();

    insert_file(&resolver, 1, "foo.asset");
    insert_file(&resolver, 2, "foo.asset"); // 2 -> 1
    insert_file(&resolver, 3, "foo.asset"); // 3 -> 1

    // Retire 1 by moving a fresh id onto its (soft-deleted) path; every
    // alias must be rewritten to the new canonical record in one hop.
    resolver.mark_deleted(1, 1).unwrap();
    assert_eq!(resolver.update(4, "foo.asset", time(2), 1).unwrap(), 4);

    for duplicate in &[2, 3] {
        let resolved = resolver.find_by_id(*duplicate, false).unwrap().unwrap();
        assert_eq!(resolved.file_id(), 4);
    }
}

#[test]
fn update_moves_a_record_and_keeps_the_old_path_in_history() {
    let resolver = open_resolver();

    insert_file(&resolver, 1, "foo.asset");
    assert_eq!(resolver.update(1, "bar.asset", time(1), 2).unwrap(), 1);

    let file = resolver.find_by_id(1, false).unwrap().unwrap();
    assert_eq!(file.path, "bar.asset");
    assert_eq!(file.user_id, 2);
    assert!(resolver.find_by_path("foo.asset", true).unwrap().is_none());

    let history = resolver.history(1).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].operation, PatchOperation::Update);
    assert_eq!(history[1].data.as_ref().unwrap(), "foo.asset");
}

#[test]
fn update_obliterates_a_soft_deleted_path_squatter() {
    let resolver = open_resolver();

    insert_file(&resolver, 1, "foo.asset");
    resolver.mark_deleted(1, 1).unwrap();

    // A fresh id takes over the path, the stale record is hard-retired.
    assert_eq!(resolver.update(3, "foo.asset", time(2), 1).unwrap(), 3);

    let file = resolver.find_by_path("foo.asset", false).unwrap().unwrap();
    assert_eq!(file.file_id(), 3);
    assert!(resolver.find_by_id(1, true).unwrap().is_none());

    let retired_ops = operations(&resolver, 1);
    assert_eq!(*retired_ops.last().unwrap(), PatchOperation::Obliterate);
    assert_eq!(operations(&resolver, 3), vec![PatchOperation::Insert]);
}

#[test]
fn update_aliases_to_a_live_path_owner() {
    let resolver = open_resolver();

    insert_file(&resolver, 1, "foo.asset");
    insert_file(&resolver, 2, "bar.asset");

    // Moving 2 onto the live path of 1 does not steal the path, 2 becomes
    // an alias and its own record is soft-deleted.
    assert_eq!(resolver.update(2, "foo.asset", time(2), 1).unwrap(), 1);

    assert_eq!(resolver.find_by_id(2, false).unwrap().unwrap().file_id(), 1);
    assert!(resolver.find_by_path("bar.asset", false).unwrap().is_none());
    assert!(resolver.find_by_path("bar.asset", true).unwrap().is_some());
}

#[test]
fn at_most_one_live_record_per_path() {
    let resolver = open_resolver();

    insert_file(&resolver, 1, "foo.asset");
    insert_file(&resolver, 2, "foo.asset");
    resolver.mark_deleted(1, 1).unwrap();
    resolver.update(3, "foo.asset", time(3), 1).unwrap();
    resolver.insert(4, "foo.asset", time(4), time(4), 1).unwrap();

    let live: Vec<_> = resolver.all_files().unwrap();
    let on_path: Vec<_> = live.iter().filter(|f| f.path == "foo.asset").collect();
    assert_eq!(on_path.len(), 1);
}

#[test]
fn delete_and_restore_toggle_and_append_history() {
    let resolver = open_resolver();

    insert_file(&resolver, 1, "foo.asset");

    resolver.mark_deleted(1, 2).unwrap();
    assert!(!resolver.contains(1, false).unwrap());
    assert!(resolver.contains(1, true).unwrap());

    // Deleting twice must not add a second entry.
    resolver.mark_deleted(1, 2).unwrap();
    assert_eq!(
        operations(&resolver, 1),
        vec![PatchOperation::Insert, PatchOperation::Delete]
    );

    resolver.restore(1, 2).unwrap();
    assert!(resolver.contains(1, false).unwrap());
    resolver.restore(1, 2).unwrap();
    assert_eq!(
        operations(&resolver, 1),
        vec![
            PatchOperation::Insert,
            PatchOperation::Delete,
            PatchOperation::Restore
        ]
    );
}

#[test]
fn history_is_ordered_and_matches_record_state() {
    let resolver = open_resolver();

    insert_file(&resolver, 1, "foo.asset");
    resolver.update(1, "bar.asset", time(5), 1).unwrap();
    resolver.mark_deleted(1, 1).unwrap();

    let history = resolver.history(1).unwrap();
    for window in history.windows(2) {
        assert!(window[0].modified <= window[1].modified);
    }

    // The last entry always reflects the record's soft-delete state.
    let file = resolver.find_by_id(1, true).unwrap().unwrap();
    let last = history.last().unwrap();
    assert_eq!(file.was_deleted, last.operation == PatchOperation::Delete);

    resolver.restore(1, 1).unwrap();
    let file = resolver.find_by_id(1, true).unwrap().unwrap();
    let last = resolver.history(1).unwrap().pop().unwrap();
    assert_eq!(file.was_deleted, last.operation == PatchOperation::Delete);
}

#[test]
fn branch_clones_a_record_under_a_new_identity() {
    let resolver = open_resolver();

    insert_file(&resolver, 1, "foo.asset");
    assert_eq!(
        resolver.branch(1, 2, "copy/foo.asset", time(1), 3).unwrap(),
        2
    );

    let copy = resolver.find_by_path("copy/foo.asset", false).unwrap().unwrap();
    assert_eq!(copy.file_id(), 2);

    let history = resolver.history(2).unwrap();
    assert_eq!(history[0].operation, PatchOperation::Branch);
    assert_eq!(history[0].data.as_ref().unwrap(), "foo.asset");

    // Branching onto a taken path or id must fail loudly.
    assert!(resolver.branch(1, 2, "other.asset", time(2), 3).is_err());
    assert!(resolver.branch(1, 5, "foo.asset", time(2), 3).is_err());
}

#[test]
fn user_dimension_resolves_and_creates_names() {
    let resolver = open_resolver();

    let alice = resolver.user_id("alice").unwrap();
    let bob = resolver.user_id("bob").unwrap();
    assert_ne!(alice, bob);
    assert_eq!(resolver.user_id("alice").unwrap(), alice);

    assert_eq!(resolver.username(alice).unwrap().unwrap(), "alice");
    assert_eq!(resolver.username(999).unwrap(), None);
}

#[test]
fn handled_event_ledger_deduplicates_and_clears() {
    let resolver = open_resolver();

    assert!(!resolver.was_handled(7).unwrap());
    resolver.record_handled(7, "alice").unwrap();
    resolver.record_handled(7, "alice").unwrap();
    resolver.record_handled(9, "bob").unwrap();

    assert!(resolver.was_handled(7).unwrap());
    assert_eq!(
        resolver.handled_events().unwrap(),
        [7, 9].iter().cloned().collect()
    );

    resolver.clear_handled().unwrap();
    assert!(!resolver.was_handled(7).unwrap());
    assert!(resolver.handled_events().unwrap().is_empty());
}
