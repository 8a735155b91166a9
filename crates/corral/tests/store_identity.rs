//! Store-level behavior: the identity map, the unfiltered-cache shortcut,
//! persistence dispatch, and pagination.

mod common;

use common::{FakeConnection, row, zoo_session};
use corral::dialect::SqlServerDialect;
use corral::{Entity, Selector, Session, Term, Value};

fn fixture() -> (Session, FakeConnection) {
    let conn = FakeConnection::new();
    (zoo_session(conn.clone()), conn)
}

fn cow_row() -> corral::Row {
    row(&[
        ("id", Value::Int(3)),
        ("name", Value::Text("cow".into())),
        ("legs", Value::Int(4)),
    ])
}

#[test]
fn identity_map_uniqueness_across_access_paths() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![cow_row()]);
    let by_key = animals.get(3i64).unwrap().unwrap();
    assert_eq!(conn.queries(), vec!["SELECT * FROM animal WHERE id = 3"]);

    conn.push_rows(vec![cow_row()]);
    let by_filter = animals
        .get_all(&Selector::field("name", Term::eq("cow")), &[])
        .unwrap();
    assert_eq!(by_filter.len(), 1);
    assert!(Entity::ptr_eq(&by_key, &by_filter[0]));

    // a scalar re-fetch is served from the map without a query
    let cached = animals.get(3i64).unwrap().unwrap();
    assert!(Entity::ptr_eq(&by_key, &cached));
    assert_eq!(conn.query_count(), 2);
}

#[test]
fn cached_instance_wins_over_fetched_row() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![cow_row()]);
    let cow = animals.get(3i64).unwrap().unwrap();
    cow.set("legs", 6i64).unwrap();

    // the same row comes back staler than our in-memory copy
    conn.push_rows(vec![cow_row()]);
    let refetched = animals
        .get_all(&Selector::field("legs", Term::eq(4i64)), &[])
        .unwrap();
    assert!(Entity::ptr_eq(&cow, &refetched[0]));
    assert_eq!(refetched[0].get("legs").unwrap(), Value::Int(6));
}

#[test]
fn unfiltered_get_all_short_circuits_to_cache() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![
        cow_row(),
        row(&[("id", Value::Int(4)), ("name", Value::Text("emu".into()))]),
    ]);
    let first = animals.get_all(&Selector::all(), &[]).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(conn.query_count(), 1);

    let fresh = animals
        .create([("name", Value::Text("yak".into()))])
        .unwrap();

    let second = animals.get_all(&Selector::all(), &[]).unwrap();
    assert_eq!(conn.query_count(), 1, "second unfiltered get_all must not query");
    assert_eq!(second.len(), 3);
    assert!(second.iter().any(|entity| Entity::ptr_eq(entity, &fresh)));
}

#[test]
fn ordered_get_all_still_queries() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![cow_row()]);
    animals.get_all(&Selector::all(), &[]).unwrap();

    conn.push_rows(vec![cow_row()]);
    animals.get_all(&Selector::all(), &["name"]).unwrap();
    assert_eq!(conn.query_count(), 2);
    assert_eq!(
        conn.queries()[1],
        "SELECT * FROM animal ORDER BY name"
    );
}

#[test]
fn ambiguous_get_is_a_consistency_error() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();
    conn.push_rows(vec![
        cow_row(),
        row(&[("id", Value::Int(4)), ("name", Value::Text("ox".into()))]),
    ]);
    let err = animals
        .get(Selector::field("sound", Term::eq("moo")))
        .unwrap_err();
    assert!(err.is_consistency());
}

#[test]
fn insert_assigns_generated_id_and_promotes_into_the_map() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();
    conn.set_auto_increment(7);

    let yak = animals
        .create([
            ("name", Value::Text("yak".into())),
            ("legs", Value::Int(4)),
        ])
        .unwrap();
    assert!(yak.save(&session).unwrap());

    assert_eq!(
        conn.executes(),
        vec!["INSERT INTO animal(legs,name) VALUES (4,'yak')"]
    );
    assert_eq!(yak.id(), Some(Value::Int(7)));
    assert!(yak.is_persisted());
    assert!(!yak.is_dirty());

    // now reachable by key without a query
    let cached = animals.get(7i64).unwrap().unwrap();
    assert!(Entity::ptr_eq(&yak, &cached));
    assert_eq!(conn.query_count(), 0);
}

#[test]
fn insert_refuses_an_identity_already_tracked() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![cow_row()]);
    animals.get(3i64).unwrap().unwrap();

    let dup = animals.create([("name", Value::Text("cow2".into()))]).unwrap();
    dup.set_id(3i64).unwrap();
    assert!(animals.save(&dup).unwrap_err().is_consistency());
}

#[test]
fn update_row_count_mismatch_is_a_consistency_error() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![cow_row()]);
    let cow = animals.get(3i64).unwrap().unwrap();
    cow.set("legs", 9i64).unwrap();
    conn.push_affected(2);
    assert!(cow.save(&session).unwrap_err().is_consistency());
}

#[test]
fn delete_evicts_from_the_identity_map() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![cow_row()]);
    let cow = animals.get(3i64).unwrap().unwrap();

    cow.delete(&session).unwrap();
    assert_eq!(conn.executes(), vec!["DELETE FROM animal WHERE id = 3"]);
    assert!(cow.is_marked_for_deletion());

    // no longer reachable without a query
    conn.push_rows(vec![]);
    assert!(animals.get(3i64).unwrap().is_none());
    assert_eq!(conn.query_count(), 2);
}

#[test]
fn store_delete_requires_an_identity() {
    let (session, _conn) = fixture();
    let animals = session.store("Animal").unwrap();
    let unsaved = animals.create([("name", Value::Text("ghost".into()))]).unwrap();
    assert!(animals.delete(&unsaved).unwrap_err().is_consistency());

    // the entity-level cascade drops never-persisted records quietly
    unsaved.delete(&session).unwrap();
    assert!(unsaved.is_marked_for_deletion());
}

#[test]
fn count_all_and_cache_controls() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![row(&[("cnt", Value::Int(5))])]);
    assert_eq!(animals.count_all().unwrap(), 5);
    assert_eq!(conn.queries(), vec!["SELECT COUNT(*) FROM animal"]);

    conn.push_rows(vec![cow_row()]);
    assert_eq!(animals.cache(&Selector::all()).unwrap(), 1);

    animals.clear_cache();
    conn.push_rows(vec![]);
    assert!(animals.get(3i64).unwrap().is_none());
    assert_eq!(conn.query_count(), 3);
}

#[test]
fn get_paginated_always_hits_the_database() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![cow_row()]);
    animals.get_all(&Selector::all(), &[]).unwrap();

    conn.push_rows(vec![cow_row()]);
    let page = animals
        .get_paginated(&Selector::all(), &["name"], 2, 4)
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(
        conn.queries()[1],
        "SELECT * FROM animal ORDER BY name LIMIT 2 OFFSET 4"
    );
}

#[test]
fn top_dialect_pagination() {
    let conn = FakeConnection::with_dialect(SqlServerDialect);
    let session = zoo_session(conn.clone());
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![cow_row()]);
    animals.get_paginated(&Selector::all(), &[], 3, 0).unwrap();
    assert_eq!(conn.queries(), vec!["SELECT TOP 3 * FROM animal"]);

    let err = animals
        .get_paginated(&Selector::all(), &[], 3, 5)
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn refresh_rereads_or_marks_for_deletion() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();

    conn.push_rows(vec![cow_row()]);
    let cow = animals.get(3i64).unwrap().unwrap();
    cow.set("legs", 9i64).unwrap();

    conn.push_rows(vec![row(&[("id", Value::Int(3)), ("legs", Value::Int(6))])]);
    cow.refresh(&session, false).unwrap();
    assert_eq!(conn.queries()[1], "SELECT * FROM animal WHERE id = 3");
    assert!(!cow.is_dirty(), "refresh discards pending changes");
    assert_eq!(cow.get("legs").unwrap(), Value::Int(6));

    // a vanished row marks the entity instead of failing
    conn.push_rows(vec![]);
    cow.refresh(&session, false).unwrap();
    assert!(cow.is_marked_for_deletion());
}

#[test]
fn save_all_walks_cache_and_new_entities() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();
    conn.set_auto_increment(10);

    conn.push_rows(vec![cow_row()]);
    let cow = animals.get(3i64).unwrap().unwrap();
    cow.set("legs", 5i64).unwrap();
    let yak = animals.create([("name", Value::Text("yak".into()))]).unwrap();

    animals.save_all(&session).unwrap();
    assert_eq!(
        conn.executes(),
        vec![
            "UPDATE animal SET legs = 5 WHERE id = 3",
            "INSERT INTO animal(name) VALUES ('yak')",
        ]
    );
    assert!(yak.is_persisted());
    assert_eq!(yak.id(), Some(Value::Int(10)));

    // now both live in the identity map; nothing left to write
    animals.save_all(&session).unwrap();
    assert_eq!(conn.executes().len(), 2);
}

#[test]
fn get_all_indexed_keys_by_field_value() {
    let (session, conn) = fixture();
    let animals = session.store("Animal").unwrap();
    conn.push_rows(vec![
        cow_row(),
        row(&[("id", Value::Int(4)), ("name", Value::Text("emu".into()))]),
    ]);
    let indexed = animals
        .get_all_indexed(&Selector::all(), &[], "name")
        .unwrap();
    assert_eq!(indexed.len(), 2);
    assert_eq!(indexed["cow"].id(), Some(Value::Int(3)));
    assert_eq!(indexed["emu"].id(), Some(Value::Int(4)));
}

#[test]
fn transaction_calls_pass_through() {
    let (session, conn) = fixture();
    session.begin_transaction("zoo").unwrap();
    session.commit("zoo").unwrap();
    session.rollback("zoo").unwrap();
    assert_eq!(conn.executes(), vec!["BEGIN", "COMMIT", "ROLLBACK"]);
    assert!(session.begin_transaction("warehouse").unwrap_err().is_configuration());
}

#[test]
fn duplicate_connection_registration_fails() {
    let (session, _conn) = fixture();
    let err = session
        .register_connection("zoo", FakeConnection::new())
        .unwrap_err();
    assert!(err.is_configuration());
}
