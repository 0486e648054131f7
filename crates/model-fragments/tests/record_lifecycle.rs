mod common;

use common::*;
use model_fragments::{
    AttrValue, FragmentError, FragmentState, Owner, RecordState, Scalar, SnapshotValue,
    StoreOptions,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn create_and_save_a_new_record() {
    init_tracing();
    let mut store = store();
    let person = store
        .create_record("person", &json!({ "name": { "first": "Jon" } }))
        .unwrap();
    let name = fragment_of(&mut store, person, "name");
    assert_eq!(store.record_state(person).unwrap(), RecordState::New);
    assert_eq!(
        store.fragment(name).unwrap().state().unwrap(),
        FragmentState::LoadedCreated
    );
    assert!(is_dirty(&mut store, person));

    let payload = store.record(person).unwrap().will_commit().unwrap();
    assert_eq!(payload["name"], json!({ "first": "Jon", "last": null }));
    assert_eq!(payload["titles"], json!(["Ser"]));
    assert_eq!(
        store.record_state(person).unwrap(),
        RecordState::InFlight { was_new: true }
    );
    assert!(is_dirty(&mut store, person));

    store
        .record(person)
        .unwrap()
        .did_commit(Some(&json!({ "id": "42" })))
        .unwrap();
    assert_eq!(store.record_state(person).unwrap(), RecordState::Saved);
    assert!(!is_dirty(&mut store, person));
    assert_eq!(
        store.fragment(name).unwrap().state().unwrap(),
        FragmentState::LoadedSaved
    );
    assert_eq!(store.record(person).unwrap().record_id().unwrap(), Some("42"));
    assert_eq!(store.find_record("person", "42"), Some(person));
}

#[test]
fn server_payload_is_merged_on_commit() {
    let mut store = store();
    let person = store
        .push_record("person", "1", &json!({ "name": { "first": "Jon", "last": "Snow" } }))
        .unwrap();
    let name = fragment_of(&mut store, person, "name");
    store.fragment(name).unwrap().set("first", "Aegon").unwrap();

    store.record(person).unwrap().will_commit().unwrap();
    store
        .record(person)
        .unwrap()
        .did_commit(Some(&json!({ "name": { "last": "Targaryen" } })))
        .unwrap();

    assert_eq!(fragment_of(&mut store, person, "name"), name);
    assert_eq!(
        get_json(&mut store, person, "name"),
        json!({ "first": "Aegon", "last": "Targaryen" })
    );
    assert_eq!(store.record_state(person).unwrap(), RecordState::Saved);
    assert!(!is_dirty(&mut store, person));
}

#[test]
fn failed_save_keeps_changes() {
    let mut store = store();
    let person = store
        .push_record("person", "1", &json!({ "name": { "first": "Jon" } }))
        .unwrap();
    let name = fragment_of(&mut store, person, "name");
    store.fragment(name).unwrap().set("first", "Aegon").unwrap();

    store.record(person).unwrap().will_commit().unwrap();
    store.record(person).unwrap().commit_failed().unwrap();

    assert_eq!(store.record_state(person).unwrap(), RecordState::Updated);
    assert!(is_dirty(&mut store, person));
    assert_eq!(
        store.fragment(name).unwrap().get("first").unwrap(),
        AttrValue::from("Aegon")
    );

    let created = store.create_record("person", &json!({})).unwrap();
    store.record(created).unwrap().will_commit().unwrap();
    store.record(created).unwrap().commit_failed().unwrap();
    assert_eq!(store.record_state(created).unwrap(), RecordState::New);
}

#[test]
fn rollback_during_a_save_reverts_values_but_not_the_save() {
    let mut store = store();
    let person = store
        .push_record("person", "1", &json!({ "name": { "first": "Jon" } }))
        .unwrap();
    let name = fragment_of(&mut store, person, "name");
    store.fragment(name).unwrap().set("first", "Aegon").unwrap();
    store.record(person).unwrap().will_commit().unwrap();

    store.record(person).unwrap().rollback_attributes().unwrap();
    assert!(store.record_state(person).unwrap().is_saving());
    assert!(is_dirty(&mut store, person), "reports dirtiness from before the save");
    assert!(!store.fragment(name).unwrap().is_dirty());

    store.record(person).unwrap().commit_failed().unwrap();
    assert_eq!(store.record_state(person).unwrap(), RecordState::Saved);
    assert!(!is_dirty(&mut store, person));
}

#[test]
fn save_is_rejected_outside_its_protocol() {
    let mut store = store();
    let person = store.push_record("person", "1", &json!({})).unwrap();

    let err = store.record(person).unwrap().did_commit(None).unwrap_err();
    assert!(matches!(err, FragmentError::InvalidRecordState { .. }), "{err}");
    let err = store.record(person).unwrap().commit_failed().unwrap_err();
    assert!(matches!(err, FragmentError::InvalidRecordState { .. }), "{err}");

    store.record(person).unwrap().will_commit().unwrap();
    let err = store.record(person).unwrap().will_commit().unwrap_err();
    assert!(matches!(err, FragmentError::InvalidRecordState { .. }), "{err}");
}

#[test]
fn server_id_already_taken_aborts_the_commit() {
    let mut store = store();
    store.push_record("person", "1", &json!({})).unwrap();
    let created = store.create_record("person", &json!({})).unwrap();

    store.record(created).unwrap().will_commit().unwrap();
    let err = store
        .record(created)
        .unwrap()
        .did_commit(Some(&json!({ "id": 1 })))
        .unwrap_err();
    assert!(
        matches!(&err, FragmentError::DuplicateRecord { model, id } if model == "person" && id == "1"),
        "{err}"
    );
    assert!(store.record_state(created).unwrap().is_saving());
    assert_eq!(store.record(created).unwrap().record_id().unwrap(), None);
}

#[test]
fn pushing_a_known_record_updates_it_in_place() {
    let mut store = store();
    let person = store
        .push_record("person", "1", &json!({ "name": { "first": "Jon", "last": "Snow" } }))
        .unwrap();
    let name = fragment_of(&mut store, person, "name");
    let titles = array_of(&mut store, person, "titles");
    store.array(titles).unwrap().push("Lord Commander").unwrap();

    let again = store
        .push_record("person", "1", &json!({ "name": { "first": "Aegon" } }))
        .unwrap();
    assert_eq!(again, person);
    assert_eq!(fragment_of(&mut store, person, "name"), name);
    assert_eq!(
        get_json(&mut store, person, "name"),
        json!({ "first": "Aegon", "last": "Snow" })
    );
    assert_eq!(store.record_state(person).unwrap(), RecordState::Updated);

    store
        .push_record("person", "1", &json!({ "titles": ["King in the North"] }))
        .unwrap();
    assert_eq!(store.record_state(person).unwrap(), RecordState::Saved);
    assert_eq!(
        get_json(&mut store, person, "titles"),
        json!(["King in the North"])
    );
}

#[test]
fn pushed_value_replaces_a_pending_assignment() {
    let mut store = store();
    let person = store
        .push_record("person", "1", &json!({ "name": { "first": "Jon" } }))
        .unwrap();
    store.record(person).unwrap().set("name", AttrValue::NULL).unwrap();
    assert!(is_dirty(&mut store, person));

    store
        .push_record("person", "1", &json!({ "name": { "first": "Aegon" } }))
        .unwrap();
    assert!(!is_dirty(&mut store, person));
    assert_eq!(
        get_json(&mut store, person, "name"),
        json!({ "first": "Aegon", "last": null })
    );
}

#[test]
fn unknown_payload_keys_are_ignored_on_push() {
    let mut store = store();
    let person = store
        .push_record(
            "person",
            "1",
            &json!({ "name": { "first": "Jon", "sigil": "wolf" }, "age": 17 }),
        )
        .unwrap();
    assert_eq!(
        get_json(&mut store, person, "name"),
        json!({ "first": "Jon", "last": null })
    );
}

#[test]
fn new_record_stays_new_when_its_fragments_reset() {
    let mut store = store();
    let person = store.create_record("person", &json!({})).unwrap();
    let addresses = fragment_array_of(&mut store, person, "addresses");

    store
        .fragment_array(addresses)
        .unwrap()
        .add_json(&json!({ "city": "Winterfell" }))
        .unwrap();
    store.fragment_array(addresses).unwrap().remove_at(0).unwrap();
    assert_eq!(store.record_state(person).unwrap(), RecordState::New);

    store.record(person).unwrap().rollback_attributes().unwrap();
    assert_eq!(store.record_state(person).unwrap(), RecordState::New);
}

#[test]
fn new_record_without_changes_is_discarded_when_configured() {
    let mut store = store_discarding_new();
    let person = store.create_record("person", &json!({})).unwrap();
    let addresses = fragment_array_of(&mut store, person, "addresses");

    store
        .fragment_array(addresses)
        .unwrap()
        .add_json(&json!({ "city": "Winterfell" }))
        .unwrap();
    assert_eq!(store.record_state(person).unwrap(), RecordState::New);
    store.fragment_array(addresses).unwrap().remove_at(0).unwrap();
    assert_eq!(store.record_state(person).unwrap(), RecordState::Deleted);

    // A deleted record ignores further notifications.
    store
        .fragment_array(addresses)
        .unwrap()
        .add_json(&json!({ "city": "The Wall" }))
        .unwrap();
    assert_eq!(store.record_state(person).unwrap(), RecordState::Deleted);

    let other = store.create_record("person", &json!({})).unwrap();
    store.record(other).unwrap().rollback_attributes().unwrap();
    assert_eq!(store.record_state(other).unwrap(), RecordState::Deleted);
}

#[test]
fn deleted_record_cannot_be_saved() {
    let mut store = store();
    let person = store.push_record("person", "1", &json!({})).unwrap();
    store.record(person).unwrap().delete().unwrap();

    let err = store.record(person).unwrap().will_commit().unwrap_err();
    assert!(matches!(
        err,
        FragmentError::InvalidRecordState {
            state: RecordState::Deleted,
            ..
        }
    ));
}

#[test]
fn unload_removes_the_record_and_its_tree() {
    let mut store = store();
    let person = store
        .push_record(
            "person",
            "1",
            &json!({
                "name": { "first": "Jon" },
                "orders": [{ "amount": 1, "products": [{ "name": "Longclaw" }] }]
            }),
        )
        .unwrap();
    let name = fragment_of(&mut store, person, "name");
    let orders = fragment_array_of(&mut store, person, "orders");
    let order = store.fragment_array(orders).unwrap().members().unwrap()[0];
    let loose = store.create_fragment("name", &json!({})).unwrap();

    store.record(person).unwrap().unload().unwrap();
    assert!(!store.contains_record(person));
    for node in [name, orders, order] {
        assert!(!store.contains_node(node), "{node} must be unloaded");
    }
    assert!(store.contains_node(loose));
    assert_eq!(store.find_record("person", "1"), None);
    assert!(matches!(
        store.record(person),
        Err(FragmentError::RecordNotFound(_))
    ));
}

#[test]
fn snapshot_is_detached_from_later_changes() {
    let mut store = store();
    let person = store
        .push_record(
            "person",
            "1",
            &json!({
                "name": { "first": "Jon", "last": "Snow" },
                "addresses": [{ "city": "Winterfell" }],
                "titles": ["Ser"]
            }),
        )
        .unwrap();
    let snapshot = store.record(person).unwrap().snapshot().unwrap();
    let name = fragment_of(&mut store, person, "name");
    store.fragment(name).unwrap().set("first", "Aegon").unwrap();

    assert_eq!(snapshot.model, "person");
    assert_eq!(snapshot.id.as_deref(), Some("1"));
    let name_snapshot = snapshot.fragment("name").unwrap();
    assert_eq!(
        name_snapshot.attr("first"),
        Some(&SnapshotValue::Scalar(Scalar::from("Jon")))
    );
    assert!(name_snapshot.id.is_none());
    assert!(matches!(
        snapshot.attr("addresses"),
        Some(SnapshotValue::FragmentArray(members)) if members.len() == 1
    ));
    assert_eq!(
        snapshot.to_json()["titles"],
        json!(["Ser"])
    );
    assert_eq!(
        snapshot.to_json()["name"],
        json!({ "first": "Jon", "last": "Snow" })
    );
}

#[test]
fn only_record_models_make_records() {
    let mut store = store();
    let err = store.create_record("name", &json!({})).unwrap_err();
    assert!(matches!(err, FragmentError::InvalidRecordType(ref m) if m == "name"));
    let err = store.push_record("dragon", "1", &json!({})).unwrap_err();
    assert!(matches!(err, FragmentError::InvalidRecordType(_)));
    let err = store.create_record("person", &json!(["Jon"])).unwrap_err();
    assert!(matches!(err, FragmentError::InvalidPayload { .. }));
}

#[test]
fn hydrate_links_without_assigning() {
    let mut store = store();
    let person = store.push_record("person", "1", &json!({})).unwrap();
    let value = store
        .hydrate(Owner::Record(person), "name", &json!({ "first": "Jon" }))
        .unwrap();
    let name = value.as_fragment().unwrap();
    assert_eq!(
        store.link(name).unwrap().map(|l| l.key.as_str()),
        Some("name")
    );
    assert!(!is_dirty(&mut store, person));
    assert_eq!(
        store.serialize_value(&value).unwrap(),
        json!({ "first": "Jon", "last": null })
    );

    store.record(person).unwrap().set("name", value).unwrap();
    assert!(is_dirty(&mut store, person));
}

#[test]
fn store_options_load_from_toml() {
    let options = StoreOptions::from_toml_str("suppress_reset_on_new_owner = false\n").unwrap();
    assert!(!options.suppress_reset_on_new_owner);
    assert_eq!(
        options.validate_invariants,
        StoreOptions::default().validate_invariants
    );

    assert!(StoreOptions::from_toml_str("").unwrap().suppress_reset_on_new_owner);
    assert!(StoreOptions::from_toml_str("discard = true").is_err());
}

#[test]
fn commit_reaches_members_of_nested_fragment_arrays() {
    let mut store = store();
    let person = store
        .push_record(
            "person",
            "1",
            &json!({
                "orders": [{
                    "amount": 10,
                    "products": [
                        { "name": "Tears of Lys", "sku": "poison-001", "price": "1.00" },
                        { "name": "Nightshade", "sku": "poison-002", "price": "1.50" }
                    ]
                }]
            }),
        )
        .unwrap();
    let orders = fragment_array_of(&mut store, person, "orders");
    let order = store.fragment_array(orders).unwrap().members().unwrap()[0];
    let products = store
        .fragment(order)
        .unwrap()
        .get("products")
        .unwrap()
        .as_fragment_array()
        .unwrap();

    store.fragment_array(products).unwrap().remove_at(0).unwrap();
    assert!(store.fragment_array(products).unwrap().is_dirty());
    assert!(store.fragment(order).unwrap().is_dirty());
    assert!(is_dirty(&mut store, person));

    store.record(person).unwrap().rollback_attributes().unwrap();
    assert_eq!(store.fragment_array(products).unwrap().len().unwrap(), 2);
    assert!(!store.fragment(order).unwrap().is_dirty());
    assert!(!is_dirty(&mut store, person));

    let tears = store.fragment_array(products).unwrap().remove_at(0).unwrap();
    let payload = store.record(person).unwrap().will_commit().unwrap();
    assert_eq!(
        payload["orders"][0]["products"],
        json!([{ "name": "Nightshade", "sku": "poison-002", "price": 1.5 }])
    );
    store.record(person).unwrap().did_commit(None).unwrap();
    assert_eq!(store.record_state(person).unwrap(), RecordState::Saved);
    assert_eq!(
        store.fragment(order).unwrap().state().unwrap(),
        FragmentState::LoadedSaved
    );
    assert!(!store.fragment_array(products).unwrap().is_dirty());

    store.record(person).unwrap().rollback_attributes().unwrap();
    assert_eq!(store.fragment_array(products).unwrap().len().unwrap(), 1);
    assert_eq!(
        get_json(&mut store, person, "orders"),
        json!([{
            "amount": 10,
            "products": [{ "name": "Nightshade", "sku": "poison-002", "price": 1.5 }]
        }])
    );
    assert!(!store.contains_node(tears), "committed removal frees the member");
}

#[test]
fn commit_frees_replaced_fragments() {
    let mut store = store();
    let person = store
        .push_record(
            "person",
            "1",
            &json!({
                "name": { "first": "Jon", "last": "Snow" },
                "info": { "name": "Jon", "notes": ["bastard"] }
            }),
        )
        .unwrap();
    let name = fragment_of(&mut store, person, "name");
    let info = fragment_of(&mut store, person, "info");
    let notes = store.fragment(info).unwrap().get("notes").unwrap().as_array().unwrap();

    let aegon = store
        .create_fragment("name", &json!({ "first": "Aegon", "last": "Targaryen" }))
        .unwrap();
    store
        .record(person)
        .unwrap()
        .set("name", AttrValue::Fragment(aegon))
        .unwrap();
    store.record(person).unwrap().set("info", AttrValue::NULL).unwrap();
    assert!(store.contains_node(name), "kept while rollback can restore it");

    store.record(person).unwrap().will_commit().unwrap();
    store.record(person).unwrap().did_commit(None).unwrap();
    for node in [name, info, notes] {
        assert!(!store.contains_node(node), "{node} must be freed");
    }
    assert_eq!(fragment_of(&mut store, person, "name"), aegon);
    assert!(!is_dirty(&mut store, person));
    assert!(!store.record(person).unwrap().has_dirty_attributes().unwrap());

    for round in 0..3 {
        let previous = fragment_of(&mut store, person, "name");
        let next = store
            .create_fragment("name", &json!({ "first": format!("Jon {round}") }))
            .unwrap();
        store
            .record(person)
            .unwrap()
            .set("name", AttrValue::Fragment(next))
            .unwrap();
        store.record(person).unwrap().will_commit().unwrap();
        store.record(person).unwrap().did_commit(None).unwrap();
        assert!(!store.contains_node(previous));
    }
}
