mod common;

use common::*;
use model_fragments::{AttrValue, FragmentError, FragmentState};
use serde_json::json;

#[test]
fn fragment_copy_is_an_unowned_new_fragment() {
    let mut store = store();
    let person = store
        .push_record(
            "person",
            "1",
            &json!({ "info": { "name": "Jon", "notes": ["bastard", "brother"] } }),
        )
        .unwrap();
    let info = fragment_of(&mut store, person, "info");
    store.fragment(info).unwrap().set("name", "Aegon").unwrap();

    let copy = store.fragment(info).unwrap().copy().unwrap();
    assert_ne!(copy, info);
    assert!(store.link(copy).unwrap().is_none());
    assert_eq!(
        store.fragment(copy).unwrap().state().unwrap(),
        FragmentState::LoadedCreated
    );
    assert_eq!(
        store.fragment(copy).unwrap().serialize().unwrap(),
        json!({ "name": "Aegon", "notes": ["bastard", "brother"] })
    );

    // The copy owns its own notes.
    let notes = store
        .fragment(copy)
        .unwrap()
        .get("notes")
        .unwrap()
        .as_array()
        .unwrap();
    let original_notes = store
        .fragment(info)
        .unwrap()
        .get("notes")
        .unwrap()
        .as_array()
        .unwrap();
    assert_ne!(notes, original_notes);
    store.array(notes).unwrap().push("king").unwrap();
    assert_eq!(
        store.array(original_notes).unwrap().len().unwrap(),
        2,
        "copies share no nodes"
    );
    assert!(store.array(notes).unwrap().is_dirty());
    assert!(store.fragment(copy).unwrap().is_dirty());
}

#[test]
fn copied_fragment_can_move_to_another_record() {
    let mut store = store();
    let jon = store
        .push_record("person", "1", &json!({ "name": { "first": "Jon", "last": "Snow" } }))
        .unwrap();
    let sam = store.push_record("person", "2", &json!({})).unwrap();
    let name = fragment_of(&mut store, jon, "name");

    let copy = store.fragment(name).unwrap().copy().unwrap();
    store
        .record(sam)
        .unwrap()
        .set("name", AttrValue::Fragment(copy))
        .unwrap();
    assert!(is_dirty(&mut store, sam));
    assert!(!is_dirty(&mut store, jon));
    assert_eq!(
        get_json(&mut store, sam, "name"),
        json!({ "first": "Jon", "last": "Snow" })
    );

    store.fragment(copy).unwrap().set("first", "Samwell").unwrap();
    assert_eq!(
        get_json(&mut store, jon, "name"),
        json!({ "first": "Jon", "last": "Snow" })
    );
}

#[test]
fn fragment_array_copy_has_clean_members() {
    let mut store = store();
    let person = store
        .push_record(
            "person",
            "1",
            &json!({ "addresses": [
                { "street": "Castle Black", "city": "The Wall" },
                { "street": "Great Keep", "city": "Winterfell" }
            ]}),
        )
        .unwrap();
    let other = store.push_record("person", "2", &json!({})).unwrap();
    let addresses = fragment_array_of(&mut store, person, "addresses");

    let copy = store.fragment_array(addresses).unwrap().copy().unwrap();
    assert!(store.link(copy).unwrap().is_none());
    let members = store.fragment_array(copy).unwrap().members().unwrap();
    assert_eq!(members.len(), 2);
    for member in &members {
        assert_eq!(
            store.fragment(*member).unwrap().state().unwrap(),
            FragmentState::LoadedSaved
        );
    }

    store
        .record(other)
        .unwrap()
        .set("addresses", AttrValue::FragmentArray(copy))
        .unwrap();
    assert!(is_dirty(&mut store, other));
    for member in &members {
        assert_eq!(
            store.link(*member).unwrap().map(|l| l.key.as_str()),
            Some("addresses")
        );
    }
    assert_eq!(
        get_json(&mut store, other, "addresses"),
        get_json(&mut store, person, "addresses")
    );
}

#[test]
fn primitive_array_copy_is_independent() {
    let mut store = store();
    let person = store
        .push_record("person", "1", &json!({ "nicknames": ["Lord Snow", 7] }))
        .unwrap();
    let nicknames = array_of(&mut store, person, "nicknames");

    let copy = store.array(nicknames).unwrap().copy().unwrap();
    store.array(copy).unwrap().push("Crow").unwrap();
    assert_eq!(store.array(nicknames).unwrap().len().unwrap(), 2);
    assert_eq!(store.array(copy).unwrap().serialize().unwrap(), json!(["Lord Snow", 7, "Crow"]));
    assert!(!is_dirty(&mut store, person));
}

#[test]
fn unowned_array_copy_only_takes_unowned_fragments() {
    let mut store = store();
    let person = store
        .push_record(
            "person",
            "1",
            &json!({ "addresses": [
                { "street": "Castle Black", "city": "The Wall" },
                { "street": "Great Keep", "city": "Winterfell" }
            ]}),
        )
        .unwrap();
    let addresses = fragment_array_of(&mut store, person, "addresses");
    let owned = store.fragment_array(addresses).unwrap().members().unwrap()[0];
    let copy = store.fragment_array(addresses).unwrap().copy().unwrap();

    let err = store
        .fragment_array(copy)
        .unwrap()
        .add_fragment(owned)
        .unwrap_err();
    assert!(
        matches!(&err, FragmentError::OwnershipConflict { existing, requested: None } if existing.key == "addresses"),
        "{err}"
    );
    assert_eq!(store.fragment_array(copy).unwrap().len().unwrap(), 2);
    assert!(!store.fragment_array(copy).unwrap().members().unwrap().contains(&owned));

    let loose = store
        .create_fragment("address", &json!({ "city": "Dragonstone" }))
        .unwrap();
    store.fragment_array(copy).unwrap().add_fragment(loose).unwrap();
    assert_eq!(store.fragment_array(copy).unwrap().len().unwrap(), 3);
    assert!(!is_dirty(&mut store, person));
}
