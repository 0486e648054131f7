#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use model_fragments::{
    AttrValue, AttributeOptions, NodeId, OwnerEvent, RecordId, Registry, Store, StoreOptions,
    Transform,
};
use serde_json::Value;

pub fn registry() -> Arc<Registry> {
    let polymorphic = || AttributeOptions::default().polymorphic();
    let registry = Registry::builder()
        .fragment("name", |m| {
            m.attr("first", Transform::String)
                .attr("last", Transform::String)
        })
        .fragment("address", |m| {
            m.attr("street", Transform::String)
                .attr("city", Transform::String)
        })
        .fragment("product", |m| {
            m.attr("name", Transform::String)
                .attr("sku", Transform::String)
                .attr("price", Transform::Number)
        })
        .fragment("order", |m| {
            m.attr("amount", Transform::Number)
                .fragment_array("products", "product")
        })
        .fragment("info", |m| {
            m.attr("name", Transform::String)
                .array("notes", Some(Transform::String))
        })
        .fragment("animal", |m| m.abstract_model().attr("name", Transform::String))
        .fragment("lion", |m| {
            m.extends("animal").attr("has_mane", Transform::Boolean)
        })
        .fragment("elephant", |m| {
            m.extends("animal").attr("trunk_length", Transform::Number)
        })
        .fragment("node", |m| {
            m.attr("label", Transform::String).fragment("child", "node")
        })
        .record("person", |m| {
            m.fragment("name", "name")
                .fragment_array("addresses", "address")
                .array_with(
                    "titles",
                    Some(Transform::String),
                    AttributeOptions::default().with_default(serde_json::json!(["Ser"])),
                )
                .array("nicknames", None)
                .fragment_array("orders", "order")
                .fragment("info", "info")
                .fragment_with("favorite", "animal", polymorphic())
                .fragment_array_with("pets", "animal", polymorphic().type_key("$type"))
        })
        .record("zoo", |m| {
            m.attr("city", Transform::String)
                .fragment_with("star", "animal", polymorphic())
        })
        .record("tree", |m| m.fragment("root", "node"))
        .build()
        .expect("test registry must build");
    Arc::new(registry)
}

pub fn store() -> Store {
    Store::new(registry())
}

pub fn store_discarding_new() -> Store {
    Store::with_options(
        registry(),
        StoreOptions {
            suppress_reset_on_new_owner: false,
            validate_invariants: true,
        },
    )
}

/// Collects every owner notification the store emits.
pub fn record_events(store: &mut Store) -> Arc<Mutex<Vec<OwnerEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    store.on_change(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

pub fn fragment_of(store: &mut Store, record: RecordId, key: &str) -> NodeId {
    store
        .record(record)
        .unwrap()
        .get(key)
        .unwrap()
        .as_fragment()
        .unwrap_or_else(|| panic!("`{key}` must hold a fragment"))
}

pub fn fragment_array_of(store: &mut Store, record: RecordId, key: &str) -> NodeId {
    store
        .record(record)
        .unwrap()
        .get(key)
        .unwrap()
        .as_fragment_array()
        .unwrap_or_else(|| panic!("`{key}` must hold a fragment array"))
}

pub fn array_of(store: &mut Store, record: RecordId, key: &str) -> NodeId {
    store
        .record(record)
        .unwrap()
        .get(key)
        .unwrap()
        .as_array()
        .unwrap_or_else(|| panic!("`{key}` must hold an array"))
}

pub fn get_json(store: &mut Store, record: RecordId, key: &str) -> Value {
    store.record(record).unwrap().get_json(key).unwrap()
}

pub fn is_dirty(store: &mut Store, record: RecordId) -> bool {
    store.record(record).unwrap().has_dirty_attributes().unwrap()
}

pub fn scalar(value: &str) -> AttrValue {
    AttrValue::from(value)
}
