mod common;

use tempora::error::TransactionError;
use tempora::schema::{AttributeSchema, DOC, IDENT};
use tempora::{Connection, EntityId, EntityRef, Transaction, Value, ValueType};

use common::{attr, declare_people, memory_connection};

fn with_ada() -> (Connection, EntityId) {
    let conn = memory_connection();
    declare_people(&conn);
    let ada = conn
        .transact(
            &Transaction::new()
                .assert(EntityRef::temp("ada"), "person/name", "Ada")
                .assert(EntityRef::temp("ada"), "person/email", "ada@example.org")
                .assert(EntityRef::temp("ada"), "person/tag", "math")
                .assert(EntityRef::temp("ada"), "person/tag", "poetry"),
        )
        .expect("ada")
        .tempid("ada")
        .unwrap();
    (conn, ada)
}

fn rejected(conn: &Connection, tx: Transaction) -> TransactionError {
    let before = conn.latest_t().unwrap();
    let err = conn.transact(&tx).expect_err("transaction should be rejected");
    assert_eq!(conn.latest_t().unwrap(), before, "a rejected transaction must not advance t");
    err
}

fn is_validation(err: &TransactionError) -> bool {
    matches!(err, TransactionError::ValidationFailed(_))
}

fn is_conflict(err: &TransactionError) -> bool {
    matches!(err, TransactionError::ConflictingOps(_))
}

#[test]
fn assert_and_retract_of_one_triple_conflict() {
    let (conn, ada) = with_ada();
    let err = rejected(
        &conn,
        Transaction::new()
            .assert(ada, "person/tag", "art")
            .retract(ada, "person/tag", "art"),
    );
    assert!(is_conflict(&err), "{}", err);
}

#[test]
fn two_values_for_a_single_valued_attribute_conflict() {
    let (conn, ada) = with_ada();
    let err = rejected(
        &conn,
        Transaction::new()
            .assert(ada, "person/name", "Augusta")
            .assert(ada, "person/name", "Ada King"),
    );
    assert!(is_conflict(&err), "{}", err);
    // asserting the same value twice is fine
    conn.transact(
        &Transaction::new()
            .assert(ada, "person/name", "Augusta")
            .assert(ada, "person/name", "Augusta"),
    )
    .expect("duplicate assertion");
}

#[test]
fn two_entities_claiming_a_unique_value_conflict() {
    let (conn, _) = with_ada();
    let err = rejected(
        &conn,
        Transaction::new()
            .assert(EntityRef::temp("a"), "person/email", "shared@example.org")
            .assert(EntityRef::temp("b"), "person/email", "shared@example.org"),
    );
    assert!(is_conflict(&err), "{}", err);
}

#[test]
fn unique_value_held_elsewhere_is_rejected() {
    let (conn, ada) = with_ada();
    let err = rejected(
        &conn,
        Transaction::new().assert(EntityRef::temp("b"), "person/email", "ada@example.org"),
    );
    assert!(is_validation(&err), "{}", err);
    // handing it over in the same transaction works
    let result = conn
        .transact(
            &Transaction::new()
                .assert(ada, "person/email", "countess@example.org")
                .assert(EntityRef::temp("b"), "person/email", "ada@example.org"),
        )
        .expect("move unique value");
    let email = attr(result.db(), "person/email");
    let b = result.tempid("b").unwrap();
    assert_eq!(result.db().entities_with(email, &"ada@example.org".into()).unwrap(), vec![b]);
    assert_eq!(
        result.db().entities_with(email, &"countess@example.org".into()).unwrap(),
        vec![ada]
    );
}

#[test]
fn unknown_or_mistyped_attributes_are_rejected() {
    let (conn, ada) = with_ada();
    assert!(is_validation(&rejected(&conn, Transaction::new().assert(ada, "person/shoe", "42"))));
    // an entity that is not an attribute
    assert!(is_validation(&rejected(&conn, Transaction::new().assert(ada, ada, "x"))));
    assert!(is_validation(&rejected(&conn, Transaction::new().assert(ada, "person/age", "old"))));
    assert!(is_validation(&rejected(&conn, Transaction::new().assert(ada, "person/friend", 7i64))));
}

#[test]
fn malformed_values_and_entities_are_rejected() {
    let (conn, ada) = with_ada();
    assert!(is_validation(&rejected(&conn, Transaction::new().assert(ada, "person/height", f64::NAN))));
    assert!(is_validation(&rejected(
        &conn,
        Transaction::new().assert(ada, "person/height", f64::INFINITY)
    )));
    assert!(is_validation(&rejected(&conn, Transaction::new().assert(0u64, "person/name", "Nobody"))));
    assert!(is_validation(&rejected(
        &conn,
        Transaction::new().assert(ada, "person/friend", EntityRef::Id(0))
    )));
    assert!(is_validation(&rejected(
        &conn,
        Transaction::new().assert(ada, "person/friend", EntityRef::temp("x")).assert(
            ada,
            "person/friend",
            EntityRef::unique("person/email", "nobody@example.org")
        )
    )));
    conn.transact(&Transaction::new().assert(ada, "person/height", 1.65))
        .expect("finite float");
}

#[test]
fn system_entities_are_read_only() {
    let (conn, _) = with_ada();
    let err = rejected(&conn, Transaction::new().assert(IDENT, DOC, "names things"));
    assert!(is_validation(&err), "{}", err);
}

#[test]
fn retract_attribute_needs_a_single_current_value() {
    let (conn, ada) = with_ada();
    assert!(is_validation(&rejected(&conn, Transaction::new().retract_attribute(ada, "person/tag"))));
    assert!(is_validation(&rejected(&conn, Transaction::new().retract_attribute(ada, "person/age"))));
}

#[test]
fn redundant_operations_write_nothing() {
    let (conn, ada) = with_ada();
    let result = conn
        .transact(
            &Transaction::new()
                .assert(ada, "person/name", "Ada")
                .assert(ada, "person/tag", "math")
                .retract(ada, "person/tag", "chess"),
        )
        .expect("redundant");
    assert!(result.facts().is_empty());
    assert_eq!(result.t(), result.before().t() + 1);
    assert_eq!(result.db().tx_record(result.t()).unwrap().unwrap().fact_count(), 0);
}

#[test]
fn empty_transaction_advances_t() {
    let conn = memory_connection();
    let result = conn.transact(&Transaction::new()).expect("empty");
    assert_eq!(result.t(), 1);
    assert!(result.facts().is_empty());
    assert_eq!(conn.latest_t().unwrap(), 1);
}

#[test]
fn temporary_ids_resolve_once_per_transaction() {
    let conn = memory_connection();
    declare_people(&conn);
    let result = conn
        .transact(
            &Transaction::new()
                .assert(EntityRef::temp("ada"), "person/name", "Ada")
                .assert(EntityRef::temp("charles"), "person/name", "Charles")
                .assert(EntityRef::temp("ada"), "person/friend", EntityRef::temp("charles")),
        )
        .unwrap();
    assert_eq!(result.tempids().len(), 2);
    let ada = result.tempid("ada").unwrap();
    let charles = result.tempid("charles").unwrap();
    assert_ne!(ada, charles);
    let friend = attr(result.db(), "person/friend");
    assert_eq!(result.db().value(ada, friend).unwrap(), Some(Value::Ref(charles)));
    // the next transaction gets fresh ids
    let again = conn
        .transact(&Transaction::new().assert(EntityRef::temp("ada"), "person/name", "Ada II"))
        .unwrap()
        .tempid("ada")
        .unwrap();
    assert!(again > charles.max(ada));
}

#[test]
fn explicit_ids_are_never_generated() {
    let conn = memory_connection();
    declare_people(&conn);
    let result = conn
        .transact(
            &Transaction::new()
                .assert(1000u64, "person/name", "Explicit")
                .assert(EntityRef::temp("t"), "person/name", "Generated"),
        )
        .unwrap();
    assert!(result.tempid("t").unwrap() > 1000);
}

#[test]
fn declaring_an_existing_ident_reuses_its_entity() {
    let conn = memory_connection();
    declare_people(&conn);
    let db = conn.db().unwrap();
    let name = attr(&db, "person/name");

    // redeclaring the same attribute changes nothing
    let result = conn
        .transact(&AttributeSchema::new("person/name", ValueType::String).doc("full name"))
        .unwrap();
    assert!(result.facts().is_empty());

    let result = conn
        .transact(
            &Transaction::new()
                .assert(EntityRef::temp("n"), IDENT, "person/name")
                .assert(EntityRef::temp("n"), DOC, "given and family name"),
        )
        .unwrap();
    assert_eq!(result.tempid("n"), Some(name));
    let attribute = result.db().attribute(name).unwrap().unwrap();
    assert_eq!(attribute.doc(), Some("given and family name"));
    assert_eq!(attribute.ident(), Some("person/name"));
}

#[test]
fn value_type_cannot_change() {
    let (conn, _) = with_ada();
    let err = rejected(&conn, Transaction::new().append(&AttributeSchema::new("person/age", ValueType::String)));
    assert!(is_validation(&err), "{}", err);
}
