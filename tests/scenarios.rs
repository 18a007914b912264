mod common;

use std::sync::Arc;
use std::thread;

use tempora::error::ConnectionError;
use tempora::schema::AttributeSchema;
use tempora::{Fact, Transactable, Transaction, Value, ValueType};

use common::{attr, declare_people, memory_connection};

#[test]
fn first_transaction_on_an_empty_store() {
    let conn = memory_connection();
    assert_eq!(conn.latest_t().unwrap(), 0);
    let tx = AttributeSchema::new("name", ValueType::String)
        .transaction()
        .assert(1u64, "name", "Ada");
    let result = conn.transact(&tx).expect("transact");
    assert_eq!(result.t(), 1);
    assert_eq!(conn.latest_t().unwrap(), 1);

    let name = attr(result.db(), "name");
    let db = conn.as_of(1).expect("as_of 1");
    assert_eq!(
        db.entity_facts(1).unwrap(),
        vec![Fact::assertion(1, name, Value::from("Ada"), 1)]
    );
    // before the first commit there is nothing
    let genesis = conn.as_of(0).expect("as_of 0");
    assert!(genesis.entity_facts(1).unwrap().is_empty());
    assert_eq!(genesis.lookup_ident("name").unwrap(), None);
}

#[test]
fn single_valued_attribute_overridden_in_a_later_transaction() {
    let conn = memory_connection();
    let tx = AttributeSchema::new("name", ValueType::String)
        .transaction()
        .assert(1u64, "name", "Ada");
    conn.transact(&tx).expect("t=1");
    let result = conn
        .transact(&Transaction::new().assert(1u64, "name", "Grace"))
        .expect("t=2");
    assert_eq!(result.t(), 2);
    let name = attr(result.db(), "name");
    // the override is written as a retraction of the old value
    assert_eq!(
        result.facts(),
        &[
            Fact::retraction(1, name, Value::from("Ada"), 2),
            Fact::assertion(1, name, Value::from("Grace"), 2),
        ]
    );

    let at_one = conn.as_of(1).unwrap();
    assert_eq!(at_one.value(1, name).unwrap(), Some(Value::from("Ada")));
    let at_two = conn.as_of(2).unwrap();
    assert_eq!(
        at_two.entity_facts(1).unwrap(),
        vec![Fact::assertion(1, name, Value::from("Grace"), 2)]
    );
}

#[test]
fn concurrent_transactions_serialize() {
    let conn = Arc::new(memory_connection());
    declare_people(&conn);
    let writers: Vec<_> = ["Ada", "Grace", "Barbara", "Frances"]
        .into_iter()
        .map(|name| {
            let conn = Arc::clone(&conn);
            thread::spawn(move || {
                let tx = Transaction::new().assert(tempora::EntityRef::temp("p"), "person/name", name);
                conn.transact(&tx).expect("transact")
            })
        })
        .collect();
    let mut results: Vec<_> = writers.into_iter().map(|w| w.join().unwrap()).collect();
    results.sort_by_key(|r| r.t());
    let ts: Vec<_> = results.iter().map(|r| r.t()).collect();
    assert_eq!(ts, vec![2, 3, 4, 5]);
    // each one was staged on top of the one before it
    for pair in results.windows(2) {
        assert_eq!(pair[1].before().t(), pair[0].t());
    }
    let ids: std::collections::BTreeSet<_> = results.iter().map(|r| r.tempid("p").unwrap()).collect();
    assert_eq!(ids.len(), 4, "every writer got its own entity");
    assert_eq!(conn.latest_t().unwrap(), 5);
}

#[test]
fn as_of_beyond_latest_is_unknown() {
    let conn = memory_connection();
    declare_people(&conn);
    assert_eq!(
        conn.as_of(5).unwrap_err(),
        ConnectionError::UnknownT { requested: 5, latest: 1 }
    );
    assert_eq!(conn.db().unwrap().t(), 1);
}
