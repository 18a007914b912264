mod common;

use tempora::config::{BackendKind, StoreConfig};
use tempora::error::ConnectionError;
use tempora::persist::{PersistenceMode, Persistor};
use tempora::{Connection, EntityRef, Transaction, Value};

use common::{assert_indexes_consistent, attr, declare_people, init_logging};

#[test]
fn file_mode_survives_a_reopen() {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = StoreConfig::sqlite(dir.path().join("facts.db"));
    let ada = {
        let conn = Connection::open(&config).expect("open");
        declare_people(&conn);
        let ada = conn
            .transact(
                &Transaction::new()
                    .assert(EntityRef::temp("ada"), "person/name", "Ada")
                    .assert(EntityRef::temp("ada"), "person/tag", "math"),
            )
            .unwrap()
            .tempid("ada")
            .unwrap();
        conn.transact(&Transaction::new().assert(ada, "person/name", "Ada Lovelace")).unwrap();
        conn.close().unwrap();
        ada
    };

    let conn = Connection::open(&config).expect("reopen");
    assert_eq!(conn.latest_t().unwrap(), 3);
    let db = conn.db().unwrap();
    let name = attr(&db, "person/name");
    assert_eq!(db.value_as::<String>(ada, name).unwrap().as_deref(), Some("Ada Lovelace"));
    assert_eq!(
        conn.as_of(2).unwrap().value(ada, name).unwrap(),
        Some(Value::from("Ada"))
    );
    assert_indexes_consistent(&db);
    // fresh ids continue after the ones handed out before the reopen
    let next = conn
        .transact(&Transaction::new().assert(EntityRef::temp("b"), "person/name", "Grace"))
        .unwrap();
    assert_eq!(next.t(), 4);
    assert!(next.tempid("b").unwrap() > ada);
}

#[test]
fn sqlite_scans_come_back_in_key_order_across_pages() {
    let storage = Persistor::with_options(PersistenceMode::InMemory, 2, 100).expect("sqlite");
    let conn = Connection::new(storage).unwrap();
    declare_people(&conn);
    let mut tx = Transaction::new();
    for (i, age) in [40i64, -1, 7, 1_000, 0].into_iter().enumerate() {
        tx = tx.assert(EntityRef::temp(format!("p{}", i)), "person/age", age);
    }
    conn.transact(&tx).unwrap();
    let db = conn.db().unwrap();
    let age = attr(&db, "person/age");
    let ages: Vec<_> = db
        .datoms(tempora::encoding::Index::Avet)
        .unwrap()
        .into_iter()
        .filter(|f| f.attribute() == age)
        .map(|f| f.into_value())
        .collect();
    assert_eq!(
        ages,
        [-1i64, 0, 7, 40, 1_000].into_iter().map(Value::Integer).collect::<Vec<_>>()
    );
}

#[test]
fn config_file_selects_the_backend() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("from-config.db");
    let file = dir.path().join("tempora.toml");
    std::fs::write(
        &file,
        format!(
            "backend = \"sqlite\"\nsqlite_path = {:?}\nscan_page_size = 7\n",
            db_path.display().to_string()
        ),
    )
    .unwrap();
    let config = StoreConfig::from_file(&file).expect("config");
    assert_eq!(config.backend, BackendKind::Sqlite);
    assert_eq!(config.sqlite_path.as_deref(), Some(db_path.as_path()));
    assert_eq!(config.scan_page_size, 7);
    assert_eq!(config.busy_timeout_ms, StoreConfig::default().busy_timeout_ms);

    let conn = Connection::open(&config).unwrap();
    declare_people(&conn);
    assert!(db_path.exists());
}

#[test]
fn bad_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        StoreConfig::from_file(&dir.path().join("missing.toml")),
        Err(ConnectionError::Config(_))
    ));
    let file = dir.path().join("zero.toml");
    std::fs::write(&file, "scan_page_size = 0\n").unwrap();
    assert!(matches!(StoreConfig::from_file(&file), Err(ConnectionError::Config(_))));
    let file = dir.path().join("unknown.toml");
    std::fs::write(&file, "backend = \"tape\"\n").unwrap();
    assert!(matches!(StoreConfig::from_file(&file), Err(ConnectionError::Config(_))));
}
