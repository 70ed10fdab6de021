use std::cell::Cell;

use asupersync::runtime::RuntimeBuilder;
use serde::Deserialize;

use sqltemplate::prelude::*;
use sqltemplate::{CardinalityError, DataAccessErrorKind, ExtractionErrorKind};

fn people() -> Database<SqliteEngine> {
    let engine = SqliteEngine::with_tables([
        "CREATE TABLE t (id INTEGER PRIMARY KEY)",
        "INSERT INTO t (id) VALUES (1), (2), (3)",
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT, prefs TEXT)",
        "INSERT INTO people (name, city, prefs) VALUES \
            ('Kasia', 'Krakow', '{\"theme\": \"dark\", \"size\": 12}'), \
            ('Michal', 'Gdansk', NULL), \
            ('Ola', 'Krakow', NULL)",
    ])
    .expect("seed tables");
    Database::new(engine)
}

#[derive(Debug, PartialEq)]
struct Person {
    id: i64,
    name: String,
    city: Option<String>,
}

fn person(row: &Row) -> Result<Person> {
    Ok(Person {
        id: row.long("id")?,
        name: row.string("name")?,
        city: row.string_or_null("city")?,
    })
}

#[test]
fn query_list_returns_ids_in_row_order() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let db = people();

    rt.block_on(async {
        let ids = db
            .query_list(&cx, "SELECT id FROM t", |row: &Row| row.int("id"))
            .await
            .expect("list ids");
        assert_eq!(ids, vec![1, 2, 3]);

        let desc = db
            .query_list(&cx, "SELECT id FROM t ORDER BY id DESC", column::<i64>("id"))
            .await
            .expect("list ids descending");
        assert_eq!(desc, vec![3, 2, 1]);

        let none = db
            .query_list(&cx, "SELECT id FROM t WHERE id > 10", column::<i64>("id"))
            .await
            .expect("empty list");
        assert!(none.is_empty());
    });
}

#[test]
fn query_list_maps_rows_with_named_extractor() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let db = people();

    rt.block_on(async {
        let krakow = db
            .query_list(
                &cx,
                Statement::new("SELECT id, name, city FROM people WHERE city = ? ORDER BY name")
                    .bind("Krakow"),
                person,
            )
            .await
            .expect("people in Krakow");
        assert_eq!(
            krakow,
            vec![
                Person {
                    id: 1,
                    name: "Kasia".into(),
                    city: Some("Krakow".into()),
                },
                Person {
                    id: 3,
                    name: "Ola".into(),
                    city: Some("Krakow".into()),
                },
            ]
        );
    });
}

#[test]
fn query_one_requires_exactly_one_row() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let db = people();
    let calls = Cell::new(0);
    let counting = |row: &Row| {
        calls.set(calls.get() + 1);
        row.string("name")
    };

    rt.block_on(async {
        let name = db
            .query_one(
                &cx,
                Statement::named("SELECT name FROM people WHERE id = :id").param("id", 2),
                counting,
            )
            .await
            .expect("one row");
        assert_eq!(name, "Michal");
        assert_eq!(calls.get(), 1);

        let err = db
            .query_one(&cx, "SELECT name FROM people WHERE id = 42", counting)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cardinality(CardinalityError { actual: 0, .. })));

        let err = db
            .query_one(&cx, "SELECT name FROM people WHERE city = 'Krakow'", counting)
            .await
            .unwrap_err();
        assert!(err.is_cardinality());
        assert_eq!(calls.get(), 1, "extractor must not run on cardinality failure");
    });
}

#[test]
fn query_optional_allows_zero_rows() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let db = people();

    rt.block_on(async {
        let missing = db
            .query_optional(&cx, "SELECT name FROM people WHERE id = 9", column::<String>("name"))
            .await
            .expect("zero rows is fine");
        assert_eq!(missing, None);

        let found = db
            .query_optional(&cx, "SELECT name FROM people WHERE id = 1", column::<String>("name"))
            .await
            .expect("one row");
        assert_eq!(found.as_deref(), Some("Kasia"));

        let err = db
            .query_optional(&cx, "SELECT name FROM people", column::<String>("name"))
            .await
            .unwrap_err();
        assert!(err.is_cardinality());
    });
}

#[test]
fn extraction_failure_yields_no_partial_result() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let db = people();
    let seen = Cell::new(0);

    rt.block_on(async {
        let result = db
            .query_list(&cx, "SELECT id, prefs FROM people ORDER BY id", |row: &Row| {
                seen.set(seen.get() + 1);
                // Row 2 has NULL prefs, which the non-null getter rejects.
                row.string("prefs")
            })
            .await;
        let err = result.unwrap_err();
        assert!(
            matches!(err, Error::Extraction(ref e) if e.kind == ExtractionErrorKind::UnexpectedNull)
        );
        assert_eq!(seen.get(), 2, "extraction stops at the failing row");

        let err = db
            .query_one(&cx, "SELECT id FROM people WHERE id = 1", column::<String>("missing"))
            .await
            .unwrap_err();
        assert!(err.is_extraction());
    });
}

#[test]
fn query_aggregate_sees_the_whole_row_set() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let db = people();

    rt.block_on(async {
        let by_city = db
            .query_aggregate(
                &cx,
                "SELECT id, city FROM people ORDER BY id",
                group_by(column::<String>("city"), column::<i64>("id")),
            )
            .await
            .expect("group by city");
        assert_eq!(by_city["Krakow"], vec![1, 3]);
        assert_eq!(by_city["Gdansk"], vec![2]);

        let total = db
            .query_aggregate(&cx, "SELECT id FROM t", |rows: &mut RowSet| {
                let mut sum = 0;
                for row in rows {
                    sum += row?.long("id")?;
                }
                Ok::<_, Error>(sum)
            })
            .await
            .expect("sum ids");
        assert_eq!(total, 6);

        assert!(
            db.query_aggregate(&cx, "SELECT id FROM t WHERE id = 2", exists())
                .await
                .expect("exists")
        );
        let count = db
            .query_one(&cx, "SELECT COUNT(*) AS count FROM people", column::<i64>("count"))
            .await
            .expect("count");
        assert_eq!(count, 3);
    });
}

#[test]
fn json_columns_deserialize_through_serde() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Prefs {
        theme: String,
        size: u32,
    }

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let db = people();

    rt.block_on(async {
        let prefs: Prefs = db
            .query_one(&cx, "SELECT prefs FROM people WHERE id = 1", |row: &Row| {
                row.json("prefs")
            })
            .await
            .expect("prefs");
        assert_eq!(
            prefs,
            Prefs {
                theme: "dark".into(),
                size: 12,
            }
        );

        let raw: serde_json::Value = db
            .query_one(&cx, "SELECT prefs FROM people WHERE id = 1", |row: &Row| {
                row.json("prefs")
            })
            .await
            .expect("raw prefs");
        assert_eq!(raw["size"], 12);
    });
}

#[test]
fn writes_autocommit_and_report_counts() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let db = people();

    rt.block_on(async {
        let id = db
            .insert(
                &cx,
                Statement::positional(
                    "INSERT INTO people (name, city) VALUES (?, ?)",
                    ["Zofia", "Poznan"],
                ),
            )
            .await
            .expect("insert");
        assert_eq!(id, Some(4));

        let none = db
            .insert(&cx, "INSERT INTO people (name) SELECT name FROM people WHERE id > 100")
            .await
            .expect("insert nothing");
        assert_eq!(none, None);

        let moved = db
            .update(
                &cx,
                Statement::named("UPDATE people SET city = :to WHERE city = :from")
                    .param("from", "Krakow")
                    .param("to", "Warszawa"),
            )
            .await
            .expect("update");
        assert_eq!(moved, 2);

        let removed = db
            .update(&cx, "DELETE FROM people WHERE city = 'Poznan'")
            .await
            .expect("delete");
        assert_eq!(removed, 1);
    });
    assert_eq!(db.engine().committed_rows("people"), Some(3));
}

#[test]
fn engine_failures_are_data_access_errors() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let db = people();

    rt.block_on(async {
        let err = db
            .query_list(&cx, "SELECT id FROM nowhere", column::<i64>("id"))
            .await
            .unwrap_err();
        assert_eq!(err.data_access_kind(), Some(DataAccessErrorKind::NotFound));
        match err {
            Error::DataAccess(e) => assert_eq!(e.sql.as_deref(), Some("SELECT id FROM nowhere")),
            other => panic!("expected data access error, got {other:?}"),
        }

        let err = db
            .insert(&cx, "INSERT INTO t (id) VALUES (1)")
            .await
            .unwrap_err();
        assert_eq!(err.data_access_kind(), Some(DataAccessErrorKind::Constraint));

        let err = db
            .query_one(
                &cx,
                Statement::named("SELECT id FROM t WHERE id = :id"),
                column::<i64>("id"),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.data_access_kind(),
            Some(DataAccessErrorKind::InvalidParameter)
        );

        // A value bound in the wrong style is rejected, not dropped.
        let err = db
            .update(
                &cx,
                Statement::new("DELETE FROM t WHERE id = ?").param("id", 1),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.data_access_kind(),
            Some(DataAccessErrorKind::InvalidParameter)
        );
    });
    assert_eq!(db.engine().committed_rows("t"), Some(3));
}

#[test]
fn user_extractor_failures_become_extraction_errors() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let db = people();

    rt.block_on(async {
        let err = db
            .query_list(&cx, "SELECT id FROM people ORDER BY id", |row: &Row| -> Result<i64> {
                let id = row.long("id")?;
                if id == 2 {
                    return Err(Error::custom("bad row"));
                }
                Ok(id)
            })
            .await
            .unwrap_err();
        assert!(err.is_extraction(), "got {err:?}");
        assert_eq!(err.kind_name(), "extraction");
        assert!(err.to_string().contains("bad row"));

        let err = db
            .query_aggregate(&cx, "SELECT id FROM t", |_: &mut RowSet| {
                Err::<i64, _>(Error::custom("cannot total"))
            })
            .await
            .unwrap_err();
        assert!(err.is_extraction(), "got {err:?}");

        // Errors already in the taxonomy keep their category.
        let err = db
            .query_optional(&cx, "SELECT id FROM t WHERE id = 1", |_: &Row| {
                Err::<i64, _>(Error::Cardinality(CardinalityError {
                    expected: "exactly one row",
                    actual: 2,
                }))
            })
            .await
            .unwrap_err();
        assert!(err.is_cardinality());
    });
}

#[test]
fn cancelled_context_stops_facade_operations() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    cx.cancel_with(asupersync::CancelKind::User, Some("client went away"));
    let db = people();

    rt.block_on(async {
        let err = db
            .query_list(&cx, "SELECT id FROM t", column::<i64>("id"))
            .await
            .unwrap_err();
        assert_eq!(err.data_access_kind(), Some(DataAccessErrorKind::Cancelled));

        let err = db
            .update(&cx, "DELETE FROM t")
            .await
            .unwrap_err();
        assert_eq!(err.data_access_kind(), Some(DataAccessErrorKind::Cancelled));
    });
    assert_eq!(db.engine().committed_rows("t"), Some(3));
}
