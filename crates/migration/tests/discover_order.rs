use std::fs;
use tidemark_migration::discover_migrations;

#[test]
fn order_is_independent_of_creation_order() {
    let names = [
        "001_create_users.sql",
        "002_create_orders.sql",
        "002_create_orders_index.sql",
        "003_add_email.sql",
        "010_backfill.sql",
        "100_cleanup.sql",
    ];

    let creation_orders: [[usize; 6]; 3] = [[5, 4, 3, 2, 1, 0], [2, 0, 5, 1, 4, 3], [0, 1, 2, 3, 4, 5]];

    for order in creation_orders {
        let tmp = tempfile::tempdir().unwrap();
        for i in order {
            fs::write(tmp.path().join(names[i]), format!("-- {}\n", names[i])).unwrap();
        }

        let found: Vec<String> = discover_migrations(tmp.path())
            .unwrap()
            .into_iter()
            .map(|s| s.identity().to_string())
            .collect();

        assert_eq!(found, names, "creation order {order:?}");
    }
}

#[test]
fn paths_point_at_the_listed_files() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("001_a.sql"), b"select 1;").unwrap();

    let scripts = discover_migrations(tmp.path()).unwrap();
    assert_eq!(scripts[0].path(), tmp.path().join("001_a.sql"));
    assert_eq!(scripts[0].read().unwrap().sql, "select 1;");
}
