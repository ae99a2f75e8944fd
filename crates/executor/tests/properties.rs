mod common;

use common::*;
use tidemark_contracts::fake::FakeDatabase;
use tidemark_contracts::DbError;
use tidemark_executor::OutcomeStatus;

const N: usize = 5;

fn script_name(i: usize) -> String {
    format!("{i:03}_step.sql")
}

fn script_body(i: usize) -> String {
    format!("CREATE TABLE t{i} (id int);")
}

#[tokio::test]
async fn failure_at_k_never_runs_later_scripts() {
    for k in 1..=N {
        let tmp = tempfile::tempdir().unwrap();
        for i in 1..=N {
            std::fs::write(tmp.path().join(script_name(i)), script_body(i)).unwrap();
        }
        let db = FakeDatabase::new().fail_when_contains(
            format!("t{k} "),
            DbError::message("permission denied for schema public").with_code("42501"),
        );

        let result = run(&db, config(tmp.path())).await;

        assert_eq!(result.outcomes().len(), k, "k={k}");
        let (identity, _) = result.failure().unwrap();
        assert_eq!(identity, script_name(k));
        for later in k + 1..=N {
            let body = script_body(later);
            assert!(
                !db.executed().contains(&body),
                "script {later} ran after failure at {k}"
            );
        }
        assert_eq!(db.releases(), 1);
    }
}

#[tokio::test]
async fn listing_order_does_not_matter() {
    let tmp = tempfile::tempdir().unwrap();
    for i in [4, 1, 5, 3, 2] {
        std::fs::write(tmp.path().join(script_name(i)), script_body(i)).unwrap();
    }
    let db = FakeDatabase::new();

    let result = run(&db, config(tmp.path())).await;

    let expected: Vec<String> = (1..=N).map(script_name).collect();
    assert_eq!(identities(&result), expected);
    let bodies: Vec<String> = (1..=N).map(script_body).collect();
    assert_eq!(db.executed_scripts(), bodies);
}

#[tokio::test]
async fn second_run_skips_every_created_structure() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 1..=N {
        std::fs::write(tmp.path().join(script_name(i)), script_body(i)).unwrap();
    }

    for ledger in [true, false] {
        let db = FakeDatabase::new();
        let cfg = config(tmp.path()).with_ledger(ledger);

        run(&db, cfg.clone()).await;
        let second = run(&db, cfg).await;

        assert_eq!(second.outcomes().len(), N);
        assert!(second
            .outcomes()
            .iter()
            .all(|o| matches!(o.status, OutcomeStatus::SkippedAlreadyApplied(_))));
        assert_eq!(db.releases(), 2);
    }
}
