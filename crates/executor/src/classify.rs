use tidemark_contracts::DbError;

/// PostgreSQL `duplicate_table`: "relation ... already exists".
pub const DUPLICATE_TABLE_SQLSTATE: &str = "42P07";

pub const ALREADY_EXISTS_MARKER: &str = "already exists";

/// PostgreSQL `query_canceled`, raised when `statement_timeout` fires.
pub const QUERY_CANCELED_SQLSTATE: &str = "57014";

/// True when the database refused a statement because the object it creates is
/// already there. This is the only error treated as "already applied".
pub fn is_already_exists(err: &DbError) -> bool {
    if err.code() == Some(DUPLICATE_TABLE_SQLSTATE) {
        return true;
    }

    err.message.to_ascii_lowercase().contains(ALREADY_EXISTS_MARKER)
}

pub fn is_query_canceled(err: &DbError) -> bool {
    err.code() == Some(QUERY_CANCELED_SQLSTATE)
}

#[cfg(test)]
mod tests {
    use super::{is_already_exists, is_query_canceled};
    use tidemark_contracts::DbError;

    #[test]
    fn duplicate_table_code_matches() {
        let err = DbError::message("relation \"users\" already exists").with_code("42P07");
        assert!(is_already_exists(&err));
    }

    #[test]
    fn code_alone_is_enough() {
        assert!(is_already_exists(&DbError::message("duplicate").with_code("42P07")));
    }

    #[test]
    fn message_marker_without_code_matches() {
        assert!(is_already_exists(&DbError::message("table users already exists")));
        assert!(is_already_exists(&DbError::message("Table `users` Already Exists")));
    }

    #[test]
    fn other_errors_do_not_match() {
        let syntax = DbError::message("syntax error at or near \"CREAT\"").with_code("42601");
        assert!(!is_already_exists(&syntax));

        let unique = DbError::message("duplicate key value violates unique constraint").with_code("23505");
        assert!(!is_already_exists(&unique));
    }

    #[test]
    fn statement_timeout_is_recognised_by_code() {
        let err = DbError::message("canceling statement due to statement timeout").with_code("57014");
        assert!(is_query_canceled(&err));
        assert!(!is_already_exists(&err));
        assert!(!is_query_canceled(&DbError::message("canceling statement")));
    }
}
