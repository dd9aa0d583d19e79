//! User query builders.

use sea_query::{Alias, Asterisk, Expr, Func, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::Users;

const USER_COLUMNS: [Users; 5] = [
    Users::Id,
    Users::Email,
    Users::Name,
    Users::AvatarUrl,
    Users::CreatedAt,
];

/// UPSERT a user keyed by email. An existing row keeps its id and
/// `created_at`; name and avatar are replaced.
pub fn upsert_by_email(
    id: &str,
    email: &str,
    name: Option<&str>,
    avatar_url: Option<&str>,
) -> Built {
    // raw SQL: sea-query's ON CONFLICT support is limited
    let sql = concat!(
        "INSERT INTO \"users\" (\"id\", \"email\", \"name\", \"avatar_url\") ",
        "VALUES (?, ?, ?, ?) ",
        "ON CONFLICT (\"email\") DO UPDATE SET ",
        "\"name\" = excluded.\"name\", ",
        "\"avatar_url\" = excluded.\"avatar_url\"",
    )
    .to_string();
    let values = sea_query::Values(vec![
        id.into(),
        email.into(),
        name.map(|s| s.to_string()).into(),
        avatar_url.map(|s| s.to_string()).into(),
    ]);
    (sql, values)
}

/// Find user by email. Columns: id, email, name, avatar_url, created_at.
pub fn get_by_email(email: &str) -> Built {
    Query::select()
        .columns(USER_COLUMNS)
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .build(SqliteQueryBuilder)
}

/// Find user by id. Columns: id, email, name, avatar_url, created_at.
pub fn get_by_id(user_id: &str) -> Built {
    Query::select()
        .columns(USER_COLUMNS)
        .from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Count all users.
pub fn count() -> Built {
    Query::select()
        .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
        .from(Users::Table)
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_targets_email_conflict() {
        let (sql, values) = upsert_by_email("u1", "a@b.c", Some("A"), None);
        assert!(sql.contains("ON CONFLICT (\"email\")"));
        assert!(!sql.contains("\"id\" = excluded"));
        assert_eq!(values.0.len(), 4);
    }

    #[test]
    fn lookup_binds_parameters() {
        let (sql, values) = get_by_email("a@b.c");
        assert!(sql.contains("WHERE \"email\" = ?"));
        assert_eq!(values.0.len(), 1);
    }
}
