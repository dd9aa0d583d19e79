//! Account (provider identity link) query builders.

use sea_query::{Alias, Asterisk, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::Accounts;

const ACCOUNT_COLUMNS: [Accounts; 4] = [
    Accounts::Provider,
    Accounts::Subject,
    Accounts::UserId,
    Accounts::CreatedAt,
];

/// UPSERT an account keyed by `(provider, subject)`, repointing it at `user_id`.
pub fn upsert(provider: &str, subject: &str, user_id: &str) -> Built {
    let sql = concat!(
        "INSERT INTO \"accounts\" (\"provider\", \"subject\", \"user_id\") ",
        "VALUES (?, ?, ?) ",
        "ON CONFLICT (\"provider\", \"subject\") DO UPDATE SET ",
        "\"user_id\" = excluded.\"user_id\"",
    )
    .to_string();
    let values = sea_query::Values(vec![provider.into(), subject.into(), user_id.into()]);
    (sql, values)
}

/// Find the account for a provider identity.
pub fn find_by_provider(provider: &str, subject: &str) -> Built {
    Query::select()
        .columns(ACCOUNT_COLUMNS)
        .from(Accounts::Table)
        .and_where(Expr::col(Accounts::Provider).eq(provider))
        .and_where(Expr::col(Accounts::Subject).eq(subject))
        .build(SqliteQueryBuilder)
}

/// All accounts linked to a user, oldest first.
pub fn find_by_user(user_id: &str) -> Built {
    Query::select()
        .columns(ACCOUNT_COLUMNS)
        .from(Accounts::Table)
        .and_where(Expr::col(Accounts::UserId).eq(user_id))
        .order_by(Accounts::CreatedAt, Order::Asc)
        .order_by(Accounts::Provider, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Count all accounts.
pub fn count() -> Built {
    Query::select()
        .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
        .from(Accounts::Table)
        .build(SqliteQueryBuilder)
}
