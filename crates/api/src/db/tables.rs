//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Email,
    Name,
    AvatarUrl,
    CreatedAt,
}

#[derive(Iden)]
pub enum Accounts {
    Table,
    Provider,
    Subject,
    UserId,
    CreatedAt,
}
