use anyhow::{Context, Result};
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use mcpgate_api::db::{self as dbq, Built, migrations::MIGRATIONS};
use mcpgate_api::{Account, User, VerifiedIdentity};

/// Shared database state.
///
/// One SQLite connection behind a mutex; concurrent callers queue on the lock.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Liveness probe used at startup.
    pub fn ping(&self) -> Result<()> {
        self.conn()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("database ping")?;
        Ok(())
    }

    /// Map a verified identity onto a local user, atomically.
    ///
    /// The user row is matched on email (name and avatar refreshed), then the
    /// `(provider, subject)` account is created or repointed at that user.
    /// Both writes commit together or not at all.
    pub fn upsert_identity(&self, provider: &str, identity: &VerifiedIdentity) -> Result<User> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("begin upsert transaction")?;

        let new_id = uuid::Uuid::new_v4().to_string();
        sq_execute(
            &tx,
            dbq::users::upsert_by_email(
                &new_id,
                &identity.email,
                identity.name.as_deref(),
                identity.picture.as_deref(),
            ),
        )
        .context("upsert user")?;

        let user = sq_query_row(&tx, dbq::users::get_by_email(&identity.email), user_from_row)
            .context("load upserted user")?;

        sq_execute(
            &tx,
            dbq::accounts::upsert(provider, &identity.subject, &user.id),
        )
        .context("upsert account")?;

        tx.commit().context("commit upsert transaction")?;
        Ok(user)
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        sq_query_row(&conn, dbq::users::get_by_id(user_id), user_from_row)
            .optional()
            .context("get user")
    }

    pub fn find_account(&self, provider: &str, subject: &str) -> Result<Option<Account>> {
        let conn = self.conn();
        sq_query_row(
            &conn,
            dbq::accounts::find_by_provider(provider, subject),
            account_from_row,
        )
        .optional()
        .context("find account")
    }

    pub fn accounts_for_user(&self, user_id: &str) -> Result<Vec<Account>> {
        let conn = self.conn();
        sq_query_map(&conn, dbq::accounts::find_by_user(user_id), account_from_row)
            .context("list accounts")
    }

    pub fn count_users(&self) -> Result<i64> {
        let conn = self.conn();
        sq_query_row(&conn, dbq::users::count(), |row| row.get(0)).context("count users")
    }

    pub fn count_accounts(&self) -> Result<i64> {
        let conn = self.conn();
        sq_query_row(&conn, dbq::accounts::count(), |row| row.get(0)).context("count accounts")
    }
}

/// Initialize the database: open connection, enable WAL, run migrations.
pub fn init_db(data_dir: &Path) -> Result<Db> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("mcpgate.db");
    let conn = Connection::open(&db_path).context("opening SQLite database")?;

    // Enable WAL mode for better concurrent read performance
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    run_migrations(&conn)?;

    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
    })
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// sea-query → rusqlite glue
// ---------------------------------------------------------------------------

struct SqValue<'a>(&'a sea_query::Value);

impl ToSql for SqValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use sea_query::Value as V;
        let value = match self.0 {
            V::Bool(Some(b)) => Value::Integer(i64::from(*b)),
            V::Int(Some(i)) => Value::Integer(i64::from(*i)),
            V::BigInt(Some(i)) => Value::Integer(*i),
            V::String(Some(s)) => Value::Text(s.to_string()),
            _ => Value::Null,
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

pub fn sq_execute(conn: &Connection, (sql, values): Built) -> rusqlite::Result<usize> {
    conn.execute(&sql, rusqlite::params_from_iter(values.0.iter().map(SqValue)))
}

pub fn sq_query_row<T, F>(conn: &Connection, (sql, values): Built, f: F) -> rusqlite::Result<T>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(&sql, rusqlite::params_from_iter(values.0.iter().map(SqValue)), f)
}

pub fn sq_query_map<T, F>(conn: &Connection, (sql, values): Built, f: F) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.0.iter().map(SqValue)), f)?;
    rows.collect()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        provider: row.get(0)?,
        subject: row.get(1)?,
        user_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Db {
        let dir = tempfile::tempdir().unwrap();
        init_db(&dir.keep()).unwrap()
    }

    fn identity(subject: &str, email: &str, name: Option<&str>) -> VerifiedIdentity {
        VerifiedIdentity {
            subject: subject.to_string(),
            email: email.to_string(),
            email_verified: true,
            name: name.map(String::from),
            picture: None,
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.keep();
        init_db(&path).unwrap();
        let db = init_db(&path).unwrap();
        db.ping().unwrap();
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = test_db();
        let first = db
            .upsert_identity("google", &identity("g-1", "alice@example.com", Some("Alice")))
            .unwrap();
        let second = db
            .upsert_identity("google", &identity("g-1", "alice@example.com", Some("Alice")))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(db.count_users().unwrap(), 1);
        assert_eq!(db.count_accounts().unwrap(), 1);
    }

    #[test]
    fn test_second_provider_links_to_same_user() {
        let db = test_db();
        let alice = db
            .upsert_identity("google", &identity("g-1", "alice@example.com", Some("Alice")))
            .unwrap();
        let relinked = db
            .upsert_identity("auth0", &identity("auth0|42", "alice@example.com", Some("Alice A.")))
            .unwrap();

        assert_eq!(alice.id, relinked.id);
        assert_eq!(relinked.name.as_deref(), Some("Alice A."));
        assert_eq!(db.count_users().unwrap(), 1);

        let accounts = db.accounts_for_user(&alice.id).unwrap();
        let providers: Vec<&str> = accounts.iter().map(|a| a.provider.as_str()).collect();
        assert_eq!(accounts.len(), 2);
        assert!(providers.contains(&"google"));
        assert!(providers.contains(&"auth0"));
    }

    #[test]
    fn test_account_is_repointed_when_email_changes() {
        let db = test_db();
        let old = db
            .upsert_identity("google", &identity("g-1", "old@example.com", None))
            .unwrap();
        let new = db
            .upsert_identity("google", &identity("g-1", "new@example.com", None))
            .unwrap();

        assert_ne!(old.id, new.id);
        let account = db.find_account("google", "g-1").unwrap().unwrap();
        assert_eq!(account.user_id, new.id);
        assert_eq!(db.count_accounts().unwrap(), 1);
    }

    #[test]
    fn test_failed_account_link_rolls_back_user() {
        let db = test_db();
        let err = db.upsert_identity("google", &identity("", "bob@example.com", None));

        assert!(err.is_err());
        assert_eq!(db.count_users().unwrap(), 0);
        assert_eq!(db.count_accounts().unwrap(), 0);
    }

    #[test]
    fn test_get_user_roundtrip() {
        let db = test_db();
        let user = db
            .upsert_identity("oidc", &identity("s-1", "carol@example.com", Some("Carol")))
            .unwrap();
        let loaded = db.get_user(&user.id).unwrap().unwrap();
        assert_eq!(loaded, user);
        assert!(db.get_user("missing").unwrap().is_none());
    }
}
