use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewUser, User, UserId},
    traits::LedgerError,
};

pub async fn insert_user(user: NewUser, conn: &mut SqliteConnection) -> Result<User, LedgerError> {
    let user: User = sqlx::query_as(
        r#"
            INSERT INTO users (full_name, email, privilege_level)
            VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(user.full_name)
    .bind(user.email)
    .bind(user.privilege_level)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ User {} created with id {}", user.email, user.id);
    Ok(user)
}

pub async fn fetch_user(id: UserId, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// The most recently created user with at least the given privilege level.
pub async fn fetch_most_recent_privileged(
    min_privilege: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM users WHERE privilege_level >= $1 ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(min_privilege)
    .fetch_optional(conn)
    .await
}
