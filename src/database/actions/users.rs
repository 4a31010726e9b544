use crate::{
    authentication::{middleware::RequestContext, permissions::ActionType},
    error::{ApiError, HtmlError, QueryError},
    form::NewUser,
    schema::{Id, User, UserRow},
};

use sqlx::{Pool, Postgres};

const PROFILE_COLUMNS: &str = "
    u.id, u.username, u.email, u.first_name, u.last_name,
    EXISTS (SELECT 1 FROM follows f WHERE f.author_id = u.id AND f.user_id = $1) AS is_subscribed
";

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Creates a user account. Uniqueness of username and email is enforced by
/// the storage layer.
pub async fn create_user(pool: &Pool<Postgres>, user: NewUser) -> Result<User, ApiError> {
    log::trace!("> Creating user {}", user.username);

    let row: User = sqlx::query_as(
        "
        INSERT INTO users (username, email, first_name, last_name)
        VALUES ($1, $2, $3, $4)
        RETURNING *
    ",
    )
    .bind(user.username)
    .bind(user.email)
    .bind(user.first_name)
    .bind(user.last_name)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

/// Deletes a user together with everything that references them.
pub async fn delete_user(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    user_id: Id,
) -> Result<(), ApiError> {
    let session = context.require_session()?;
    session.authenticate(ActionType::ManageUsers)?;

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("No user exists with specified id"));
    }

    log::info!("User {user_id} deleted by {}", session.username);
    Ok(())
}

pub async fn get_profile(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    user_id: Id,
) -> Result<Option<UserRow>, ApiError> {
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "SELECT {PROFILE_COLUMNS} FROM users u WHERE u.id = $2"
    ))
    .bind(context.viewer_id())
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn list_profiles(
    pool: &Pool<Postgres>,
    context: &RequestContext,
) -> Result<Vec<UserRow>, ApiError> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {PROFILE_COLUMNS} FROM users u ORDER BY u.first_name, u.last_name, u.id"
    ))
    .bind(context.viewer_id())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn list_profiles_by_ids(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    user_ids: &[Id],
) -> Result<Vec<UserRow>, ApiError> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {PROFILE_COLUMNS} FROM users u WHERE u.id = ANY($2)"
    ))
    .bind(context.viewer_id())
    .bind(user_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}
