use crate::{
    authentication::{middleware::RequestContext, permissions::ActionType},
    error::{ApiError, ConflictError, HtmlError, QueryError},
    form::validate_follow,
    schema::{Id, User, UserRow},
};

use super::users::get_user_by_id;

use sqlx::{Pool, Postgres};

pub async fn is_following(
    user_id: Id,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
    )
    .bind(user_id)
    .bind(author_id)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(exists)
}

async fn get_author(author_id: Id, pool: &Pool<Postgres>) -> Result<User, ApiError> {
    get_user_by_id(pool, author_id)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No user exists with specified id"))
}

/// Creates the follow edge caller -> author.
pub async fn subscribe(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    author_id: Id,
) -> Result<User, ApiError> {
    let session = context.require_session()?;
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    let author = get_author(author_id, pool).await?;
    let already_following = is_following(session.user_id, author_id, pool).await?;
    validate_follow(already_following, session.user_id, author_id)?;

    let result = sqlx::query(
        "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ConflictError::AlreadyFollowing.into());
    }

    log::trace!("> User {} now follows {}", session.user_id, author_id);
    Ok(author)
}

/// Removes the follow edge caller -> author.
pub async fn unsubscribe(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    author_id: Id,
) -> Result<(), ApiError> {
    let session = context.require_session()?;
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    get_author(author_id, pool).await?;

    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ConflictError::NotFollowing.into());
    }

    Ok(())
}

/// Authors the caller follows, ordered like the user list.
pub async fn list_subscriptions(
    pool: &Pool<Postgres>,
    context: &RequestContext,
) -> Result<Vec<UserRow>, ApiError> {
    let session = context.require_session()?;

    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.id, u.username, u.email, u.first_name, u.last_name, TRUE AS is_subscribed
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY u.first_name, u.last_name, u.id
    ",
    )
    .bind(session.user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}
