use crate::{
    authentication::{middleware::RequestContext, permissions::ActionType},
    error::{ApiError, ConflictError, HtmlError, QueryError},
    schema::{Id, RecipeShort, Selection},
};

use super::recipes::get_recipe_short;

use sqlx::{Pool, Postgres};

/// Adds the recipe to the caller's favorites or cart. Fails if it is already there.
pub async fn add_selection(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    selection: Selection,
    recipe_id: Id,
) -> Result<RecipeShort, ApiError> {
    let session = context.require_session()?;
    session.authenticate(ActionType::ManageOwnSelections)?;

    let recipe = get_recipe_short(recipe_id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No recipe exists with specified id"))?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        selection.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        log::warn!(
            "User {} tried to add recipe {recipe_id} to {} twice",
            session.user_id,
            selection.table()
        );
        return Err(ConflictError::AlreadySelected(selection).into());
    }

    Ok(recipe)
}

/// Removes the recipe from the caller's favorites or cart. Fails if it is not there.
pub async fn remove_selection(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    selection: Selection,
    recipe_id: Id,
) -> Result<(), ApiError> {
    let session = context.require_session()?;
    session.authenticate(ActionType::ManageOwnSelections)?;

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        selection.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        if get_recipe_short(recipe_id, pool).await?.is_none() {
            return Err(HtmlError::NotFound.new("No recipe exists with specified id"));
        }
        return Err(ConflictError::NotSelected(selection).into());
    }

    Ok(())
}
