use crate::{
    authentication::{jwt::SessionData, middleware::RequestContext, permissions::ActionType},
    error::{ApiError, HtmlError, QueryError},
    form::{FormError, RecipeFilter, ValidRecipe},
    schema::{Id, Recipe, RecipeCount, RecipePart, RecipePreview, RecipeRow, RecipeShort},
};

use super::{
    ingredients::{find_missing_ingredient, replace_recipe_ingredients},
    tags::{find_missing_tag, replace_recipe_tags},
};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

/// Starts a recipe query selecting the viewer-dependent flags. Anonymous
/// viewers bind `NULL`, which makes both flags false.
fn recipe_query<'a>(viewer: Option<Id>) -> QueryBuilder<'a, Postgres> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT r.*, EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ",
    );
    query
        .push_bind(viewer)
        .push(") AS is_favorited, EXISTS (SELECT 1 FROM shopping_carts c WHERE c.recipe_id = r.id AND c.user_id = ")
        .push_bind(viewer)
        .push(") AS is_in_shopping_cart FROM recipes r WHERE TRUE");

    query
}

pub async fn fetch_recipes(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    filter: &RecipeFilter,
) -> Result<Vec<RecipeRow>, ApiError> {
    let viewer = context.viewer_id();
    if viewer.is_none() && (filter.is_favorited || filter.is_in_shopping_cart) {
        return Ok(vec![]);
    }

    let mut query = recipe_query(viewer);

    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query
            .push(" AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(")
            .push_bind(filter.tags.clone())
            .push("))");
    }
    if filter.is_favorited {
        query
            .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
            .push_bind(viewer)
            .push(")");
    }
    if filter.is_in_shopping_cart {
        query
            .push(" AND EXISTS (SELECT 1 FROM shopping_carts c WHERE c.recipe_id = r.id AND c.user_id = ")
            .push_bind(viewer)
            .push(")");
    }
    query.push(" ORDER BY r.created_at DESC, r.id DESC");

    let rows: Vec<RecipeRow> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn get_recipe_row(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    id: Id,
) -> Result<Option<RecipeRow>, ApiError> {
    let mut query = recipe_query(context.viewer_id());
    query.push(" AND r.id = ").push_bind(id);

    let row: Option<RecipeRow> = query
        .build_query_as()
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, ApiError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_recipe_short(
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeShort>, ApiError> {
    let row: Option<RecipeShort> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

/// Loads a recipe the session may modify: its author's, or any for admins.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let recipe = get_recipe(id, pool).await?;

    match recipe {
        Some(recipe) => match session.authenticate(ActionType::ManageAllRecipes) {
            Ok(_) => Ok(recipe),
            Err(_) => {
                if recipe.author_id != session.user_id {
                    Err(HtmlError::Unauthorized.default())
                } else {
                    Ok(recipe)
                }
            }
        },
        None => Err(HtmlError::NotFound.new("No recipe exists with specified id")),
    }
}

pub async fn list_recipe_parts(
    pool: &Pool<Postgres>,
    recipe_ids: &[Id],
) -> Result<Vec<RecipePart>, ApiError> {
    let rows: Vec<RecipePart> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

async fn ensure_catalog_refs(
    conn: &mut PgConnection,
    recipe: &ValidRecipe,
) -> Result<(), ApiError> {
    let ingredient_ids: Vec<Id> = recipe.ingredients.iter().map(|(id, _)| *id).collect();

    if let Some(id) = find_missing_ingredient(&mut *conn, &ingredient_ids).await? {
        return Err(FormError::UnknownIngredient(id).into());
    }
    if let Some(id) = find_missing_tag(&mut *conn, &recipe.tags).await? {
        return Err(FormError::UnknownTag(id).into());
    }

    Ok(())
}

/// Stores a validated recipe with the caller as author. Scalars, tags and
/// ingredient rows are written in one transaction.
pub async fn create_recipe(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    recipe: ValidRecipe,
) -> Result<Id, ApiError> {
    let session = context.require_session()?;
    session.authenticate(ActionType::CreateRecipes)?;

    let image = recipe
        .image
        .as_deref()
        .ok_or(FormError::MissingField("image"))?;

    let mut tr = pool.begin().await.map_err(QueryError::from)?;
    ensure_catalog_refs(&mut tr, &recipe).await?;

    let (id,): (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(session.user_id)
    .bind(&recipe.name)
    .bind(image)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    replace_recipe_tags(&mut tr, id, &recipe.tags).await?;
    replace_recipe_ingredients(&mut tr, id, &recipe.ingredients).await?;

    tr.commit().await.map_err(QueryError::from)?;

    log::trace!("> Recipe {id} created by {}", session.username);
    Ok(id)
}

/// Fully replaces the tags and ingredient rows of a recipe, then applies the
/// scalar fields. Ingredients missing from `recipe` are removed.
pub async fn update_recipe(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    id: Id,
    recipe: ValidRecipe,
) -> Result<(), ApiError> {
    let session = context.require_session()?;
    get_recipe_mut(id, session, pool).await?;

    let mut tr = pool.begin().await.map_err(QueryError::from)?;
    ensure_catalog_refs(&mut tr, &recipe).await?;

    replace_recipe_tags(&mut tr, id, &recipe.tags).await?;
    replace_recipe_ingredients(&mut tr, id, &recipe.ingredients).await?;

    let result = sqlx::query(
        "
        UPDATE recipes SET name = $1, text = $2, cooking_time = $3, image = COALESCE($4, image)
        WHERE id = $5
    ",
    )
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .bind(recipe.image.as_deref())
    .bind(id)
    .execute(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("No recipe exists with specified id"));
    }

    tr.commit().await.map_err(QueryError::from)?;

    log::trace!("> Recipe {id} updated by {}", session.username);
    Ok(())
}

pub async fn delete_recipe(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    id: Id,
) -> Result<(), ApiError> {
    let session = context.require_session()?;
    get_recipe_mut(id, session, pool).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    log::trace!("> Recipe {id} deleted by {}", session.username);
    Ok(())
}

/// The newest recipes of each author, at most `limit` per author when given.
pub async fn list_recipe_previews(
    pool: &Pool<Postgres>,
    author_ids: &[Id],
    limit: Option<i64>,
) -> Result<Vec<RecipePreview>, ApiError> {
    let rows: Vec<RecipePreview> = sqlx::query_as(
        "
        SELECT p.author_id, p.id, p.name, p.image, p.cooking_time
        FROM (
            SELECT r.author_id, r.id, r.name, r.image, r.cooking_time, r.created_at,
                ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.created_at DESC, r.id DESC) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) p
        WHERE $2::BIGINT IS NULL OR p.position <= $2
        ORDER BY p.author_id, p.position
    ",
    )
    .bind(author_ids)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn count_recipes(
    pool: &Pool<Postgres>,
    author_ids: &[Id],
) -> Result<Vec<RecipeCount>, ApiError> {
    let rows: Vec<RecipeCount> = sqlx::query_as(
        "
        SELECT author_id, COUNT(*) AS count
        FROM recipes
        WHERE author_id = ANY($1)
        GROUP BY author_id
    ",
    )
    .bind(author_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}
