use crate::{
    error::{ApiError, QueryError},
    schema::{Id, Ingredient},
};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

/// Escapes `LIKE` wildcards so user input only ever matches literally.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Adds an ingredient to the catalog. The `(name, measurement_unit)` pair is unique.
pub async fn create_ingredient(
    name: &str,
    measurement_unit: &str,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, ApiError> {
    let ingredient: Ingredient = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *",
    )
    .bind(name)
    .bind(measurement_unit)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(ingredient)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, ApiError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Lists the catalog, optionally narrowed to names starting with `prefix`
/// (case-insensitive).
pub async fn list_ingredients(
    prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, ApiError> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM ingredients");

    if let Some(prefix) = prefix.filter(|prefix| !prefix.is_empty()) {
        query
            .push(" WHERE name ILIKE ")
            .push_bind(format!("{}%", escape_like(prefix)));
    }
    query.push(" ORDER BY name, measurement_unit");

    let rows: Vec<Ingredient> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows)
}

/// Returns the first id of `ingredient_ids` that is not in the catalog.
pub async fn find_missing_ingredient(
    conn: &mut PgConnection,
    ingredient_ids: &[Id],
) -> Result<Option<Id>, ApiError> {
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ingredient_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(ingredient_ids
        .iter()
        .find(|id| !found.iter().any(|(found,)| found == *id))
        .copied())
}

/// Replaces every `(ingredient, amount)` row of a recipe. Runs inside the
/// caller's transaction so readers never see a recipe without ingredients.
pub async fn replace_recipe_ingredients(
    conn: &mut PgConnection,
    recipe_id: Id,
    ingredients: &[(Id, i32)],
) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    if ingredients.is_empty() {
        return Ok(());
    }

    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    query.push_values(ingredients, |mut row, (ingredient_id, amount)| {
        row.push_bind(recipe_id)
            .push_bind(*ingredient_id)
            .push_bind(*amount);
    });

    query
        .build()
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("egg"), "egg");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
