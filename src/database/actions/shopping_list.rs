use crate::{
    authentication::{middleware::RequestContext, permissions::ActionType},
    constants::{SHOPPING_LIST_HEADER, SHOPPING_LIST_SUFFIX},
    error::{ApiError, ConflictError, HtmlError, QueryError},
    schema::Id,
};

use super::users::get_user_by_id;

use sqlx::{Pool, Postgres};

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Ingredient totals over every recipe in a user's cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingList {
    pub owner: String,
    pub items: Vec<ShoppingListItem>,
}

impl ShoppingList {
    pub fn render(&self) -> String {
        let lines = self
            .items
            .iter()
            .map(|item| {
                format!(
                    "- {} ({}) - {}",
                    item.name, item.measurement_unit, item.amount
                )
            })
            .collect::<Vec<String>>()
            .join("\n");

        format!("{SHOPPING_LIST_HEADER} {}\n\n{lines}", self.owner)
    }

    pub fn filename(username: &str) -> String {
        format!("{username}{SHOPPING_LIST_SUFFIX}")
    }
}

/// Sums the amounts of the user's cart per `(name, measurement_unit)`,
/// ordered by name in the database collation.
pub async fn list_cart_totals(
    pool: &Pool<Postgres>,
    user_id: Id,
) -> Result<Vec<ShoppingListItem>, ApiError> {
    let rows: Vec<ShoppingListItem> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, SUM(ri.amount)::BIGINT AS amount
        FROM shopping_carts c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
        GROUP BY i.name, i.measurement_unit
        ORDER BY i.name, i.measurement_unit
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Builds the caller's shopping list and its attachment filename. An empty
/// cart is rejected.
pub async fn build_shopping_list(
    pool: &Pool<Postgres>,
    context: &RequestContext,
) -> Result<(String, ShoppingList), ApiError> {
    let session = context.require_session()?;
    session.authenticate(ActionType::ManageOwnSelections)?;

    let user = get_user_by_id(pool, session.user_id)
        .await?
        .ok_or_else(|| HtmlError::InvalidSession.new("Invalid session; Unknown user"))?;

    let items = list_cart_totals(pool, user.id).await?;
    if items.is_empty() {
        return Err(ConflictError::EmptyShoppingCart.into());
    }

    Ok((
        ShoppingList::filename(&user.username),
        ShoppingList {
            owner: user.full_name(),
            items,
        },
    ))
}
