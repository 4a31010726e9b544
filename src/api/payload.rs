use std::collections::HashMap;

use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::{
    actions::{
        count_recipes, list_profiles_by_ids, list_recipe_parts, list_recipe_previews,
        list_recipe_tags,
    },
    authentication::middleware::RequestContext,
    error::ApiError,
    schema::{
        Id, LinkedRecipeTag, RecipeCount, RecipePart, RecipePreview, RecipeRow, RecipeShort, Tag,
        User, UserRow,
    },
};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl From<UserRow> for UserProfile {
    fn from(value: UserRow) -> Self {
        Self {
            email: value.email,
            id: value.id,
            username: value.username,
            first_name: value.first_name,
            last_name: value.last_name,
            is_subscribed: value.is_subscribed,
        }
    }
}

impl UserProfile {
    pub fn from_user(user: User, is_subscribed: bool) -> Self {
        Self {
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed,
        }
    }
}

/// An author with a preview of their recipes.
#[derive(Serialize, Debug, Clone)]
pub struct FollowProfile {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub recipes: Vec<RecipeShort>,
    pub recipes_count: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<RecipePart> for IngredientAmount {
    fn from(value: RecipePart) -> Self {
        Self {
            id: value.id,
            name: value.name,
            measurement_unit: value.measurement_unit,
            amount: value.amount,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct RecipeRead {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserProfile,
    pub ingredients: Vec<IngredientAmount>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// Joins recipe rows with their tags, ingredient rows and authors. Rows
/// whose author is missing are skipped.
pub fn compose_recipes(
    rows: Vec<RecipeRow>,
    tags: Vec<LinkedRecipeTag>,
    parts: Vec<RecipePart>,
    authors: Vec<UserRow>,
) -> Vec<RecipeRead> {
    let mut tags_by_recipe: HashMap<Id, Vec<Tag>> = HashMap::new();
    tags.into_iter().for_each(|tag| {
        tags_by_recipe
            .entry(tag.recipe_id)
            .or_default()
            .push(tag.into())
    });

    let mut parts_by_recipe: HashMap<Id, Vec<IngredientAmount>> = HashMap::new();
    parts.into_iter().for_each(|part| {
        parts_by_recipe
            .entry(part.recipe_id)
            .or_default()
            .push(part.into())
    });

    let authors: HashMap<Id, UserProfile> = authors
        .into_iter()
        .map(|author| (author.id, author.into()))
        .collect();

    rows.into_iter()
        .filter_map(|row| {
            let author = authors.get(&row.author_id)?.to_owned();

            Some(RecipeRead {
                id: row.id,
                tags: tags_by_recipe.remove(&row.id).unwrap_or_default(),
                author,
                ingredients: parts_by_recipe.remove(&row.id).unwrap_or_default(),
                is_favorited: row.is_favorited,
                is_in_shopping_cart: row.is_in_shopping_cart,
                name: row.name,
                image: row.image,
                text: row.text,
                cooking_time: row.cooking_time,
            })
        })
        .collect()
}

/// Loads everything the read payload of `rows` needs, as seen by the viewer.
pub async fn recipe_payloads(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    rows: Vec<RecipeRow>,
) -> Result<Vec<RecipeRead>, ApiError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let recipe_ids: Vec<Id> = rows.iter().map(|row| row.id).collect();
    let mut author_ids: Vec<Id> = rows.iter().map(|row| row.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let tags = list_recipe_tags(pool, &recipe_ids).await?;
    let parts = list_recipe_parts(pool, &recipe_ids).await?;
    let authors = list_profiles_by_ids(pool, context, &author_ids).await?;

    Ok(compose_recipes(rows, tags, parts, authors))
}

/// Attaches recipe previews and counts to each author.
pub fn compose_follow_profiles(
    authors: Vec<UserProfile>,
    previews: Vec<RecipePreview>,
    counts: Vec<RecipeCount>,
) -> Vec<FollowProfile> {
    let mut previews_by_author: HashMap<Id, Vec<RecipeShort>> = HashMap::new();
    previews.into_iter().for_each(|preview| {
        previews_by_author
            .entry(preview.author_id)
            .or_default()
            .push(preview.into())
    });

    let counts: HashMap<Id, i64> = counts
        .into_iter()
        .map(|count| (count.author_id, count.count))
        .collect();

    authors
        .into_iter()
        .map(|profile| FollowProfile {
            recipes: previews_by_author.remove(&profile.id).unwrap_or_default(),
            recipes_count: counts.get(&profile.id).copied().unwrap_or(0),
            profile,
        })
        .collect()
}

pub async fn follow_payloads(
    pool: &Pool<Postgres>,
    authors: Vec<UserProfile>,
    recipes_limit: Option<i64>,
) -> Result<Vec<FollowProfile>, ApiError> {
    if authors.is_empty() {
        return Ok(vec![]);
    }

    let author_ids: Vec<Id> = authors.iter().map(|author| author.id).collect();
    let previews = list_recipe_previews(pool, &author_ids, recipes_limit).await?;
    let counts = count_recipes(pool, &author_ids).await?;

    Ok(compose_follow_profiles(authors, previews, counts))
}
