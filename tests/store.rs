//! Storage behaviour against a live PostgreSQL server.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

use foodgram_sdk::{
    actions,
    error::{ApiError, QueryError},
    form::{NewUser, RecipeFilter, RecipeForm, ValidRecipe, WriteMode},
    jwt::SessionKeys,
    middleware::RequestContext,
    payload::{follow_payloads, recipe_payloads, UserProfile},
    schema::{Id, Selection, User, UserRole},
};
use serde_json::json;
use sqlx::PgPool;

const IMAGE: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

async fn user(pool: &PgPool, username: &str) -> User {
    actions::create_user(
        pool,
        NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            first_name: username.to_uppercase(),
            last_name: String::from("Cook"),
        },
    )
    .await
    .unwrap()
}

fn context(user: &User) -> RequestContext {
    let keys = SessionKeys::new("store-test-secret", 1).unwrap();
    let token = keys.issue_session_token(user).unwrap();
    RequestContext::authenticated(keys.verify_session_token(&token).unwrap().into())
}

fn recipe(ingredients: &[(Id, i64)], tags: &[Id]) -> ValidRecipe {
    let form: RecipeForm = serde_json::from_value(json!({
        "ingredients": ingredients
            .iter()
            .map(|(id, amount)| json!({"id": id, "amount": amount}))
            .collect::<Vec<_>>(),
        "tags": tags,
        "image": IMAGE,
        "name": "Pancakes",
        "text": "Mix and fry.",
        "cooking_time": 15
    }))
    .unwrap();

    form.validate(WriteMode::Create).unwrap()
}

struct Catalog {
    egg: Id,
    flour: Id,
    milk: Id,
    breakfast: Id,
    lunch: Id,
}

async fn catalog(pool: &PgPool) -> Catalog {
    Catalog {
        egg: actions::create_ingredient("egg", "pcs", pool).await.unwrap().id,
        flour: actions::create_ingredient("flour", "cup", pool).await.unwrap().id,
        milk: actions::create_ingredient("milk", "ml", pool).await.unwrap().id,
        breakfast: actions::create_tag("Breakfast", "#E26C2D", "breakfast", pool)
            .await
            .unwrap()
            .id,
        lunch: actions::create_tag("Lunch", "#49B64E", "lunch", pool)
            .await
            .unwrap()
            .id,
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn following_twice_or_yourself_is_rejected(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let bob = user(&pool, "bob").await;
    let ctx = context(&anna);

    actions::subscribe(&pool, &ctx, bob.id).await.unwrap();

    let error = actions::subscribe(&pool, &ctx, bob.id).await.unwrap_err();
    assert_eq!(error.code, 400);
    assert_eq!(error.info, "You are already subscribed to this user");

    let error = actions::subscribe(&pool, &ctx, anna.id).await.unwrap_err();
    assert_eq!(error.code, 400);
    assert_eq!(error.info, "You cannot subscribe to yourself");

    let subscriptions = actions::list_subscriptions(&pool, &ctx).await.unwrap();
    assert_eq!(subscriptions.len(), 1);
    assert!(subscriptions[0].is_subscribed);

    actions::unsubscribe(&pool, &ctx, bob.id).await.unwrap();
    let error = actions::unsubscribe(&pool, &ctx, bob.id).await.unwrap_err();
    assert_eq!(error.info, "You are not subscribed to this user");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn selections_are_unique_per_user(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let ctx = context(&anna);
    let c = catalog(&pool).await;
    let id = actions::create_recipe(&pool, &ctx, recipe(&[(c.egg, 2)], &[c.breakfast]))
        .await
        .unwrap();

    let short = actions::add_selection(&pool, &ctx, Selection::Favorite, id)
        .await
        .unwrap();
    assert_eq!(short.id, id);

    let error = actions::add_selection(&pool, &ctx, Selection::Favorite, id)
        .await
        .unwrap_err();
    assert_eq!(error.info, "Recipe is already in favorites");

    let error = actions::remove_selection(&pool, &ctx, Selection::ShoppingCart, id)
        .await
        .unwrap_err();
    assert_eq!(error.code, 400);
    assert_eq!(error.info, "Recipe is not in the shopping cart");

    let error = actions::remove_selection(&pool, &ctx, Selection::Favorite, id + 1000)
        .await
        .unwrap_err();
    assert_eq!(error.code, 404);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn shopping_list_sums_matching_ingredients(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let ctx = context(&anna);
    let c = catalog(&pool).await;

    let error = actions::build_shopping_list(&pool, &ctx).await.unwrap_err();
    assert_eq!(error.info, "Shopping cart is empty");

    let first = actions::create_recipe(&pool, &ctx, recipe(&[(c.egg, 2)], &[c.breakfast]))
        .await
        .unwrap();
    let second = actions::create_recipe(
        &pool,
        &ctx,
        recipe(&[(c.flour, 1), (c.egg, 3)], &[c.breakfast]),
    )
    .await
    .unwrap();

    for id in [first, second] {
        actions::add_selection(&pool, &ctx, Selection::ShoppingCart, id)
            .await
            .unwrap();
    }

    let (filename, list) = actions::build_shopping_list(&pool, &ctx).await.unwrap();
    assert_eq!(filename, "anna_shopping_list.txt");
    assert_eq!(
        list.render(),
        "Shopping list for: ANNA Cook\n\n- egg (pcs) - 5\n- flour (cup) - 1"
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn created_recipes_read_back_unchanged(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let ctx = context(&anna);
    let c = catalog(&pool).await;

    let id = actions::create_recipe(
        &pool,
        &ctx,
        recipe(&[(c.egg, 2), (c.milk, 250)], &[c.breakfast, c.lunch]),
    )
    .await
    .unwrap();

    let row = actions::get_recipe_row(&pool, &ctx, id).await.unwrap().unwrap();
    let read = recipe_payloads(&pool, &ctx, vec![row]).await.unwrap().remove(0);

    assert_eq!(read.author.id, anna.id);
    assert_eq!(read.cooking_time, 15);
    assert_eq!(
        read.ingredients
            .iter()
            .map(|i| (i.id, i.amount))
            .collect::<Vec<_>>(),
        vec![(c.egg, 2), (c.milk, 250)]
    );
    let mut tags: Vec<Id> = read.tags.iter().map(|t| t.id).collect();
    tags.sort();
    assert_eq!(tags, vec![c.breakfast, c.lunch]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn updates_replace_ingredients_and_tags(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let ctx = context(&anna);
    let c = catalog(&pool).await;

    let id = actions::create_recipe(
        &pool,
        &ctx,
        recipe(&[(c.egg, 2), (c.flour, 1)], &[c.breakfast]),
    )
    .await
    .unwrap();

    let mut update = recipe(&[(c.milk, 100)], &[c.lunch]);
    update.image = None;
    actions::update_recipe(&pool, &ctx, id, update).await.unwrap();

    let parts = actions::list_recipe_parts(&pool, &[id]).await.unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].id, c.milk);

    let tags = actions::list_recipe_tags(&pool, &[id]).await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].id, c.lunch);

    let stored = actions::get_recipe(id, &pool).await.unwrap().unwrap();
    assert_eq!(stored.image, IMAGE);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn only_the_author_may_change_a_recipe(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let bob = user(&pool, "bob").await;
    let c = catalog(&pool).await;

    let id = actions::create_recipe(&pool, &context(&anna), recipe(&[(c.egg, 2)], &[c.lunch]))
        .await
        .unwrap();

    let error = actions::delete_recipe(&pool, &context(&bob), id)
        .await
        .unwrap_err();
    assert_eq!(error.code, 403);

    let error = actions::update_recipe(&pool, &context(&bob), id, recipe(&[(c.egg, 1)], &[c.lunch]))
        .await
        .unwrap_err();
    assert_eq!(error.code, 403);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn unknown_catalog_references_are_rejected(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let c = catalog(&pool).await;

    let error = actions::create_recipe(
        &pool,
        &context(&anna),
        recipe(&[(c.egg + 1000, 2)], &[c.lunch]),
    )
    .await
    .unwrap_err();

    assert_eq!(error.code, 400);
    assert_eq!(error.info, format!("Ingredient {} does not exist", c.egg + 1000));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn anonymous_viewers_see_no_selections(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let ctx = context(&anna);
    let c = catalog(&pool).await;

    let id = actions::create_recipe(&pool, &ctx, recipe(&[(c.egg, 2)], &[c.lunch]))
        .await
        .unwrap();
    actions::add_selection(&pool, &ctx, Selection::Favorite, id)
        .await
        .unwrap();

    let own = actions::get_recipe_row(&pool, &ctx, id).await.unwrap().unwrap();
    assert!(own.is_favorited);
    assert!(!own.is_in_shopping_cart);

    let anonymous = RequestContext::anonymous();
    let row = actions::get_recipe_row(&pool, &anonymous, id)
        .await
        .unwrap()
        .unwrap();
    assert!(!row.is_favorited);
    assert!(!row.is_in_shopping_cart);

    let filter = RecipeFilter {
        is_favorited: true,
        ..Default::default()
    };
    assert!(actions::fetch_recipes(&pool, &anonymous, &filter)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(actions::fetch_recipes(&pool, &ctx, &filter).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn deleting_removes_dependent_rows(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let bob = user(&pool, "bob").await;
    let c = catalog(&pool).await;

    let id = actions::create_recipe(&pool, &context(&anna), recipe(&[(c.egg, 2)], &[c.lunch]))
        .await
        .unwrap();
    actions::add_selection(&pool, &context(&bob), Selection::ShoppingCart, id)
        .await
        .unwrap();

    actions::delete_recipe(&pool, &context(&anna), id).await.unwrap();
    assert!(actions::list_cart_totals(&pool, bob.id).await.unwrap().is_empty());
    assert!(actions::list_recipe_parts(&pool, &[id]).await.unwrap().is_empty());

    actions::create_recipe(&pool, &context(&bob), recipe(&[(c.flour, 1)], &[c.lunch]))
        .await
        .unwrap();
    sqlx::query("UPDATE users SET role = 'admin' WHERE id = $1")
        .bind(anna.id)
        .execute(&pool)
        .await
        .unwrap();
    let admin = User {
        role: UserRole::Admin,
        ..anna
    };

    actions::delete_user(&pool, &context(&admin), bob.id).await.unwrap();
    let counts = actions::count_recipes(&pool, &[bob.id]).await.unwrap();
    assert!(counts.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn recipe_filters_match_author_and_any_tag(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let bob = user(&pool, "bob").await;
    let c = catalog(&pool).await;

    let morning = actions::create_recipe(
        &pool,
        &context(&anna),
        recipe(&[(c.egg, 2)], &[c.breakfast]),
    )
    .await
    .unwrap();
    let noon = actions::create_recipe(&pool, &context(&anna), recipe(&[(c.egg, 2)], &[c.lunch]))
        .await
        .unwrap();
    let brunch = actions::create_recipe(
        &pool,
        &context(&anna),
        recipe(&[(c.egg, 2)], &[c.breakfast, c.lunch]),
    )
    .await
    .unwrap();
    let other = actions::create_recipe(
        &pool,
        &context(&bob),
        recipe(&[(c.flour, 1)], &[c.breakfast]),
    )
    .await
    .unwrap();

    let ids = |rows: Vec<foodgram_sdk::schema::RecipeRow>| -> Vec<Id> {
        rows.into_iter().map(|row| row.id).collect()
    };
    let anonymous = RequestContext::anonymous();

    let filter = RecipeFilter {
        tags: vec![String::from("breakfast")],
        ..Default::default()
    };
    let rows = actions::fetch_recipes(&pool, &anonymous, &filter).await.unwrap();
    assert_eq!(ids(rows), vec![other, brunch, morning]);

    let filter = RecipeFilter {
        author: Some(anna.id),
        tags: vec![String::from("lunch")],
        ..Default::default()
    };
    let rows = actions::fetch_recipes(&pool, &anonymous, &filter).await.unwrap();
    assert_eq!(ids(rows), vec![brunch, noon]);

    let filter = RecipeFilter {
        author: Some(anna.id),
        tags: vec![String::from("breakfast"), String::from("lunch")],
        ..Default::default()
    };
    let rows = actions::fetch_recipes(&pool, &anonymous, &filter).await.unwrap();
    assert_eq!(ids(rows), vec![brunch, noon, morning]);

    let filter = RecipeFilter {
        tags: vec![String::from("dinner")],
        ..Default::default()
    };
    assert!(actions::fetch_recipes(&pool, &anonymous, &filter)
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn recipes_limit_caps_previews_but_not_the_count(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let bob = user(&pool, "bob").await;
    let c = catalog(&pool).await;

    let mut created = vec![];
    for _ in 0..3 {
        let id = actions::create_recipe(
            &pool,
            &context(&anna),
            recipe(&[(c.egg, 2)], &[c.breakfast]),
        )
        .await
        .unwrap();
        created.push(id);
    }
    actions::subscribe(&pool, &context(&bob), anna.id).await.unwrap();

    let authors: Vec<UserProfile> = actions::list_subscriptions(&pool, &context(&bob))
        .await
        .unwrap()
        .into_iter()
        .map(UserProfile::from)
        .collect();

    let capped = follow_payloads(&pool, authors.clone(), Some(2)).await.unwrap();
    assert_eq!(capped[0].recipes_count, 3);
    assert_eq!(
        capped[0].recipes.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![created[2], created[1]]
    );

    let full = follow_payloads(&pool, authors.clone(), None).await.unwrap();
    assert_eq!(full[0].recipes.len(), 3);

    let none = follow_payloads(&pool, authors, Some(0)).await.unwrap();
    assert!(none[0].recipes.is_empty());
    assert_eq!(none[0].recipes_count, 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn ingredient_search_is_a_literal_case_insensitive_prefix(pool: PgPool) {
    catalog(&pool).await;
    actions::create_ingredient("Eggplant", "pcs", &pool).await.unwrap();

    let mut names: Vec<String> = actions::list_ingredients(Some("E"), &pool)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Eggplant", "egg"]);

    assert!(actions::list_ingredients(Some("%"), &pool).await.unwrap().is_empty());
    assert!(actions::list_ingredients(Some("_gg"), &pool).await.unwrap().is_empty());
    assert_eq!(actions::list_ingredients(None, &pool).await.unwrap().len(), 4);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn storage_rejects_duplicate_selections(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let c = catalog(&pool).await;
    let id = actions::create_recipe(&pool, &context(&anna), recipe(&[(c.egg, 2)], &[c.lunch]))
        .await
        .unwrap();

    let insert = "INSERT INTO favorites (user_id, recipe_id) VALUES ($1, $2)";
    sqlx::query(insert)
        .bind(anna.id)
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();
    let error: ApiError = QueryError::from(
        sqlx::query(insert)
            .bind(anna.id)
            .bind(id)
            .execute(&pool)
            .await
            .unwrap_err(),
    )
    .into();

    assert_eq!(error.code, 400);
    assert_eq!(error.info, "Recipe is already in favorites");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn duplicate_sign_up_is_rejected(pool: PgPool) {
    user(&pool, "anna").await;

    let error = actions::create_user(
        &pool,
        NewUser {
            username: String::from("anna"),
            email: String::from("other@example.com"),
            first_name: String::from("Anna"),
            last_name: String::from("Other"),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(error.code, 400);
    assert_eq!(error.info, "A user with that username already exists");

    let error = actions::create_user(
        &pool,
        NewUser {
            username: String::from("anna2"),
            email: String::from("anna@example.com"),
            first_name: String::from("Anna"),
            last_name: String::from("Other"),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(error.info, "A user with that email already exists");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn range_checks_report_their_reason(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let c = catalog(&pool).await;
    let id = actions::create_recipe(&pool, &context(&anna), recipe(&[(c.egg, 2)], &[c.lunch]))
        .await
        .unwrap();

    let error: ApiError = QueryError::from(
        sqlx::query("UPDATE recipe_ingredients SET amount = 0 WHERE recipe_id = $1")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap_err(),
    )
    .into();
    assert_eq!(error.code, 400);
    assert_eq!(error.info, "Ingredient amount must be between 1 and 32767");

    let error: ApiError = QueryError::from(
        sqlx::query("UPDATE recipes SET cooking_time = 40000 WHERE id = $1")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap_err(),
    )
    .into();
    assert_eq!(error.info, "Cooking time must be between 1 and 32767 minutes");

    let error = actions::create_tag("Dinner", "red", "dinner", &pool)
        .await
        .unwrap_err();
    assert_eq!(error.info, "Tag color must be a hex code such as #E26C2D");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn shopping_list_follows_the_catalog_order(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let ctx = context(&anna);
    let c = catalog(&pool).await;
    let banana = actions::create_ingredient("Banana", "pcs", &pool).await.unwrap().id;
    let apple = actions::create_ingredient("apple", "pcs", &pool).await.unwrap().id;

    for ingredients in [vec![(banana, 1), (apple, 2)], vec![(apple, 3)]] {
        let id = actions::create_recipe(&pool, &ctx, recipe(&ingredients, &[c.lunch]))
            .await
            .unwrap();
        actions::add_selection(&pool, &ctx, Selection::ShoppingCart, id)
            .await
            .unwrap();
    }

    let catalog_order: Vec<String> = actions::list_ingredients(None, &pool)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .filter(|name| name == "Banana" || name == "apple")
        .collect();

    let items = actions::list_cart_totals(&pool, anna.id).await.unwrap();
    let list_order: Vec<String> = items.iter().map(|item| item.name.clone()).collect();
    assert_eq!(list_order, catalog_order);

    let apples = items.iter().find(|item| item.name == "apple").unwrap();
    assert_eq!(apples.amount, 5);
}
