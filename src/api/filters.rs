use std::convert::Infallible;

use serde::de::DeserializeOwned;
use sqlx::{Pool, Postgres};
use warp::{filters::BoxedFilter, reply::Response, Filter, Reply};

use crate::{
    authentication::{jwt::SessionKeys, middleware::with_context},
    constants::MAX_BODY_BYTES,
    error::handle_rejection,
    form::Form,
    schema::{Id, Selection},
};

use super::handlers;

fn with_pool(
    pool: Pool<Postgres>,
) -> impl Filter<Extract = (Pool<Postgres>,), Error = Infallible> + Clone {
    warp::any().map(move || pool.clone())
}

fn with_selection(
    selection: Selection,
) -> impl Filter<Extract = (Selection,), Error = Infallible> + Clone {
    warp::any().map(move || selection)
}

/// Query string pairs; repeated keys such as `tags` are kept.
fn with_form() -> impl Filter<Extract = (Form,), Error = warp::Rejection> + Clone {
    warp::query::<Vec<(String, String)>>().map(Form::from_pairs)
}

fn json_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn catalog_routes(pool: Pool<Postgres>) -> BoxedFilter<(Response,)> {
    let list_tags = warp::path!("tags")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::list_tags);

    let get_tag = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::get_tag);

    let list_ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(with_form())
        .and(with_pool(pool.clone()))
        .and_then(handlers::list_ingredients);

    let get_ingredient = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_pool(pool))
        .and_then(handlers::get_ingredient);

    list_tags
        .or(get_tag)
        .unify()
        .or(list_ingredients)
        .unify()
        .or(get_ingredient)
        .unify()
        .boxed()
}

fn selection_routes(
    pool: Pool<Postgres>,
    keys: SessionKeys,
    segment: &'static str,
    selection: Selection,
) -> BoxedFilter<(Response,)> {
    let route = with_selection(selection)
        .and(warp::path("recipes"))
        .and(warp::path::param::<Id>())
        .and(warp::path(segment))
        .and(warp::path::end());

    let add = route
        .clone()
        .and(warp::post())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::add_selection);

    let remove = route
        .and(warp::delete())
        .and(with_context(keys))
        .and(with_pool(pool))
        .and_then(handlers::remove_selection);

    add.or(remove).unify().boxed()
}

fn recipe_routes(pool: Pool<Postgres>, keys: SessionKeys) -> BoxedFilter<(Response,)> {
    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::download_shopping_cart);

    let list = warp::path!("recipes")
        .and(warp::get())
        .and(with_form())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::list_recipes);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(json_body())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::create_recipe);

    let get = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::get_recipe);

    let update = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(json_body())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::update_recipe);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::delete_recipe);

    let favorite = selection_routes(pool.clone(), keys.clone(), "favorite", Selection::Favorite);
    let cart = selection_routes(pool, keys, "shopping_cart", Selection::ShoppingCart);

    download
        .or(list)
        .unify()
        .or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(favorite)
        .unify()
        .or(cart)
        .unify()
        .boxed()
}

fn user_routes(pool: Pool<Postgres>, keys: SessionKeys) -> BoxedFilter<(Response,)> {
    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::me);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(with_form())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::list_subscriptions);

    let list = warp::path!("users")
        .and(warp::get())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::list_users);

    let sign_up = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::create_user);

    let get = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::get_user);

    let delete = warp::path!("users" / Id)
        .and(warp::delete())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::delete_user);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::post())
        .and(with_form())
        .and(with_context(keys.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::subscribe);

    let unsubscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_context(keys))
        .and(with_pool(pool))
        .and_then(handlers::unsubscribe);

    me.or(subscriptions)
        .unify()
        .or(list)
        .unify()
        .or(sign_up)
        .unify()
        .or(get)
        .unify()
        .or(delete)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .boxed()
}

/// The whole HTTP surface under `/api`. Every rejection is turned into a
/// JSON `{"detail": ...}` response.
pub fn api(
    pool: Pool<Postgres>,
    keys: SessionKeys,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let routes = catalog_routes(pool.clone())
        .or(recipe_routes(pool.clone(), keys.clone()))
        .unify()
        .or(user_routes(pool, keys))
        .unify();

    warp::path("api")
        .and(routes)
        .recover(handle_rejection)
        .with(warp::log("foodgram::api"))
}
