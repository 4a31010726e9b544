use serde::Serialize;
use sqlx::{Pool, Postgres};
use warp::{
    http::{header::CONTENT_DISPOSITION, StatusCode},
    reject::Rejection,
    reply::Response,
    Reply,
};

use crate::{
    actions,
    authentication::middleware::RequestContext,
    error::{ApiError, HtmlError},
    form::{recipes_limit, Form, RecipeFilter, RecipeForm, UserForm, WriteMode},
    schema::{Id, Selection},
};

use super::payload::{follow_payloads, recipe_payloads, FollowProfile, RecipeRead, UserProfile};

fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

fn recipe_not_found() -> ApiError {
    HtmlError::NotFound.new("No recipe exists with specified id")
}

async fn read_recipe(
    pool: &Pool<Postgres>,
    context: &RequestContext,
    id: Id,
) -> Result<RecipeRead, ApiError> {
    let row = actions::get_recipe_row(pool, context, id)
        .await?
        .ok_or_else(recipe_not_found)?;

    recipe_payloads(pool, context, vec![row])
        .await?
        .pop()
        .ok_or_else(recipe_not_found)
}

async fn follow_profile(
    pool: &Pool<Postgres>,
    profile: UserProfile,
    limit: Option<i64>,
) -> Result<FollowProfile, ApiError> {
    follow_payloads(pool, vec![profile], limit)
        .await?
        .pop()
        .ok_or_else(|| HtmlError::NotFound.new("No user exists with specified id"))
}

pub async fn list_tags(pool: Pool<Postgres>) -> Result<Response, Rejection> {
    let tags = actions::list_tags(&pool).await?;
    Ok(json_reply(&tags, StatusCode::OK))
}

pub async fn get_tag(id: Id, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    let tag = actions::get_tag(id, &pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No tag exists with specified id"))?;

    Ok(json_reply(&tag, StatusCode::OK))
}

pub async fn list_ingredients(form: Form, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    let ingredients = actions::list_ingredients(form.get_str("name"), &pool).await?;
    Ok(json_reply(&ingredients, StatusCode::OK))
}

pub async fn get_ingredient(id: Id, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    let ingredient = actions::get_ingredient(id, &pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No ingredient exists with specified id"))?;

    Ok(json_reply(&ingredient, StatusCode::OK))
}

pub async fn list_recipes(
    form: Form,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let filter = RecipeFilter::try_from(&form).map_err(ApiError::from)?;
    let rows = actions::fetch_recipes(&pool, &context, &filter).await?;
    let recipes = recipe_payloads(&pool, &context, rows).await?;

    Ok(json_reply(&recipes, StatusCode::OK))
}

pub async fn get_recipe(
    id: Id,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let recipe = read_recipe(&pool, &context, id).await?;
    Ok(json_reply(&recipe, StatusCode::OK))
}

pub async fn create_recipe(
    form: RecipeForm,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    context.require_session()?;
    let recipe = form.validate(WriteMode::Create).map_err(ApiError::from)?;

    let id = actions::create_recipe(&pool, &context, recipe).await?;
    let recipe = read_recipe(&pool, &context, id).await?;

    Ok(json_reply(&recipe, StatusCode::CREATED))
}

pub async fn update_recipe(
    id: Id,
    form: RecipeForm,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let session = context.require_session()?;
    actions::get_recipe_mut(id, session, &pool).await?;
    let recipe = form.validate(WriteMode::Update).map_err(ApiError::from)?;

    actions::update_recipe(&pool, &context, id, recipe).await?;
    let recipe = read_recipe(&pool, &context, id).await?;

    Ok(json_reply(&recipe, StatusCode::OK))
}

pub async fn delete_recipe(
    id: Id,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    actions::delete_recipe(&pool, &context, id).await?;
    Ok(no_content())
}

pub async fn add_selection(
    selection: Selection,
    id: Id,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let recipe = actions::add_selection(&pool, &context, selection, id).await?;
    Ok(json_reply(&recipe, StatusCode::CREATED))
}

pub async fn remove_selection(
    selection: Selection,
    id: Id,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    actions::remove_selection(&pool, &context, selection, id).await?;
    Ok(no_content())
}

pub async fn download_shopping_cart(
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let (filename, list) = actions::build_shopping_list(&pool, &context).await?;

    Ok(warp::reply::with_header(
        list.render(),
        CONTENT_DISPOSITION,
        format!("attachment; filename=\"{filename}\""),
    )
    .into_response())
}

pub async fn list_users(
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let users: Vec<UserProfile> = actions::list_profiles(&pool, &context)
        .await?
        .into_iter()
        .map(UserProfile::from)
        .collect();

    Ok(json_reply(&users, StatusCode::OK))
}

pub async fn create_user(form: UserForm, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    let user = form.validate().map_err(ApiError::from)?;
    let user = actions::create_user(&pool, user).await?;

    log::info!("Signed up user {} ({})", user.username, user.id);
    Ok(json_reply(
        &UserProfile::from_user(user, false),
        StatusCode::CREATED,
    ))
}

pub async fn me(context: RequestContext, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    let session = context.require_session()?;
    let profile = actions::get_profile(&pool, &context, session.user_id)
        .await?
        .ok_or_else(|| HtmlError::InvalidSession.new("Invalid session; Unknown user"))?;

    Ok(json_reply(&UserProfile::from(profile), StatusCode::OK))
}

pub async fn get_user(
    id: Id,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let profile = actions::get_profile(&pool, &context, id)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No user exists with specified id"))?;

    Ok(json_reply(&UserProfile::from(profile), StatusCode::OK))
}

pub async fn delete_user(
    id: Id,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    actions::delete_user(&pool, &context, id).await?;
    Ok(no_content())
}

pub async fn list_subscriptions(
    form: Form,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    context.require_session()?;
    let limit = recipes_limit(&form).map_err(ApiError::from)?;

    let authors = actions::list_subscriptions(&pool, &context)
        .await?
        .into_iter()
        .map(UserProfile::from)
        .collect();
    let profiles = follow_payloads(&pool, authors, limit).await?;

    Ok(json_reply(&profiles, StatusCode::OK))
}

pub async fn subscribe(
    id: Id,
    form: Form,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    context.require_session()?;
    let limit = recipes_limit(&form).map_err(ApiError::from)?;

    let author = actions::subscribe(&pool, &context, id).await?;
    let profile = follow_profile(&pool, UserProfile::from_user(author, true), limit).await?;

    Ok(json_reply(&profile, StatusCode::CREATED))
}

pub async fn unsubscribe(
    id: Id,
    context: RequestContext,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    actions::unsubscribe(&pool, &context, id).await?;
    Ok(no_content())
}
