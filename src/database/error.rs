use std::convert::Infallible;
use std::fmt::{self, Display};

use serde_json::json;
use warp::{
    http::StatusCode,
    reject::{Reject, Rejection},
    Reply,
};

use crate::{form::FormError, schema::Selection};

/// The rejected-response type of every operation in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: u16,
    pub info: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.info, self.code)
    }
}

impl std::error::Error for ApiError {}
impl Reject for ApiError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlError {
    InvalidRequest,
    InvalidSession,
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

impl HtmlError {
    pub fn code(&self) -> u16 {
        match self {
            HtmlError::InvalidRequest => 400,
            HtmlError::InvalidSession => 401,
            HtmlError::Unauthorized => 403,
            HtmlError::NotFound => 404,
            HtmlError::MethodNotAllowed => 405,
            HtmlError::InternalServerError => 500,
        }
    }

    pub fn new(self, info: &str) -> ApiError {
        ApiError {
            code: self.code(),
            info: info.to_string(),
        }
    }

    pub fn default(self) -> ApiError {
        let info = match self {
            HtmlError::InvalidRequest => "Invalid request",
            HtmlError::InvalidSession => "Authentication credentials were not provided",
            HtmlError::Unauthorized => "You don't have permission to perform this action",
            HtmlError::NotFound => "Not found",
            HtmlError::MethodNotAllowed => "Method not allowed",
            HtmlError::InternalServerError => "Internal server error",
        };

        self.new(info)
    }
}

/// Storage failures. Constraint violations are client errors, everything
/// else is reported as an internal error.
#[derive(Debug)]
pub struct QueryError {
    kind: HtmlError,
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            kind: HtmlError::InternalServerError,
            info,
        }
    }

    fn rejected(kind: HtmlError, info: &str) -> Self {
        Self {
            kind,
            info: info.to_string(),
        }
    }
}

/// Maps storage constraint names to the reason reported to the caller.
pub fn constraint_message(constraint: &str) -> Option<&'static str> {
    match constraint {
        "already_following" => Some("You are already subscribed to this user"),
        "prevent_self_follow" => Some("You cannot subscribe to yourself"),
        "already_favorite" => Some("Recipe is already in favorites"),
        "already_shopping_cart" => Some("Recipe is already in the shopping cart"),
        "unique_recipe_ingredient" => Some("Ingredients must be unique"),
        "recipe_tags_pkey" => Some("Tags must not repeat"),
        "ingredient_amount_range" => Some("Ingredient amount must be between 1 and 32767"),
        "cooking_time_range" => Some("Cooking time must be between 1 and 32767 minutes"),
        "tag_color_hex" => Some("Tag color must be a hex code such as #E26C2D"),
        "unique_unit_of_measurement" => {
            Some("An ingredient with this name and measurement unit already exists")
        }
        "users_username_key" => Some("A user with that username already exists"),
        "users_email_key" => Some("A user with that email already exists"),
        "tags_name_key" => Some("A tag with that name already exists"),
        "tags_color_key" => Some("A tag with that color already exists"),
        "tags_slug_key" => Some("A tag with that slug already exists"),
        _ => None,
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => {
                let reason = e.constraint().and_then(constraint_message);

                if e.is_unique_violation() {
                    Self::rejected(
                        HtmlError::InvalidRequest,
                        reason.unwrap_or("Entry already exists"),
                    )
                } else if e.is_check_violation() {
                    Self::rejected(
                        HtmlError::InvalidRequest,
                        reason.unwrap_or("Value violates a constraint"),
                    )
                } else if e.is_foreign_key_violation() {
                    Self::rejected(
                        HtmlError::InvalidRequest,
                        reason.unwrap_or("Referenced entry does not exist"),
                    )
                } else {
                    Self::new(format!("{e}"))
                }
            }
            sqlx::Error::RowNotFound => Self::rejected(HtmlError::NotFound, "Not found"),
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(format!("{e}")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(value: QueryError) -> Self {
        if value.kind == HtmlError::InternalServerError {
            log::error!("Query failed: {}", value.info);
        }

        value.kind.new(&value.info)
    }
}

/// Malformed request parameters.
#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}

impl From<TypeError> for ApiError {
    fn from(value: TypeError) -> Self {
        HtmlError::InvalidRequest.new(&value.info)
    }
}

/// Rejections of membership edges and derived views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictError {
    AlreadyFollowing,
    NotFollowing,
    AlreadySelected(Selection),
    NotSelected(Selection),
    EmptyShoppingCart,
}

impl Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictError::AlreadyFollowing => write!(f, "You are already subscribed to this user"),
            ConflictError::NotFollowing => write!(f, "You are not subscribed to this user"),
            ConflictError::AlreadySelected(selection) => {
                write!(f, "Recipe is already in {}", selection.label())
            }
            ConflictError::NotSelected(selection) => {
                write!(f, "Recipe is not in {}", selection.label())
            }
            ConflictError::EmptyShoppingCart => write!(f, "Shopping cart is empty"),
        }
    }
}

impl std::error::Error for ConflictError {}

impl From<ConflictError> for ApiError {
    fn from(value: ConflictError) -> Self {
        HtmlError::InvalidRequest.new(&value.to_string())
    }
}

impl From<FormError> for ApiError {
    fn from(value: FormError) -> Self {
        HtmlError::InvalidRequest.new(&value.to_string())
    }
}

fn error_reply(error: &ApiError) -> warp::reply::Response {
    warp::reply::with_status(
        warp::reply::json(&json!({ "detail": error.info })),
        error.status(),
    )
    .into_response()
}

/// Turns every rejection into a JSON `{"detail": ...}` response.
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    let error = if let Some(error) = err.find::<ApiError>() {
        error.to_owned()
    } else if err.is_not_found() {
        HtmlError::NotFound.default()
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        HtmlError::InvalidRequest.new(&format!("Invalid body: {e}"))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        HtmlError::InvalidRequest.new(&format!("{e}"))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        ApiError {
            code: 413,
            info: String::from("Payload too large"),
        }
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        ApiError {
            code: 411,
            info: String::from("Content length required"),
        }
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        ApiError {
            code: 415,
            info: String::from("Unsupported media type"),
        }
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        HtmlError::MethodNotAllowed.default()
    } else {
        log::error!("Unhandled rejection: {err:?}");
        HtmlError::InternalServerError.default()
    };

    Ok(error_reply(&error))
}
