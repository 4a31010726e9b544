use std::{
    collections::HashSet,
    fmt::{self, Display},
    str::FromStr,
};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer};

use crate::{
    constants::{
        MAX_EMAIL_LENGTH, MAX_RECIPE_NAME_LENGTH, MAX_SMALL_POSITIVE, MAX_USER_FIELD_LENGTH,
    },
    error::{ApiError, ConflictError, TypeError},
    schema::Id,
};

/// Query string pairs in request order. Keys may repeat.
#[derive(Debug, Default, Clone)]
pub struct Form {
    inner: Vec<(String, String)>,
}

impl Form {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self { inner: pairs }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.inner
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, TypeError>
    where
        T: FromStr,
    {
        match self.get_str(key) {
            Some(value) if !value.is_empty() => value
                .parse()
                .map(Some)
                .map_err(|_e| TypeError::new(&format!("Invalid number for '{key}'"))),
            _ => Ok(None),
        }
    }

    pub fn get_flag(&self, key: &str) -> Result<bool, TypeError> {
        match self.get_str(key) {
            None | Some("") | Some("0") | Some("false") => Ok(false),
            Some("1") | Some("true") => Ok(true),
            Some(_) => Err(TypeError::new(&format!("Invalid flag for '{key}'"))),
        }
    }
}

/// An integer sent either as a JSON number or as a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LenientInt(pub i64);

impl<'de> Deserialize<'de> for LenientInt {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(i64),
            Str(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Int(value) => Ok(Self(value)),
            Repr::Str(value) => value
                .trim()
                .parse()
                .map(Self)
                .map_err(|_e| serde::de::Error::custom("expected an integer")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormError {
    NoIngredients,
    DuplicateIngredient,
    NonPositiveAmount,
    AmountTooLarge,
    NoTags,
    DuplicateTag,
    NonPositiveCookingTime,
    CookingTimeTooLarge,
    InvalidId(&'static str),
    UnknownIngredient(Id),
    UnknownTag(Id),
    MissingField(&'static str),
    FieldTooLong(&'static str, usize),
    InvalidImage,
    InvalidUsername,
    InvalidEmail,
    SelfFollow,
}

impl Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::NoIngredients => write!(f, "At least one ingredient is required"),
            FormError::DuplicateIngredient => write!(f, "Ingredients must be unique"),
            FormError::NonPositiveAmount => {
                write!(f, "Ingredient amount must be greater than zero")
            }
            FormError::AmountTooLarge => {
                write!(f, "Ingredient amount must not exceed {MAX_SMALL_POSITIVE}")
            }
            FormError::NoTags => write!(f, "At least one tag is required"),
            FormError::DuplicateTag => write!(f, "Tags must not repeat"),
            FormError::NonPositiveCookingTime => write!(f, "Minimum cooking time is 1 minute"),
            FormError::CookingTimeTooLarge => {
                write!(f, "Cooking time must not exceed {MAX_SMALL_POSITIVE} minutes")
            }
            FormError::InvalidId(field) => write!(f, "Invalid id in '{field}'"),
            FormError::UnknownIngredient(id) => write!(f, "Ingredient {id} does not exist"),
            FormError::UnknownTag(id) => write!(f, "Tag {id} does not exist"),
            FormError::MissingField(field) => write!(f, "Field '{field}' is required"),
            FormError::FieldTooLong(field, max) => {
                write!(f, "Field '{field}' must be at most {max} characters")
            }
            FormError::InvalidImage => write!(f, "Image must be a base64 encoded data URI"),
            FormError::InvalidUsername => write!(
                f,
                "Username may only contain letters, digits and @/./+/-/_ characters"
            ),
            FormError::InvalidEmail => write!(f, "Enter a valid email address"),
            FormError::SelfFollow => write!(f, "You cannot subscribe to yourself"),
        }
    }
}

impl std::error::Error for FormError {}

#[derive(Deserialize, Debug, Clone)]
pub struct IngredientAmountForm {
    pub id: LenientInt,
    pub amount: LenientInt,
}

/// Untrusted recipe write payload.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeForm {
    #[serde(default)]
    pub ingredients: Vec<IngredientAmountForm>,
    #[serde(default)]
    pub tags: Vec<LenientInt>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<LenientInt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// A recipe payload that passed every rule and is ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRecipe {
    pub name: String,
    pub text: String,
    /// `None` keeps the stored image on update.
    pub image: Option<String>,
    pub cooking_time: i32,
    pub ingredients: Vec<(Id, i32)>,
    pub tags: Vec<Id>,
}

fn to_id(value: LenientInt, field: &'static str) -> Result<Id, FormError> {
    Id::try_from(value.0)
        .ok()
        .filter(|id| *id > 0)
        .ok_or(FormError::InvalidId(field))
}

fn required_text(
    value: Option<String>,
    field: &'static str,
    max: Option<usize>,
) -> Result<String, FormError> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(FormError::MissingField(field))?;

    match max {
        Some(max) if value.chars().count() > max => Err(FormError::FieldTooLong(field, max)),
        _ => Ok(value),
    }
}

/// Accepts `data:<mime>;base64,<payload>` with a decodable payload.
pub fn validate_image(image: &str) -> Result<(), FormError> {
    let (header, data) = image.split_once(',').ok_or(FormError::InvalidImage)?;
    if !header.starts_with("data:") || !header.ends_with(";base64") {
        return Err(FormError::InvalidImage);
    }

    match STANDARD.decode(data.trim()) {
        Ok(bytes) if !bytes.is_empty() => Ok(()),
        _ => Err(FormError::InvalidImage),
    }
}

impl RecipeForm {
    pub fn validate(self, mode: WriteMode) -> Result<ValidRecipe, FormError> {
        if self.ingredients.is_empty() {
            return Err(FormError::NoIngredients);
        }

        let mut ingredients = Vec::with_capacity(self.ingredients.len());
        let mut seen = HashSet::new();
        for ingredient in self.ingredients.iter() {
            let id = to_id(ingredient.id, "ingredients")?;
            if !seen.insert(id) {
                return Err(FormError::DuplicateIngredient);
            }
            ingredients.push((id, ingredient.amount.0));
        }

        if ingredients.iter().any(|(_, amount)| *amount <= 0) {
            return Err(FormError::NonPositiveAmount);
        }
        if ingredients
            .iter()
            .any(|(_, amount)| *amount > MAX_SMALL_POSITIVE)
        {
            return Err(FormError::AmountTooLarge);
        }

        if self.tags.is_empty() {
            return Err(FormError::NoTags);
        }

        let mut tags = Vec::with_capacity(self.tags.len());
        let mut seen = HashSet::new();
        for tag in self.tags.iter() {
            let id = to_id(*tag, "tags")?;
            if !seen.insert(id) {
                return Err(FormError::DuplicateTag);
            }
            tags.push(id);
        }

        let cooking_time = self
            .cooking_time
            .ok_or(FormError::MissingField("cooking_time"))?
            .0;
        if cooking_time <= 0 {
            return Err(FormError::NonPositiveCookingTime);
        }
        if cooking_time > MAX_SMALL_POSITIVE {
            return Err(FormError::CookingTimeTooLarge);
        }

        let name = required_text(self.name, "name", Some(MAX_RECIPE_NAME_LENGTH))?;
        let text = required_text(self.text, "text", None)?;

        let image = match (self.image, mode) {
            (Some(image), _) => {
                validate_image(&image)?;
                Some(image)
            }
            (None, WriteMode::Create) => return Err(FormError::MissingField("image")),
            (None, WriteMode::Update) => None,
        };

        // Bounds were checked above.
        let ingredients = ingredients
            .into_iter()
            .map(|(id, amount)| (id, amount as i32))
            .collect();

        Ok(ValidRecipe {
            name,
            text,
            image,
            cooking_time: cooking_time as i32,
            ingredients,
            tags,
        })
    }
}

/// Untrusted sign-up payload.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl UserForm {
    pub fn validate(self) -> Result<NewUser, FormError> {
        let username = required_text(self.username, "username", Some(MAX_USER_FIELD_LENGTH))?;
        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
        {
            return Err(FormError::InvalidUsername);
        }

        let email = required_text(self.email, "email", Some(MAX_EMAIL_LENGTH))?;
        match email.split_once('@') {
            Some((local, domain))
                if !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !domain.contains('@')
                    && !email.contains(char::is_whitespace) => {}
            _ => return Err(FormError::InvalidEmail),
        }

        let first_name =
            required_text(self.first_name, "first_name", Some(MAX_USER_FIELD_LENGTH))?;
        let last_name = required_text(self.last_name, "last_name", Some(MAX_USER_FIELD_LENGTH))?;

        Ok(NewUser {
            username,
            email: email.to_lowercase(),
            first_name,
            last_name,
        })
    }
}

/// Rules for creating a follow edge, checked in order.
pub fn validate_follow(already_following: bool, follower: Id, author: Id) -> Result<(), ApiError> {
    if already_following {
        return Err(ConflictError::AlreadyFollowing.into());
    }
    if follower == author {
        return Err(FormError::SelfFollow.into());
    }
    Ok(())
}

/// Filters accepted by the recipe list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl TryFrom<&Form> for RecipeFilter {
    type Error = TypeError;

    fn try_from(form: &Form) -> Result<Self, Self::Error> {
        Ok(Self {
            author: form.get_number("author")?,
            tags: form
                .get_all("tags")
                .into_iter()
                .map(|tag| tag.to_string())
                .collect(),
            is_favorited: form.get_flag("is_favorited")?,
            is_in_shopping_cart: form.get_flag("is_in_shopping_cart")?,
        })
    }
}

/// Reads the optional `recipes_limit` cap of recipe previews.
pub fn recipes_limit(form: &Form) -> Result<Option<i64>, TypeError> {
    match form.get_number::<i64>("recipes_limit")? {
        Some(limit) if limit < 0 => Err(TypeError::new("'recipes_limit' must not be negative")),
        limit => Ok(limit),
    }
}
