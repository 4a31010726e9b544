pub const MAX_RECIPE_NAME_LENGTH: usize = 200;
pub const MAX_USER_FIELD_LENGTH: usize = 150;
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Upper bound of amounts and cooking times (a small positive integer).
pub const MAX_SMALL_POSITIVE: i64 = 32767;

pub const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

pub const SESSION_COOKIE: &str = "session";
pub const SHOPPING_LIST_SUFFIX: &str = "_shopping_list.txt";
pub const SHOPPING_LIST_HEADER: &str = "Shopping list for:";

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8000";
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
