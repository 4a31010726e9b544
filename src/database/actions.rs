pub mod follows;
pub mod ingredients;
pub mod recipes;
pub mod selections;
pub mod shopping_list;
pub mod tags;
pub mod users;

pub use follows::*;
pub use ingredients::*;
pub use recipes::*;
pub use selections::*;
pub use shopping_list::*;
pub use tags::*;
pub use users::*;
