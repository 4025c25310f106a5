pub mod comment;
pub mod item;
pub mod token_entry;
