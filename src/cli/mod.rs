pub mod args;
pub mod groups;
pub mod handlers;
