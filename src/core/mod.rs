pub mod key;
pub mod models;
pub mod types;
pub mod validation;
