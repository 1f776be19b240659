#[macro_use]
extern crate diesel;

#[macro_use]
extern crate diesel_migrations;

pub mod core;
pub mod db;
pub mod store;
pub mod util;

pub use crate::db::{DbConfig, DbKey, DbStore};
pub use crate::store::{Entity, Error, Listing, MemoryStore, Store};
