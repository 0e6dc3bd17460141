pub mod assignments;
pub mod config;
pub mod contacts;
pub mod db;
pub mod enums;
pub mod error;
pub mod geo;
pub mod invites;
pub mod mobilize;
pub mod models;
pub mod schema;
