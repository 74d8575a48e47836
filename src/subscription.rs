pub mod controllers;
pub mod query;
pub mod repository;
