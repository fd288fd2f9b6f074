// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod education;
pub mod evaluation;
pub mod notifications;
pub mod questions;
pub mod reports;
pub mod students;
