// src/models/mod.rs

pub mod exam;
pub mod group;
pub mod question;
pub mod session;
pub mod student;
pub mod subject;
pub mod user;
