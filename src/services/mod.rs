// src/services/mod.rs

pub mod anti_cheat;
pub mod audit;
pub mod cache;
pub mod notifier;
pub mod recommend;
pub mod security;
