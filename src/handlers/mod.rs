// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod contest;
pub mod participation;
pub mod stats;
pub mod submission;
pub mod violation;
