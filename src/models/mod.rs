// src/models/mod.rs

pub mod contest;
pub mod participation;
pub mod question;
pub mod stats;
pub mod user;
