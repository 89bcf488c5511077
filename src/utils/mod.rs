// src/utils/mod.rs

pub mod clock;
pub mod code;
pub mod hash;
pub mod jwt;
pub mod notify;
