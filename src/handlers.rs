// src/handlers.rs

pub mod templates;
pub mod zones;
