//! `TutorChat`: terminal chat client for a math tutor backend.

pub mod app;
pub mod chat;
pub mod config;
pub mod gateway;
pub mod ui;
