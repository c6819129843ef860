//! Blogstarter - a starter blog with a REST API, server-rendered pages and an
//! admin panel.
//!
//! This library provides the building blocks used by the `blogstarter`
//! server and the `tasks` developer CLI.

pub mod api;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod render;
pub mod services;
pub mod tasks;
