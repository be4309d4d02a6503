//! Core data model and persistence for the trailhead quest bot.
//!
//! This crate owns the pieces every other crate builds on: the quest
//! tree loaded once at startup ([`quest_config::QuestConfig`]), the
//! per-user progress record and its SQLite-backed store
//! ([`progress_store::ProgressStore`]), and the daemon configuration
//! file ([`config::TrailheadConfig`]).

pub mod config;
pub mod progress_store;
pub mod quest_config;
pub mod types;
