//! Process wiring for the pod resource recommender

pub mod api;
pub mod config;
