//! Application service layer - config, detection service, track replay, export

pub mod config;
pub mod detection_service;
pub mod export;
pub mod logging;
pub mod repository;
pub mod track;
