pub mod bot_service;
pub mod config_service;
pub mod strategy_registry;
pub mod validation_service;
