pub mod config;
pub mod error;
pub mod layer;
pub mod placeholders;
pub mod store;
pub mod workspace;

pub use config::Config;
pub use error::{DiscoveryError, ErrorKind, PathError, ValidationError};
pub use layer::{deep_merge, dig, EffectiveConfig, Layer, LayerRank, RunMode, TradingMode};
pub use store::LayerStore;
pub use workspace::{BotWorkspace, UserWorkspace};
