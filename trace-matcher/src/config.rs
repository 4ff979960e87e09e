use config::Config;
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct MotionConfig {
    pub position_noise: f64,
    pub velocity_noise: f64,
    pub position_variance: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub road_width: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfigSection {
    pub greedy_factor: f64,
    pub relaxation_budget: usize,
    pub off_network_distance_cost: f64,
}

/// Batch driver configuration: whatever the user's `--config-file` supplies,
/// merged over [`config.default.toml`](../config.default.toml).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub motion: MotionConfig,
    pub network: NetworkConfig,
    pub search: SearchConfigSection,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<AppConfig, AppError> {
        let default_config =
            config::File::from_str(include_str!("config.default.toml"), config::FileFormat::Toml);
        let mut builder = Config::builder().add_source(default_config);
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }
}
