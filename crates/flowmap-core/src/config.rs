use serde::{Deserialize, Serialize};

use crate::error::{FlowMapError, Result};

/// Integrator selector (spec.md §6 `integration`). The core fully specifies
/// RK4's stage contract; FE and RK45 are enumerated for extensibility, their
/// per-stage math owned by the device kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Integration {
    #[serde(rename = "FE")]
    ForwardEuler,
    #[serde(rename = "RK4")]
    RungeKutta4,
    #[serde(rename = "RK45")]
    RungeKutta45,
}

impl Integration {
    /// Number of integrator stages, S. Sizes the per-(block,stage) bucket
    /// array and the particle scratch layout.
    pub fn num_stages(self) -> usize {
        match self {
            Integration::ForwardEuler => 1,
            Integration::RungeKutta4 => 4,
            // Cash-Karp RK45 as used by the original tool's embedded
            // coefficient table; not exercised by this core's kernels.
            Integration::RungeKutta45 => 6,
        }
    }
}

/// Run configuration, deserialized from the TOML file named on the CLI.
/// Mirrors the key table of spec.md §6 verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub num_of_frames: usize,
    pub time_points: Vec<f64>,

    pub data_file_prefix: String,
    pub data_file_suffix: String,
    pub data_file_indices: Vec<String>,

    pub integration: Integration,
    pub time_step: f64,
    pub time_interval: f64,

    pub block_size: f64,
    pub shared_memory_kilobytes: u32,

    pub bounding_box_min_x: f64,
    pub bounding_box_min_y: f64,
    pub bounding_box_min_z: f64,
    pub bounding_box_max_x: f64,
    pub bounding_box_max_y: f64,
    pub bounding_box_max_z: f64,
    pub bounding_box_x_res: u32,
    pub bounding_box_y_res: u32,
    pub bounding_box_z_res: u32,

    pub epsilon: f64,
    pub epsilon_for_tet_blk_intersection: f64,

    #[serde(default = "default_num_of_banks")]
    pub num_of_banks: u32,

    #[serde(default)]
    pub use_double: bool,
}

fn default_num_of_banks() -> u32 {
    16
}

impl Configuration {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Configuration = toml::from_str(text)
            .map_err(|e| FlowMapError::Configuration(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_of_frames < 2 {
            return Err(FlowMapError::Configuration(
                "numOfFrames must be at least 2 to form an interval".into(),
            ));
        }
        if self.time_points.len() != self.num_of_frames {
            return Err(FlowMapError::Configuration(format!(
                "timePoints has {} entries, expected numOfFrames={}",
                self.time_points.len(),
                self.num_of_frames
            )));
        }
        if !self.time_points.windows(2).all(|w| w[0] < w[1]) {
            return Err(FlowMapError::Configuration(
                "timePoints must be strictly monotonically increasing".into(),
            ));
        }
        if self.data_file_indices.len() != self.num_of_frames {
            return Err(FlowMapError::Configuration(
                "dataFileIndices must have one entry per frame".into(),
            ));
        }
        if self.block_size <= 0.0 {
            return Err(FlowMapError::Configuration(
                "blockSize must be positive".into(),
            ));
        }
        if self.time_step <= 0.0 || self.time_interval <= 0.0 {
            return Err(FlowMapError::Configuration(
                "timeStep and timeInterval must be positive".into(),
            ));
        }
        if self.bounding_box_x_res == 0 || self.bounding_box_y_res == 0 || self.bounding_box_z_res == 0
        {
            return Err(FlowMapError::Configuration(
                "bounding box resolutions must be nonzero".into(),
            ));
        }
        if self.bounding_box_min_x >= self.bounding_box_max_x
            || self.bounding_box_min_y >= self.bounding_box_max_y
            || self.bounding_box_min_z >= self.bounding_box_max_z
        {
            return Err(FlowMapError::Configuration(
                "bounding box min must be strictly less than max on every axis".into(),
            ));
        }
        Ok(())
    }

    pub fn frame_file_name(&self, frame_index: usize) -> String {
        format!(
            "{}{}{}",
            self.data_file_prefix, self.data_file_indices[frame_index], self.data_file_suffix
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Configuration {
        Configuration {
            num_of_frames: 2,
            time_points: vec![0.0, 1.0],
            data_file_prefix: "frame".into(),
            data_file_suffix: ".raw".into(),
            data_file_indices: vec!["000".into(), "001".into()],
            integration: Integration::RungeKutta4,
            time_step: 0.25,
            time_interval: 1.0,
            block_size: 1.0,
            shared_memory_kilobytes: 16,
            bounding_box_min_x: 0.0,
            bounding_box_min_y: 0.0,
            bounding_box_min_z: 0.0,
            bounding_box_max_x: 2.0,
            bounding_box_max_y: 2.0,
            bounding_box_max_z: 2.0,
            bounding_box_x_res: 4,
            bounding_box_y_res: 4,
            bounding_box_z_res: 4,
            epsilon: 1e-6,
            epsilon_for_tet_blk_intersection: 1e-4,
            num_of_banks: 16,
            use_double: true,
        }
    }

    #[test]
    fn rejects_non_monotone_time_points() {
        let mut config = base_config();
        config.time_points = vec![1.0, 0.5];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_frame_count() {
        let mut config = base_config();
        config.time_points = vec![0.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn stage_counts_match_integrators() {
        assert_eq!(Integration::ForwardEuler.num_stages(), 1);
        assert_eq!(Integration::RungeKutta4.num_stages(), 4);
        assert_eq!(Integration::RungeKutta45.num_stages(), 6);
    }
}
