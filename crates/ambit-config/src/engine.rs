//! Engine configuration file format and operations.

use std::path::Path;
use std::sync::Arc;

use ambit_core::{ContextOptions, Listener, ListenerState, RenderContext, Vec3};
use ambit_spatial::{DistanceModel, PanningModel, SpatializerNode};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation::{self, ValidationResult};

/// Render clock and destination layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Frames rendered per quantum.
    pub quantum_frames: usize,
    /// Channel count of the destination.
    pub destination_channels: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let options = ContextOptions::default();
        Self {
            sample_rate: options.sample_rate,
            quantum_frames: options.quantum_frames,
            destination_channels: options.destination_channels,
        }
    }
}

/// Initial listener pose and Doppler settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Position `[x, y, z]`.
    pub position: [f64; 3],
    /// Facing direction.
    pub forward: [f64; 3],
    /// Up direction.
    pub up: [f64; 3],
    /// Velocity, world units per second.
    pub velocity: [f64; 3],
    /// Scales the Doppler effect; 0 disables it.
    pub doppler_factor: f64,
    /// Speed of sound, world units per second.
    pub speed_of_sound: f64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerState::default().into()
    }
}

impl From<ListenerState> for ListenerConfig {
    fn from(state: ListenerState) -> Self {
        Self {
            position: state.position.into(),
            forward: state.forward.into(),
            up: state.up.into(),
            velocity: state.velocity.into(),
            doppler_factor: state.doppler_factor,
            speed_of_sound: state.speed_of_sound,
        }
    }
}

impl From<ListenerConfig> for ListenerState {
    fn from(config: ListenerConfig) -> Self {
        Self {
            position: Vec3::from(config.position),
            forward: Vec3::from(config.forward),
            up: Vec3::from(config.up),
            velocity: Vec3::from(config.velocity),
            doppler_factor: config.doppler_factor,
            speed_of_sound: config.speed_of_sound,
        }
    }
}

/// Defaults applied to new spatializers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpatializerConfig {
    /// `"hrtf"` or `"equalpower"`.
    pub panning_model: String,
    /// `"linear"`, `"inverse"` or `"exponential"`.
    pub distance_model: String,
    /// Distance at which attenuation starts.
    pub ref_distance: f64,
    /// Distance beyond which attenuation stops.
    pub max_distance: f64,
    /// Attenuation steepness.
    pub rolloff_factor: f64,
    /// Inner cone angle, degrees.
    pub cone_inner_angle: f64,
    /// Outer cone angle, degrees.
    pub cone_outer_angle: f64,
    /// Gain outside the outer cone.
    pub cone_outer_gain: f64,
}

impl Default for SpatializerConfig {
    fn default() -> Self {
        Self {
            panning_model: PanningModel::default().as_str().to_string(),
            distance_model: DistanceModel::default().as_str().to_string(),
            ref_distance: 1.0,
            max_distance: 10000.0,
            rolloff_factor: 1.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
        }
    }
}

impl SpatializerConfig {
    /// Parsed panning model.
    pub fn panning_model(&self) -> ValidationResult<PanningModel> {
        validation::parse_panning_model(&self.panning_model)
    }

    /// Parsed distance model.
    pub fn distance_model(&self) -> ValidationResult<DistanceModel> {
        validation::parse_distance_model(&self.distance_model)
    }

    /// Applies these settings to `node`.
    pub fn apply(&self, node: &SpatializerNode) -> Result<(), ConfigError> {
        validation::validate_spatializer(self)?;
        node.set_panning_model(self.panning_model()?);
        node.set_distance_model(self.distance_model()?);
        node.set_ref_distance(self.ref_distance)?;
        node.set_max_distance(self.max_distance)?;
        node.set_rolloff_factor(self.rolloff_factor)?;
        node.set_cone_inner_angle(self.cone_inner_angle);
        node.set_cone_outer_angle(self.cone_outer_angle);
        node.set_cone_outer_gain(self.cone_outer_gain);
        Ok(())
    }
}

/// Complete engine configuration.
///
/// Every field has a default, so a TOML file only needs the values it
/// changes:
///
/// ```rust
/// use ambit_config::EngineConfig;
///
/// let config = EngineConfig::from_toml(r#"
///     [render]
///     sample_rate = 44100.0
///
///     [spatializer]
///     panning_model = "equalpower"
///     rolloff_factor = 2.0
/// "#).unwrap();
///
/// assert_eq!(config.render.quantum_frames, 128);
/// assert_eq!(config.context_options().sample_rate, 44100.0);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Render clock and destination.
    pub render: RenderConfig,
    /// Initial listener.
    pub listener: ListenerConfig,
    /// Spatializer defaults.
    pub spatializer: SpatializerConfig,
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every section, reporting all problems at once.
    pub fn validate(&self) -> ValidationResult<()> {
        validation::validate_engine(self)
    }

    /// Render context options.
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            sample_rate: self.render.sample_rate,
            quantum_frames: self.render.quantum_frames,
            destination_channels: self.render.destination_channels,
        }
    }

    /// Initial listener state.
    pub fn listener_state(&self) -> ListenerState {
        self.listener.into()
    }

    /// Publishes the configured listener state.
    pub fn apply_listener(&self, listener: &Listener) {
        listener.set_state(self.listener_state());
    }

    /// Validates, then creates a render context with the configured listener.
    pub fn build_context(&self) -> Result<Arc<RenderContext>, ConfigError> {
        self.validate()?;
        let context = RenderContext::new(self.context_options());
        self.apply_listener(context.listener());
        Ok(context)
    }

    /// Creates a spatializer in `context` with the configured defaults.
    pub fn build_spatializer(
        &self,
        context: &Arc<RenderContext>,
    ) -> Result<SpatializerNode, ConfigError> {
        let node = SpatializerNode::with_model(context, self.spatializer.panning_model()?);
        self.spatializer.apply(&node)?;
        Ok(node)
    }
}
