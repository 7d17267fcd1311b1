//! Rendering configuration.
//!
//! Configuration is read from YAML. Every key is optional; anything absent
//! keeps its default, and an empty file yields the default configuration.
//!
//! ```yaml
//! resolution: package
//! showMultipleReferences: true
//! palette:
//!   base:
//!     packageName: "#000"
//!     importArrow: rgb(40, 40, 40)
//!   cycle:
//!     importArrow: "#ff0000"
//! goos: linux
//! buildTags: [integration]
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::analysis::{default_workers, BuildContext, PipelineOptions, DEFAULT_QUEUE_CAPACITY};
use crate::export::Resolution;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid resolution '{0}', must be one of ['file', 'package']")]
    InvalidResolution(String),

    #[error("Invalid color '{0}'")]
    InvalidColor(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// An RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const CYAN: Color = Color::rgb(0, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// `#rrggbb`, alpha dropped.
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    fn parse_hex(digits: &str) -> Option<Self> {
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match digits.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (slot, idx) in rgb.iter_mut().zip(0..3) {
                    let v = channel(&digits[idx..idx + 1])?;
                    *slot = v * 17;
                }
                Some(Color::rgb(rgb[0], rgb[1], rgb[2]))
            }
            6 => Some(Color::rgb(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            _ => None,
        }
    }

    fn parse_functional(s: &str) -> Option<Self> {
        let (args, with_alpha) = if let Some(rest) = s.strip_prefix("rgba(") {
            (rest.strip_suffix(')')?, true)
        } else {
            (s.strip_prefix("rgb(")?.strip_suffix(')')?, false)
        };

        let parts: Vec<&str> = args.split(',').map(str::trim).collect();
        let expected = if with_alpha { 4 } else { 3 };
        if parts.len() != expected {
            return None;
        }
        let r = parts[0].parse().ok()?;
        let g = parts[1].parse().ok()?;
        let b = parts[2].parse().ok()?;
        let a = if with_alpha {
            let alpha: f64 = parts[3].parse().ok()?;
            if !(0.0..=1.0).contains(&alpha) {
                return None;
            }
            (alpha * 255.0).round() as u8
        } else {
            255
        };
        Some(Color { r, g, b, a })
    }
}

impl FromStr for Color {
    type Err = ConfigError;

    /// Accepts `#rgb`, `#rrggbb`, `rgb(r, g, b)`, and `rgba(r, g, b, a)` with
    /// alpha in `[0, 1]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_lowercase();
        let parsed = match trimmed.strip_prefix('#') {
            Some(digits) => Color::parse_hex(digits),
            None => Color::parse_functional(&trimmed),
        };
        parsed.ok_or_else(|| ConfigError::InvalidColor(s.to_string()))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

/// Colors for one rendering state (normal or in-cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub package_name: Color,
    pub package_background: Color,
    pub file_name: Color,
    pub file_background: Color,
    pub import_arrow: Color,
}

impl Theme {
    fn uniform(text: Color, background: Color) -> Self {
        Self {
            package_name: text,
            package_background: background,
            file_name: text,
            file_background: background,
            import_arrow: text,
        }
    }
}

/// Base colors plus the colors that highlight import cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub base: Theme,
    pub cycle: Theme,
}

impl Default for Palette {
    /// Black on white, cycles in red.
    fn default() -> Self {
        Self {
            base: Theme::uniform(Color::BLACK, Color::WHITE),
            cycle: Theme::uniform(Color::RED, Color::WHITE),
        }
    }
}

impl Palette {
    /// White on black, cycles in cyan.
    pub fn inverted() -> Self {
        Self {
            base: Theme::uniform(Color::WHITE, Color::BLACK),
            cycle: Theme::uniform(Color::CYAN, Color::BLACK),
        }
    }

    /// Picks the theme for an entity's cycle state.
    pub fn theme(&self, in_cycle: bool) -> &Theme {
        if in_cycle {
            &self.cycle
        } else {
            &self.base
        }
    }
}

/// Full tool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub resolution: Resolution,
    pub palette: Palette,
    pub show_multiple_references: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Target platform and build tags
    pub build: BuildContext,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: Resolution::File,
            palette: Palette::default(),
            show_multiple_references: false,
            workers: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            build: BuildContext::default(),
        }
    }
}

/// On-disk theme: every slot optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawTheme {
    package_name: Option<String>,
    package_background: Option<String>,
    file_name: Option<String>,
    file_background: Option<String>,
    import_arrow: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPalette {
    base: Option<RawTheme>,
    cycle: Option<RawTheme>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawConfig {
    resolution: Option<String>,
    palette: Option<RawPalette>,
    show_multiple_references: Option<bool>,
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    goos: Option<String>,
    goarch: Option<String>,
    build_tags: Option<Vec<String>>,
}

fn apply_color(slot: &mut Color, value: Option<&str>) -> ConfigResult<()> {
    match value {
        Some(value) if !value.is_empty() => {
            *slot = value.parse()?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn apply_theme(theme: &mut Theme, raw: Option<&RawTheme>) -> ConfigResult<()> {
    let Some(raw) = raw else {
        return Ok(());
    };
    apply_color(&mut theme.package_name, raw.package_name.as_deref())?;
    apply_color(&mut theme.package_background, raw.package_background.as_deref())?;
    apply_color(&mut theme.file_name, raw.file_name.as_deref())?;
    apply_color(&mut theme.file_background, raw.file_background.as_deref())?;
    apply_color(&mut theme.import_arrow, raw.import_arrow.as_deref())?;
    Ok(())
}

impl Config {
    /// Parses YAML configuration, layering it over the defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use depscope::config::{Color, Config};
    /// use depscope::export::Resolution;
    ///
    /// let config = Config::from_yaml_str("resolution: package\npalette:\n  cycle:\n    importArrow: '#0f0'\n").unwrap();
    /// assert_eq!(config.resolution, Resolution::Package);
    /// assert_eq!(config.palette.cycle.import_arrow, Color::rgb(0, 255, 0));
    /// ```
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let mut config = Config::default();
        if yaml.trim().is_empty() {
            return Ok(config);
        }
        // a document of only comments deserializes to null
        let raw: Option<RawConfig> = serde_yaml::from_str(yaml)?;
        let Some(raw) = raw else {
            return Ok(config);
        };

        if let Some(resolution) = raw.resolution.filter(|r| !r.is_empty()) {
            config.resolution = resolution
                .parse()
                .map_err(|_| ConfigError::InvalidResolution(resolution))?;
        }
        if let Some(palette) = raw.palette {
            apply_theme(&mut config.palette.base, palette.base.as_ref())?;
            apply_theme(&mut config.palette.cycle, palette.cycle.as_ref())?;
        }
        if let Some(show) = raw.show_multiple_references {
            config.show_multiple_references = show;
        }
        if let Some(workers) = raw.workers {
            config.workers = workers;
        }
        if let Some(capacity) = raw.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(goos) = raw.goos.filter(|v| !v.is_empty()) {
            config.build.goos = goos;
        }
        if let Some(goarch) = raw.goarch.filter(|v| !v.is_empty()) {
            config.build.goarch = goarch;
        }
        if let Some(tags) = raw.build_tags {
            config.build.tags.extend(tags.into_iter().filter(|t| !t.is_empty()));
        }
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Pipeline settings carried by this configuration.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            build: self.build.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_hex_colors() {
        assert_eq!("#ff0000".parse::<Color>().unwrap(), Color::RED);
        assert_eq!("#0FF".parse::<Color>().unwrap(), Color::CYAN);
        assert_eq!("#123456".parse::<Color>().unwrap().hex(), "#123456");
        assert!("#12345".parse::<Color>().is_err());
        assert!("#gggggg".parse::<Color>().is_err());
        assert!("ff0000".parse::<Color>().is_err());
    }

    #[test]
    fn test_parse_functional_colors() {
        assert_eq!("rgb(255, 0, 0)".parse::<Color>().unwrap(), Color::RED);

        let translucent: Color = "rgba(0,0,255,0.5)".parse().unwrap();
        assert_eq!((translucent.b, translucent.a), (255, 128));
        assert_eq!(translucent.hex(), "#0000ff");

        assert!("rgb(256, 0, 0)".parse::<Color>().is_err());
        assert!("rgb(1, 2)".parse::<Color>().is_err());
        assert!("rgba(1, 2, 3, 2.0)".parse::<Color>().is_err());
        assert!("".parse::<Color>().is_err());
    }

    #[test]
    fn test_default_and_inverted_palettes() {
        let palette = Palette::default();
        assert_eq!(palette.base.package_name.hex(), "#000000");
        assert_eq!(palette.base.file_background.hex(), "#ffffff");
        assert_eq!(palette.theme(true).import_arrow.hex(), "#ff0000");

        let inverted = Palette::inverted();
        assert_eq!(inverted.base.file_name, Color::WHITE);
        assert_eq!(inverted.cycle.import_arrow, Color::CYAN);
    }

    #[test]
    fn test_empty_yaml_yields_defaults() {
        assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
        assert_eq!(Config::from_yaml_str("# nothing\n").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_palette_override() {
        let yaml = "palette:\n  base:\n    fileName: rgb(10, 20, 30)\n";
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.palette.base.file_name, Color::rgb(10, 20, 30));
        assert_eq!(config.palette.base.package_name, Color::BLACK);
        assert_eq!(config.palette.cycle, Palette::default().cycle);
        assert_eq!(config.resolution, Resolution::File);
    }

    #[test]
    fn test_pipeline_settings() {
        let yaml = "showMultipleReferences: true\nworkers: 3\nqueueCapacity: 8\n";
        let config = Config::from_yaml_str(yaml).unwrap();
        assert!(config.show_multiple_references);
        assert_eq!(
            config.pipeline_options(),
            PipelineOptions {
                workers: 3,
                queue_capacity: 8,
                build: BuildContext::default(),
            }
        );
    }

    #[test]
    fn test_build_settings() {
        let yaml = "goos: windows\ngoarch: arm64\nbuildTags:\n  - integration\n  - netgo\n";
        let config = Config::from_yaml_str(yaml).unwrap();
        let build = config.pipeline_options().build;
        assert_eq!(build.goos, "windows");
        assert_eq!(build.goarch, "arm64");
        assert!(build.matches_tag("integration"));
        assert!(build.matches_tag("netgo"));
        assert!(!build.matches_tag("linux"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Config::from_yaml_str("resolution: module\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidResolution(ref r) if r == "module"));

        let err = Config::from_yaml_str("palette:\n  cycle:\n    importArrow: purple\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidColor(ref c) if c == "purple"));

        let err = Config::from_yaml_str("colour: red\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_from_yaml_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "resolution: package\n").unwrap();
        let config = Config::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.resolution, Resolution::Package);

        let missing = Config::from_yaml_file(Path::new("/nonexistent/depscope.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
