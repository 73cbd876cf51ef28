//! Configuration for the chat application.
//!
//! Options come from the command line (parsed with `arrrg`) and, optionally, a YAML file
//! supplying the same fields.  Flags given on the command line win over the file.

use std::path::{Path, PathBuf};

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::ModelVariant;

/// Directory name under the platform data directory.
const DATA_DIR_NAME: &str = "spurify";

/// Command-line arguments for the spurify-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to select at startup.
    #[arrrg(optional, "Model to use: pro, flash, or thinking (default: last used)", "MODEL")]
    pub model: Option<String>,

    /// Where the conversation is saved between runs.
    #[arrrg(optional, "Directory holding the saved conversation", "DIR")]
    pub data_dir: Option<String>,

    /// Where exported archives are written.
    #[arrrg(optional, "Directory for exported code archives (default: .)", "DIR")]
    pub export_dir: Option<String>,

    /// YAML file with defaults for the options above.
    #[arrrg(optional, "YAML configuration file", "FILE")]
    pub config: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Contents of a YAML configuration file.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub model: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub no_color: Option<bool>,
}

impl ConfigFile {
    /// Parse a configuration from YAML text.
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("reading {}", path.display()), err))?;
        Self::parse(&content)
    }
}

/// Resolved chat configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Model requested at startup; `None` keeps the persisted selection.
    pub model: Option<ModelVariant>,

    /// Directory for persisted conversation state.
    pub data_dir: PathBuf,

    /// Directory exported archives are written to.
    pub export_dir: PathBuf,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Resolve `args`, reading the configuration file it names, if any.
    pub fn resolve(args: ChatArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => ConfigFile::load(Path::new(path))?,
            None => ConfigFile::default(),
        };
        Self::merge(args, file)
    }

    /// Combine command-line arguments with file settings.  Arguments take precedence.
    pub fn merge(args: ChatArgs, file: ConfigFile) -> Result<Self> {
        let model = match args.model.or(file.model) {
            Some(name) => Some(name.parse::<ModelVariant>().map_err(|err| {
                Error::validation(err, Some("model".to_string()))
            })?),
            None => None,
        };
        let data_dir = args
            .data_dir
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(default_data_dir);
        let export_dir = args
            .export_dir
            .map(PathBuf::from)
            .or(file.export_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let use_color = !(args.no_color || file.no_color.unwrap_or(false));
        Ok(Self {
            model,
            data_dir,
            export_dir,
            use_color,
        })
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: None,
            data_dir: default_data_dir(),
            export_dir: PathBuf::from("."),
            use_color: true,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::merge(ChatArgs::default(), ConfigFile::default()).unwrap();
        assert_eq!(config, ChatConfig::default());
        assert!(config.data_dir.ends_with("spurify"));
        assert_eq!(config.export_dir, PathBuf::from("."));
        assert!(config.use_color);
        assert!(config.model.is_none());
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            model: Some("flash".to_string()),
            data_dir: Some("/tmp/state".to_string()),
            export_dir: Some("out".to_string()),
            config: None,
            no_color: true,
        };
        let config = ChatConfig::merge(args, ConfigFile::default()).unwrap();
        assert_eq!(config.model, Some(ModelVariant::Flash));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/state"));
        assert_eq!(config.export_dir, PathBuf::from("out"));
        assert!(!config.use_color);
    }

    #[test]
    fn args_override_file() {
        let file = ConfigFile::parse(
            "model: gemini-2.5-flash-thinking\nexport_dir: exports\nno_color: true\n",
        )
        .unwrap();
        let args = ChatArgs {
            model: Some("pro".to_string()),
            ..ChatArgs::default()
        };
        let config = ChatConfig::merge(args, file).unwrap();
        assert_eq!(config.model, Some(ModelVariant::Pro));
        assert_eq!(config.export_dir, PathBuf::from("exports"));
        assert!(!config.use_color);
    }

    #[test]
    fn unknown_model_is_rejected() {
        let args = ChatArgs {
            model: Some("gpt-9".to_string()),
            ..ChatArgs::default()
        };
        let err = ChatConfig::merge(args, ConfigFile::default()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn unknown_file_field_is_rejected() {
        assert!(ConfigFile::parse("temperature: 0.5\n").is_err());
    }

    #[test]
    fn config_file_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spurify.yaml");
        std::fs::write(&path, "data_dir: /var/lib/spurify\n").unwrap();
        let args = ChatArgs {
            config: Some(path.display().to_string()),
            ..ChatArgs::default()
        };
        let config = ChatConfig::resolve(args).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/spurify"));
    }
}
