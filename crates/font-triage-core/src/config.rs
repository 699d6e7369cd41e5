use crate::error::Result;
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_DB_PATH: &str = "font_triage.db";
pub const DEFAULT_STAGING_DIR: &str = ".font-triage-removed";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reference_root: Option<String>,
    pub candidate_roots: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub font_extensions: Vec<String>,
    pub db_path: String,
    pub staging_dir_name: String,
    #[serde(flatten)]
    pub classify: ClassifyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reference_root: None,
            candidate_roots: Vec::new(),
            ignore_patterns: Vec::new(),
            font_extensions: ["otf", "ttf", "otc", "ttc"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            db_path: DEFAULT_DB_PATH.to_string(),
            staging_dir_name: DEFAULT_STAGING_DIR.to_string(),
            classify: ClassifyConfig::default(),
        }
    }
}

/// Knobs that affect verdicts. Kept separate so a classifier can be built
/// without a full application config.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Glyph count differences smaller than this are noise.
    pub glyph_delta_threshold: i64,
    pub trial_keywords: Vec<String>,
    /// Matched against the file stem, not the full name.
    pub conflict_suffix_pattern: String,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            glyph_delta_threshold: 50,
            trial_keywords: ["trial", "beta", "test", "demo"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            conflict_suffix_pattern: r"~\d{3}$".to_string(),
        }
    }
}

/// Load `FontTriage.toml` from the working directory (optional), overlaid by
/// `FONT_TRIAGE_*` environment variables.
pub fn load_configuration() -> Result<AppConfig> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("FontTriage").required(false))
        .add_source(
            Environment::with_prefix("FONT_TRIAGE")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("candidate_roots")
                .with_list_parse_key("ignore_patterns")
                .with_list_parse_key("font_extensions")
                .with_list_parse_key("trial_keywords"),
        )
        .build()?;
    Ok(builder.try_deserialize::<AppConfig>()?)
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for dir in dirs {
        let dir_path = Path::new(&dir);
        if result.iter().any(|kept| dir_path.starts_with(Path::new(kept))) {
            continue;
        }
        result.retain(|kept| !Path::new(kept).starts_with(dir_path));
        result.push(dir);
    }

    result
}
