//! Evaluation configuration module.
//!
//! Loads the run configuration from a TOML or JSON file, resolves every
//! raster path, and validates the result once. Downstream code only ever sees
//! a fully-populated [`EvalConfig`].
//!
//! ## File Formats
//!
//! The format is chosen by extension: `.json` is JSON, anything else is TOML.
//! Section names are dotted (`INPUT.TEST`). In TOML they are ordinary nested
//! tables; JSON files spell them as literal dotted keys. Both forms are
//! normalized into nested tables before deserialization.
//!
//! ```toml
//! [INPUT.REF]
//! DSMFilename = "ref/dsm.tif"
//! DTMFilename = "ref/dtm.tif"
//! CLSFilename = "ref/cls.tif"
//! NDXFilename = "ref/ndx.tif"
//! MTLFilename = "ref/mtl.tif"
//! CLSMatchValue = [6]
//!
//! [INPUT.TEST]
//! DSMFilename = "test/dsm.tif"
//! DTMFilename = "test/dtm.tif"     # optional, defaults to the reference DTM
//! CLSFilename = "test/cls.tif"
//! MTLFilename = "test/mtl.tif"     # optional, material metrics skipped without it
//! CLSMatchValue = [6]              # [256] = every non-zero class
//!
//! [MATERIALS.REF]
//! MaterialNames = ["Unclassified", "Asphalt", "Concrete"]
//! MaterialIndicesToIgnore = [0]
//!
//! [PLOTS]
//! ShowPlots = false
//! SavePlots = false
//!
//! [OPTIONS]
//! QuantizeHeight = false
//! TerrainZErrorThreshold = 1.0
//!
//! [REGEXEPATH]
//! Align3DPath = "/opt/pubgeo/align3d"
//! MetricsPath = "/opt/core3d/core3dmetrics-engine"
//! ```
//!
//! ## Path Resolution
//!
//! Relative `INPUT.REF` filenames resolve against the reference directory,
//! relative `INPUT.TEST` filenames against the test directory. Both default to
//! the directory holding the config file. Absolute paths are used as-is.
//!
//! Unknown keys are rejected to catch typos early.

use crate::masks::ClassMatch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration file does not exist: {0}")]
    NotFound(PathBuf),
    #[error("\"outputpath\" not a valid folder <{0}>")]
    InvalidOutputDir(PathBuf),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Fully resolved, validated run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    pub test: TestInputs,
    pub reference: RefInputs,
    pub materials: MaterialsConfig,
    pub plots: PlotsConfig,
    pub options: OptionsConfig,
    pub executables: ExecutablesConfig,
}

/// Test model rasters, with paths resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TestInputs {
    pub dsm: PathBuf,
    pub dtm: Option<PathBuf>,
    pub cls: PathBuf,
    pub mtl: Option<PathBuf>,
    pub cls_match: ClassMatch,
}

/// Reference model rasters, with paths resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RefInputs {
    pub dsm: PathBuf,
    pub dtm: PathBuf,
    pub cls: PathBuf,
    pub ndx: PathBuf,
    pub mtl: PathBuf,
    pub cls_match: ClassMatch,
}

/// Material labels for material metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaterialsConfig {
    /// Display name per material label, indexed by label value.
    #[serde(rename = "MaterialNames")]
    pub names: Vec<String>,
    /// Material labels excluded from scoring.
    #[serde(rename = "MaterialIndicesToIgnore")]
    pub indices_to_ignore: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotsConfig {
    #[serde(rename = "ShowPlots")]
    pub show: bool,
    #[serde(rename = "SavePlots")]
    pub save: bool,
}

impl PlotsConfig {
    pub fn enabled(&self) -> bool {
        self.show || self.save
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsConfig {
    /// Snap elevations to a voxel grid matching the horizontal resolution.
    #[serde(rename = "QuantizeHeight")]
    pub quantize_height: bool,
    /// Z error threshold for terrain accuracy metrics.
    #[serde(rename = "TerrainZErrorThreshold")]
    pub terrain_z_threshold: f64,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            quantize_height: false,
            terrain_z_threshold: 1.0,
        }
    }
}

/// External executables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutablesConfig {
    /// The `align3d` registration tool. Absent means identity alignment.
    #[serde(rename = "Align3DPath")]
    pub align3d: Option<PathBuf>,
    /// Metrics engine executable. Absent means `core3dmetrics-engine` on `PATH`.
    #[serde(rename = "MetricsPath")]
    pub metrics: Option<PathBuf>,
}

// =============================================================================
// On-disk layout
// =============================================================================

/// `CLSMatchValue` may be written as a single integer or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MatchValues {
    One(i64),
    Many(Vec<i64>),
}

impl MatchValues {
    fn to_class_match(&self, section: &str) -> Result<ClassMatch, ConfigError> {
        let values = match self {
            Self::One(v) => std::slice::from_ref(v),
            Self::Many(vs) => vs.as_slice(),
        };
        ClassMatch::from_values(values).map_err(|e| ConfigError::Validation(format!("{section}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(rename = "INPUT")]
    input: InputSections,
    #[serde(rename = "MATERIALS", default)]
    materials: MaterialsSections,
    #[serde(rename = "PLOTS", default)]
    plots: PlotsConfig,
    #[serde(rename = "OPTIONS", default)]
    options: OptionsConfig,
    #[serde(rename = "REGEXEPATH", default)]
    executables: ExecutablesConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InputSections {
    #[serde(rename = "TEST")]
    test: TestSection,
    #[serde(rename = "REF")]
    reference: RefSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MaterialsSections {
    #[serde(rename = "REF")]
    reference: MaterialsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestSection {
    #[serde(rename = "DSMFilename")]
    dsm: String,
    #[serde(rename = "DTMFilename", default)]
    dtm: Option<String>,
    #[serde(rename = "CLSFilename")]
    cls: String,
    #[serde(rename = "MTLFilename", default)]
    mtl: Option<String>,
    #[serde(rename = "CLSMatchValue")]
    cls_match: MatchValues,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RefSection {
    #[serde(rename = "DSMFilename")]
    dsm: String,
    #[serde(rename = "DTMFilename")]
    dtm: String,
    #[serde(rename = "CLSFilename")]
    cls: String,
    #[serde(rename = "NDXFilename")]
    ndx: String,
    #[serde(rename = "MTLFilename")]
    mtl: String,
    #[serde(rename = "CLSMatchValue")]
    cls_match: MatchValues,
}

// =============================================================================
// Loading, normalization, and validation
// =============================================================================

/// Load a config file as a raw value, TOML or JSON by extension.
pub fn load_raw_config(path: &Path) -> Result<Value, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(&content)?)
    } else {
        let value: toml::Value = toml::from_str(&content)?;
        Ok(serde_json::to_value(value)?)
    }
}

/// Split dotted top-level keys (`"INPUT.TEST"`) into nested tables.
///
/// Already-nested tables are merged key by key, so a file may mix both forms.
pub fn nest_dotted_sections(raw: Value) -> Value {
    let Value::Object(top) = raw else {
        return raw;
    };
    let mut nested = Map::new();
    for (key, value) in top {
        match key.split_once('.') {
            Some((outer, inner)) => {
                let slot = nested
                    .entry(outer.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(table) = slot {
                    table.insert(inner.to_string(), value);
                }
            }
            None => match (nested.get_mut(&key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    existing.extend(incoming);
                }
                (_, value) => {
                    nested.insert(key, value);
                }
            },
        }
    }
    Value::Object(nested)
}

/// Normalize, deserialize, resolve paths and validate a raw config value.
pub fn resolve_config(
    raw: Value,
    ref_dir: &Path,
    test_dir: &Path,
) -> Result<EvalConfig, ConfigError> {
    let file: FileConfig = serde_json::from_value(nest_dotted_sections(raw))?;

    let test = &file.input.test;
    let reference = &file.input.reference;
    let config = EvalConfig {
        test: TestInputs {
            dsm: resolve_path(test_dir, &test.dsm),
            dtm: optional_name(&test.dtm).map(|p| resolve_path(test_dir, p)),
            cls: resolve_path(test_dir, &test.cls),
            mtl: optional_name(&test.mtl).map(|p| resolve_path(test_dir, p)),
            cls_match: test.cls_match.to_class_match("INPUT.TEST")?,
        },
        reference: RefInputs {
            dsm: resolve_path(ref_dir, &reference.dsm),
            dtm: resolve_path(ref_dir, &reference.dtm),
            cls: resolve_path(ref_dir, &reference.cls),
            ndx: resolve_path(ref_dir, &reference.ndx),
            mtl: resolve_path(ref_dir, &reference.mtl),
            cls_match: reference.cls_match.to_class_match("INPUT.REF")?,
        },
        materials: file.materials.reference,
        plots: file.plots,
        options: file.options,
        executables: file.executables,
    };
    config.validate()?;
    Ok(config)
}

/// Parse and resolve a configuration file.
///
/// `ref_dir`/`test_dir` default to the config file's directory.
pub fn parse_config(
    path: &Path,
    ref_dir: Option<&Path>,
    test_dir: Option<&Path>,
) -> Result<EvalConfig, ConfigError> {
    let raw = load_raw_config(path)?;
    let config_dir = path.parent().unwrap_or(Path::new(""));
    resolve_config(
        raw,
        ref_dir.unwrap_or(config_dir),
        test_dir.unwrap_or(config_dir),
    )
}

impl EvalConfig {
    /// Validate option values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.options.terrain_z_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "OPTIONS.TerrainZErrorThreshold must be a positive number, got {threshold}"
            )));
        }
        if self.test.dsm.file_name().is_none() {
            return Err(ConfigError::Validation(
                "INPUT.TEST.DSMFilename must name a file".into(),
            ));
        }
        Ok(())
    }

    /// File name of the test DSM, used to name every output artifact.
    pub fn test_dsm_base_name(&self) -> String {
        self.test
            .dsm
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Fail unless `dir` is an existing, writable directory.
pub fn check_output_dir(dir: &Path) -> Result<(), ConfigError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => Ok(()),
        _ => Err(ConfigError::InvalidOutputDir(dir.to_path_buf())),
    }
}

/// An optional file name; blank counts as absent.
fn optional_name(name: &Option<String>) -> Option<&str> {
    name.as_deref().map(str::trim).filter(|n| !n.is_empty())
}

fn resolve_path(base: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const MINIMAL_TOML: &str = r#"
[INPUT.REF]
DSMFilename = "ref_dsm.tif"
DTMFilename = "ref_dtm.tif"
CLSFilename = "ref_cls.tif"
NDXFilename = "ref_ndx.tif"
MTLFilename = "ref_mtl.tif"
CLSMatchValue = [6]

[INPUT.TEST]
DSMFilename = "test_dsm.tif"
CLSFilename = "test_cls.tif"
CLSMatchValue = [256]
"#;

    fn minimal_json() -> Value {
        json!({
            "INPUT.REF": {
                "DSMFilename": "ref_dsm.tif",
                "DTMFilename": "ref_dtm.tif",
                "CLSFilename": "ref_cls.tif",
                "NDXFilename": "ref_ndx.tif",
                "MTLFilename": "ref_mtl.tif",
                "CLSMatchValue": [6]
            },
            "INPUT.TEST": {
                "DSMFilename": "test_dsm.tif",
                "DTMFilename": "test_dtm.tif",
                "CLSFilename": "test_cls.tif",
                "MTLFilename": "test_mtl.tif",
                "CLSMatchValue": [2, 6]
            },
            "MATERIALS.REF": {
                "MaterialNames": ["Unclassified", "Asphalt"],
                "MaterialIndicesToIgnore": [0]
            },
            "PLOTS": {"ShowPlots": false, "SavePlots": true},
            "OPTIONS": {"QuantizeHeight": true, "TerrainZErrorThreshold": 0.5},
            "REGEXEPATH": {"Align3DPath": "/opt/align3d"}
        })
    }

    // =========================================================================
    // Section normalization
    // =========================================================================

    #[test]
    fn dotted_keys_become_nested_tables() {
        let nested = nest_dotted_sections(json!({
            "INPUT.REF": {"a": 1},
            "INPUT.TEST": {"b": 2},
            "PLOTS": {"ShowPlots": true}
        }));
        assert_eq!(
            nested,
            json!({
                "INPUT": {"REF": {"a": 1}, "TEST": {"b": 2}},
                "PLOTS": {"ShowPlots": true}
            })
        );
    }

    #[test]
    fn dotted_and_nested_forms_merge() {
        let nested = nest_dotted_sections(json!({
            "INPUT": {"REF": {"a": 1}},
            "INPUT.TEST": {"b": 2}
        }));
        assert_eq!(nested["INPUT"]["REF"], json!({"a": 1}));
        assert_eq!(nested["INPUT"]["TEST"], json!({"b": 2}));
    }

    // =========================================================================
    // resolve_config
    // =========================================================================

    #[test]
    fn blank_optional_test_files_are_absent() {
        let mut raw = minimal_json();
        raw["INPUT.TEST"]["DTMFilename"] = json!("");
        raw["INPUT.TEST"]["MTLFilename"] = json!("  ");
        let config = resolve_config(raw, Path::new("/data/ref"), Path::new("/data/test")).unwrap();

        assert_eq!(config.test.dtm, None);
        assert_eq!(config.test.mtl, None);
    }

    #[test]
    fn json_config_resolves_all_sections() {
        let config =
            resolve_config(minimal_json(), Path::new("/data/ref"), Path::new("/data/test")).unwrap();

        assert_eq!(config.reference.dsm, PathBuf::from("/data/ref/ref_dsm.tif"));
        assert_eq!(config.reference.ndx, PathBuf::from("/data/ref/ref_ndx.tif"));
        assert_eq!(config.test.dsm, PathBuf::from("/data/test/test_dsm.tif"));
        assert_eq!(config.test.dtm, Some(PathBuf::from("/data/test/test_dtm.tif")));
        assert_eq!(config.test.mtl, Some(PathBuf::from("/data/test/test_mtl.tif")));
        assert_eq!(config.reference.cls_match, ClassMatch::Values(vec![6]));
        assert_eq!(config.test.cls_match, ClassMatch::Values(vec![2, 6]));
        assert_eq!(config.materials.names, vec!["Unclassified", "Asphalt"]);
        assert_eq!(config.materials.indices_to_ignore, vec![0]);
        assert!(config.plots.enabled());
        assert!(config.options.quantize_height);
        assert_eq!(config.options.terrain_z_threshold, 0.5);
        assert_eq!(config.executables.align3d, Some(PathBuf::from("/opt/align3d")));
        assert_eq!(config.executables.metrics, None);
    }

    #[test]
    fn optional_sections_take_defaults() {
        let raw = serde_json::to_value(toml::from_str::<toml::Value>(MINIMAL_TOML).unwrap()).unwrap();
        let config = resolve_config(raw, Path::new("r"), Path::new("t")).unwrap();

        assert_eq!(config.test.dtm, None);
        assert_eq!(config.test.mtl, None);
        assert_eq!(config.test.cls_match, ClassMatch::AnyLabeled);
        assert_eq!(config.materials, MaterialsConfig::default());
        assert!(!config.plots.enabled());
        assert!(!config.options.quantize_height);
        assert_eq!(config.options.terrain_z_threshold, 1.0);
        assert_eq!(config.executables, ExecutablesConfig::default());
    }

    #[test]
    fn scalar_match_value_is_accepted() {
        let mut raw = minimal_json();
        raw["INPUT.TEST"]["CLSMatchValue"] = json!(6);
        let config = resolve_config(raw, Path::new("r"), Path::new("t")).unwrap();
        assert_eq!(config.test.cls_match, ClassMatch::Values(vec![6]));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let mut raw = minimal_json();
        raw["INPUT.REF"]["DSMFilename"] = json!("/abs/dsm.tif");
        let config = resolve_config(raw, Path::new("/data/ref"), Path::new("t")).unwrap();
        assert_eq!(config.reference.dsm, PathBuf::from("/abs/dsm.tif"));
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let mut raw = minimal_json();
        raw["INPUT.REF"].as_object_mut().unwrap().remove("NDXFilename");
        let err = resolve_config(raw, Path::new("r"), Path::new("t")).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
        assert!(err.to_string().contains("NDXFilename"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut raw = minimal_json();
        raw["OPTIONS"]["QuantiseHeight"] = json!(true);
        let err = resolve_config(raw, Path::new("r"), Path::new("t")).unwrap_err();
        assert!(err.to_string().contains("QuantiseHeight"));
    }

    #[test]
    fn empty_match_values_fail_validation() {
        let mut raw = minimal_json();
        raw["INPUT.REF"]["CLSMatchValue"] = json!([]);
        let err = resolve_config(raw, Path::new("r"), Path::new("t")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("INPUT.REF"));
    }

    #[test]
    fn non_positive_z_threshold_fails_validation() {
        let mut raw = minimal_json();
        raw["OPTIONS"]["TerrainZErrorThreshold"] = json!(0.0);
        let err = resolve_config(raw, Path::new("r"), Path::new("t")).unwrap_err();
        assert!(err.to_string().contains("TerrainZErrorThreshold"));
    }

    #[test]
    fn base_name_is_test_dsm_file_name() {
        let config = resolve_config(minimal_json(), Path::new("r"), Path::new("/x/y")).unwrap();
        assert_eq!(config.test_dsm_base_name(), "test_dsm.tif");
    }

    // =========================================================================
    // parse_config (filesystem)
    // =========================================================================

    #[test]
    fn parse_config_defaults_dirs_to_config_location() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.toml");
        fs::write(&path, MINIMAL_TOML).unwrap();

        let config = parse_config(&path, None, None).unwrap();
        assert_eq!(config.reference.cls, tmp.path().join("ref_cls.tif"));
        assert_eq!(config.test.cls, tmp.path().join("test_cls.tif"));
    }

    #[test]
    fn parse_config_applies_overrides() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.json");
        fs::write(&path, minimal_json().to_string()).unwrap();

        let config =
            parse_config(&path, Some(Path::new("/refs")), Some(Path::new("/tests"))).unwrap();
        assert_eq!(config.reference.dtm, PathBuf::from("/refs/ref_dtm.tif"));
        assert_eq!(config.test.cls, PathBuf::from("/tests/test_cls.tif"));
    }

    #[test]
    fn parse_config_reports_missing_file() {
        let err = parse_config(Path::new("/nonexistent/run.toml"), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn parse_config_reports_toml_syntax_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.toml");
        fs::write(&path, "[INPUT.REF\nDSMFilename = ").unwrap();
        assert!(matches!(
            parse_config(&path, None, None).unwrap_err(),
            ConfigError::Toml(_)
        ));
    }

    // =========================================================================
    // check_output_dir
    // =========================================================================

    #[test]
    fn output_dir_must_exist() {
        let tmp = TempDir::new().unwrap();
        assert!(check_output_dir(tmp.path()).is_ok());
        let err = check_output_dir(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOutputDir(_)));
    }

    #[test]
    fn output_dir_must_be_a_directory() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(check_output_dir(&file).is_err());
    }
}
