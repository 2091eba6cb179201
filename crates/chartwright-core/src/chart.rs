//! Chart definition, loading and value resolution

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::value::{Mapping, ValueNode};
use crate::values::{MergePolicy, Values};

/// Chart metadata, read from `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// API version of the chart file
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    pub version: Version,

    /// Application version, free form
    #[serde(default, deserialize_with = "deserialize_opt_text")]
    pub app_version: Option<String>,

    /// Description
    #[serde(default)]
    pub description: Option<String>,

    /// Subchart declarations
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

fn default_api_version() -> String {
    "v2".to_string()
}

/// `appVersion: 1.16` is a YAML float; keep it as the text the author wrote
fn deserialize_opt_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let node = ValueNode::deserialize(deserializer)?;
    Ok(match node {
        ValueNode::Null => None,
        other => Some(other.to_text()),
    })
}

impl ChartMetadata {
    /// Create metadata with only the required fields
    pub fn new(name: &str, version: Version) -> Self {
        Self {
            api_version: default_api_version(),
            name: name.to_string(),
            version,
            app_version: None,
            description: None,
            dependencies: Vec::new(),
        }
    }

    /// Set the application version
    pub fn with_app_version(mut self, app_version: &str) -> Self {
        self.app_version = Some(app_version.to_string());
        self
    }

    /// Find the dependency declaration for a subchart
    pub fn dependency_for(&self, chart_name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name == chart_name)
    }

    /// The `.Chart` tree
    pub fn to_node(&self) -> ValueNode {
        let mut map = Mapping::new();
        map.insert("Name".into(), self.name.clone().into());
        map.insert("Version".into(), self.version.to_string().into());
        map.insert("AppVersion".into(), self.app_version.clone().unwrap_or_default().into());
        map.insert("Description".into(), self.description.clone().unwrap_or_default().into());
        map.insert("ApiVersion".into(), self.api_version.clone().into());
        ValueNode::Mapping(map)
    }
}

/// A subchart declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// Name of the subchart (matches its `Chart.yaml` name)
    pub name: String,

    /// Version constraint
    #[serde(default)]
    pub version: Option<String>,

    /// Repository URL
    #[serde(default)]
    pub repository: Option<String>,

    /// Comma-separated value paths; the first one holding a bool decides
    #[serde(default)]
    pub condition: Option<String>,

    /// Alias name (overrides the value scope key)
    #[serde(default)]
    pub alias: Option<String>,
}

impl Dependency {
    /// Get the effective name (alias if set, otherwise name)
    #[inline]
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Evaluate the condition against the parent's merged values
    ///
    /// A condition whose paths are all missing or non-boolean leaves the
    /// subchart enabled.
    pub fn is_enabled(&self, parent_values: &Values) -> bool {
        let Some(condition) = &self.condition else {
            return true;
        };

        condition
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .find_map(|path| parent_values.get(path).and_then(ValueNode::as_bool))
            .unwrap_or(true)
    }
}

/// A template source file of a chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    /// Path relative to the chart root, `/` separated (e.g. `templates/service.yaml`)
    pub path: String,

    /// Template source text
    pub source: String,
}

impl TemplateFile {
    pub fn new(path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Files starting with `_` hold helpers and never produce a document
    pub fn is_partial(&self) -> bool {
        self.file_name().starts_with('_')
    }

    /// `NOTES.txt` renders into release notes, not manifests
    pub fn is_notes(&self) -> bool {
        self.file_name().eq_ignore_ascii_case("NOTES.txt")
    }
}

/// A chart: metadata, default values, templates and nested subcharts
#[derive(Debug, Clone)]
pub struct Chart {
    pub metadata: ChartMetadata,

    /// Defaults from `values.yaml`
    pub values: Values,

    /// Template files, sorted by path
    pub templates: Vec<TemplateFile>,

    /// Subcharts from `charts/`
    pub subcharts: Vec<Chart>,
}

impl Chart {
    /// Create a chart with no values or templates
    pub fn new(metadata: ChartMetadata) -> Self {
        Self {
            metadata,
            values: Values::new(),
            templates: Vec::new(),
            subcharts: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: Values) -> Self {
        self.values = values;
        self
    }

    pub fn with_template(mut self, path: &str, source: &str) -> Self {
        self.templates.push(TemplateFile::new(path, source));
        self
    }

    pub fn with_subchart(mut self, subchart: Chart) -> Self {
        self.subcharts.push(subchart);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Load a chart directory
    ///
    /// Reads `Chart.yaml`, the optional `values.yaml`, every template under
    /// `templates/` and each directory under `charts/` as a subchart.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref();

        if !root.is_dir() {
            return Err(CoreError::ChartNotFound {
                path: root.display().to_string(),
            });
        }

        let chart_file = root.join("Chart.yaml");
        if !chart_file.exists() {
            return Err(CoreError::InvalidChart {
                message: format!("Chart.yaml not found in {}", root.display()),
            });
        }

        let metadata: ChartMetadata = serde_yaml::from_str(&std::fs::read_to_string(&chart_file)?)?;
        if metadata.name.trim().is_empty() {
            return Err(CoreError::InvalidChart {
                message: format!("{}: name must not be empty", chart_file.display()),
            });
        }

        let values_path = root.join("values.yaml");
        let values = if values_path.exists() {
            Values::from_file(&values_path)?
        } else {
            Values::new()
        };

        let templates = load_templates(root)?;
        let subcharts = load_subcharts(root)?;

        tracing::debug!(
            chart = %metadata.name,
            templates = templates.len(),
            subcharts = subcharts.len(),
            "loaded chart"
        );

        Ok(Self {
            metadata,
            values,
            templates,
            subcharts,
        })
    }

    /// Merge every value layer of the chart tree
    ///
    /// Dependency conditions are settled first, against the chart's own
    /// `global` and the overrides. `global` is then unioned over the enabled
    /// charts only (subchart defaults, then parent defaults, then the
    /// overrides) and installed into every chart. Each chart merges its own
    /// defaults with what its parent passes down under its scope name.
    pub fn resolve(&self, overrides: &Values, policy: MergePolicy) -> Result<ResolvedChart<'_>> {
        let defaults = self.values.without_global();
        let user = overrides.without_global();
        let layers = [&defaults, &user];

        let mut seed = self.values.global_layer();
        seed.merge(&overrides.global_layer(), policy)?;
        let seed = seed.global().cloned().unwrap_or_else(ValueNode::mapping);
        let selected = self.select(self.name(), &layers, &seed, policy)?;

        let mut globals = selected.collect_globals(policy)?;
        globals.merge(&overrides.global_layer(), policy)?;
        let global = globals.global().cloned().unwrap_or_else(ValueNode::mapping);

        selected.resolve(self.name().to_string(), &layers, &global, policy)
    }

    /// Walk the tree and keep the subcharts whose conditions hold
    fn select<'c>(
        &'c self,
        name: &'c str,
        layers: &[&Values],
        global: &ValueNode,
        policy: MergePolicy,
    ) -> Result<Selected<'c>> {
        let mut values = Values::merge_layers(layers.iter().copied(), policy)?;
        values.set_global(global.clone());

        let mut subcharts = Vec::with_capacity(self.subcharts.len());
        for sub in &self.subcharts {
            let dependency = self.metadata.dependency_for(sub.name());
            let scope_name = dependency
                .map(Dependency::effective_name)
                .unwrap_or_else(|| sub.name());

            if dependency.is_some_and(|d| !d.is_enabled(&values)) {
                tracing::warn!(parent = %name, subchart = %scope_name, "skipping subchart disabled by condition");
                continue;
            }

            let defaults = sub.values.without_global();
            let scoped = values.scope_for_subchart(scope_name);
            subcharts.push(sub.select(scope_name, &[&defaults, &scoped], global, policy)?);
        }

        Ok(Selected {
            chart: self,
            name,
            subcharts,
        })
    }
}

/// A chart taking part in a render, with its enabled subcharts
struct Selected<'c> {
    chart: &'c Chart,
    name: &'c str,
    subcharts: Vec<Selected<'c>>,
}

impl<'c> Selected<'c> {
    fn collect_globals(&self, policy: MergePolicy) -> Result<Values> {
        let mut layers = self
            .subcharts
            .iter()
            .map(|sub| sub.collect_globals(policy))
            .collect::<Result<Vec<_>>>()?;
        layers.push(self.chart.values.global_layer());
        Values::merge_layers(layers.iter(), policy)
    }

    fn resolve(
        &self,
        path: String,
        layers: &[&Values],
        global: &ValueNode,
        policy: MergePolicy,
    ) -> Result<ResolvedChart<'c>> {
        let mut values = Values::merge_layers(layers.iter().copied(), policy)?;
        values.set_global(global.clone());

        let subcharts = self
            .subcharts
            .iter()
            .map(|sub| {
                let defaults = sub.chart.values.without_global();
                let scoped = values.scope_for_subchart(sub.name);
                let sub_path = format!("{}/charts/{}", path, sub.chart.name());
                sub.resolve(sub_path, &[&defaults, &scoped], global, policy)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedChart {
            chart: self.chart,
            name: self.name.to_string(),
            path,
            values,
            subcharts,
        })
    }
}

/// A chart paired with its final merged values
///
/// Only enabled subcharts are present. Nothing here changes after resolution.
#[derive(Debug)]
pub struct ResolvedChart<'c> {
    pub chart: &'c Chart,

    /// Scope name (alias if set)
    pub name: String,

    /// Output path prefix, e.g. `app/charts/redis`
    pub path: String,

    /// Merged values, including the shared `global`
    pub values: Values,

    pub subcharts: Vec<ResolvedChart<'c>>,
}

impl ResolvedChart<'_> {
    /// Find a resolved subchart by scope name
    pub fn subchart(&self, name: &str) -> Option<&Self> {
        self.subcharts.iter().find(|s| s.name == name)
    }
}

fn load_templates(root: &Path) -> Result<Vec<TemplateFile>> {
    let templates_dir = root.join("templates");
    let mut files = Vec::new();

    if !templates_dir.is_dir() {
        return Ok(files);
    }

    for entry in walkdir::WalkDir::new(&templates_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !is_template_extension(path) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(TemplateFile::new(id, std::fs::read_to_string(path)?));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn is_template_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| matches!(ext.as_str(), "yaml" | "yml" | "tpl" | "txt" | "json"))
}

fn load_subcharts(root: &Path) -> Result<Vec<Chart>> {
    let charts_dir = root.join("charts");
    if !charts_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(&charts_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            if p.is_dir() {
                true
            } else {
                tracing::debug!(path = %p.display(), "skipping non-directory entry in charts/");
                false
            }
        })
        .collect();
    dirs.sort();

    dirs.iter().map(Chart::load).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> ChartMetadata {
        ChartMetadata::new(name, Version::new(1, 0, 0))
    }

    fn values(yaml: &str) -> Values {
        Values::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_parse_chart_yaml() {
        let metadata: ChartMetadata = serde_yaml::from_str(
            r#"
apiVersion: v2
name: web
version: 1.2.3
appVersion: 1.16
dependencies:
  - name: redis
    version: 17.x
    condition: redis.enabled
    alias: cache
"#,
        )
        .unwrap();

        assert_eq!(metadata.name, "web");
        assert_eq!(metadata.version, Version::new(1, 2, 3));
        assert_eq!(metadata.app_version.as_deref(), Some("1.16"));
        assert_eq!(metadata.dependencies[0].effective_name(), "cache");
    }

    #[test]
    fn test_invalid_version_rejected() {
        let result: std::result::Result<ChartMetadata, _> =
            serde_yaml::from_str("name: web\nversion: not-a-version\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_template_file_kinds() {
        assert!(TemplateFile::new("templates/_helpers.tpl", "").is_partial());
        assert!(!TemplateFile::new("templates/service.yaml", "").is_partial());
        assert!(TemplateFile::new("templates/NOTES.txt", "").is_notes());
    }

    #[test]
    fn test_dependency_condition() {
        let dep = Dependency {
            name: "redis".into(),
            version: None,
            repository: None,
            condition: Some("cache.enabled, redis.enabled".into()),
            alias: None,
        };

        assert!(!dep.is_enabled(&values("redis: {enabled: false}\n")));
        assert!(dep.is_enabled(&values("cache: {enabled: true}\nredis: {enabled: false}\n")));
        assert!(dep.is_enabled(&values("other: 1\n")));
    }

    #[test]
    fn test_resolve_scopes_subchart_values() {
        let redis = Chart::new(meta("redis")).with_values(values("replicas: 1\nport: 6379\n"));
        let chart = Chart::new(meta("app"))
            .with_values(values("redis:\n  replicas: 2\nname: app\n"))
            .with_subchart(redis);

        let overrides = values("redis:\n  replicas: 5\n");
        let resolved = chart.resolve(&overrides, MergePolicy::Strict).unwrap();

        let redis = resolved.subchart("redis").unwrap();
        assert_eq!(redis.path, "app/charts/redis");
        assert_eq!(redis.values.get("replicas").unwrap(), &ValueNode::Int(5));
        assert_eq!(redis.values.get("port").unwrap(), &ValueNode::Int(6379));
        assert!(redis.values.get("name").is_none());
    }

    #[test]
    fn test_resolve_unions_globals_across_tree() {
        let redis = Chart::new(meta("redis"))
            .with_values(values("global:\n  fromSub: sub\n  shared: sub\n"));
        let chart = Chart::new(meta("app"))
            .with_values(values("global:\n  shared: parent\n"))
            .with_subchart(redis);

        let overrides = values("global:\n  registry: example.com\n");
        let resolved = chart.resolve(&overrides, MergePolicy::Strict).unwrap();

        for v in [&resolved.values, &resolved.subchart("redis").unwrap().values] {
            assert_eq!(v.get("global.registry").unwrap(), &ValueNode::from("example.com"));
            assert_eq!(v.get("global.shared").unwrap(), &ValueNode::from("parent"));
            assert_eq!(v.get("global.fromSub").unwrap(), &ValueNode::from("sub"));
        }
    }

    #[test]
    fn test_resolve_skips_disabled_subchart_and_uses_alias() {
        let mut chart = Chart::new(meta("app"))
            .with_values(values("cache:\n  enabled: true\n  size: 3\nmetrics:\n  enabled: false\n"))
            .with_subchart(Chart::new(meta("redis")))
            .with_subchart(Chart::new(meta("prometheus")));
        chart.metadata.dependencies = vec![
            Dependency {
                name: "redis".into(),
                version: None,
                repository: None,
                condition: Some("cache.enabled".into()),
                alias: Some("cache".into()),
            },
            Dependency {
                name: "prometheus".into(),
                version: None,
                repository: None,
                condition: Some("metrics.enabled".into()),
                alias: None,
            },
        ];

        let resolved = chart.resolve(&Values::new(), MergePolicy::Strict).unwrap();
        assert_eq!(resolved.subcharts.len(), 1);
        let cache = resolved.subchart("cache").unwrap();
        assert_eq!(cache.values.get("size").unwrap(), &ValueNode::Int(3));
    }

    fn conditional(name: &str, condition: &str) -> Dependency {
        Dependency {
            name: name.into(),
            version: None,
            repository: None,
            condition: Some(condition.into()),
            alias: None,
        }
    }

    #[test]
    fn test_disabled_subchart_contributes_no_globals() {
        let redis = Chart::new(meta("redis"))
            .with_values(values("global:\n  leaked: from-redis\n  env: [a, b]\n"));
        let mut chart = Chart::new(meta("app"))
            .with_values(values("global:\n  env:\n    name: prod\nredis:\n  enabled: false\n"))
            .with_subchart(redis);
        chart.metadata.dependencies = vec![conditional("redis", "redis.enabled")];

        // `global.env` would conflict if the disabled chart were merged
        let resolved = chart.resolve(&Values::new(), MergePolicy::Strict).unwrap();

        assert!(resolved.subcharts.is_empty());
        assert!(resolved.values.get("global.leaked").is_none());
        assert_eq!(resolved.values.get("global.env.name").unwrap(), &ValueNode::from("prod"));
    }

    #[test]
    fn test_enabled_subchart_still_contributes_globals() {
        let redis = Chart::new(meta("redis")).with_values(values("global:\n  fromRedis: yes-please\n"));
        let mut chart = Chart::new(meta("app"))
            .with_values(values("redis:\n  enabled: false\n"))
            .with_subchart(redis);
        chart.metadata.dependencies = vec![conditional("redis", "redis.enabled")];

        let overrides = values("redis:\n  enabled: true\n");
        let resolved = chart.resolve(&overrides, MergePolicy::Strict).unwrap();

        assert_eq!(resolved.subcharts.len(), 1);
        assert_eq!(resolved.values.get("global.fromRedis").unwrap(), &ValueNode::from("yes-please"));
    }

    #[test]
    fn test_nested_condition_reads_parent_scoped_path() {
        let mut redis = Chart::new(meta("redis"))
            .with_values(values("metrics:\n  enabled: true\n"))
            .with_subchart(Chart::new(meta("exporter")));
        redis.metadata.dependencies = vec![conditional("exporter", "metrics.enabled")];
        let mut chart = Chart::new(meta("app")).with_subchart(redis);
        chart.metadata.dependencies = vec![conditional("redis", "redis.enabled")];

        let resolved = chart.resolve(&Values::new(), MergePolicy::Strict).unwrap();
        let redis = resolved.subchart("redis").unwrap();
        assert_eq!(redis.subchart("exporter").unwrap().path, "app/charts/redis/charts/exporter");

        // The top-level `redis.metrics.enabled` is the same key seen from redis
        let overrides = values("redis:\n  metrics:\n    enabled: false\n");
        let resolved = chart.resolve(&overrides, MergePolicy::Strict).unwrap();
        assert!(resolved.subchart("redis").unwrap().subcharts.is_empty());
    }
}
