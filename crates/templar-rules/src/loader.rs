//! Rule catalog loader
//!
//! Load rule specs from strings, files, or directories, then compile them
//! into an executable ruleset. Loading is fail-soft at file granularity and
//! compilation is fail-soft at rule granularity.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::compiler::{compile_catalog, ExcludedRule};
use crate::pattern::RuleSet;
use crate::schema::RuleSpec;

/// Errors that can occur when loading rule catalogs.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid rule: {0}")]
    Validation(String),
}

/// A loaded catalog: the compiled ruleset plus the rules that failed to
/// compile and were excluded.
#[derive(Debug)]
pub struct LoadedCatalog {
    pub rules: RuleSet,
    pub excluded: Vec<ExcludedRule>,
}

/// Parse rule specs from a YAML string: a single rule document or a list.
pub fn specs_from_string(yaml: &str) -> Result<Vec<RuleSpec>, LoadError> {
    // Try a single rule first.
    if let Ok(spec) = serde_yaml::from_str::<RuleSpec>(yaml) {
        spec.validate().map_err(LoadError::Validation)?;
        return Ok(vec![spec]);
    }

    let specs: Vec<RuleSpec> = serde_yaml::from_str(yaml)?;
    for spec in &specs {
        spec.validate().map_err(LoadError::Validation)?;
    }
    Ok(specs)
}

/// Load and compile a catalog from a YAML string.
pub fn load_catalog_from_string(yaml: &str) -> Result<LoadedCatalog, LoadError> {
    let specs = specs_from_string(yaml)?;
    let (rules, excluded) = compile_catalog(&specs);
    Ok(LoadedCatalog { rules, excluded })
}

/// Load and compile a catalog from a single file.
pub fn load_catalog_from_file(path: &Path) -> Result<LoadedCatalog, LoadError> {
    let content = fs::read_to_string(path)?;
    load_catalog_from_string(&content)
}

/// Load every `.yaml`/`.yml` file under a directory (recursively) into one
/// catalog. Files that fail to load are skipped with a warning; rule order
/// follows the sorted file paths, so the compiled arbitration order is
/// reproducible regardless of directory iteration order.
pub fn load_catalog_from_dir(dir: &Path) -> Result<LoadedCatalog, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("directory not found: {}", dir.display()),
        )));
    }

    let mut files = Vec::new();
    collect_rule_files(dir, &mut files)?;
    files.sort();

    let mut specs = Vec::new();
    for path in files {
        match fs::read_to_string(&path).map_err(LoadError::from).and_then(|c| specs_from_string(&c)) {
            Ok(loaded) => specs.extend(loaded),
            Err(e) => {
                eprintln!("warning: failed to load {}: {}", path.display(), e);
            }
        }
    }

    let (rules, excluded) = compile_catalog(&specs);
    Ok(LoadedCatalog { rules, excluded })
}

fn collect_rule_files(dir: &Path, files: &mut Vec<std::path::PathBuf>) -> Result<(), LoadError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_rule_files(&path, files)?;
        } else if let Some(ext) = path.extension() {
            if ext == "yaml" || ext == "yml" {
                files.push(path);
            }
        }
    }
    Ok(())
}

/// Validate a rule string without building a catalog.
pub fn validate_rule_string(yaml: &str) -> Result<(), LoadError> {
    specs_from_string(yaml).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SINGLE_RULE: &str = r#"
name: f_to_g
description: rename f to g
placeholders:
  x: {}
before:
  - node: call
    name: f
    args: [ { bind: x } ]
after: { node: call, name: g, args: [ { bind: x } ] }
"#;

    #[test]
    fn test_load_single_rule() {
        let catalog = load_catalog_from_string(SINGLE_RULE).unwrap();
        assert_eq!(catalog.rules.len(), 1);
        assert!(catalog.excluded.is_empty());
        assert!(catalog.rules.contains("f_to_g"));
    }

    #[test]
    fn test_load_multiple_rules() {
        let yaml = r#"
- name: rule_one
  description: first rule
  before:
    - node: call
      name: one
  after: { node: call, name: uno }

- name: rule_two
  description: second rule
  before:
    - node: call
      name: two
  after: { node: call, name: dos }
"#;
        let catalog = load_catalog_from_string(yaml).unwrap();
        assert_eq!(catalog.rules.len(), 2);
        let infos = catalog.rules.list_rules();
        assert_eq!(infos[0].name, "rule_one");
        assert_eq!(infos[1].name, "rule_two");
    }

    #[test]
    fn test_load_reports_excluded_rules() {
        let yaml = r#"
- name: good
  description: fine
  before:
    - node: call
      name: ok
  after: { node: call, name: fine }

- name: bad
  description: references a ghost placeholder
  before:
    - bind: ghost
  after: { bind: ghost }
"#;
        let catalog = load_catalog_from_string(yaml).unwrap();
        assert_eq!(catalog.rules.len(), 1);
        assert_eq!(catalog.excluded.len(), 1);
        assert_eq!(catalog.excluded[0].name, "bad");
    }

    #[test]
    fn test_validation_error() {
        let yaml = r#"
name: ""
description: missing name
before:
  - node: call
    name: f
after: { node: call, name: g }
"#;
        assert!(load_catalog_from_string(yaml).is_err());
    }

    #[test]
    fn test_load_from_dir_sorted_order() {
        let dir = tempfile::tempdir().unwrap();

        let mut b = fs::File::create(dir.path().join("b.yaml")).unwrap();
        write!(
            b,
            r#"
name: from_b
description: loaded second
before:
  - node: call
    name: bee
after: {{ node: call, name: b2 }}
"#
        )
        .unwrap();

        let mut a = fs::File::create(dir.path().join("a.yml")).unwrap();
        write!(
            a,
            r#"
name: from_a
description: loaded first
before:
  - node: call
    name: ay
after: {{ node: call, name: a2 }}
"#
        )
        .unwrap();

        // A non-rule file is skipped with a warning, not an error.
        fs::write(dir.path().join("broken.yaml"), "not: [valid").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = load_catalog_from_dir(dir.path()).unwrap();
        assert_eq!(catalog.rules.len(), 2);
        // Sorted file order fixes the arbitration index.
        assert_eq!(catalog.rules.rule(0).name, "from_a");
        assert_eq!(catalog.rules.rule(1).name, "from_b");
    }

    #[test]
    fn test_missing_dir() {
        let result = load_catalog_from_dir(Path::new("/no/such/dir"));
        assert!(matches!(result, Err(LoadError::Io(_))));
    }
}
