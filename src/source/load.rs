use super::types::{Declaration, DeclarationUnit};
use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Parse one declaration unit, choosing YAML or JSON by file extension.
pub fn load_unit(path: &Path) -> anyhow::Result<DeclarationUnit> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading declaration unit {}", path.display()))?;
    let unit: DeclarationUnit = if is_yaml(path) {
        serde_yaml::from_str(&content)
            .with_context(|| format!("parsing YAML declaration unit {}", path.display()))?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("parsing JSON declaration unit {}", path.display()))?
    };
    debug!(
        file = %unit.file,
        declarations = unit.declarations.len(),
        "Declaration unit loaded"
    );
    Ok(unit)
}

/// Load a single unit file, or every `.json`/`.yaml`/`.yml` file in a directory.
///
/// Directory entries are read in file-name order so node ids come out identical
/// across builds of the same input.
pub fn load_units(path: &Path) -> anyhow::Result<Vec<DeclarationUnit>> {
    if !path.is_dir() {
        return Ok(vec![load_unit(path)?]);
    }
    let mut files: Vec<_> = std::fs::read_dir(path)
        .with_context(|| format!("listing {}", path.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e, "json" | "yaml" | "yml"))
        })
        .collect();
    files.sort();
    let units = files
        .iter()
        .map(|f| load_unit(f))
        .collect::<anyhow::Result<Vec<_>>>()?;
    info!(
        dir = %path.display(),
        units = units.len(),
        "Declaration units loaded"
    );
    Ok(units)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|s| s == "yaml" || s == "yml")
        .unwrap_or(false)
}

/// The "type of symbol" query the compiler needs from the host type system.
pub trait TypeResolver {
    /// Resolve a declared type by name.
    fn resolve(&self, name: &str) -> Option<&Declaration>;
}

/// Name → declaration lookup over a set of units. The first declaration of a
/// name wins; later same-named declarations stay reachable through
/// [`DeclarationIndex::all_named`].
#[derive(Debug, Default, Clone)]
pub struct DeclarationIndex {
    by_name: HashMap<String, Vec<Declaration>>,
}

impl DeclarationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_units(units: &[DeclarationUnit]) -> Self {
        let mut index = Self::new();
        for unit in units {
            for decl in &unit.declarations {
                index.insert(decl.clone());
            }
        }
        index
    }

    pub fn insert(&mut self, decl: Declaration) {
        self.by_name
            .entry(decl.name().to_string())
            .or_default()
            .push(decl);
    }

    /// Replace whatever is registered under `decl.name()` with exactly `decl`.
    pub fn set(&mut self, decl: Declaration) {
        self.by_name.insert(decl.name().to_string(), vec![decl]);
    }

    pub fn all_named(&self, name: &str) -> &[Declaration] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl TypeResolver for DeclarationIndex {
    fn resolve(&self, name: &str) -> Option<&Declaration> {
        self.by_name.get(name).and_then(|v| v.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const UNIT_YAML: &str = r#"
file: src/users.ts
declarations:
  - kind: interface
    name: User
    members:
      - name: id
        type: { kind: primitive, name: number }
      - name: email
        type: { kind: primitive, name: string }
"#;

    #[test]
    fn test_load_unit_yaml() {
        let mut temp = NamedTempFile::with_suffix(".yaml").unwrap();
        temp.write_all(UNIT_YAML.as_bytes()).unwrap();
        let unit = load_unit(temp.path()).unwrap();
        assert_eq!(unit.file, "src/users.ts");
        assert_eq!(unit.declarations.len(), 1);
        assert_eq!(unit.declarations[0].name(), "User");
        assert_eq!(unit.declarations[0].members().len(), 2);
    }

    #[test]
    fn test_load_units_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), UNIT_YAML).unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"file": "src/a.ts", "declarations": []}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let units = load_units(dir.path()).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].file, "src/a.ts");
    }

    #[test]
    fn test_index_first_declaration_wins() {
        let unit: DeclarationUnit = serde_yaml::from_str(UNIT_YAML).unwrap();
        let mut second = unit.clone();
        second.file = "src/other.ts".into();
        let index = DeclarationIndex::from_units(&[unit, second]);
        assert_eq!(index.all_named("User").len(), 2);
        assert!(index.resolve("User").is_some());
        assert!(index.resolve("Missing").is_none());
    }
}
