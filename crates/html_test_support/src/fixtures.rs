//! TOML fixture model for tree-construction golden tests.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct FixtureFile {
    #[serde(default)]
    pub fixture: Vec<Fixture>,
}

#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub name: String,
    pub input: String,
    #[serde(default)]
    pub scripting: bool,
    /// Context element local name for fragment parsing.
    #[serde(default)]
    pub fragment: Option<String>,
    /// Expected snapshot, one node per line (see `dom_snapshot`).
    pub expected: String,
}

impl Fixture {
    pub fn expected_lines(&self) -> Vec<String> {
        self.expected
            .trim_end_matches('\n')
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub fn load_fixture_file(path: &Path) -> FixtureFile {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("read fixture file {}: {err}", path.display()));
    toml::from_str(&text)
        .unwrap_or_else(|err| panic!("parse fixture file {}: {err}", path.display()))
}

/// Load every `.toml` fixture file in a directory, sorted by file name for
/// deterministic test ordering.
pub fn load_fixture_dir(dir: &Path) -> Vec<(String, Fixture)> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap_or_else(|err| panic!("read fixture dir {}: {err}", dir.display()))
        .map(|entry| entry.expect("fixture dir entry").path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();
    let mut fixtures = Vec::new();
    for path in files {
        let file_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("fixture")
            .to_string();
        for fixture in load_fixture_file(&path).fixture {
            fixtures.push((format!("{file_name}::{}", fixture.name), fixture));
        }
    }
    fixtures
}
