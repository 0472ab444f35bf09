//! Persona manifest: the list of units a run works through.
//!
//! ```toml
//! [[persona]]
//! id = "01_kim_junhyuk"
//! name = "Kim Junhyuk"
//! prompt = "Candid portrait photo of ..."
//! motion_prompt = "Gentle subtle movement, natural blinking"
//! image_url = "https://i.example/01.png"   # optional, skips the upload
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Manifest read when none is named on the command line.
pub const DEFAULT_MANIFEST: &str = "personas.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Stable identifier, also the output file stem.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Portrait prompt for the image flow.
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub motion_prompt: Option<String>,
    /// Public image to animate, instead of uploading a local file.
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Persona {
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "persona")]
    pub personas: Vec<Persona>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read manifest {}: {e}", path.display()))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Ids must be unique and usable as a file name.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for persona in &self.personas {
            let id = persona.id.as_str();
            if id.trim().is_empty()
                || id.contains(['/', '\\'])
                || id == "."
                || id == ".."
            {
                return Err(Error::Configuration(format!("invalid persona id {id:?}")));
            }
            if !seen.insert(id) {
                return Err(Error::Configuration(format!("duplicate persona id {id:?}")));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Personas whose id is in `only`, or all of them when `only` is empty.
    /// Unknown ids in `only` are an error.
    pub fn select(&self, only: &[String]) -> Result<Vec<&Persona>> {
        if only.is_empty() {
            return Ok(self.personas.iter().collect());
        }
        if let Some(missing) = only.iter().find(|id| self.get(id).is_none()) {
            return Err(Error::Configuration(format!(
                "persona {missing:?} is not in the manifest"
            )));
        }
        Ok(self
            .personas
            .iter()
            .filter(|p| only.contains(&p.id))
            .collect())
    }
}

/// PNG files in `dir` whose name starts with a digit, sorted by name.
///
/// Returns `(stem, path)` pairs; the stem is used as persona id.
pub fn scan_images(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        let stem = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
        if let Some(stem) = stem
            && is_png
            && stem.starts_with(|c: char| c.is_ascii_digit())
        {
            found.push((stem, path));
        }
    }
    found.sort();
    Ok(found)
}
