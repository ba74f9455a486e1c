use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use degrid_types::{BinaryMask, SubpointLabel};
use thiserror::Error;
use tracing::{debug, info};

use crate::settings::TemplateSource;

/// Gray level above which an opaque template pixel counts as grid.
const OPAQUE_GRID_THRESHOLD: u8 = 127;
const TEMPLATE_PREFIX: &str = "mask.";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read template {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to decode template {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("no grid templates found in {location}")]
    Empty { location: String },
    #[error("template {label} is {found:?} but the first template is {expected:?}")]
    SizeMismatch {
        label: String,
        expected: (u32, u32),
        found: (u32, u32),
    },
}

/// Binary mask of the physical grid for one subpoint.
#[derive(Debug, Clone)]
pub struct GridTemplate {
    pub label: SubpointLabel,
    pub mask: BinaryMask,
    pub path: PathBuf,
}

/// Every grid template, keyed by label. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: Vec<GridTemplate>,
    dimensions: (u32, u32),
}

impl TemplateRegistry {
    pub fn load(source: &TemplateSource) -> Result<Self, RegistryError> {
        let (entries, location) = match source {
            TemplateSource::Dir(dir) => (scan_template_dir(dir)?, dir.display().to_string()),
            TemplateSource::Table(table) => (table.clone(), "the template table".to_string()),
        };
        let mut templates = Vec::with_capacity(entries.len());
        for (label, path) in entries {
            let mask = load_mask(&path)?;
            debug!(label = %label, path = %path.display(), pixels = mask.count(), "loaded template");
            templates.push(GridTemplate {
                label: SubpointLabel::new(label),
                mask,
                path,
            });
        }
        let registry = Self::from_templates(templates).map_err(|err| match err {
            RegistryError::Empty { .. } => RegistryError::Empty { location },
            other => other,
        })?;
        info!(count = registry.len(), "grid templates loaded");
        Ok(registry)
    }

    /// Build from already decoded templates, kept in the given order.
    pub fn from_templates(templates: Vec<GridTemplate>) -> Result<Self, RegistryError> {
        let Some(first) = templates.first() else {
            return Err(RegistryError::Empty {
                location: "the provided set".into(),
            });
        };
        let dimensions = first.mask.dimensions();
        if let Some(odd) = templates
            .iter()
            .find(|template| template.mask.dimensions() != dimensions)
        {
            return Err(RegistryError::SizeMismatch {
                label: odd.label.to_string(),
                expected: dimensions,
                found: odd.mask.dimensions(),
            });
        }
        Ok(Self {
            templates,
            dimensions,
        })
    }

    pub fn get(&self, label: &str) -> Option<&GridTemplate> {
        self.templates
            .iter()
            .find(|template| template.label.as_str() == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GridTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Size shared by every template; frames are resized to it.
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }
}

fn scan_template_dir(dir: &Path) -> Result<BTreeMap<String, PathBuf>, RegistryError> {
    let entries = fs::read_dir(dir).map_err(|source| RegistryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut found = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|source| RegistryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let Some(label) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(template_label)
        else {
            continue;
        };
        found.insert(label.to_string(), path);
    }
    Ok(found)
}

/// `mask.5N.png` -> `5N`; labels may contain dots (`mask.75.0W.png`).
fn template_label(file_name: &str) -> Option<&str> {
    let rest = file_name.strip_prefix(TEMPLATE_PREFIX)?;
    let (label, ext) = rest.rsplit_once('.')?;
    (ext.eq_ignore_ascii_case("png") && !label.is_empty()).then_some(label)
}

fn load_mask(path: &Path) -> Result<BinaryMask, RegistryError> {
    if !path.exists() {
        return Err(RegistryError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "template file does not exist"),
        });
    }
    let decoded = image::open(path).map_err(|source| RegistryError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    if decoded.color().has_alpha() {
        Ok(BinaryMask::from_alpha(&decoded.to_rgba8()))
    } else {
        Ok(BinaryMask::from_luma_threshold(
            &decoded.to_luma8(),
            OPAQUE_GRID_THRESHOLD,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn label_comes_from_file_name() {
        assert_eq!(template_label("mask.5N.png"), Some("5N"));
        assert_eq!(template_label("mask.5N75.0W.PNG"), Some("5N75.0W"));
        assert_eq!(template_label("mask..png"), None);
        assert_eq!(template_label("grid.5N.png"), None);
        assert_eq!(template_label("mask.5N.json"), None);
    }

    #[test]
    fn loads_alpha_and_gray_templates() {
        let dir = tempfile::tempdir().unwrap();
        let mut rgba = RgbaImage::new(8, 8);
        rgba.put_pixel(2, 3, Rgba([0, 0, 0, 1]));
        rgba.save(dir.path().join("mask.5N.png")).unwrap();
        let mut gray = GrayImage::new(8, 8);
        gray.put_pixel(4, 4, Luma([200]));
        gray.put_pixel(5, 5, Luma([127]));
        gray.save(dir.path().join("mask.0N.png")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry =
            TemplateRegistry::load(&TemplateSource::Dir(dir.path().to_path_buf())).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.dimensions(), (8, 8));
        let north = registry.get("5N").unwrap();
        assert!(north.mask.get(2, 3));
        assert_eq!(north.mask.count(), 1);
        let equator = registry.get("0N").unwrap();
        assert!(equator.mask.get(4, 4));
        assert!(!equator.mask.get(5, 5));
        assert!(registry.get("5S").is_none());
    }

    #[test]
    fn empty_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = TemplateRegistry::load(&TemplateSource::Dir(dir.path().to_path_buf()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Empty { .. }));
    }

    #[test]
    fn mixed_sizes_are_rejected() {
        let template = |label: &str, size: u32| GridTemplate {
            label: SubpointLabel::new(label),
            mask: BinaryMask::new(size, size),
            path: PathBuf::new(),
        };
        let err = TemplateRegistry::from_templates(vec![template("5N", 4), template("0N", 5)])
            .unwrap_err();
        assert!(matches!(err, RegistryError::SizeMismatch { label, .. } if label == "0N"));
    }
}
