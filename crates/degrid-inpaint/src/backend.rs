use std::fmt;
use std::str::FromStr;

use crate::{InpaintEngine, InpaintError, NeighborFillEngine};

#[cfg(feature = "engine-telea")]
use crate::TeleaEngine;

pub const DEFAULT_RADIUS: u32 = 7;

/// Inpainting strategies a run can request. Every variant parses on every build; whether it
/// can be constructed depends on the compiled features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    NeighborFill,
    Telea,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    /// Neighborhood radius for engines that sample around each pixel.
    pub radius: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            radius: DEFAULT_RADIUS,
        }
    }
}

impl Configuration {
    pub fn available_backends() -> Vec<Backend> {
        compiled_backends()
    }

    pub fn create_engine(&self) -> Result<Box<dyn InpaintEngine>, InpaintError> {
        match self.backend {
            Backend::NeighborFill => Ok(Box::new(NeighborFillEngine)),
            Backend::Telea => build_telea_engine(self.radius),
        }
    }
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::NeighborFill => "neighbor-fill",
            Backend::Telea => "telea",
        }
    }

    pub fn available() -> Vec<Backend> {
        Configuration::available_backends()
    }

    pub fn is_available(self) -> bool {
        compiled_backends().contains(&self)
    }

    pub fn create_engine(self, radius: u32) -> Result<Box<dyn InpaintEngine>, InpaintError> {
        Configuration {
            backend: self,
            radius,
        }
        .create_engine()
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neighbor-fill" | "neighbor" | "fill" => Ok(Backend::NeighborFill),
            "telea" | "fmm" => Ok(Backend::Telea),
            other => Err(InpaintError::UnknownBackend(other.to_string())),
        }
    }
}

fn compiled_backends() -> Vec<Backend> {
    vec![
        #[cfg(feature = "engine-telea")]
        Backend::Telea,
        Backend::NeighborFill,
    ]
}

fn default_backend() -> Backend {
    compiled_backends()
        .into_iter()
        .next()
        .unwrap_or(Backend::NeighborFill)
}

fn build_telea_engine(radius: u32) -> Result<Box<dyn InpaintEngine>, InpaintError> {
    #[cfg(feature = "engine-telea")]
    {
        return Ok(Box::new(TeleaEngine::new(radius)));
    }
    #[allow(unreachable_code)]
    {
        let _ = radius;
        Err(InpaintError::Unavailable {
            backend: "telea",
            reason: "feature engine-telea disabled".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("telea".parse::<Backend>().unwrap(), Backend::Telea);
        assert_eq!(
            " Neighbor-Fill ".parse::<Backend>().unwrap(),
            Backend::NeighborFill
        );
        assert!(matches!(
            "opencv".parse::<Backend>(),
            Err(InpaintError::UnknownBackend(name)) if name == "opencv"
        ));
    }

    #[test]
    fn display_round_trips() {
        for backend in [Backend::NeighborFill, Backend::Telea] {
            assert_eq!(backend.to_string().parse::<Backend>().unwrap(), backend);
        }
    }

    #[test]
    fn neighbor_fill_is_always_available() {
        assert!(Backend::NeighborFill.is_available());
        let engine = Backend::NeighborFill.create_engine(DEFAULT_RADIUS).unwrap();
        assert_eq!(engine.name(), "neighbor-fill");
    }

    #[cfg(feature = "engine-telea")]
    #[test]
    fn default_configuration_prefers_telea() {
        let engine = Configuration::default().create_engine().unwrap();
        assert_eq!(engine.name(), "telea");
    }

    #[cfg(not(feature = "engine-telea"))]
    #[test]
    fn telea_without_feature_is_unavailable() {
        assert!(matches!(
            Backend::Telea.create_engine(DEFAULT_RADIUS),
            Err(InpaintError::Unavailable { backend: "telea", .. })
        ));
    }
}
