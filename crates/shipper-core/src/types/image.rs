//! Container image instructions (`name=image`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// "The container named `name` must run image `image`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerImage {
    pub name: String,
    pub image: String,
}

impl ContainerImage {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
        }
    }
}

impl fmt::Display for ContainerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.image)
    }
}

/// A `name=image` pair that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid container image {input:?}: {reason}")]
pub struct InvalidContainerImage {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for ContainerImage {
    type Err = InvalidContainerImage;

    /// Splits on the first `=`, so image references may themselves
    /// contain `=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| InvalidContainerImage {
            input: s.to_string(),
            reason,
        };

        let (name, image) = s.split_once('=').ok_or_else(|| invalid("expected name=image"))?;
        let (name, image) = (name.trim(), image.trim());
        if name.is_empty() {
            return Err(invalid("container name is empty"));
        }
        if image.is_empty() {
            return Err(invalid("image reference is empty"));
        }

        Ok(Self::new(name, image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_image() {
        let parsed: ContainerImage = "web=registry.local/web:v2".parse().unwrap();
        assert_eq!(parsed, ContainerImage::new("web", "registry.local/web:v2"));
    }

    #[test]
    fn splits_on_first_equals_only() {
        let parsed: ContainerImage = "web=img:v2=extra".parse().unwrap();
        assert_eq!(parsed.image, "img:v2=extra");
    }

    #[test]
    fn rejects_missing_separator() {
        let err = "web".parse::<ContainerImage>().unwrap_err();
        assert_eq!(err.reason, "expected name=image");
    }

    #[test]
    fn rejects_empty_halves() {
        assert!("=img:v1".parse::<ContainerImage>().is_err());
        assert!("web=".parse::<ContainerImage>().is_err());
        assert!(" = ".parse::<ContainerImage>().is_err());
    }

    #[test]
    fn display_matches_flag_syntax() {
        assert_eq!(ContainerImage::new("web", "img:v1").to_string(), "web=img:v1");
    }
}
