//! Spec formats, size classes and documentation tiers.
//!
//! Formats and tiers are closed sets. Per-format and per-tier behavior lives
//! in lookup tables on the enums rather than behind trait objects, so adding
//! a format means adding a variant and its table entries.

use serde::{Deserialize, Serialize};

/// Source format of an API definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecFormat {
    OpenApi,
    AsyncApi,
    GraphQl,
    Postman,
    Protobuf,
}

impl SpecFormat {
    pub const ALL: [SpecFormat; 5] = [
        SpecFormat::OpenApi,
        SpecFormat::AsyncApi,
        SpecFormat::GraphQl,
        SpecFormat::Postman,
        SpecFormat::Protobuf,
    ];

    /// Directory / manifest name for this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecFormat::OpenApi => "openapi",
            SpecFormat::AsyncApi => "asyncapi",
            SpecFormat::GraphQl => "graphql",
            SpecFormat::Postman => "postman",
            SpecFormat::Protobuf => "protobuf",
        }
    }

    /// File extension of the verbose and minified artifacts.
    pub fn extension(&self) -> &'static str {
        match self {
            SpecFormat::OpenApi | SpecFormat::AsyncApi => ".yaml",
            SpecFormat::GraphQl => ".graphql",
            SpecFormat::Postman => ".json",
            SpecFormat::Protobuf => ".proto",
        }
    }
}

impl std::fmt::Display for SpecFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SpecFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpecFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown spec format: {}", s))
    }
}

/// Rough size of a spec document, used to dispatch expensive specs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Large,
    Medium,
    #[default]
    Small,
}

impl SizeClass {
    /// Dispatch rank: lower runs earlier.
    pub fn rank(&self) -> u8 {
        match self {
            SizeClass::Large => 0,
            SizeClass::Medium => 1,
            SizeClass::Small => 2,
        }
    }
}

impl std::fmt::Display for SizeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeClass::Large => write!(f, "large"),
            SizeClass::Medium => write!(f, "medium"),
            SizeClass::Small => write!(f, "small"),
        }
    }
}

/// A documentation compression tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// The original, verbose document.
    #[serde(rename = "pretty")]
    Pretty,
    /// Whitespace and comments stripped.
    #[serde(rename = "minified")]
    Minified,
    /// Compact encoding, standard profile.
    #[serde(rename = "lap-standard")]
    LapStandard,
    /// Compact encoding, lean profile.
    #[serde(rename = "lap-lean")]
    LapLean,
    /// No documentation at all (prior-knowledge baseline).
    #[serde(rename = "none")]
    None,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Pretty,
        Tier::Minified,
        Tier::LapStandard,
        Tier::LapLean,
        Tier::None,
    ];

    /// Tiers compiled for every spec, in dispatch order.
    pub const COMPILED: [Tier; 4] = [Tier::Pretty, Tier::Minified, Tier::LapStandard, Tier::LapLean];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Pretty => "pretty",
            Tier::Minified => "minified",
            Tier::LapStandard => "lap-standard",
            Tier::LapLean => "lap-lean",
            Tier::None => "none",
        }
    }

    /// Whether this tier ships a documentation artifact.
    pub fn has_document(&self) -> bool {
        !matches!(self, Tier::None)
    }

    /// Artifact filename for a format and tier, `None` for the baseline tier.
    pub fn artifact_filename(&self, format: SpecFormat) -> Option<String> {
        match self {
            Tier::Pretty => Some(format!("pretty{}", format.extension())),
            Tier::Minified => Some(format!("minified{}", format.extension())),
            Tier::LapStandard => Some("standard.lap".to_string()),
            Tier::LapLean => Some("lean.lap".to_string()),
            Tier::None => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown tier: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_filenames() {
        assert_eq!(
            Tier::Pretty.artifact_filename(SpecFormat::OpenApi),
            Some("pretty.yaml".to_string())
        );
        assert_eq!(
            Tier::Minified.artifact_filename(SpecFormat::GraphQl),
            Some("minified.graphql".to_string())
        );
        assert_eq!(
            Tier::LapLean.artifact_filename(SpecFormat::Protobuf),
            Some("lean.lap".to_string())
        );
        assert_eq!(Tier::None.artifact_filename(SpecFormat::Postman), None);
    }

    #[test]
    fn test_tier_round_trips_through_str() {
        for tier in Tier::ALL {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
        assert!("gzip".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_serde_names() {
        let yaml = "[pretty, lap-standard, none]";
        let tiers: Vec<Tier> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(tiers, vec![Tier::Pretty, Tier::LapStandard, Tier::None]);
    }

    #[test]
    fn test_size_class_rank_orders_large_first() {
        assert!(SizeClass::Large.rank() < SizeClass::Medium.rank());
        assert!(SizeClass::Medium.rank() < SizeClass::Small.rank());
        assert_eq!(SizeClass::default(), SizeClass::Small);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("AsyncAPI".parse::<SpecFormat>().unwrap(), SpecFormat::AsyncApi);
        assert!("wsdl".parse::<SpecFormat>().is_err());
    }
}
