//! Typed blacklist configuration tree.
//!
//! Built once by [`crate::parser::parse`] and read-only afterwards.

use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Name of the area holding whole-domain entries.
pub const DOMAINS: &str = "domains";
/// Name of the area holding individual host entries.
pub const HOSTS: &str = "hosts";

/// Redirect address used when the configuration does not set one.
pub const DEFAULT_REDIRECT_IP: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Root of the blacklist configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlacklistTree {
    pub disabled: bool,
    pub redirect_ip: Ipv4Addr,
    /// Root-level exclusions, applied to every area
    pub exclude: Vec<String>,
    areas: Vec<Area>,
}

impl BlacklistTree {
    pub(crate) fn new(
        disabled: bool,
        redirect_ip: Ipv4Addr,
        exclude: Vec<String>,
        areas: Vec<Area>,
    ) -> Self {
        Self {
            disabled,
            redirect_ip,
            exclude,
            areas,
        }
    }

    /// A switched-off tree with no areas; running it only removes generated files.
    pub fn disabled() -> Self {
        Self::new(true, DEFAULT_REDIRECT_IP, Vec::new(), Vec::new())
    }

    /// Look up an area by name.
    pub fn area(&self, name: &str) -> Option<&Area> {
        self.areas.iter().find(|a| a.name == name)
    }

    /// All areas in configuration order.
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    /// Every exclusion in the tree: root entries first, then each area's.
    pub fn all_excludes(&self) -> impl Iterator<Item = &str> {
        self.exclude
            .iter()
            .chain(self.areas.iter().flat_map(|a| a.exclude.iter()))
            .map(String::as_str)
    }
}

/// A named category of blacklist entries (`domains` or `hosts`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Area {
    pub name: String,
    pub disabled: bool,
    pub redirect_ip: Ipv4Addr,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub sources: Vec<Source>,
}

impl Area {
    pub fn new(name: impl Into<String>, redirect_ip: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            disabled: false,
            redirect_ip,
            include: Vec::new(),
            exclude: Vec::new(),
            sources: Vec::new(),
        }
    }

    /// Sources that fetch from a URL.
    pub fn url_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().filter(|s| s.url.is_some())
    }

    /// Sources that read a local file (and have no URL).
    pub fn file_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources
            .iter()
            .filter(|s| s.url.is_none() && s.file.is_some())
    }

    /// Sources with neither a URL nor a file.
    pub fn unusable_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().filter(|s| !s.is_usable())
    }
}

/// A named origin contributing entries to an area.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Source {
    pub name: String,
    pub url: Option<String>,
    pub file: Option<PathBuf>,
    pub prefix: Option<String>,
    pub description: String,
}

impl Source {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_usable(&self) -> bool {
        self.url.is_some() || self.file.is_some()
    }
}
