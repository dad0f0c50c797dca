//! The catalog of backends the harness knows how to drive.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const KUDU_URL: &str = "http://localhost:4242";

/// How to load and query one backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SystemProfile {
    /// The unique name of the system, e.g. `influx`
    pub name: String,
    /// The wire format of its data and queries; selects the loader and query runner executables
    pub format: String,
    /// Passed to the loader as `--urls`, otherwise the loader's default endpoint is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_url: Option<String>,
    /// Passed to the query runner as `--urls`, otherwise the runner's default endpoint is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_load_flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_run_flags: Vec<String>,
    /// Glob patterns of workloads the system cannot answer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported: Vec<String>,
    #[serde(skip)]
    unsupported_patterns: Vec<glob::Pattern>,
}

impl SystemProfile {
    pub fn new(name: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            load_url: None,
            query_url: None,
            extra_load_flags: vec![],
            extra_run_flags: vec![],
            unsupported: vec![],
            unsupported_patterns: vec![],
        }
    }

    /// Use `url` as the endpoint for both loading and querying
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.load_url = Some(url.clone());
        self.query_url = Some(url);
        self
    }

    pub fn with_query_url(mut self, url: impl Into<String>) -> Self {
        self.query_url = Some(url.into());
        self
    }

    pub fn with_extra_load_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_load_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra_run_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_run_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_unsupported<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unsupported = patterns.into_iter().map(Into::into).collect();
        self
    }

    fn compile_patterns(&mut self) -> Result<()> {
        self.unsupported_patterns = self
            .unsupported
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|source| Error::InvalidPattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// Whether the workload matches one of the unsupported patterns
    pub fn is_unsupported(&self, workload: &str) -> bool {
        self.unsupported_patterns
            .iter()
            .any(|p| p.matches(workload))
    }

    /// Endpoint and extra flags for the loader, in that order
    pub fn load_flags(&self) -> Vec<String> {
        endpoint_flag(self.load_url.as_deref())
            .into_iter()
            .chain(self.extra_load_flags.iter().cloned())
            .collect()
    }

    /// Endpoint and extra flags for the query runner, in that order
    pub fn run_flags(&self) -> Vec<String> {
        endpoint_flag(self.query_url.as_deref())
            .into_iter()
            .chain(self.extra_run_flags.iter().cloned())
            .collect()
    }
}

fn endpoint_flag(url: Option<&str>) -> Option<String> {
    url.map(|u| format!("--urls={u}"))
}

/// Immutable catalog of [`SystemProfile`]s, keyed by name
///
/// Built once at startup and shared by reference with every pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRegistry {
    systems: Vec<SystemProfile>,
}

impl SystemRegistry {
    /// Validate the profiles: names must be unique and unsupported patterns valid globs
    pub fn new(systems: Vec<SystemProfile>) -> Result<Self> {
        let mut systems = systems;
        for system in &mut systems {
            system.compile_patterns()?;
        }
        for (i, system) in systems.iter().enumerate() {
            if systems[..i].iter().any(|s| s.name == system.name) {
                return Err(Error::DuplicateSystem(system.name.clone()));
            }
        }
        Ok(Self { systems })
    }

    /// The systems the harness ships with
    pub fn builtin() -> Self {
        Self::new(vec![
            SystemProfile::new("kudu", "influx")
                .with_url(KUDU_URL)
                .with_extra_load_flags(["--do-create-db=0", "--gzip=0"]),
            SystemProfile::new("influx", "influx").with_extra_load_flags(["--gzip=0"]),
            SystemProfile::new("victoriametrics", "victoriametrics")
                .with_unsupported(["high-cpu-*"]),
            SystemProfile::new("clickhouse", "clickhouse"),
        ])
        .expect("built-in system profiles are valid")
    }

    /// Read a registry from a JSON array of profiles
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ReadRegistry {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let systems = serde_json::from_str(contents).map_err(Error::ParseRegistry)?;
        Self::new(systems)
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.systems).map_err(|source| Error::Encode {
            what: "system registry",
            source,
        })
    }

    pub fn get(&self, name: &str) -> Result<&SystemProfile> {
        self.systems
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::UnknownSystem {
                name: name.to_owned(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|s| s.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SystemProfile> {
        self.systems.iter()
    }
}
