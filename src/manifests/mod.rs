//! Load the Kubernetes manifests shipped under `deploy/kubernetes`.
//!
//! Each YAML document is decoded into the matching `k8s-openapi` type, so a
//! manifest that loads here has the shape the API server expects.

mod checks;

use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};

use k8s_openapi::api::{
    apps::v1::Deployment,
    batch::v1::Job,
    core::v1::{ConfigMap, Service},
};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu};

pub use checks::{
    check, check_deployment, registration_jobs, variable_references, Problem, REGISTRATION_CLI,
    REGISTRATION_FLAGS,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to read directory {}: {source}", path.display()))]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid document #{index} in {}: {source}", path.display()))]
    Parse {
        path: PathBuf,
        index: usize,
        source: serde_yaml::Error,
    },

    #[snafu(display("Document #{index} in {} has no kind", path.display()))]
    MissingKind { path: PathBuf, index: usize },

    #[snafu(display("Document #{index} in {} has unsupported kind {kind}", path.display()))]
    UnsupportedKind {
        path: PathBuf,
        index: usize,
        kind: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A decoded manifest document.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    ConfigMap(ConfigMap),
    Deployment(Deployment),
    Job(Job),
    Service(Service),
}

impl Manifest {
    pub fn kind(&self) -> &'static str {
        match self {
            Manifest::ConfigMap(_) => "ConfigMap",
            Manifest::Deployment(_) => "Deployment",
            Manifest::Job(_) => "Job",
            Manifest::Service(_) => "Service",
        }
    }

    pub fn name(&self) -> &str {
        let metadata = match self {
            Manifest::ConfigMap(object) => &object.metadata,
            Manifest::Deployment(object) => &object.metadata,
            Manifest::Job(object) => &object.metadata,
            Manifest::Service(object) => &object.metadata,
        };
        metadata.name.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind(), self.name())
    }
}

/// Decode every document of a YAML stream. Empty documents are skipped.
pub fn parse_documents(path: &Path, contents: &str) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(contents).enumerate() {
        let value =
            serde_yaml::Value::deserialize(document).context(ParseSnafu { path, index })?;
        if value.is_null() {
            continue;
        }

        let kind = value
            .get("kind")
            .and_then(serde_yaml::Value::as_str)
            .context(MissingKindSnafu { path, index })?
            .to_owned();
        let manifest = match kind.as_str() {
            "ConfigMap" => Manifest::ConfigMap(decode(value, path, index)?),
            "Deployment" => Manifest::Deployment(decode(value, path, index)?),
            "Job" => Manifest::Job(decode(value, path, index)?),
            "Service" => Manifest::Service(decode(value, path, index)?),
            _ => return UnsupportedKindSnafu { path, index, kind }.fail(),
        };
        manifests.push(manifest);
    }
    Ok(manifests)
}

fn decode<T>(value: serde_yaml::Value, path: &Path, index: usize) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_yaml::from_value(value).context(ParseSnafu { path, index })
}

fn is_manifest_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| matches!(extension, "yaml" | "yml"))
}

/// Load every `*.yaml`/`*.yml` file of `dir`, in file name order.
pub fn load_dir(dir: &Path) -> Result<Vec<(PathBuf, Manifest)>> {
    let mut paths = fs::read_dir(dir)
        .context(ReadDirSnafu { path: dir })?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .context(ReadDirSnafu { path: dir })?;
    paths.retain(|path| is_manifest_file(path));
    paths.sort();

    let mut loaded = Vec::new();
    for path in paths {
        let contents = fs::read_to_string(&path).context(ReadFileSnafu { path: &path })?;
        for manifest in parse_documents(&path, &contents)? {
            loaded.push((path.clone(), manifest));
        }
    }
    Ok(loaded)
}
