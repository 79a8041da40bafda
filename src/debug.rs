//! Inputs for debugging transforms: what an image runs and where its
//! application files live.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::Unix;
use crate::roots::roots;
use crate::sync_map::{ArtifactConfig, InsecureRegistries, SyncMapResolver};

/// A built image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub image_name: String,
    pub tag: String,
    pub config: ArtifactConfig,
}

impl Artifact {
    pub fn new(image_name: impl Into<String>, tag: impl Into<String>) -> Self {
        let image_name = image_name.into();
        Self {
            tag: tag.into(),
            config: ArtifactConfig {
                image_name: image_name.clone(),
            },
            image_name,
        }
    }
}

/// The parts of an image's container config that transforms look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub env: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub entrypoint: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub cmd: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub working_dir: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageConfiguration {
    pub artifact: String,
    pub app_roots: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub entrypoint: Vec<String>,
    pub arguments: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub working_dir: String,
}

/// Where container configs come from (local daemon, registry, ...).
pub trait ImageConfigSource {
    fn config_file(&self, tag: &str) -> Result<ContainerConfig>;
}

/// Reads `docker image inspect` output saved to a file.
///
/// Accepts either the inspect array or a single object; the entry whose
/// `RepoTags` contains the tag wins, otherwise the first one.
#[derive(Debug, Clone)]
pub struct InspectFileSource {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    repo_tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    config: ContainerConfig,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InspectDocument {
    Many(Vec<InspectEntry>),
    One(InspectEntry),
}

impl InspectFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageConfigSource for InspectFileSource {
    fn config_file(&self, tag: &str) -> Result<ContainerConfig> {
        let bytes =
            fs::read(self.path()).with_context(|| format!("read {}", self.path().display()))?;
        let doc: InspectDocument = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse {}", self.path().display()))?;
        let mut entries = match doc {
            InspectDocument::Many(entries) => entries,
            InspectDocument::One(entry) => vec![entry],
        };
        if entries.is_empty() {
            anyhow::bail!("no images in {}", self.path().display());
        }
        let pos = entries
            .iter()
            .position(|e| e.repo_tags.iter().any(|t| t == tag))
            .unwrap_or(0);
        Ok(entries.swap_remove(pos).config)
    }
}

/// First artifact built for `image`, matched by image name or tag.
pub fn find_artifact<'a>(image: &str, builds: &'a [Artifact]) -> Option<&'a Artifact> {
    let found = builds
        .iter()
        .find(|a| image == a.image_name || image == a.tag);
    if found.is_some() {
        log::debug!("Found artifact for image {image:?}");
    }
    found
}

/// Directories inside the image that likely hold the application, derived
/// from where synced files land. Empty when no hint is available.
pub fn infer_app_roots<R: SyncMapResolver + ?Sized>(
    artifact: &Artifact,
    resolver: &R,
    insecure_registries: &InsecureRegistries,
) -> Vec<String> {
    let sync_map = match resolver.sync_map(&artifact.config, insecure_registries) {
        Ok(map) => map,
        Err(err) => {
            log::warn!("unable to obtain sync map for {}: {err}", artifact.image_name);
            return Vec::new();
        }
    };
    let remote_files: Vec<&str> = sync_map
        .values()
        .flat_map(|remotes| remotes.iter().map(String::as_str))
        .collect();
    // containers are assumed to be linux-based
    roots(&remote_files, 1, &Unix)
}

/// Collects the image config and app roots for one artifact.
pub fn retrieve_image_configuration<S, R>(
    artifact: &Artifact,
    source: &S,
    resolver: &R,
    insecure_registries: &InsecureRegistries,
) -> Result<ImageConfiguration>
where
    S: ImageConfigSource + ?Sized,
    R: SyncMapResolver + ?Sized,
{
    let config = source.config_file(&artifact.tag).map_err(|err| {
        log::debug!("Error retrieving image config for {}: {err:#}", artifact.tag);
        err.context(format!("retrieving image config for {:?}", artifact.tag))
    })?;

    let app_roots = infer_app_roots(artifact, resolver, insecure_registries);
    log::debug!("Retrieved image configuration for {}: {config:?}", artifact.tag);

    Ok(ImageConfiguration {
        artifact: artifact.image_name.clone(),
        app_roots,
        env: env_as_map(&config.env),
        entrypoint: config.entrypoint,
        arguments: config.cmd,
        labels: config.labels,
        working_dir: config.working_dir,
    })
}

/// Looks up the artifact for `image` among `builds` and retrieves its config.
pub fn configuration_for_image<S, R>(
    image: &str,
    builds: &[Artifact],
    source: &S,
    resolver: &R,
    insecure_registries: &InsecureRegistries,
) -> Result<ImageConfiguration>
where
    S: ImageConfigSource + ?Sized,
    R: SyncMapResolver + ?Sized,
{
    let artifact = find_artifact(image, builds)
        .with_context(|| format!("no build artifact for {image:?}"))?;
    retrieve_image_configuration(artifact, source, resolver, insecure_registries)
}

/// Turns `NAME=value` strings into a map. A bare `NAME` maps to "".
pub fn env_as_map<S: AsRef<str>>(env: &[S]) -> BTreeMap<String, String> {
    env.iter()
        .map(|pair| {
            let (name, value) = pair.as_ref().split_once('=').unwrap_or((pair.as_ref(), ""));
            (name.to_string(), value.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_map::{SyncMap, SyncMapError};
    use std::cell::Cell;

    struct StaticResolver(SyncMap);

    impl SyncMapResolver for StaticResolver {
        fn sync_map(
            &self,
            _config: &ArtifactConfig,
            _insecure_registries: &InsecureRegistries,
        ) -> Result<SyncMap, SyncMapError> {
            Ok(self.0.clone())
        }
    }

    struct FailingResolver {
        calls: Cell<usize>,
    }

    impl SyncMapResolver for FailingResolver {
        fn sync_map(
            &self,
            config: &ArtifactConfig,
            _insecure_registries: &InsecureRegistries,
        ) -> Result<SyncMap, SyncMapError> {
            self.calls.set(self.calls.get() + 1);
            Err(SyncMapError::NoEntries {
                image: config.image_name.clone(),
            })
        }
    }

    struct StaticSource(ContainerConfig);

    impl ImageConfigSource for StaticSource {
        fn config_file(&self, _tag: &str) -> Result<ContainerConfig> {
            Ok(self.0.clone())
        }
    }

    struct NoDaemon;

    impl ImageConfigSource for NoDaemon {
        fn config_file(&self, _tag: &str) -> Result<ContainerConfig> {
            anyhow::bail!("daemon unreachable")
        }
    }

    fn sync_map(entries: &[(&str, &[&str])]) -> SyncMap {
        entries
            .iter()
            .map(|(local, remotes)| {
                (
                    local.to_string(),
                    remotes.iter().map(|r| r.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn app_roots_collapse_synced_destinations() {
        let resolver = StaticResolver(sync_map(&[
            ("src/app.py", &["/srv/app/app.py"]),
            ("src/lib/util.py", &["/srv/app/lib/util.py"]),
            ("conf/a.yaml", &["/etc/web/a.yaml", "/srv/app/conf/a.yaml"]),
        ]));
        let artifact = Artifact::new("web", "web:dev");
        assert_eq!(
            infer_app_roots(&artifact, &resolver, &InsecureRegistries::new()),
            vec!["/etc/web/a.yaml", "/srv/app"]
        );
    }

    #[test]
    fn app_roots_need_depth_one() {
        let resolver = StaticResolver(sync_map(&[
            ("a", &["/a"]),
            ("b", &["/b/c"]),
            ("root", &["/"]),
        ]));
        let artifact = Artifact::new("web", "web:dev");
        assert!(infer_app_roots(&artifact, &resolver, &InsecureRegistries::new()).is_empty());
    }

    #[test]
    fn app_roots_ignore_windows_separators() {
        let resolver = StaticResolver(sync_map(&[("a", &[r"\app\a", r"\app\b"])]));
        let artifact = Artifact::new("web", "web:dev");
        assert_eq!(
            infer_app_roots(&artifact, &resolver, &InsecureRegistries::new()),
            vec![r"\app\a", r"\app\b"]
        );
    }

    #[test]
    fn resolver_failure_means_no_hint() {
        let resolver = FailingResolver {
            calls: Cell::new(0),
        };
        let artifact = Artifact::new("web", "web:dev");
        assert!(infer_app_roots(&artifact, &resolver, &InsecureRegistries::new()).is_empty());
        assert_eq!(resolver.calls.get(), 1);
    }

    #[test]
    fn empty_sync_map_means_no_hint() {
        let resolver = StaticResolver(SyncMap::new());
        let artifact = Artifact::new("web", "web:dev");
        assert!(infer_app_roots(&artifact, &resolver, &InsecureRegistries::new()).is_empty());
    }

    #[test]
    fn env_pairs_split_on_first_equals() {
        let env = env_as_map(&["PATH=/usr/bin:/bin", "OPTS=a=b", "EMPTY=", "BARE"]);
        assert_eq!(env["PATH"], "/usr/bin:/bin");
        assert_eq!(env["OPTS"], "a=b");
        assert_eq!(env["EMPTY"], "");
        assert_eq!(env["BARE"], "");
        assert_eq!(env.len(), 4);
    }

    #[test]
    fn artifacts_match_by_name_or_tag() {
        let builds = vec![
            Artifact::new("web", "registry.local/web:abc"),
            Artifact::new("worker", "registry.local/worker:def"),
        ];
        assert_eq!(find_artifact("web", &builds).unwrap().tag, "registry.local/web:abc");
        assert_eq!(
            find_artifact("registry.local/worker:def", &builds)
                .unwrap()
                .image_name,
            "worker"
        );
        assert!(find_artifact("db", &builds).is_none());
    }

    #[test]
    fn image_configuration_combines_config_and_roots() {
        let source = StaticSource(ContainerConfig {
            env: vec!["PYTHONPATH=/srv/app".into(), "DEBUG=1".into()],
            entrypoint: vec!["python".into()],
            cmd: vec!["app.py".into()],
            labels: BTreeMap::from([("team".to_string(), "web".to_string())]),
            working_dir: "/srv/app".into(),
        });
        let resolver = StaticResolver(sync_map(&[
            ("app.py", &["/srv/app/app.py"]),
            ("util.py", &["/srv/app/util.py"]),
        ]));
        let builds = vec![Artifact::new("web", "web:dev")];

        let cfg = configuration_for_image(
            "web:dev",
            &builds,
            &source,
            &resolver,
            &InsecureRegistries::new(),
        )
        .unwrap();
        assert_eq!(cfg.artifact, "web");
        assert_eq!(cfg.app_roots, vec!["/srv/app"]);
        assert_eq!(cfg.env["PYTHONPATH"], "/srv/app");
        assert_eq!(cfg.entrypoint, vec!["python"]);
        assert_eq!(cfg.arguments, vec!["app.py"]);
        assert_eq!(cfg.labels["team"], "web");
        assert_eq!(cfg.working_dir, "/srv/app");
    }

    #[test]
    fn image_configuration_survives_missing_sync_map() {
        let source = StaticSource(ContainerConfig::default());
        let resolver = FailingResolver {
            calls: Cell::new(0),
        };
        let artifact = Artifact::new("web", "web:dev");
        let cfg =
            retrieve_image_configuration(&artifact, &source, &resolver, &InsecureRegistries::new())
                .unwrap();
        assert!(cfg.app_roots.is_empty());
        assert_eq!(cfg.artifact, "web");
    }

    #[test]
    fn image_configuration_errors() {
        let builds = vec![Artifact::new("web", "web:dev")];
        let resolver = StaticResolver(SyncMap::new());

        let err = configuration_for_image(
            "db",
            &builds,
            &NoDaemon,
            &resolver,
            &InsecureRegistries::new(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "no build artifact for \"db\"");

        let err = configuration_for_image(
            "web",
            &builds,
            &NoDaemon,
            &resolver,
            &InsecureRegistries::new(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "retrieving image config for \"web:dev\"");
        assert!(format!("{err:#}").contains("daemon unreachable"));
    }

    #[test]
    fn container_config_tolerates_nulls() {
        let cfg: ContainerConfig = serde_json::from_str(
            r#"{"Env":["A=1"],"Entrypoint":null,"Cmd":["run"],"Labels":null,"WorkingDir":""}"#,
        )
        .unwrap();
        assert_eq!(cfg.env, vec!["A=1"]);
        assert!(cfg.entrypoint.is_empty());
        assert!(cfg.labels.is_empty());
        assert_eq!(cfg.cmd, vec!["run"]);
    }

    #[test]
    fn inspect_file_picks_entry_by_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inspect.json");
        fs::write(
            &path,
            r#"[
                {"RepoTags":["other:1"],"Config":{"WorkingDir":"/other"}},
                {"RepoTags":["web:dev"],"Config":{"WorkingDir":"/srv/app","Env":null}}
            ]"#,
        )
        .unwrap();
        let source = InspectFileSource::new(&path);
        assert_eq!(source.config_file("web:dev").unwrap().working_dir, "/srv/app");
        assert_eq!(source.config_file("missing").unwrap().working_dir, "/other");

        fs::write(&path, "[]").unwrap();
        assert!(source.config_file("web:dev").is_err());
    }
}
