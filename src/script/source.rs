//! Script sources

use super::ScriptSource;
use crate::error::{EnsembleError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Where `runurl` is installed from on each node
pub const RUNURL_INSTALL_URL: &str = "http://run.alestic.com/runurl";

/// How HTTP script bases are turned into scripts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptMode {
    /// Nodes download each script themselves with `runurl`
    #[default]
    RunUrl,
    /// The orchestrator downloads scripts and sends their content
    Inline,
}

/// Emits `runurl` lines; nodes fetch the scripts themselves
pub struct RunUrlSource {
    base: String,
}

impl RunUrlSource {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ScriptSource for RunUrlSource {
    fn preamble(&self) -> Vec<u8> {
        format!(
            "if ! command -v runurl >/dev/null; then\n  \
             wget -qO/usr/bin/runurl {url} || curl -fsSL -o /usr/bin/runurl {url}\n  \
             chmod 755 /usr/bin/runurl\nfi\n",
            url = RUNURL_INSTALL_URL
        )
        .into_bytes()
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        Ok(format!("runurl {}/{} \"$@\"\n", self.base, path.trim_start_matches('/')).into_bytes())
    }
}

/// Downloads scripts over HTTP
pub struct HttpSource {
    base: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ScriptSource for HttpSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        tracing::debug!("Fetching script {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(EnsembleError::ScriptSource(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Reads scripts from a local directory
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ScriptSource for FileSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(EnsembleError::ScriptSource(format!(
                "Script path escapes the script root: {}",
                path
            )));
        }

        let full = self.root.join(relative);
        tokio::fs::read(&full).await.map_err(|e| {
            EnsembleError::ScriptSource(format!("Failed to read {}: {}", full.display(), e))
        })
    }
}

/// Pick a source for a script base location
pub fn source_for(base: &str, mode: ScriptMode) -> Box<dyn ScriptSource> {
    if base.starts_with("http://") || base.starts_with("https://") {
        match mode {
            ScriptMode::RunUrl => Box::new(RunUrlSource::new(base)),
            ScriptMode::Inline => Box::new(HttpSource::new(base)),
        }
    } else {
        // Nodes cannot see local files, so local scripts are always inlined
        let root = base.strip_prefix("file://").unwrap_or(base);
        Box::new(FileSource::new(root))
    }
}
