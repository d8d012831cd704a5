//! Install and configure scripts
//!
//! Script content lives under a base location (a cluster's `run_url_base`).
//! A [`ScriptSource`] turns a path under that base into shell text, and
//! [`ScriptBuilder`] stitches one or more of them into a runnable [`Script`].

pub mod source;

pub use source::{source_for, FileSource, HttpSource, RunUrlSource, ScriptMode};

use crate::error::Result;
use async_trait::async_trait;

/// Resolves script paths to shell text
#[async_trait]
pub trait ScriptSource: Send + Sync {
    /// Lines that must run before any fetched script
    fn preamble(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Shell text for the script at `path`
    async fn fetch(&self, path: &str) -> Result<Vec<u8>>;
}

/// A script ready to run on nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Phase name, e.g. `bootstrap` or `configure`
    pub name: String,
    /// Script body, fed to `bash` on stdin
    pub body: Vec<u8>,
    /// Positional arguments
    pub args: Vec<String>,
}

impl Script {
    pub fn new(name: &str, body: Vec<u8>, args: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            body,
            args,
        }
    }

    /// Remote command that runs the body from stdin with the arguments.
    ///
    /// Arguments are joined with spaces and not quoted, so a space-separated
    /// argument such as a peer list reaches the script as separate words.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            "bash -s".to_string()
        } else {
            format!("bash -s -- {}", self.args.join(" "))
        }
    }

    /// Body as text, for logging and inspection
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Composes fetched scripts into one runnable script
pub struct ScriptBuilder;

impl ScriptBuilder {
    /// Fetch every path and concatenate them under one header.
    ///
    /// Each part runs in its own subshell; `set -e` stops at the first
    /// failing part.
    pub async fn compose(
        source: &dyn ScriptSource,
        name: &str,
        paths: &[String],
        args: Vec<String>,
    ) -> Result<Script> {
        let mut body = b"#!/bin/bash\nset -e\n".to_vec();
        body.extend(source.preamble());

        for path in paths {
            let part = source.fetch(path).await?;
            body.extend_from_slice(format!("# {}\n(\n", path).as_bytes());
            body.extend_from_slice(&part);
            if !part.ends_with(b"\n") {
                body.push(b'\n');
            }
            body.extend_from_slice(b")\n");
        }

        Ok(Script::new(name, body, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let plain = Script::new("bootstrap", Vec::new(), Vec::new());
        assert_eq!(plain.command_line(), "bash -s");

        let with_args = Script::new(
            "configure",
            Vec::new(),
            vec!["-c".to_string(), "ec2".to_string(), "10.0.0.1 10.0.0.2".to_string()],
        );
        assert_eq!(
            with_args.command_line(),
            "bash -s -- -c ec2 10.0.0.1 10.0.0.2"
        );
    }

    #[tokio::test]
    async fn test_compose_runurl() {
        let source = RunUrlSource::new("http://example.com/scripts");
        let script = ScriptBuilder::compose(
            &source,
            "bootstrap",
            &["sun/java/install".to_string(), "apache/zookeeper/install".to_string()],
            Vec::new(),
        )
        .await
        .unwrap();

        let text = script.text();
        assert!(text.starts_with("#!/bin/bash\nset -e\n"));
        assert!(text.contains("runurl http://example.com/scripts/sun/java/install"));
        let java = text.find("sun/java/install \"$@\"").unwrap();
        let zk = text.find("apache/zookeeper/install \"$@\"").unwrap();
        assert!(java < zk);
    }
}
