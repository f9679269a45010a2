//! Graphviz rasterizer.
//!
//! Pipes DOT text into `dot -T<format> -o <path>` (or any compatible layout
//! program such as `neato`) and maps process failures to `RenderError`.

use crate::ports::{Rasterizer, RenderError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphvizRasterizer {
    program: String,
    format: String,
}

impl Default for GraphvizRasterizer {
    fn default() -> Self {
        Self::new("dot", "png")
    }
}

impl GraphvizRasterizer {
    pub fn new(program: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            format: format.into(),
        }
    }
}

/// The command line a rasterization runs, without executing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

pub fn build_command_spec(rasterizer: &GraphvizRasterizer, output: &Path) -> CommandSpec {
    CommandSpec {
        program: rasterizer.program.clone(),
        args: vec![
            format!("-T{}", rasterizer.format),
            "-o".to_string(),
            output.display().to_string(),
        ],
    }
}

impl Rasterizer for GraphvizRasterizer {
    fn rasterize(&self, dot: &str, output: &Path) -> Result<(), RenderError> {
        let spec = build_command_spec(self, output);
        debug!(program = %spec.program, output = %output.display(), "rasterizing");

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => RenderError::RasterizerMissing(spec.program.clone()),
                _ => RenderError::Io {
                    path: PathBuf::from(&spec.program),
                    source: e,
                },
            })?;

        // The child is always reaped; a write error only matters if it exited cleanly.
        let write_result = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(dot.as_bytes()),
            None => Ok(()),
        };

        let result = child.wait_with_output().map_err(|source| RenderError::Io {
            path: PathBuf::from(&spec.program),
            source,
        })?;

        if !result.status.success() {
            return Err(RenderError::RasterizerFailed {
                program: spec.program,
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        write_result.map_err(|source| RenderError::Io {
            path: PathBuf::from(&spec.program),
            source,
        })
    }

    fn extension(&self) -> &str {
        &self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_spec_default() {
        let spec = build_command_spec(&GraphvizRasterizer::default(), Path::new("out/main.png"));
        assert_eq!(spec.program, "dot");
        assert_eq!(spec.args, vec!["-Tpng", "-o", "out/main.png"]);
    }

    #[test]
    fn test_build_command_spec_custom_program() {
        let rasterizer = GraphvizRasterizer::new("neato", "svg");
        let spec = build_command_spec(&rasterizer, Path::new("a.svg"));
        assert_eq!(spec.program, "neato");
        assert_eq!(spec.args[0], "-Tsvg");
        assert_eq!(rasterizer.extension(), "svg");
    }

    #[test]
    fn test_missing_program_is_reported() {
        let rasterizer = GraphvizRasterizer::new("callflow-no-such-rasterizer", "png");
        let dir = tempfile::tempdir().unwrap();
        let err = rasterizer
            .rasterize("digraph G {}", &dir.path().join("g.png"))
            .unwrap_err();
        assert!(matches!(err, RenderError::RasterizerMissing(p) if p == "callflow-no-such-rasterizer"));
    }

    #[test]
    #[cfg(unix)]
    fn test_early_exit_reports_failure_not_write_error() {
        // Larger than a pipe buffer, so the write hits a closed pipe.
        let mut dot = String::from("digraph G {\n");
        for i in 0..20_000 {
            dot.push_str(&format!("  \"n{}\" -> \"n{}\";\n", i, i + 1));
        }
        dot.push('}');
        assert!(dot.len() > 64 * 1024);

        let dir = tempfile::tempdir().unwrap();
        let err = GraphvizRasterizer::new("false", "png")
            .rasterize(&dot, &dir.path().join("g.png"))
            .unwrap_err();
        assert!(
            matches!(err, RenderError::RasterizerFailed { ref program, code: Some(1), .. } if program == "false"),
            "unexpected error: {:?}",
            err
        );
    }

    #[test]
    #[ignore] // Requires Graphviz to be installed
    fn test_rasterize_with_dot() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("g.png");
        GraphvizRasterizer::default()
            .rasterize("digraph G { a -> b; }", &out)
            .unwrap();
        assert!(out.exists());
    }
}
