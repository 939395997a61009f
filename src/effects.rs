use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{ErrorKind, LangError, LangResult};
use crate::pkgconf::{self, PkgInfo};
use crate::run_cmd::{self, CmdOutput};

/// Capability boundary for everything a native function may do outside
/// the workspace: filesystem writes, process spawning, external
/// queries. Selected once per run; the normal pipeline gets
/// [`RealEffects`], the analyzer gets [`DryEffects`], which answers
/// every request with a plausible placeholder so type-dependent code
/// downstream keeps working.
///
/// Reading source files is not behind this boundary: the analyzer
/// still evaluates real build files.
pub trait Effects {
    fn label(&self) -> &'static str;

    /// Existence probe used when coercing strings to file objects.
    fn file_exists(&self, path: &Path) -> bool;

    fn write_file(&self, path: &Path, data: &[u8]) -> LangResult<()>;

    fn mkdir_all(&self, path: &Path) -> LangResult<()>;

    fn run_cmd(&self, argv: &[String], timeout: Duration) -> LangResult<CmdOutput>;

    /// PATH search for `find_program()`.
    fn find_program(&self, name: &str) -> Option<String>;

    fn pkg_lookup(&self, name: &str, timeout: Duration) -> LangResult<Option<PkgInfo>>;

    fn pkg_get_variable(
        &self,
        name: &str,
        key: &str,
        timeout: Duration,
    ) -> LangResult<Option<String>>;
}

pub struct RealEffects;

impl Effects for RealEffects {
    fn label(&self) -> &'static str {
        "real"
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file() || path.is_dir()
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> LangResult<()> {
        std::fs::write(path, data)
            .map_err(|err| LangError::bare(ErrorKind::Io(format!("writing {path:?}: {err}"))))
    }

    fn mkdir_all(&self, path: &Path) -> LangResult<()> {
        std::fs::create_dir_all(path)
            .map_err(|err| LangError::bare(ErrorKind::Io(format!("creating {path:?}: {err}"))))
    }

    fn run_cmd(&self, argv: &[String], timeout: Duration) -> LangResult<CmdOutput> {
        run_cmd::run_cmd(argv, timeout)
    }

    fn find_program(&self, name: &str) -> Option<String> {
        if name.contains('/') {
            let path = Path::new(name);
            return if path.is_file() {
                Some(name.to_string())
            } else {
                None
            };
        }
        let path_env = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path_env) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate.to_string_lossy().into_owned());
            }
        }
        None
    }

    fn pkg_lookup(&self, name: &str, timeout: Duration) -> LangResult<Option<PkgInfo>> {
        pkgconf::lookup(name, timeout)
    }

    fn pkg_get_variable(
        &self,
        name: &str,
        key: &str,
        timeout: Duration,
    ) -> LangResult<Option<String>> {
        pkgconf::get_variable(name, key, timeout)
    }
}

/// Side-effect-free stand-in used by the analyzer. Writes and process
/// spawns succeed without doing anything; probes report success so the
/// common `if dep.found()` branches stay live for analysis.
pub struct DryEffects;

impl Effects for DryEffects {
    fn label(&self) -> &'static str {
        "dry"
    }

    fn file_exists(&self, _path: &Path) -> bool {
        true
    }

    fn write_file(&self, path: &Path, _data: &[u8]) -> LangResult<()> {
        debug!(?path, "dry run: skipping write");
        Ok(())
    }

    fn mkdir_all(&self, _path: &Path) -> LangResult<()> {
        Ok(())
    }

    fn run_cmd(&self, argv: &[String], _timeout: Duration) -> LangResult<CmdOutput> {
        debug!(cmd = %argv.join(" "), "dry run: skipping command");
        Ok(CmdOutput {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
        })
    }

    fn find_program(&self, name: &str) -> Option<String> {
        Some(name.to_string())
    }

    fn pkg_lookup(&self, name: &str, _timeout: Duration) -> LangResult<Option<PkgInfo>> {
        Ok(Some(PkgInfo {
            name: name.to_string(),
            version: "0.0.0".to_string(),
            ..PkgInfo::default()
        }))
    }

    fn pkg_get_variable(
        &self,
        _name: &str,
        _key: &str,
        _timeout: Duration,
    ) -> LangResult<Option<String>> {
        Ok(Some(String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_effects_report_plausible_success() {
        let effects = DryEffects;
        assert!(effects.file_exists(Path::new("/nonexistent/file.c")));
        let out = effects
            .run_cmd(&["cc".to_string()], Duration::from_secs(1))
            .expect("dry run_cmd should succeed");
        assert!(out.success());
        assert_eq!(effects.find_program("cc"), Some("cc".to_string()));
    }

    #[test]
    fn real_effects_find_program_searches_path() {
        let effects = RealEffects;
        assert!(effects.find_program("sh").is_some());
        assert!(effects.find_program("definitely-not-a-real-binary").is_none());
    }
}
