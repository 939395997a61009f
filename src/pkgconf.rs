use std::time::Duration;

use tracing::debug;

use crate::error::LangResult;
use crate::run_cmd::run_cmd;

/// Result of a package-metadata query, the external collaborator's
/// answer shape: found or not, plus paths and version when found.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PkgInfo {
    pub name: String,
    pub version: String,
    pub includes: Vec<String>,
    pub libs: Vec<String>,
    pub link_args: Vec<String>,
}

fn query(args: &[&str], timeout: Duration) -> LangResult<Option<String>> {
    let argv: Vec<String> = std::iter::once("pkg-config".to_string())
        .chain(args.iter().map(|s| s.to_string()))
        .collect();
    let out = run_cmd(&argv, timeout)?;
    if out.success() {
        Ok(Some(out.stdout.trim().to_string()))
    } else {
        Ok(None)
    }
}

/// `lookup(name)`: a negative answer (package unknown) is an ordinary
/// `None`; only an unlaunchable pkg-config propagates as an error.
pub fn lookup(name: &str, timeout: Duration) -> LangResult<Option<PkgInfo>> {
    let version = match query(&["--modversion", name], timeout)? {
        Some(version) => version,
        None => {
            debug!(name, "pkg-config lookup: not found");
            return Ok(None);
        }
    };

    let mut info = PkgInfo {
        name: name.to_string(),
        version,
        ..PkgInfo::default()
    };

    if let Some(cflags) = query(&["--cflags", name], timeout)? {
        for flag in cflags.split_whitespace() {
            if let Some(path) = flag.strip_prefix("-I") {
                info.includes.push(path.to_string());
            }
        }
    }
    if let Some(libs) = query(&["--libs", name], timeout)? {
        for flag in libs.split_whitespace() {
            if let Some(path) = flag.strip_prefix("-L") {
                info.libs.push(path.to_string());
            } else {
                info.link_args.push(flag.to_string());
            }
        }
    }

    debug!(name, version = %info.version, "pkg-config lookup: found");
    Ok(Some(info))
}

pub fn get_variable(name: &str, key: &str, timeout: Duration) -> LangResult<Option<String>> {
    let var = format!("--variable={key}");
    match query(&[&var, name], timeout)? {
        Some(value) if !value.is_empty() => Ok(Some(value)),
        _ => Ok(None),
    }
}
