//! Locating a binutils toolchain for a target architecture

use std::env;
use std::path::{Path, PathBuf};

use log::debug;
use nix::unistd::{AccessFlags, access};
use shellrun_core::{Arch, Result, ShellrunError};

const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Paths to the tools one assembly run needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub assembler: PathBuf,
    pub objcopy: PathBuf,
    /// Prefix the tools were found under, empty for host tools
    pub prefix: String,
}

impl Toolchain {
    /// Find `as` and `objcopy` for `arch`.
    ///
    /// With an explicit `prefix` only that prefix is tried; otherwise the
    /// host tools are tried first for native targets, then the usual cross
    /// prefixes.
    pub fn find(arch: Arch, prefix: Option<&str>) -> Result<Toolchain> {
        let candidates: Vec<String> = match prefix {
            Some(p) => vec![p.to_string()],
            None => candidate_prefixes(arch),
        };

        let path_value = env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string());

        for prefix in &candidates {
            let (Some(assembler), Some(objcopy)) = (
                resolve_program_path(&format!("{}as", prefix), &path_value),
                resolve_program_path(&format!("{}objcopy", prefix), &path_value),
            ) else {
                continue;
            };

            debug!(
                "using {} toolchain: {}",
                arch,
                assembler.display()
            );
            return Ok(Toolchain {
                assembler,
                objcopy,
                prefix: prefix.clone(),
            });
        }

        let tried: Vec<String> = candidates.iter().map(|p| format!("{}as", p)).collect();
        Err(ShellrunError::Assembly(format!(
            "no binutils toolchain for {} (tried: {})",
            arch,
            tried.join(", ")
        )))
    }
}

/// Whether a toolchain for `arch` is installed
pub fn available(arch: Arch) -> bool {
    Toolchain::find(arch, None).is_ok()
}

/// Whether the host's own tools can assemble for `arch`
pub fn is_native(arch: Arch) -> bool {
    match (Arch::host(), arch) {
        (Some(Arch::Amd64 | Arch::I386), Arch::Amd64 | Arch::I386) => true,
        (Some(host), target) => host == target,
        (None, _) => false,
    }
}

/// Tool-name prefixes to try for `arch`, host tools first when native
pub fn candidate_prefixes(arch: Arch) -> Vec<String> {
    let cross: &[&str] = match arch {
        Arch::Amd64 => &["x86_64-linux-gnu-", "x86_64-pc-linux-gnu-"],
        Arch::I386 => &["i686-linux-gnu-", "i386-linux-gnu-", "x86_64-linux-gnu-"],
        Arch::Aarch64 => &[
            "aarch64-linux-gnu-",
            "aarch64-none-linux-gnu-",
            "aarch64-unknown-linux-gnu-",
        ],
        Arch::Arm => &[
            "arm-linux-gnueabihf-",
            "arm-linux-gnueabi-",
            "arm-none-eabi-",
        ],
    };

    let mut prefixes = Vec::with_capacity(cross.len() + 1);
    if is_native(arch) {
        prefixes.push(String::new());
    }
    prefixes.extend(cross.iter().map(|p| p.to_string()));
    prefixes
}

/// Resolve a program name to an absolute path using PATH semantics.
fn resolve_program_path(program: &str, path_value: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return access(path, AccessFlags::X_OK)
            .is_ok()
            .then(|| path.to_path_buf());
    }

    for entry in path_value.split(':') {
        let dir = if entry.is_empty() { "." } else { entry };
        let candidate = Path::new(dir).join(program);

        if candidate.is_file() && access(&candidate, AccessFlags::X_OK).is_ok() {
            return Some(candidate);
        }
    }

    None
}
