use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use console::style;
use log::info;
use serde::Serialize;
use shellrun::{Arch, Context, ContextConfig, Runner, RunnerBuilder, Toolchain, toolchain};

use crate::cli::InputArgs;
use crate::input::{load_shellcode, to_hex};

type CmdResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Serialize)]
struct AsmReport {
    context: Context,
    len: usize,
    hex: String,
}

#[derive(Serialize)]
struct ElfReport<'a> {
    context: Context,
    path: &'a Path,
    len: usize,
    entry: u64,
}

#[derive(Serialize)]
struct ToolchainReport {
    arch: Arch,
    available: bool,
    assembler: Option<String>,
    objcopy: Option<String>,
}

pub fn runner_for(config: &ContextConfig) -> CmdResult<Runner> {
    Ok(RunnerBuilder::new().context(config.clone()).build()?)
}

pub fn assemble(text: &str, config: &ContextConfig, json: bool) -> CmdResult<()> {
    let runner = runner_for(config)?;
    let shellcode = runner.assemble(text)?;
    info!("assembled {} bytes", shellcode.len());

    if json {
        let report = AsmReport {
            context: runner.context()?,
            len: shellcode.len(),
            hex: to_hex(&shellcode),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", to_hex(&shellcode));
    }
    Ok(())
}

pub fn write_elf(
    input: &InputArgs,
    output: &Path,
    config: &ContextConfig,
    json: bool,
) -> CmdResult<()> {
    let runner = runner_for(config)?;
    let shellcode = load_shellcode(input, &runner)?;
    let image = runner.build_image(&shellcode)?;

    fs::write(output, image.bytes())
        .map_err(|e| format!("cannot write {}: {}", output.display(), e))?;
    fs::set_permissions(output, Permissions::from_mode(0o755))?;
    info!("wrote {} bytes to {}", image.len(), output.display());

    if json {
        let report = ElfReport {
            context: *image.context(),
            path: output,
            len: image.len(),
            entry: image.entry(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} {} ({} bytes, entry {:#x})",
            style("wrote").green().bold(),
            output.display(),
            image.len(),
            image.entry()
        );
    }
    Ok(())
}

pub fn check_toolchains(json: bool) -> CmdResult<()> {
    info!("Checking assembler toolchains");

    let reports: Vec<ToolchainReport> = Arch::all()
        .into_iter()
        .map(|arch| match Toolchain::find(arch, None) {
            Ok(found) => ToolchainReport {
                arch,
                available: true,
                assembler: Some(found.assembler.display().to_string()),
                objcopy: Some(found.objcopy.display().to_string()),
            },
            Err(_) => ToolchainReport {
                arch,
                available: false,
                assembler: None,
                objcopy: None,
            },
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!("Checking assembler toolchains...\n");
    for report in &reports {
        match &report.assembler {
            Some(path) => println!("[✓] {:8} {}", report.arch.as_str(), path),
            None => println!(
                "[✗] {:8} not found (tried: {})",
                report.arch.as_str(),
                toolchain::candidate_prefixes(report.arch)
                    .iter()
                    .map(|p| format!("{}as", p))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    match Arch::host() {
        Some(host) => println!("\nHost architecture: {}", host),
        None => println!("\nHost architecture: unsupported"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_toolchains_runs() {
        check_toolchains(false).unwrap();
        check_toolchains(true).unwrap();
    }

    #[test]
    fn write_elf_from_hex() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("exit3");
        let input = InputArgs {
            asm: None,
            hex: Some("bf03000000b83c0000000f05".to_string()),
            file: None,
        };

        write_elf(&input, &out, &ContextConfig::new().arch(Arch::Amd64), false).unwrap();

        let bytes = fs::read(&out).unwrap();
        assert_eq!(&bytes[..4], b"\x7fELF");
        assert!(bytes.ends_with(&[0x0f, 0x05]));
        let mode = fs::metadata(&out).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn inconsistent_context_is_rejected() {
        let config = ContextConfig::new().arch(Arch::Amd64).bits(32);
        assert!(runner_for(&config).is_err());
    }
}
