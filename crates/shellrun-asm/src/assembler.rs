//! Assembly text to raw shellcode bytes

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, trace};
use shellrun_core::{Arch, Context, Endian, Result, ShellrunError};

use crate::constants;
use crate::toolchain::Toolchain;

const SECTION: &str = ".shellcode";

/// Turns assembly text into raw machine code for a target context
pub trait Assembler: Send + Sync {
    fn assemble(&self, text: &str, ctx: &Context) -> Result<Vec<u8>>;
}

/// Assembler backed by GNU `as` and `objcopy`
#[derive(Debug, Clone, Default)]
pub struct BinutilsAssembler {
    prefix: Option<String>,
    extra_flags: Vec<String>,
}

impl BinutilsAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use tools named `<prefix>as` and `<prefix>objcopy` only
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Pass an additional flag to `as`
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.extra_flags.push(flag.into());
        self
    }

    fn as_flags(&self, ctx: &Context) -> Vec<String> {
        let mut flags: Vec<String> = match ctx.arch {
            Arch::Amd64 => vec!["--64".into()],
            Arch::I386 => vec!["--32".into()],
            Arch::Aarch64 => vec![endian_flag(ctx.endian).into()],
            Arch::Arm => vec![endian_flag(ctx.endian).into(), "-march=armv7-a".into()],
        };
        flags.extend(self.extra_flags.iter().cloned());
        flags
    }
}

impl Assembler for BinutilsAssembler {
    fn assemble(&self, text: &str, ctx: &Context) -> Result<Vec<u8>> {
        ctx.validate()?;
        let toolchain = Toolchain::find(ctx.arch, self.prefix.as_deref())?;

        let prelude = prelude(ctx);
        let body = constants::expand(&normalize(text), ctx);
        let source = format!("{}\n{}\n", prelude.join("\n"), body);

        let scratch = tempfile::Builder::new()
            .prefix("shellrun-asm-")
            .tempdir()
            .map_err(|e| ShellrunError::Assembly(format!("scratch directory: {}", e)))?;
        let src = scratch.path().join("step1.s");
        let obj = scratch.path().join("step2.o");
        let bin = scratch.path().join("step3.bin");

        fs::write(&src, &source)
            .map_err(|e| ShellrunError::Assembly(format!("write {}: {}", src.display(), e)))?;
        trace!("assembling for {}:\n{}", ctx.arch, source);

        let mut cmd = Command::new(&toolchain.assembler);
        cmd.args(self.as_flags(ctx)).arg("-o").arg(&obj).arg(&src);
        run_tool(cmd, &toolchain.assembler, &src, prelude.len())?;

        let mut cmd = Command::new(&toolchain.objcopy);
        cmd.args(["-j", SECTION, "-O", "binary"]).arg(&obj).arg(&bin);
        run_tool(cmd, &toolchain.objcopy, &src, prelude.len())?;

        let bytes = fs::read(&bin)
            .map_err(|e| ShellrunError::Assembly(format!("read {}: {}", bin.display(), e)))?;

        debug!("assembled {} bytes for {}", bytes.len(), ctx.arch);
        Ok(bytes)
    }
}

fn endian_flag(endian: Endian) -> &'static str {
    match endian {
        Endian::Little => "-EL",
        Endian::Big => "-EB",
    }
}

fn run_tool(mut cmd: Command, tool: &Path, src: &Path, line_offset: usize) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let spawned = {
        let _lock = shellrun_core::spawn_lock();
        cmd.spawn()
    };
    let output = spawned.and_then(|child| child.wait_with_output()).map_err(|e| {
        ShellrunError::Assembly(format!("failed to run {}: {}", tool.display(), e))
    })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let diagnostics = clean_diagnostics(&stderr, src, line_offset);
    let name = tool
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| tool.display().to_string());

    Err(ShellrunError::Assembly(if diagnostics.is_empty() {
        format!("{} failed with {}", name, output.status)
    } else {
        diagnostics
    }))
}

/// Directives placed before the caller's text
pub fn prelude(ctx: &Context) -> Vec<String> {
    let mut lines = vec![
        format!(".section {},\"awx\"", SECTION),
        ".global _start".to_string(),
        "_start:".to_string(),
    ];

    match ctx.arch {
        Arch::Amd64 | Arch::I386 => lines.push(".intel_syntax noprefix".to_string()),
        Arch::Arm => {
            lines.push(".syntax unified".to_string());
            lines.push(".arm".to_string());
        }
        Arch::Aarch64 => {}
    }

    lines
}

/// Split statements on newlines and on `;` outside string literals.
pub fn normalize(text: &str) -> String {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            current.push(c);
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            ';' | '\n' => statements.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    statements.push(current);

    statements
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// "/tmp/shellrun-asm-x/step1.s:5: Error: ..." becomes "<input>:2: Error: ..."
fn clean_diagnostics(stderr: &str, src: &Path, line_offset: usize) -> String {
    let src_prefix = format!("{}:", src.display());

    stderr
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.ends_with("Assembler messages:"))
        .map(|line| {
            let Some(rest) = line.strip_prefix(&src_prefix) else {
                return line.to_string();
            };
            if let Some((num, tail)) = rest.split_once(':')
                && let Ok(n) = num.parse::<usize>()
            {
                return format!("<input>:{}:{}", n.saturating_sub(line_offset), tail);
            }
            format!("<input>:{}", rest)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
