use clap::{Args, Parser, Subcommand};
use shellrun::{Arch, ContextConfig, Endian, Os};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shellrun-ctl")]
#[command(version, about = "Assemble, stage and run shellcode", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Assemble and print the bytes
    shellrun-ctl asm 'mov edi, 3; mov eax, SYS_exit; syscall'

    # Run raw shellcode and wait for it
    shellrun-ctl run --hex 'bf03000000b83c0000000f05' --wait

    # Talk to running shellcode through stdin/stdout
    shellrun-ctl run --asm 'xor eax, eax; xor edi, edi; mov rsi, rsp; mov edx, 64; syscall'

    # Write a standalone ELF for another target
    shellrun-ctl --arch i386 elf --asm 'mov ebx, 3; mov eax, SYS_exit; int 0x80' -o exit3

    # Which targets can be assembled here
    shellrun-ctl check
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Target architecture (amd64, i386, aarch64, arm)
    #[arg(short, long, value_name = "ARCH", global = true)]
    pub arch: Option<Arch>,

    /// Target operating system (linux, freebsd)
    #[arg(long, value_name = "OS", global = true)]
    pub os: Option<Os>,

    /// Byte order (little, big)
    #[arg(short, long, value_name = "ENDIAN", global = true)]
    pub endian: Option<Endian>,

    /// Word size in bits (32, 64)
    #[arg(short, long, value_name = "BITS", global = true)]
    pub bits: Option<u8>,

    /// JSON file with a context override; flags win over it
    #[arg(short, long, value_name = "FILE", global = true)]
    pub context: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Context override from `--context` with the individual flags on top
    pub fn context_config(&self) -> shellrun::Result<ContextConfig> {
        let base = match &self.context {
            Some(path) => ContextConfig::load(path)?,
            None => ContextConfig::default(),
        };

        let flags = ContextConfig {
            arch: self.arch,
            os: self.os,
            endian: self.endian,
            bits: self.bits,
        };
        Ok(base.overlay(&flags))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assemble text and print the shellcode as hex
    Asm {
        /// Assembly text; `;` separates statements
        text: String,
    },

    /// Wrap shellcode in an ELF executable and write it out
    Elf {
        #[command(flatten)]
        input: InputArgs,

        /// Output path
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
    },

    /// Stage and run shellcode
    Run {
        #[command(flatten)]
        input: InputArgs,

        /// Wait for the program instead of relaying stdin/stdout
        #[arg(short, long)]
        wait: bool,

        /// Leave the staged file behind (default)
        #[arg(long, conflicts_with = "cleanup")]
        keep: bool,

        /// Remove the staged file once the program is done
        #[arg(long)]
        cleanup: bool,

        /// Directory for staged files
        #[arg(long, value_name = "DIR")]
        staging_dir: Option<PathBuf>,

        /// Arguments passed to the program
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Report which targets have a usable assembler toolchain
    Check,
}

/// Where the shellcode comes from
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct InputArgs {
    /// Assembly text
    #[arg(long, value_name = "TEXT")]
    pub asm: Option<String>,

    /// Shellcode as hex; whitespace and `\x` escapes are ignored
    #[arg(long, value_name = "HEX")]
    pub hex: Option<String>,

    /// File holding raw shellcode
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
}
