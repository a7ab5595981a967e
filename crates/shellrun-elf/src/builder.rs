//! Executable image construction

use log::debug;
use shellrun_core::{Context, Endian, Result, ShellrunError};

use crate::elf::{
    self, ELF_MAGIC, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFDATA2MSB, ET_EXEC, EV_CURRENT,
    ElfWriter, PAGE_ALIGN, PF_R, PF_W, PF_X, PHNUM, PT_GNU_STACK, PT_LOAD, ProgramHeader,
};

/// Largest shellcode accepted by [`ElfBuilder`]
pub const MAX_SHELLCODE_LEN: usize = 64 * 1024 * 1024;

/// A directly loadable program image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableImage {
    bytes: Vec<u8>,
    entry: u64,
    code_offset: usize,
    context: Context,
}

impl ExecutableImage {
    /// Wrap already-built image bytes.
    ///
    /// `code_offset` is the file offset of the first shellcode byte.
    pub fn new(bytes: Vec<u8>, entry: u64, code_offset: usize, context: Context) -> Self {
        Self {
            bytes,
            entry,
            code_offset,
            context,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Virtual address of the entry point
    pub fn entry(&self) -> u64 {
        self.entry
    }

    /// The shellcode embedded in the image
    pub fn code(&self) -> &[u8] {
        &self.bytes[self.code_offset.min(self.bytes.len())..]
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Turns raw shellcode into an executable image for a target context
pub trait ExecutableBuilder: Send + Sync {
    fn build(&self, shellcode: &[u8], ctx: &Context) -> Result<ExecutableImage>;
}

/// Builds minimal static ELF executables
#[derive(Debug, Clone, Default)]
pub struct ElfBuilder {
    base_address: Option<u64>,
}

impl ElfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the image at `addr` instead of the arch's conventional base
    pub fn base_address(mut self, addr: u64) -> Self {
        self.base_address = Some(addr);
        self
    }

    fn check(&self, shellcode: &[u8], ctx: &Context) -> Result<u64> {
        ctx.validate()
            .map_err(|e| ShellrunError::Build(format!("unsupported target: {}", e)))?;

        if shellcode.is_empty() {
            return Err(ShellrunError::Build("shellcode is empty".to_string()));
        }

        if shellcode.len() > MAX_SHELLCODE_LEN {
            return Err(ShellrunError::Build(format!(
                "shellcode is {} bytes, limit is {}",
                shellcode.len(),
                MAX_SHELLCODE_LEN
            )));
        }

        let base = self
            .base_address
            .unwrap_or_else(|| elf::base_address(ctx.arch));
        if base % PAGE_ALIGN != 0 {
            return Err(ShellrunError::Build(format!(
                "base address {:#x} is not page aligned",
                base
            )));
        }

        let total = elf::headers_size(ctx.bits) + shellcode.len() as u64;
        let limit = if ctx.bits == 64 {
            u64::MAX
        } else {
            u32::MAX as u64
        };
        if base.checked_add(total).is_none_or(|end| end > limit) {
            return Err(ShellrunError::Build(format!(
                "image at {:#x} does not fit a {}-bit address space",
                base, ctx.bits
            )));
        }

        Ok(base)
    }
}

impl ExecutableBuilder for ElfBuilder {
    fn build(&self, shellcode: &[u8], ctx: &Context) -> Result<ExecutableImage> {
        let base = self.check(shellcode, ctx)?;
        let bits = ctx.bits;
        let code_offset = elf::headers_size(bits);
        let total = code_offset + shellcode.len() as u64;
        let entry = base + code_offset;

        let mut w = ElfWriter::new(ctx.endian, bits, total as usize);

        // e_ident
        w.bytes(&ELF_MAGIC);
        w.u8(if bits == 64 { ELFCLASS64 } else { ELFCLASS32 });
        w.u8(match ctx.endian {
            Endian::Little => ELFDATA2LSB,
            Endian::Big => ELFDATA2MSB,
        });
        w.u8(EV_CURRENT);
        w.u8(elf::osabi(ctx.os));
        w.bytes(&[0u8; 8]);

        w.u16(ET_EXEC);
        w.u16(elf::machine(ctx.arch));
        w.u32(EV_CURRENT as u32);
        w.word(entry);
        w.word(elf::ehdr_size(bits) as u64); // e_phoff
        w.word(0); // e_shoff
        w.u32(elf::flags(ctx.arch));
        w.u16(elf::ehdr_size(bits));
        w.u16(elf::phdr_size(bits));
        w.u16(PHNUM);
        w.u16(0); // e_shentsize
        w.u16(0); // e_shnum
        w.u16(0); // e_shstrndx

        ProgramHeader {
            p_type: PT_LOAD,
            p_flags: PF_R | PF_W | PF_X,
            p_offset: 0,
            p_vaddr: base,
            p_filesz: total,
            p_memsz: total,
            p_align: PAGE_ALIGN,
        }
        .write(&mut w);

        ProgramHeader {
            p_type: PT_GNU_STACK,
            p_flags: PF_R | PF_W | PF_X,
            p_offset: 0,
            p_vaddr: 0,
            p_filesz: 0,
            p_memsz: 0,
            p_align: 16,
        }
        .write(&mut w);

        debug_assert_eq!(w.len() as u64, code_offset);
        w.bytes(shellcode);

        debug!(
            "built {}-bit {} image: {} bytes, entry {:#x}",
            bits,
            ctx.arch,
            w.len(),
            entry
        );

        Ok(ExecutableImage::new(
            w.finish(),
            entry,
            code_offset as usize,
            *ctx,
        ))
    }
}
