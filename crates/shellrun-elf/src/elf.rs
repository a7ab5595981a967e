//! ELF constants and a header writer for 32- and 64-bit images

use shellrun_core::{Arch, Endian, Os};

/// ELF magic number: 0x7F 'E' 'L' 'F'
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

pub const ELFCLASS32: u8 = 1;
pub const ELFCLASS64: u8 = 2;

pub const ELFDATA2LSB: u8 = 1;
pub const ELFDATA2MSB: u8 = 2;

pub const EV_CURRENT: u8 = 1;

pub const ELFOSABI_SYSV: u8 = 0;
pub const ELFOSABI_FREEBSD: u8 = 9;

/// ELF type: executable
pub const ET_EXEC: u16 = 2;

pub const EM_386: u16 = 3;
pub const EM_ARM: u16 = 40;
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

/// ARM EABI version 5, required by Linux for static ARM binaries
pub const EF_ARM_EABI_VER5: u32 = 0x0500_0000;

/// Program header type: loadable segment
pub const PT_LOAD: u32 = 1;

/// Program header type: stack permissions
pub const PT_GNU_STACK: u32 = 0x6474_e551;

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

pub const PAGE_ALIGN: u64 = 0x1000;

/// Number of program headers every image carries
pub const PHNUM: u16 = 2;

pub fn machine(arch: Arch) -> u16 {
    match arch {
        Arch::Amd64 => EM_X86_64,
        Arch::I386 => EM_386,
        Arch::Aarch64 => EM_AARCH64,
        Arch::Arm => EM_ARM,
    }
}

pub fn flags(arch: Arch) -> u32 {
    match arch {
        Arch::Arm => EF_ARM_EABI_VER5,
        _ => 0,
    }
}

pub fn osabi(os: Os) -> u8 {
    match os {
        Os::Linux => ELFOSABI_SYSV,
        Os::Freebsd => ELFOSABI_FREEBSD,
    }
}

/// Conventional load address for static executables
pub fn base_address(arch: Arch) -> u64 {
    match arch {
        Arch::Amd64 | Arch::Aarch64 => 0x40_0000,
        Arch::I386 => 0x0804_8000,
        Arch::Arm => 0x1_0000,
    }
}

pub fn ehdr_size(bits: u8) -> u16 {
    if bits == 64 { 64 } else { 52 }
}

pub fn phdr_size(bits: u8) -> u16 {
    if bits == 64 { 56 } else { 32 }
}

/// Offset of the first byte after the headers
pub fn headers_size(bits: u8) -> u64 {
    ehdr_size(bits) as u64 + PHNUM as u64 * phdr_size(bits) as u64
}

/// Field-by-field writer honoring the target's word size and byte order
pub struct ElfWriter {
    buf: Vec<u8>,
    endian: Endian,
    bits: u8,
}

impl ElfWriter {
    pub fn new(endian: Endian, bits: u8, capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            endian,
            bits,
        }
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        match self.endian {
            Endian::Little => self.bytes(&v.to_le_bytes()),
            Endian::Big => self.bytes(&v.to_be_bytes()),
        }
    }

    pub fn u32(&mut self, v: u32) {
        match self.endian {
            Endian::Little => self.bytes(&v.to_le_bytes()),
            Endian::Big => self.bytes(&v.to_be_bytes()),
        }
    }

    pub fn u64(&mut self, v: u64) {
        match self.endian {
            Endian::Little => self.bytes(&v.to_le_bytes()),
            Endian::Big => self.bytes(&v.to_be_bytes()),
        }
    }

    /// Address/offset sized field (`ElfN_Addr`, `ElfN_Off`)
    pub fn word(&mut self, v: u64) {
        if self.bits == 64 {
            self.u64(v);
        } else {
            self.u32(v as u32);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Values for one program header
#[derive(Debug, Clone, Copy)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl ProgramHeader {
    /// Layout differs between classes: ELF64 places `p_flags` second,
    /// ELF32 places it after `p_memsz`.
    pub fn write(&self, w: &mut ElfWriter) {
        w.u32(self.p_type);
        if w.bits == 64 {
            w.u32(self.p_flags);
        }
        w.word(self.p_offset);
        w.word(self.p_vaddr);
        w.word(self.p_vaddr);
        w.word(self.p_filesz);
        w.word(self.p_memsz);
        if w.bits != 64 {
            w.u32(self.p_flags);
        }
        w.word(self.p_align);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_sizes_match_abi() {
        assert_eq!(headers_size(64), 64 + 2 * 56);
        assert_eq!(headers_size(32), 52 + 2 * 32);
    }

    #[test]
    fn writer_honors_endianness() {
        let mut le = ElfWriter::new(Endian::Little, 32, 4);
        le.u32(0x0102_0304);
        assert_eq!(le.finish(), vec![4, 3, 2, 1]);

        let mut be = ElfWriter::new(Endian::Big, 32, 4);
        be.u32(0x0102_0304);
        assert_eq!(be.finish(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn word_follows_class() {
        let mut w32 = ElfWriter::new(Endian::Little, 32, 8);
        w32.word(0x10);
        assert_eq!(w32.len(), 4);

        let mut w64 = ElfWriter::new(Endian::Little, 64, 8);
        w64.word(0x10);
        assert_eq!(w64.len(), 8);
    }

    #[test]
    fn program_header_sizes() {
        let ph = ProgramHeader {
            p_type: PT_LOAD,
            p_flags: PF_R | PF_X,
            p_offset: 0,
            p_vaddr: 0x1000,
            p_filesz: 1,
            p_memsz: 1,
            p_align: PAGE_ALIGN,
        };

        let mut w64 = ElfWriter::new(Endian::Little, 64, 56);
        ph.write(&mut w64);
        assert_eq!(w64.len(), phdr_size(64) as usize);

        let mut w32 = ElfWriter::new(Endian::Little, 32, 32);
        ph.write(&mut w32);
        assert_eq!(w32.len(), phdr_size(32) as usize);
        // p_flags is the seventh 32-bit field in ELF32
        let out = w32.finish();
        assert_eq!(&out[24..28], &(PF_R | PF_X).to_le_bytes());
    }

    #[test]
    fn machine_codes() {
        assert_eq!(machine(Arch::Amd64), 62);
        assert_eq!(machine(Arch::I386), 3);
        assert_eq!(machine(Arch::Aarch64), 183);
        assert_eq!(machine(Arch::Arm), 40);
    }
}
