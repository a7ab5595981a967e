//! Syscall-number constants usable by name in assembly text
//!
//! Names are replaced textually before assembling, so `mov eax, SYS_exit`
//! and `mov r7, #SYS_exit` both end up with a plain immediate.

use shellrun_core::{Arch, Context, Os};

type Table = &'static [(&'static str, u32)];

const LINUX_AMD64: Table = &[
    ("SYS_read", 0),
    ("SYS_write", 1),
    ("SYS_open", 2),
    ("SYS_close", 3),
    ("SYS_mmap", 9),
    ("SYS_mprotect", 10),
    ("SYS_getpid", 39),
    ("SYS_execve", 59),
    ("SYS_exit", 60),
    ("SYS_kill", 62),
    ("SYS_exit_group", 231),
    ("SYS_openat", 257),
];

const LINUX_I386: Table = &[
    ("SYS_exit", 1),
    ("SYS_read", 3),
    ("SYS_write", 4),
    ("SYS_open", 5),
    ("SYS_close", 6),
    ("SYS_execve", 11),
    ("SYS_getpid", 20),
    ("SYS_kill", 37),
    ("SYS_mmap", 90),
    ("SYS_mprotect", 125),
    ("SYS_mmap2", 192),
    ("SYS_exit_group", 252),
    ("SYS_openat", 295),
];

const LINUX_AARCH64: Table = &[
    ("SYS_openat", 56),
    ("SYS_close", 57),
    ("SYS_read", 63),
    ("SYS_write", 64),
    ("SYS_exit", 93),
    ("SYS_exit_group", 94),
    ("SYS_kill", 129),
    ("SYS_getpid", 172),
    ("SYS_execve", 221),
    ("SYS_mmap", 222),
    ("SYS_mprotect", 226),
];

const LINUX_ARM: Table = &[
    ("SYS_exit", 1),
    ("SYS_read", 3),
    ("SYS_write", 4),
    ("SYS_open", 5),
    ("SYS_close", 6),
    ("SYS_execve", 11),
    ("SYS_getpid", 20),
    ("SYS_kill", 37),
    ("SYS_mprotect", 125),
    ("SYS_mmap2", 192),
    ("SYS_exit_group", 248),
    ("SYS_openat", 322),
];

// FreeBSD numbers are shared by every architecture.
const FREEBSD: Table = &[
    ("SYS_exit", 1),
    ("SYS_read", 3),
    ("SYS_write", 4),
    ("SYS_open", 5),
    ("SYS_close", 6),
    ("SYS_getpid", 20),
    ("SYS_kill", 37),
    ("SYS_execve", 59),
    ("SYS_mprotect", 74),
    ("SYS_mmap", 477),
    ("SYS_openat", 499),
];

/// Syscall constants for the target
pub fn syscalls(ctx: &Context) -> Table {
    match (ctx.os, ctx.arch) {
        (Os::Freebsd, _) => FREEBSD,
        (Os::Linux, Arch::Amd64) => LINUX_AMD64,
        (Os::Linux, Arch::I386) => LINUX_I386,
        (Os::Linux, Arch::Aarch64) => LINUX_AARCH64,
        (Os::Linux, Arch::Arm) => LINUX_ARM,
    }
}

pub fn lookup(ctx: &Context, name: &str) -> Option<u32> {
    syscalls(ctx)
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
}

/// Replace every whole-word constant name in `text` with its value
pub fn expand(text: &str, ctx: &Context) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if !(c.is_ascii_alphabetic() || c == '_') {
            out.push(c);
            continue;
        }

        let mut end = start + c.len_utf8();
        while let Some(&(i, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                end = i + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        let word = &text[start..end];
        match lookup(ctx, word) {
            Some(value) => out.push_str(&value.to_string()),
            None => out.push_str(word),
        }
    }

    out
}
