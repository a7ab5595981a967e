//! Run amd64 shellcode and report how it terminated

use shellrun::{Arch, Cleanup, RunnerBuilder};

// mov edi, 3; mov eax, 60; syscall
const EXIT_3: &[u8] = &[
    0xbf, 0x03, 0x00, 0x00, 0x00, 0xb8, 0x3c, 0x00, 0x00, 0x00, 0x0f, 0x05,
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== shellrun - Exit Code Example ===\n");

    let runner = RunnerBuilder::new()
        .arch(Arch::Amd64)
        .cleanup(Cleanup::OnDrop)
        .build()?;

    println!("[1] Running raw shellcode ({} bytes)...", EXIT_3.len());
    let status = runner.run_shellcode_until_exit(EXIT_3)?;
    println!("[*] {}", status);

    if shellrun::toolchain::available(Arch::Amd64) {
        println!("[2] Assembling and running the same program...");
        let status =
            runner.run_assembly_until_exit("mov edi, 3; mov eax, SYS_exit; syscall")?;
        println!("[*] {}", status);
    } else {
        println!("[2] Skipped: no amd64 binutils on PATH");
    }

    Ok(())
}
