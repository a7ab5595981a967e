//! Talk to running shellcode through its standard streams

use std::time::Duration;

use shellrun::{Arch, RunnerBuilder};

// n = read(0, rsp, 64); write(1, rsp, n); exit(0)
const ECHO: &[u8] = &[
    0x48, 0x83, 0xec, 0x40, 0x31, 0xc0, 0x31, 0xff, 0x48, 0x89, 0xe6, 0xba, 0x40, 0x00, 0x00,
    0x00, 0x0f, 0x05, 0x89, 0xc2, 0xbf, 0x01, 0x00, 0x00, 0x00, 0xb8, 0x01, 0x00, 0x00, 0x00,
    0x0f, 0x05, 0x31, 0xff, 0xb8, 0x3c, 0x00, 0x00, 0x00, 0x0f, 0x05,
];

fn main() -> shellrun::Result<()> {
    let runner = RunnerBuilder::new().arch(Arch::Amd64).build()?;

    let mut running = runner.run_shellcode(ECHO)?;
    println!("pid {} from {}", running.pid(), running.staged_path().display());

    running.sendline(b"hello shellcode")?;
    let reply = running.recv_line(Some(Duration::from_secs(5)))?;
    print!("echoed: {}", String::from_utf8_lossy(&reply));

    println!("{}", running.wait()?);
    Ok(())
}
