use std::fs;

use log::debug;
use shellrun::Runner;

use crate::cli::InputArgs;

/// Resolve the input to shellcode bytes, assembling with `runner` if needed
pub fn load_shellcode(
    input: &InputArgs,
    runner: &Runner,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if let Some(text) = &input.asm {
        return Ok(runner.assemble(text)?);
    }

    if let Some(hex) = &input.hex {
        return Ok(parse_hex(hex)?);
    }

    if let Some(path) = &input.file {
        debug!("reading shellcode from {}", path.display());
        return fs::read(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e).into());
    }

    Err("no shellcode given (use --asm, --hex or --file)".into())
}

/// Parse hex like `bf03000000`, `bf 03 00`, `\xbf\x03` or `0xbf03`
pub fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: String = text
        .replace("\\x", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);

    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in {:?}", text));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex near offset {} in {:?}", i, text))
        })
        .collect()
}

/// Lowercase hex without separators
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
