//! Target description: architecture, operating system and byte order

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShellrunError};

/// Byte order of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endian::Little => "little",
            Endian::Big => "big",
        }
    }
}

impl FromStr for Endian {
    type Err = ShellrunError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "little" | "le" | "el" => Ok(Endian::Little),
            "big" | "be" | "eb" => Ok(Endian::Big),
            _ => Err(ShellrunError::InvalidContext(format!(
                "unknown endianness: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Freebsd,
}

impl Os {
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Freebsd => "freebsd",
        }
    }

    /// OS of the running host, when it is a supported target
    pub fn host() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Os::Linux)
        } else if cfg!(target_os = "freebsd") {
            Some(Os::Freebsd)
        } else {
            None
        }
    }
}

impl FromStr for Os {
    type Err = ShellrunError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Os::Linux),
            "freebsd" => Ok(Os::Freebsd),
            _ => Err(ShellrunError::InvalidContext(format!("unknown os: {}", s))),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target instruction set architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    I386,
    Aarch64,
    Arm,
}

impl Arch {
    /// Get canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::I386 => "i386",
            Arch::Aarch64 => "aarch64",
            Arch::Arm => "arm",
        }
    }

    /// Native word size in bits
    pub fn bits(&self) -> u8 {
        match self {
            Arch::Amd64 | Arch::Aarch64 => 64,
            Arch::I386 | Arch::Arm => 32,
        }
    }

    /// Native byte order
    pub fn endian(&self) -> Endian {
        Endian::Little
    }

    /// Whether the arch can be configured big-endian
    pub fn supports_big_endian(&self) -> bool {
        matches!(self, Arch::Aarch64 | Arch::Arm)
    }

    /// Architecture of the running host, when it is a supported target
    pub fn host() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Arch::Amd64)
        } else if cfg!(target_arch = "x86") {
            Some(Arch::I386)
        } else if cfg!(target_arch = "aarch64") {
            Some(Arch::Aarch64)
        } else if cfg!(target_arch = "arm") {
            Some(Arch::Arm)
        } else {
            None
        }
    }

    pub fn all() -> [Arch; 4] {
        [Arch::Amd64, Arch::I386, Arch::Aarch64, Arch::Arm]
    }
}

impl FromStr for Arch {
    type Err = ShellrunError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "amd64" | "x86_64" | "x86-64" | "x64" => Ok(Arch::Amd64),
            "i386" | "x86" | "i686" | "ia32" => Ok(Arch::I386),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            "arm" | "armv7" | "armel" => Ok(Arch::Arm),
            _ => Err(ShellrunError::InvalidContext(format!(
                "unknown architecture: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_aliases_parse() {
        assert_eq!("x86_64".parse::<Arch>().unwrap(), Arch::Amd64);
        assert_eq!("AMD64".parse::<Arch>().unwrap(), Arch::Amd64);
        assert_eq!("i686".parse::<Arch>().unwrap(), Arch::I386);
        assert_eq!("arm64".parse::<Arch>().unwrap(), Arch::Aarch64);
        assert_eq!("armv7".parse::<Arch>().unwrap(), Arch::Arm);
    }

    #[test]
    fn unknown_arch_is_invalid_context() {
        let err = "mips".parse::<Arch>().unwrap_err();
        assert!(matches!(err, ShellrunError::InvalidContext(_)));
        assert!(err.to_string().contains("mips"));
    }

    #[test]
    fn arch_natives() {
        assert_eq!(Arch::Amd64.bits(), 64);
        assert_eq!(Arch::I386.bits(), 32);
        assert_eq!(Arch::Aarch64.bits(), 64);
        assert_eq!(Arch::Arm.bits(), 32);
        assert!(Arch::all().iter().all(|a| a.endian() == Endian::Little));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for arch in Arch::all() {
            assert_eq!(arch.to_string().parse::<Arch>().unwrap(), arch);
        }
    }

    #[test]
    fn endian_and_os_parse() {
        assert_eq!("be".parse::<Endian>().unwrap(), Endian::Big);
        assert_eq!("Little".parse::<Endian>().unwrap(), Endian::Little);
        assert_eq!("FreeBSD".parse::<Os>().unwrap(), Os::Freebsd);
        assert!("windows".parse::<Os>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Arch::Aarch64).unwrap();
        assert_eq!(json, "\"aarch64\"");
        let os: Os = serde_json::from_str("\"linux\"").unwrap();
        assert_eq!(os, Os::Linux);
    }
}
