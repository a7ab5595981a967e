//! Ambient target context with scoped per-call overrides
//!
//! Every thread sees a process-wide default [`Context`] unless it has pushed
//! an override. Overrides live on a thread-local stack, so a call running on
//! one thread never observes an override made by a sibling thread. A pushed
//! override is popped by [`ContextGuard`] on drop, which also covers early
//! returns and unwinding.
//!
//! # Example
//!
//! ```
//! use shellrun_core::{Arch, ContextConfig, context};
//!
//! let cfg = ContextConfig::new().arch(Arch::I386);
//! let bits = context::scoped(&cfg, |ctx| Ok(ctx.bits)).unwrap();
//! assert_eq!(bits, 32);
//! ```

use std::cell::RefCell;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{OnceLock, RwLock};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShellrunError};
use crate::target::{Arch, Endian, Os};

/// Fully resolved target context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    pub arch: Arch,
    pub os: Os,
    pub endian: Endian,
    /// Word size in bits
    pub bits: u8,
}

impl Default for Context {
    fn default() -> Self {
        let mut ctx = Context::new(Arch::host().unwrap_or(Arch::Amd64));
        if let Some(os) = Os::host() {
            ctx.os = os;
        }
        ctx
    }
}

impl Context {
    /// Linux context with the arch's native word size and byte order
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            os: Os::Linux,
            endian: arch.endian(),
            bits: arch.bits(),
        }
    }

    /// Word size in bytes
    pub fn bytes(&self) -> usize {
        self.bits as usize / 8
    }

    /// Check that the fields describe a target that can exist
    pub fn validate(&self) -> Result<()> {
        if self.bits != 32 && self.bits != 64 {
            return Err(ShellrunError::InvalidContext(format!(
                "word size must be 32 or 64 bits, got {}",
                self.bits
            )));
        }

        if self.bits != self.arch.bits() {
            return Err(ShellrunError::InvalidContext(format!(
                "{} is a {}-bit architecture, cannot use {} bits",
                self.arch,
                self.arch.bits(),
                self.bits
            )));
        }

        if self.endian == Endian::Big && !self.arch.supports_big_endian() {
            return Err(ShellrunError::InvalidContext(format!(
                "{} has no big-endian variant",
                self.arch
            )));
        }

        Ok(())
    }

    /// Apply an override on top of this context.
    ///
    /// Setting `arch` resets word size and byte order to the arch's natives
    /// first; explicit `bits`/`endian` in the same override then win.
    pub fn merged(&self, config: &ContextConfig) -> Result<Context> {
        let mut ctx = match config.arch {
            Some(arch) => Context {
                os: self.os,
                ..Context::new(arch)
            },
            None => *self,
        };

        if let Some(os) = config.os {
            ctx.os = os;
        }
        if let Some(endian) = config.endian {
            ctx.endian = endian;
        }
        if let Some(bits) = config.bits {
            ctx.bits = bits;
        }

        ctx.validate()?;
        Ok(ctx)
    }
}

/// Partial context override; unset fields inherit from the ambient context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    pub arch: Option<Arch>,
    pub os: Option<Os>,
    pub endian: Option<Endian>,
    pub bits: Option<u8>,
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arch(mut self, arch: Arch) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn os(mut self, os: Os) -> Self {
        self.os = Some(os);
        self
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    pub fn bits(mut self, bits: u8) -> Self {
        self.bits = Some(bits);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.arch.is_none() && self.os.is_none() && self.endian.is_none() && self.bits.is_none()
    }

    /// Combine two overrides; fields set in `other` take precedence
    pub fn overlay(&self, other: &ContextConfig) -> ContextConfig {
        // A new arch in `other` invalidates our bits/endian, which were
        // chosen for our arch.
        let arch_changed = other.arch.is_some() && other.arch != self.arch;
        ContextConfig {
            arch: other.arch.or(self.arch),
            os: other.os.or(self.os),
            endian: other
                .endian
                .or(if arch_changed { None } else { self.endian }),
            bits: other.bits.or(if arch_changed { None } else { self.bits }),
        }
    }

    /// Check the override for internal consistency against its own arch
    pub fn validate(&self) -> Result<()> {
        let base = Context::new(self.arch.unwrap_or(Arch::Amd64));
        match self.arch {
            Some(_) => base.merged(self).map(|_| ()),
            // Without an arch, only the word size itself can be checked.
            None => match self.bits {
                Some(bits) if bits != 32 && bits != 64 => Err(ShellrunError::InvalidContext(
                    format!("word size must be 32 or 64 bits, got {}", bits),
                )),
                _ => Ok(()),
            },
        }
    }

    /// Load an override from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            ShellrunError::InvalidContext(format!("{}: {}", path.display(), e))
        })
    }
}

fn defaults_lock() -> &'static RwLock<Context> {
    static DEFAULTS: OnceLock<RwLock<Context>> = OnceLock::new();
    DEFAULTS.get_or_init(|| RwLock::new(Context::default()))
}

thread_local! {
    static STACK: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

/// Process-wide default context
pub fn defaults() -> Context {
    *defaults_lock()
        .read()
        .unwrap_or_else(|poison| poison.into_inner())
}

/// Replace the process-wide default context.
///
/// Threads inside a scoped override keep seeing their override.
pub fn set_defaults(ctx: Context) -> Result<()> {
    ctx.validate()?;
    *defaults_lock()
        .write()
        .unwrap_or_else(|poison| poison.into_inner()) = ctx;
    Ok(())
}

/// Context visible to the calling thread
pub fn current() -> Context {
    STACK
        .with_borrow(|stack| stack.last().copied())
        .unwrap_or_else(defaults)
}

/// Push an override for the calling thread until the guard drops
pub fn local(config: &ContextConfig) -> Result<ContextGuard> {
    let ctx = current().merged(config)?;
    let depth = STACK.with_borrow_mut(|stack| {
        stack.push(ctx);
        stack.len()
    });
    trace!(
        "context push depth={} arch={} os={} endian={} bits={}",
        depth, ctx.arch, ctx.os, ctx.endian, ctx.bits
    );
    Ok(ContextGuard {
        depth,
        _not_send: PhantomData,
    })
}

/// Run `f` with `config` merged over the current context
pub fn scoped<T, F>(config: &ContextConfig, f: F) -> Result<T>
where
    F: FnOnce(&Context) -> Result<T>,
{
    let _guard = local(config)?;
    f(&current())
}

/// Pre-bind a context override onto an operation
pub fn bind<A, T, F>(config: ContextConfig, op: F) -> impl Fn(A) -> Result<T>
where
    F: Fn(A) -> Result<T>,
{
    move |arg| scoped(&config, |_| op(arg))
}

/// Pops the thread's context stack back to where it was when pushed
pub struct ContextGuard {
    depth: usize,
    // The stack is thread-local; the guard must drop on the pushing thread.
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    /// The context this guard pushed
    pub fn context(&self) -> Context {
        STACK
            .with_borrow(|stack| stack.get(self.depth - 1).copied())
            .unwrap_or_else(defaults)
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        STACK.with_borrow_mut(|stack| stack.truncate(self.depth - 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Barrier, Mutex};
    use std::thread;

    static DEFAULTS_LOCK: Mutex<()> = Mutex::new(());

    // Pins the thread's context so assertions do not race with tests that
    // change the process-wide defaults.
    fn pinned() -> ContextGuard {
        local(&ContextConfig::new().arch(Arch::Amd64)).unwrap()
    }

    #[test]
    fn test_context_new_uses_natives() {
        let ctx = Context::new(Arch::I386);
        assert_eq!(ctx.bits, 32);
        assert_eq!(ctx.endian, Endian::Little);
        assert_eq!(ctx.os, Os::Linux);
        assert_eq!(ctx.bytes(), 4);
    }

    #[test]
    fn default_context_is_valid() {
        Context::default().validate().unwrap();
    }

    #[test]
    fn merge_arch_resets_bits() {
        let base = Context::new(Arch::Amd64);
        let ctx = base.merged(&ContextConfig::new().arch(Arch::Arm)).unwrap();
        assert_eq!(ctx.arch, Arch::Arm);
        assert_eq!(ctx.bits, 32);
    }

    #[test]
    fn merge_keeps_os_when_arch_changes() {
        let base = Context {
            os: Os::Freebsd,
            ..Context::new(Arch::Amd64)
        };
        let ctx = base.merged(&ContextConfig::new().arch(Arch::I386)).unwrap();
        assert_eq!(ctx.os, Os::Freebsd);
    }

    #[test]
    fn merge_rejects_bits_mismatch() {
        let base = Context::new(Arch::Amd64);
        let err = base.merged(&ContextConfig::new().bits(32)).unwrap_err();
        assert!(matches!(err, ShellrunError::InvalidContext(_)));
    }

    #[test]
    fn merge_allows_big_endian_arm() {
        let base = Context::new(Arch::Amd64);
        let ctx = base
            .merged(&ContextConfig::new().arch(Arch::Arm).endian(Endian::Big))
            .unwrap();
        assert_eq!(ctx.endian, Endian::Big);
        assert!(
            base.merged(&ContextConfig::new().endian(Endian::Big))
                .is_err()
        );
    }

    #[test]
    fn overlay_prefers_other_and_drops_stale_bits() {
        let file = ContextConfig::new().arch(Arch::Amd64).bits(64);
        let flags = ContextConfig::new().arch(Arch::I386);
        let combined = file.overlay(&flags);
        assert_eq!(combined.arch, Some(Arch::I386));
        assert_eq!(combined.bits, None);
        combined.validate().unwrap();
    }

    #[test]
    fn config_validate_catches_bad_word_size() {
        assert!(ContextConfig::new().bits(16).validate().is_err());
        assert!(ContextConfig::new().bits(64).validate().is_ok());
        assert!(
            ContextConfig::new()
                .arch(Arch::Aarch64)
                .bits(32)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.json");
        fs::write(&path, r#"{"arch": "i386", "os": "linux"}"#).unwrap();
        let cfg = ContextConfig::load(&path).unwrap();
        assert_eq!(cfg.arch, Some(Arch::I386));
        assert_eq!(cfg.bits, None);
    }

    #[test]
    fn load_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.json");
        fs::write(&path, r#"{"arch": "i386", "signed": true}"#).unwrap();
        let err = ContextConfig::load(&path).unwrap_err();
        assert!(matches!(err, ShellrunError::InvalidContext(_)));
    }

    #[test]
    fn scoped_override_is_restored() {
        let _pin = pinned();
        let before = current();
        let inner = scoped(&ContextConfig::new().arch(Arch::Arm), |ctx| {
            assert_eq!(current().arch, Arch::Arm);
            Ok(ctx.arch)
        })
        .unwrap();
        assert_eq!(inner, Arch::Arm);
        assert_eq!(current(), before);
    }

    #[test]
    fn scoped_override_is_restored_after_error() {
        let _pin = pinned();
        let before = current();
        let result: Result<()> = scoped(&ContextConfig::new().arch(Arch::Arm), |_| {
            Err(ShellrunError::Build("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(current(), before);
    }

    #[test]
    fn scoped_override_is_restored_after_panic() {
        let _pin = pinned();
        let before = current();
        let caught = std::panic::catch_unwind(|| {
            let _ = scoped(&ContextConfig::new().arch(Arch::Aarch64), |_| -> Result<()> {
                panic!("inside scope")
            });
        });
        assert!(caught.is_err());
        assert_eq!(current(), before);
    }

    #[test]
    fn invalid_override_pushes_nothing() {
        let _pin = pinned();
        let before = current();
        assert!(local(&ContextConfig::new().bits(8)).is_err());
        assert_eq!(current(), before);
    }

    #[test]
    fn nested_scopes_unwind_in_order() {
        let _pin = pinned();
        let _outer = local(&ContextConfig::new().arch(Arch::I386)).unwrap();
        {
            let inner = local(&ContextConfig::new().os(Os::Freebsd)).unwrap();
            assert_eq!(inner.context().arch, Arch::I386);
            assert_eq!(current().os, Os::Freebsd);
        }
        assert_eq!(current().arch, Arch::I386);
        assert_eq!(current().os, Os::Linux);
    }

    #[test]
    fn sibling_threads_do_not_see_overrides() {
        let barrier = std::sync::Arc::new(Barrier::new(2));
        let b1 = barrier.clone();
        let overriding = thread::spawn(move || {
            scoped(&ContextConfig::new().arch(Arch::Arm), |_| {
                b1.wait();
                b1.wait();
                Ok(current().arch)
            })
            .unwrap()
        });

        let b2 = barrier.clone();
        let observing = thread::spawn(move || {
            b2.wait();
            let seen = current();
            b2.wait();
            seen
        });

        assert_eq!(overriding.join().unwrap(), Arch::Arm);
        assert_ne!(observing.join().unwrap().arch, Arch::Arm);
    }

    #[test]
    fn bind_applies_config_per_call() {
        let bits_of = bind(ContextConfig::new().arch(Arch::I386), |extra: u32| {
            Ok(current().bits as u32 + extra)
        });
        assert_eq!(bits_of(1).unwrap(), 33);
        assert_eq!(bits_of(0).unwrap(), 32);
    }

    #[test]
    fn set_defaults_changes_thread_fallback() {
        let _lock = DEFAULTS_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let previous = defaults();

        set_defaults(Context::new(Arch::Aarch64)).unwrap();
        let seen = thread::spawn(current).join().unwrap();
        assert_eq!(seen.arch, Arch::Aarch64);

        set_defaults(previous).unwrap();
        assert_eq!(defaults(), previous);
    }

    #[test]
    fn set_defaults_rejects_invalid_context() {
        let bad = Context {
            bits: 32,
            ..Context::new(Arch::Amd64)
        };
        assert!(set_defaults(bad).is_err());
    }
}
