use console::style;
use env_logger::{Builder, Env};
use log::{Level, LevelFilter};
use std::io::Write;

/// Initialize logger; `RUST_LOG` overrides the level chosen by `verbose`
pub fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env = Env::default().filter_or("RUST_LOG", default_level);

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            let level = match record.level() {
                Level::Error => format!("{}", style("ERROR").red().bold()),
                Level::Warn => format!("{}", style("WARN ").yellow().bold()),
                Level::Info => format!("{}", style("INFO ").green()),
                Level::Debug => format!("{}", style("DEBUG").cyan()),
                Level::Trace => format!("{}", style("TRACE").dim()),
            };
            match stage_label(record.target()) {
                Some(stage) => {
                    writeln!(buf, "{} [{}] {}", level, style(stage).dim(), record.args())
                }
                None => writeln!(buf, "{} {}", level, record.args()),
            }
        })
        .filter_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .parse_env(env)
        .init();
}

/// Pipeline stage a record came from, `None` for the CLI itself.
///
/// `shellrun_asm::assembler` is shown as `asm`, the facade crate as `shellrun`.
fn stage_label(target: &str) -> Option<&str> {
    let krate = target.split("::").next().unwrap_or(target);
    if krate == env!("CARGO_CRATE_NAME") {
        return None;
    }
    Some(krate.strip_prefix("shellrun_").unwrap_or(krate))
}
