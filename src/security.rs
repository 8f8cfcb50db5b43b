#![forbid(unsafe_code)]

//! Startup guards shared by the channelhub binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Refuses to start a binary as root. The cache only ever needs to touch
/// its own data directory, so a dedicated unprivileged account is always
/// the right way to run it.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!("{process} must not run as root; use an unprivileged service account");
    }
    Ok(())
}
