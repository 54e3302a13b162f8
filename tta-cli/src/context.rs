// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run-wide state threaded explicitly through a single `encode` or
//! `decode` invocation, plus the one piece of state that genuinely
//! can't be threaded that way: the path of the file currently being
//! written, which a Ctrl-C handler needs process-wide access to.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub struct Context {
    quiet: bool,
    warnings: AtomicU32,
    current_destination: Arc<Mutex<Option<PathBuf>>>,
}

impl Context {
    pub fn new(quiet: bool) -> Self {
        Context { quiet, warnings: AtomicU32::new(0), current_destination: Arc::new(Mutex::new(None)) }
    }

    pub fn warn(&self, message: impl std::fmt::Display) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
        log::warn!("{message}");
        if !self.quiet {
            eprintln!("tta: warning: {message}");
        }
    }

    pub fn error(&self, message: impl std::fmt::Display) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
        log::error!("{message}");
        eprintln!("tta: error: {message}");
    }

    /// Process exit status: the warning/error count, saturated to a
    /// normal shell exit-code range. Zero means a clean run.
    pub fn exit_code(&self) -> i32 {
        self.warnings.load(Ordering::Relaxed).min(255) as i32
    }

    /// Records the file a writer is currently producing, so a SIGINT
    /// mid-write has somewhere to look. Pass `None` once the file is
    /// complete or closed.
    pub fn set_current_destination(&self, path: Option<PathBuf>) {
        *self.current_destination.lock().unwrap() = path;
    }

    /// Installs a process-wide SIGINT handler that removes whatever
    /// path is currently recorded via [`Self::set_current_destination`]
    /// before exiting, so an interrupted run doesn't leave a truncated
    /// file behind. Should be called at most once per process.
    pub fn install_sigint_handler(&self) -> anyhow::Result<()> {
        let destination = Arc::clone(&self.current_destination);
        ctrlc::set_handler(move || {
            if let Some(path) = destination.lock().unwrap().take() {
                let _ = remove_partial_file(&path);
            }
            std::process::exit(130);
        })?;
        Ok(())
    }
}

fn remove_partial_file(path: &Path) -> std::io::Result<()> {
    std::fs::remove_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_counts_warnings_and_errors() {
        let ctx = Context::new(true);
        assert_eq!(ctx.exit_code(), 0);
        ctx.warn("first");
        ctx.error("second");
        assert_eq!(ctx.exit_code(), 2);
    }

    #[test]
    fn exit_code_saturates() {
        let ctx = Context::new(true);
        for _ in 0..300 {
            ctx.warn("spam");
        }
        assert_eq!(ctx.exit_code(), 255);
    }
}
