//! Tiny WASI command modules written as WAT.
//!
//! A [`CommandModule`] checks that some files exist in its filesystem,
//! writes fixed contents to others, and optionally exits with a status or
//! spins forever. That is enough to stand in for the translator and the
//! search in host checks and tests.

use std::fmt::Write as _;
use std::path::Path;

/// Exit status when a required file cannot be opened (sysexits EX_NOINPUT).
pub const EXIT_MISSING_INPUT: i32 = 66;
/// Exit status when an output cannot be created (sysexits EX_CANTCREAT).
pub const EXIT_CANT_CREATE: i32 = 73;

// All 29 preview 1 rights.
const ALL_RIGHTS: u64 = 0x1FFF_FFFF;
const OFLAGS_CREAT_TRUNC: u32 = 1 | 8;
// Scratch layout: opened fd at 0, iovec at 8..16, nwritten at 16.
const FD_SLOT: u32 = 0;
const IOVEC: u32 = 8;
const NWRITTEN: u32 = 16;
const DATA_START: u32 = 1024;

#[derive(Debug, Clone)]
pub struct CommandModule {
    export: String,
    requires: Vec<String>,
    writes: Vec<(String, Vec<u8>)>,
    exit_code: Option<i32>,
    spin: bool,
}

impl Default for CommandModule {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandModule {
    pub fn new() -> Self {
        Self {
            export: "_start".into(),
            requires: Vec::new(),
            writes: Vec::new(),
            exit_code: None,
            spin: false,
        }
    }

    /// Exit with [`EXIT_MISSING_INPUT`] unless `path` exists.
    pub fn requires(mut self, path: &str) -> Self {
        self.requires.push(guest_relative(path));
        self
    }

    /// Create (or truncate) `path` and write `content` to it.
    pub fn writes(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.writes.push((guest_relative(path), content.into()));
        self
    }

    /// Finish with `proc_exit(code)`.
    pub fn exits_with(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Loop forever after the file operations.
    pub fn spins(mut self) -> Self {
        self.spin = true;
        self
    }

    /// Export the body under `name` instead of `_start`.
    pub fn export_as(mut self, name: impl Into<String>) -> Self {
        self.export = name.into();
        self
    }

    pub fn to_wat(&self) -> String {
        let mut data = String::new();
        let mut body = String::new();
        let mut offset = DATA_START;
        let mut place = |bytes: &[u8], data: &mut String| -> (u32, u32) {
            let at = offset;
            let _ = writeln!(data, "  (data (i32.const {at}) \"{}\")", escape(bytes));
            offset += (bytes.len() as u32).div_ceil(8) * 8 + 8;
            (at, bytes.len() as u32)
        };

        for path in &self.requires {
            let (ptr, len) = place(path.as_bytes(), &mut data);
            let _ = writeln!(body, "{}", open_call(ptr, len, 0, EXIT_MISSING_INPUT));
            let _ = writeln!(body, "    (drop (call $fd_close (i32.load (i32.const {FD_SLOT}))))");
        }

        for (path, content) in &self.writes {
            let (ptr, len) = place(path.as_bytes(), &mut data);
            let (cptr, clen) = place(content, &mut data);
            let _ = writeln!(body, "{}", open_call(ptr, len, OFLAGS_CREAT_TRUNC, EXIT_CANT_CREATE));
            let _ = writeln!(body, "    (i32.store (i32.const {IOVEC}) (i32.const {cptr}))");
            let _ = writeln!(body, "    (i32.store (i32.const {}) (i32.const {clen}))", IOVEC + 4);
            let _ = writeln!(
                body,
                "    (drop (call $fd_write (i32.load (i32.const {FD_SLOT})) (i32.const {IOVEC}) (i32.const 1) (i32.const {NWRITTEN})))"
            );
            let _ = writeln!(body, "    (drop (call $fd_close (i32.load (i32.const {FD_SLOT}))))");
        }

        if self.spin {
            let _ = writeln!(body, "    (loop $spin (br $spin))");
        }
        if let Some(code) = self.exit_code {
            let _ = writeln!(body, "    (call $proc_exit (i32.const {code}))");
        }

        let pages = (offset / 65536) + 1;
        format!(
            r#"(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_close"
    (func $fd_close (param i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit"
    (func $proc_exit (param i32)))
  (memory (export "memory") {pages})
{data}  (func (export "{export}")
{body}  )
)
"#,
            export = self.export,
        )
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_wat())
    }
}

/// `path_open` relative to the first preopen (fd 3), exiting with
/// `exit_code` on any errno.
fn open_call(ptr: u32, len: u32, oflags: u32, exit_code: i32) -> String {
    format!(
        "    (if (call $path_open (i32.const 3) (i32.const 0) (i32.const {ptr}) (i32.const {len}) \
         (i32.const {oflags}) (i64.const {ALL_RIGHTS}) (i64.const {ALL_RIGHTS}) (i32.const 0) (i32.const {FD_SLOT}))\n      \
         (then (call $proc_exit (i32.const {exit_code}))))"
    )
}

fn guest_relative(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

fn escape(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{b:02x}")).collect()
}
