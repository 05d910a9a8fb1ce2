#![allow(clippy::module_name_repetitions)]
/*!
Pre-load injection capability and its platform adapters.

- InjectableRuntime: the seam the launcher talks to
- PreloadRuntime: loader-variable based injection (LD_PRELOAD, DYLD_INSERT_LIBRARIES)
- UnsupportedRuntime: platforms without a pre-load mechanism

Activation only edits the environment handed to the child; descendants inherit
it, which is what makes interception transitive.
*/
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::HookError;
use crate::overlay::EnvSnapshot;

/// Binary formats the dynamic loaders accept for pre-loading.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ObjectFormat {
    Elf,
    MachO,
}

pub trait InjectableRuntime: Send + Sync {
    /// Short mechanism name for diagnostics.
    fn name(&self) -> &'static str;

    /// Loader variable that carries the library, when there is one.
    fn preload_var(&self) -> Option<&'static str>;

    /// Check that `library` can be pre-loaded into `target` and register it in `env`.
    fn activate(
        &self,
        library: &Path,
        target: Option<&Path>,
        env: &mut EnvSnapshot,
    ) -> Result<(), HookError>;
}

#[derive(Clone, Debug)]
pub struct PreloadRuntime {
    name: &'static str,
    var: &'static str,
    format: ObjectFormat,
    extra_env: &'static [(&'static str, &'static str)],
    // Loader strips the variable for binaries under these prefixes.
    stripped_prefixes: &'static [&'static str],
}

impl PreloadRuntime {
    pub fn ld_preload() -> Self {
        Self {
            name: "ld-preload",
            var: "LD_PRELOAD",
            format: ObjectFormat::Elf,
            extra_env: &[],
            stripped_prefixes: &[],
        }
    }

    pub fn dyld_insert() -> Self {
        Self {
            name: "dyld-insert-libraries",
            var: "DYLD_INSERT_LIBRARIES",
            format: ObjectFormat::MachO,
            extra_env: &[("DYLD_FORCE_FLAT_NAMESPACE", "1")],
            stripped_prefixes: &["/usr/bin/", "/bin/", "/usr/sbin/", "/sbin/", "/System/"],
        }
    }

    pub fn format(&self) -> ObjectFormat {
        self.format
    }
}

impl InjectableRuntime for PreloadRuntime {
    fn name(&self) -> &'static str {
        self.name
    }

    fn preload_var(&self) -> Option<&'static str> {
        Some(self.var)
    }

    fn activate(
        &self,
        library: &Path,
        target: Option<&Path>,
        env: &mut EnvSnapshot,
    ) -> Result<(), HookError> {
        if let Err(reason) = check_preload_entry(library.as_os_str()) {
            return Err(unsupported(library, reason));
        }
        check_object_format(library, self.format)?;
        if let Some(exe) = target {
            check_not_secure_exec(library, exe)?;
            if self.stripped_prefixes.iter().any(|p| exe.starts_with(p)) {
                warn!(
                    target_exe = %exe.display(),
                    var = self.var,
                    "loader strips pre-load variables for this target; \
                     interception relies on re-injection by the library"
                );
            }
        }

        let value = prepend_preload_entry(env.get(self.var), library.as_os_str());
        debug!(var = self.var, value = ?value, "pre-load registered");
        env.set(self.var, value);
        for (k, v) in self.extra_env {
            env.set(*k, *v);
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct UnsupportedRuntime {
    reason: &'static str,
}

impl UnsupportedRuntime {
    pub fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

impl InjectableRuntime for UnsupportedRuntime {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn preload_var(&self) -> Option<&'static str> {
        None
    }

    fn activate(
        &self,
        library: &Path,
        _target: Option<&Path>,
        _env: &mut EnvSnapshot,
    ) -> Result<(), HookError> {
        Err(HookError::InjectionUnsupported {
            library: library.to_path_buf(),
            reason: self.reason.to_string(),
        })
    }
}

/// Adapter for the platform this binary was built for.
pub fn platform_runtime() -> Box<dyn InjectableRuntime> {
    #[cfg(target_os = "macos")]
    {
        Box::new(PreloadRuntime::dyld_insert())
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Box::new(PreloadRuntime::ld_preload())
    }
    #[cfg(not(unix))]
    {
        Box::new(UnsupportedRuntime::new(
            "this platform has no loader pre-load mechanism",
        ))
    }
}

fn is_list_separator(b: u8) -> bool {
    b == b':' || b.is_ascii_whitespace()
}

/// A loader list entry must survive the loader's split on ':' and whitespace.
///
/// Anything else would be cut into fragments the loader ignores, leaving the
/// tree unhooked while the launch still succeeds.
pub fn check_preload_entry(library: &OsStr) -> Result<(), String> {
    let Some(text) = library.to_str() else {
        return Err(format!(
            "path {library:?} is not valid UTF-8 and cannot be carried in a loader list"
        ));
    };
    if text.is_empty() {
        return Err("path is empty".to_string());
    }
    if let Some(c) = text.bytes().find(|b| is_list_separator(*b)) {
        return Err(format!(
            "path {text:?} contains {:?}, which the loader treats as a list separator",
            char::from(c)
        ));
    }
    Ok(())
}

/// Put `library` first in a loader list, dropping empty entries and duplicates of it.
///
/// glibc accepts both ':' and whitespace as separators; the result always uses ':'.
/// Existing entries are kept byte for byte.
pub fn prepend_preload_entry(existing: Option<&OsStr>, library: &OsStr) -> OsString {
    let mut entries: Vec<&OsStr> = vec![library];
    if let Some(list) = existing {
        for e in split_loader_list(list) {
            if !e.is_empty() && !entries.contains(&e) {
                entries.push(e);
            }
        }
    }
    let mut out = OsString::new();
    for (i, e) in entries.iter().enumerate() {
        if i > 0 {
            out.push(":");
        }
        out.push(e);
    }
    out
}

#[cfg(unix)]
fn split_loader_list(list: &OsStr) -> Vec<&OsStr> {
    use std::os::unix::ffi::OsStrExt;
    list.as_bytes()
        .split(|b| is_list_separator(*b))
        .map(OsStr::from_bytes)
        .collect()
}

#[cfg(not(unix))]
fn split_loader_list(list: &OsStr) -> Vec<&OsStr> {
    match list.to_str() {
        Some(text) => text
            .split(|c: char| c == ':' || c.is_whitespace())
            .map(OsStr::new)
            .collect(),
        None => vec![list],
    }
}

fn unsupported(library: &Path, reason: impl Into<String>) -> HookError {
    HookError::InjectionUnsupported {
        library: library.to_path_buf(),
        reason: reason.into(),
    }
}

/// Verify the header of `library` describes a loadable shared object of `format`.
pub fn check_object_format(library: &Path, format: ObjectFormat) -> Result<(), HookError> {
    let mut header = [0u8; 20];
    let n = read_prefix(library, &mut header).map_err(|source| HookError::LibraryMissing {
        path: library.to_path_buf(),
        source,
    })?;
    let header = &header[..n];
    match format {
        ObjectFormat::Elf => check_elf(library, header),
        ObjectFormat::MachO => check_macho(library, header),
    }
}

fn read_prefix(path: &Path, buf: &mut [u8]) -> io::Result<usize> {
    let mut f = File::open(path)?;
    let mut filled = 0;
    while filled < buf.len() {
        let n = f.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

const ET_DYN: u16 = 3;

fn check_elf(library: &Path, header: &[u8]) -> Result<(), HookError> {
    if header.len() < 18 || &header[..4] != b"\x7fELF" {
        return Err(unsupported(library, "not an ELF object"));
    }
    let e_type = match header[5] {
        1 => u16::from_le_bytes([header[16], header[17]]),
        2 => u16::from_be_bytes([header[16], header[17]]),
        other => {
            return Err(unsupported(
                library,
                format!("unknown ELF data encoding {other}"),
            ))
        }
    };
    if e_type != ET_DYN {
        return Err(unsupported(
            library,
            format!("ELF object is not a shared library (e_type={e_type})"),
        ));
    }
    Ok(())
}

const MH_DYLIB: u32 = 6;
const MH_BUNDLE: u32 = 8;

fn check_macho(library: &Path, header: &[u8]) -> Result<(), HookError> {
    if header.len() < 16 {
        return Err(unsupported(library, "not a Mach-O object"));
    }
    let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let filetype = match magic {
        // fat/universal: slices are checked by dyld itself
        0xcafe_babe | 0xbeba_feca => return Ok(()),
        0xfeed_face | 0xfeed_facf => {
            u32::from_be_bytes([header[12], header[13], header[14], header[15]])
        }
        0xcefa_edfe | 0xcffa_edfe => {
            u32::from_le_bytes([header[12], header[13], header[14], header[15]])
        }
        _ => return Err(unsupported(library, "not a Mach-O object")),
    };
    if filetype != MH_DYLIB && filetype != MH_BUNDLE {
        return Err(unsupported(
            library,
            format!("Mach-O object is not a dylib or bundle (filetype={filetype})"),
        ));
    }
    Ok(())
}

/// setuid/setgid targets run in secure-execution mode where the loader ignores pre-load.
#[cfg(unix)]
fn check_not_secure_exec(library: &Path, exe: &Path) -> Result<(), HookError> {
    use nix::unistd::{getegid, geteuid};
    use std::os::unix::fs::MetadataExt;

    let Ok(meta) = std::fs::metadata(exe) else {
        return Ok(());
    };
    let mode = meta.mode();
    let setuid = mode & 0o4000 != 0 && meta.uid() != geteuid().as_raw();
    let setgid = mode & 0o2000 != 0 && meta.gid() != getegid().as_raw();
    if setuid || setgid {
        return Err(unsupported(
            library,
            format!(
                "{} is setuid/setgid; the loader ignores pre-load for it",
                exe.display()
            ),
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_not_secure_exec(_library: &Path, _exe: &Path) -> Result<(), HookError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_bytes(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        let mut f = File::create(&p).expect("create");
        f.write_all(bytes).expect("write");
        p
    }

    fn elf_header(e_type: u16) -> Vec<u8> {
        let mut h = vec![0u8; 64];
        h[..4].copy_from_slice(b"\x7fELF");
        h[4] = 2;
        h[5] = 1;
        h[6] = 1;
        h[16..18].copy_from_slice(&e_type.to_le_bytes());
        h
    }

    #[test]
    fn test_prepend_preload_entry_dedups() {
        let h = OsStr::new("/h.so");
        assert_eq!(prepend_preload_entry(None, h), "/h.so");
        assert_eq!(
            prepend_preload_entry(Some(OsStr::new("/a.so /h.so:/b.so::")), h),
            "/h.so:/a.so:/b.so"
        );
    }

    #[test]
    fn test_preload_entry_rejects_separators() {
        assert!(check_preload_entry(OsStr::new("/opt/hooks/libhook.so")).is_ok());
        for bad in ["/opt/my hooks/libhook.so", "/opt/a:b/libhook.so", "/opt/x\tlib.so", ""] {
            assert!(check_preload_entry(OsStr::new(bad)).is_err(), "{bad:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_preload_entry_rejects_non_utf8() {
        use std::os::unix::ffi::OsStrExt;
        let err = check_preload_entry(OsStr::from_bytes(b"/opt/\xff/libhook.so")).unwrap_err();
        assert!(err.contains("UTF-8"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_non_utf8_entries_are_kept_verbatim() {
        use std::os::unix::ffi::OsStrExt;
        let existing = OsStr::from_bytes(b"/opt/\xfe.so");
        let value = prepend_preload_entry(Some(existing), OsStr::new("/h.so"));
        assert_eq!(value.as_bytes(), b"/h.so:/opt/\xfe.so");
    }

    #[test]
    fn test_activation_refuses_library_path_with_space() {
        let td = tempfile::tempdir().expect("tmpdir");
        let dir = td.path().join("my hooks");
        std::fs::create_dir(&dir).expect("mkdir");
        let lib = write_bytes(&dir, "hook.so", &elf_header(ET_DYN));
        let mut env = EnvSnapshot::default();
        let err = PreloadRuntime::ld_preload()
            .activate(&lib, None, &mut env)
            .unwrap_err();
        assert!(matches!(err, HookError::InjectionUnsupported { .. }), "{err}");
        assert!(!env.contains("LD_PRELOAD"));
    }

    #[test]
    fn test_elf_shared_object_accepted() {
        let td = tempfile::tempdir().expect("tmpdir");
        let lib = write_bytes(td.path(), "hook.so", &elf_header(ET_DYN));
        assert!(check_object_format(&lib, ObjectFormat::Elf).is_ok());
    }

    #[test]
    fn test_elf_executable_rejected() {
        let td = tempfile::tempdir().expect("tmpdir");
        let lib = write_bytes(td.path(), "hook.so", &elf_header(2));
        let err = check_object_format(&lib, ObjectFormat::Elf).unwrap_err();
        assert!(matches!(err, HookError::InjectionUnsupported { .. }), "{err}");
    }

    #[test]
    fn test_text_file_is_not_injectable() {
        let td = tempfile::tempdir().expect("tmpdir");
        let lib = write_bytes(td.path(), "hook.so", b"#!/bin/sh\necho hi\n");
        assert!(check_object_format(&lib, ObjectFormat::Elf).is_err());
        assert!(check_object_format(&lib, ObjectFormat::MachO).is_err());
    }

    #[test]
    fn test_macho_dylib_accepted() {
        let td = tempfile::tempdir().expect("tmpdir");
        let mut h = vec![0u8; 32];
        h[..4].copy_from_slice(&0xfeed_facfu32.to_le_bytes());
        h[12..16].copy_from_slice(&MH_DYLIB.to_le_bytes());
        let lib = write_bytes(td.path(), "hook.dylib", &h);
        assert!(check_object_format(&lib, ObjectFormat::MachO).is_ok());
    }

    #[test]
    fn test_ld_preload_activation_sets_variable() {
        let td = tempfile::tempdir().expect("tmpdir");
        let lib = write_bytes(td.path(), "hook.so", &elf_header(ET_DYN));
        let mut env = EnvSnapshot::from_pairs([("LD_PRELOAD", "/other.so")]);
        PreloadRuntime::ld_preload()
            .activate(&lib, None, &mut env)
            .expect("activate");
        let expected = format!("{}:/other.so", lib.display());
        assert_eq!(env.get_str("LD_PRELOAD").as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_unsupported_runtime_always_fails() {
        let rt = UnsupportedRuntime::new("no loader");
        let mut env = EnvSnapshot::default();
        let err = rt.activate(Path::new("/x.so"), None, &mut env).unwrap_err();
        assert!(err.to_string().contains("no loader"));
        assert!(env.is_empty());
    }
}
