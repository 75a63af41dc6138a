use std::fs;
use std::io;
use std::time::SystemTime;

/// Directory listing and stat, the two primitives the local resolver needs.
pub trait Filesystem {
    /// Names of the immediate children of `dir`, in name order.
    fn read_dir(&self, dir: &str) -> io::Result<Vec<String>>;

    fn modified(&self, path: &str) -> io::Result<SystemTime>;
}

impl<T: Filesystem + ?Sized> Filesystem for &T {
    fn read_dir(&self, dir: &str) -> io::Result<Vec<String>> {
        (**self).read_dir(dir)
    }

    fn modified(&self, path: &str) -> io::Result<SystemTime> {
        (**self).modified(path)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn read_dir(&self, dir: &str) -> io::Result<Vec<String>> {
        let mut out = Vec::<String>::new();
        for ent in fs::read_dir(dir)? {
            let ent = ent?;
            out.push(ent.file_name().to_string_lossy().into_owned());
        }
        out.sort();
        Ok(out)
    }

    // Follows symlinks, so a dangling link fails here.
    fn modified(&self, path: &str) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }
}
