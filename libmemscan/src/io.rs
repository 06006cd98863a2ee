//! Byte I/O to a foreign process's address space.
//!
//! Reads are attempted first via the vectored cross-process syscall
//! (`process_vm_readv`), falling back to `/proc/<pid>/mem` when the vector
//! call is unavailable or refused (older kernels, yama ptrace scope). Both
//! paths tolerate partial transfers; the caller only ever sees "bytes
//! transferred", never an error for a short read.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;

use libc::{_SC_PAGESIZE, pid_t, sysconf};
use nix::sys::uio::{RemoteIoVec, process_vm_readv, process_vm_writev};
use nix::unistd::Pid;
use std::io::IoSlice;
use std::io::IoSliceMut;

use crate::error::{Result, ScanError};

/// The host's page size, as reported by the kernel. Used as the unit the
/// scan engine sizes its default read block around, since that is the
/// granularity memory is actually mapped and faulted in at.
pub fn page_size() -> usize {
    unsafe { sysconf(_SC_PAGESIZE) as usize }
}

pub struct ProcessMemory {
    pid: pid_t,
}

impl ProcessMemory {
    pub fn new(pid: pid_t) -> ProcessMemory {
        ProcessMemory { pid }
    }

    pub fn pid(&self) -> pid_t {
        self.pid
    }

    /// Read up to `buf.len()` bytes starting at `addr`. Returns the number
    /// of bytes actually read, which may be less than requested (a region
    /// may be sparsely mapped); this is never treated as an error.
    pub fn read(&self, addr: usize, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Ok(n) = self.read_vectored(addr, buf) {
            if n > 0 {
                return Ok(n);
            }
        }
        self.read_via_mem_file(addr, buf)
    }

    /// Write `buf.len()` bytes starting at `addr`. Returns the number of
    /// bytes actually written.
    pub fn write(&self, addr: usize, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Ok(n) = self.write_vectored(addr, buf) {
            if n > 0 {
                return Ok(n);
            }
        }
        self.write_via_mem_file(addr, buf)
    }

    fn read_vectored(&self, addr: usize, buf: &mut [u8]) -> std::result::Result<usize, nix::Error> {
        let remote = [RemoteIoVec {
            base: addr,
            len: buf.len(),
        }];
        let mut local = [IoSliceMut::new(buf)];
        process_vm_readv(Pid::from_raw(self.pid), &mut local, &remote)
    }

    fn write_vectored(&self, addr: usize, buf: &[u8]) -> std::result::Result<usize, nix::Error> {
        let remote = [RemoteIoVec {
            base: addr,
            len: buf.len(),
        }];
        let local = [IoSlice::new(buf)];
        process_vm_writev(Pid::from_raw(self.pid), &local, &remote)
    }

    fn mem_path(&self) -> String {
        format!("/proc/{}/mem", self.pid)
    }

    fn read_via_mem_file(&self, addr: usize, buf: &mut [u8]) -> Result<usize> {
        let path = self.mem_path();
        let file =
            File::open(&path).map_err(|e| ScanError::from_proc_io(self.pid, path.into(), e))?;
        match file.read_at(buf, addr as u64) {
            Ok(n) => Ok(n),
            Err(_) => self.read_via_seek(&file, addr, buf),
        }
    }

    /// Some virtual mappings reject positioned reads but accept a plain
    /// seek-then-read; try that before giving up on this block entirely.
    fn read_via_seek(&self, file: &File, addr: usize, buf: &mut [u8]) -> Result<usize> {
        let mut file = file.try_clone()?;
        if file.seek(SeekFrom::Start(addr as u64)).is_err() {
            return Ok(0);
        }
        Ok(file.read(buf).unwrap_or(0))
    }

    fn write_via_mem_file(&self, addr: usize, buf: &[u8]) -> Result<usize> {
        let path = self.mem_path();
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| ScanError::from_proc_io(self.pid, path.into(), e))?;
        match file.write_at(buf, addr as u64) {
            Ok(n) => Ok(n),
            Err(_) => {
                let mut file = file.try_clone()?;
                if file.seek(SeekFrom::Start(addr as u64)).is_err() {
                    return Ok(0);
                }
                Ok(file.write(buf).unwrap_or(0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_own_process_memory() {
        let marker: u32 = 0xDEAD_BEEF;
        let addr = &marker as *const u32 as usize;
        let mem = ProcessMemory::new(std::process::id() as i32);
        let mut buf = [0u8; 4];
        let n = mem.read(addr, &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(u32::from_ne_bytes(buf), 0xDEAD_BEEF);
    }

    #[test]
    fn writes_own_process_memory() {
        let mut marker: u32 = 0;
        let addr = &mut marker as *mut u32 as usize;
        let mem = ProcessMemory::new(std::process::id() as i32);
        let n = mem.write(addr, &42u32.to_ne_bytes()).unwrap();
        assert_eq!(n, 4);
        assert_eq!(marker, 42);
    }

    #[test]
    fn empty_buffer_is_a_no_op() {
        let mem = ProcessMemory::new(std::process::id() as i32);
        assert_eq!(mem.read(0, &mut []).unwrap(), 0);
        assert_eq!(mem.write(0, &[]).unwrap(), 0);
    }
}
