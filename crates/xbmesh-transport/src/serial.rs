use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

const NO_TIMEOUT: u64 = u64::MAX;

/// Line speeds supported by the radio modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaudRate {
    B1200,
    B2400,
    B4800,
    #[default]
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
    B230400,
}

impl BaudRate {
    /// Bits per second.
    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::B1200 => 1200,
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
            BaudRate::B230400 => 230400,
        }
    }

    fn as_speed(self) -> libc::speed_t {
        match self {
            BaudRate::B1200 => libc::B1200,
            BaudRate::B2400 => libc::B2400,
            BaudRate::B4800 => libc::B4800,
            BaudRate::B9600 => libc::B9600,
            BaudRate::B19200 => libc::B19200,
            BaudRate::B38400 => libc::B38400,
            BaudRate::B57600 => libc::B57600,
            BaudRate::B115200 => libc::B115200,
            BaudRate::B230400 => libc::B230400,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = TransportError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1200 => Ok(BaudRate::B1200),
            2400 => Ok(BaudRate::B2400),
            4800 => Ok(BaudRate::B4800),
            9600 => Ok(BaudRate::B9600),
            19200 => Ok(BaudRate::B19200),
            38400 => Ok(BaudRate::B38400),
            57600 => Ok(BaudRate::B57600),
            115200 => Ok(BaudRate::B115200),
            230400 => Ok(BaudRate::B230400),
            other => Err(TransportError::UnsupportedBaud(other)),
        }
    }
}

/// Configuration for opening a serial port.
#[derive(Debug, Clone, Default)]
pub struct SerialConfig {
    /// Line speed. Default: 9600 baud (factory setting of the modules).
    pub baud_rate: BaudRate,
    /// Read timeout for blocking reads. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
}

/// A serial tty in raw 8N1 mode.
///
/// Reads honour the configured read timeout by polling the descriptor
/// before reading, so an elapsed timeout is reported as `TimedOut` rather
/// than a zero-length read.
pub struct SerialPort {
    file: File,
    path: PathBuf,
    read_timeout_ms: AtomicU64,
}

impl SerialPort {
    /// Open a serial device with default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, &SerialConfig::default())
    }

    /// Open a serial device and apply raw mode and line speed.
    pub fn open_with_config(path: impl AsRef<Path>, config: &SerialConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&path)
            .map_err(|e| TransportError::Open {
                path: path.clone(),
                source: e,
            })?;

        // SAFETY: `file` owns an open descriptor for the duration of the call.
        if unsafe { libc::isatty(file.as_raw_fd()) } != 1 {
            return Err(TransportError::NotATty { path });
        }

        configure_raw(&file, config.baud_rate).map_err(|e| TransportError::Configure {
            path: path.clone(),
            source: e,
        })?;

        info!(?path, baud = config.baud_rate.as_u32(), "opened serial port");

        let port = Self {
            file,
            path,
            read_timeout_ms: AtomicU64::new(NO_TIMEOUT),
        };
        port.apply_read_timeout(config.read_timeout)?;
        Ok(port)
    }

    /// The device path this port was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn apply_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let millis = match timeout {
            None => NO_TIMEOUT,
            Some(d) if d.is_zero() => {
                return Err(TransportError::Io(io::Error::new(
                    ErrorKind::InvalidInput,
                    "cannot set a zero duration read timeout",
                )));
            }
            Some(d) => u64::try_from(d.as_millis()).unwrap_or(NO_TIMEOUT - 1).max(1),
        };
        self.read_timeout_ms.store(millis, Ordering::Relaxed);
        Ok(())
    }
}

fn configure_raw(file: &File, baud: BaudRate) -> io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: termios is plain old data; tcgetattr fully initializes it.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: `fd` is an open tty and `tio` is a valid writable termios.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(io::Error::last_os_error());
    }

    tio.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::ICRNL
        | libc::INLCR
        | libc::PARMRK
        | libc::INPCK
        | libc::ISTRIP
        | libc::IXON);
    tio.c_oflag = 0;
    tio.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::IEXTEN | libc::ISIG);
    tio.c_cflag &= !(libc::CSIZE | libc::PARENB);
    tio.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    let speed = baud.as_speed();
    // SAFETY: `tio` is a valid termios obtained from tcgetattr above.
    if unsafe { libc::cfsetispeed(&mut tio, speed) } != 0
        || unsafe { libc::cfsetospeed(&mut tio, speed) } != 0
    {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `fd` is an open tty and `tio` is fully initialized.
    if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &tio) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn wait_readable(file: &File, timeout_ms: u64) -> io::Result<()> {
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout = timeout_ms.min(libc::c_int::MAX as u64) as libc::c_int;

    // SAFETY: `pfd` is a valid pollfd array of length 1.
    match unsafe { libc::poll(&mut pfd, 1, timeout) } {
        -1 => Err(io::Error::last_os_error()),
        0 => Err(io::Error::from(ErrorKind::TimedOut)),
        _ => Ok(()),
    }
}

impl Read for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.read_timeout_ms.load(Ordering::Relaxed);
        if timeout != NO_TIMEOUT {
            wait_readable(&self.file, timeout)?;
        }
        (&self.file).read(buf)
    }
}

impl Write for SerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&self.file).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&self.file).flush()
    }
}

impl LinkStream for SerialPort {
    fn try_clone(&self) -> Result<Self> {
        let file = self.file.try_clone()?;
        debug!(path = ?self.path, "cloned serial port handle");
        Ok(Self {
            file,
            path: self.path.clone(),
            read_timeout_ms: AtomicU64::new(self.read_timeout_ms.load(Ordering::Relaxed)),
        })
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.apply_read_timeout(timeout)
    }

    fn transport_name(&self) -> &'static str {
        "serial"
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_rate_conversions() {
        assert_eq!(BaudRate::default(), BaudRate::B9600);
        assert_eq!(BaudRate::try_from(115200).unwrap(), BaudRate::B115200);
        assert_eq!(BaudRate::B57600.as_u32(), 57600);
        assert!(matches!(
            BaudRate::try_from(12345),
            Err(TransportError::UnsupportedBaud(12345))
        ));
    }

    #[test]
    fn open_missing_device_fails() {
        let result = SerialPort::open("/dev/xbmesh-does-not-exist");
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }

    #[test]
    fn open_non_tty_rejected() {
        let result = SerialPort::open("/dev/null");
        assert!(matches!(result, Err(TransportError::NotATty { .. })));
    }

    /// Open a pseudo-terminal pair, returning the master side and the
    /// slave device path. `None` when the platform has no ptys available.
    #[cfg(target_os = "linux")]
    fn open_pty() -> Option<(File, PathBuf)> {
        use std::ffi::CStr;
        use std::os::fd::FromRawFd;

        // SAFETY: plain libc calls on a descriptor we own; the name buffer
        // is large enough and NUL-terminated by ptsname_r on success.
        unsafe {
            let master = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
            if master < 0 {
                return None;
            }
            let master_file = File::from_raw_fd(master);
            if libc::grantpt(master) != 0 || libc::unlockpt(master) != 0 {
                return None;
            }
            let mut name = [0 as libc::c_char; 128];
            if libc::ptsname_r(master, name.as_mut_ptr(), name.len()) != 0 {
                return None;
            }
            let path = CStr::from_ptr(name.as_ptr()).to_string_lossy().into_owned();
            Some((master_file, PathBuf::from(path)))
        }
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn pty_roundtrip_in_raw_mode() {
        let Some((mut master, slave_path)) = open_pty() else {
            return;
        };

        let config = SerialConfig {
            baud_rate: BaudRate::B115200,
            read_timeout: Some(Duration::from_millis(500)),
        };
        let mut port = SerialPort::open_with_config(&slave_path, &config).unwrap();
        assert_eq!(port.path(), slave_path.as_path());
        assert_eq!(port.transport_name(), "serial");

        // Raw mode: 0x11/0x13 (XON/XOFF) and CR pass through untouched.
        master.write_all(&[0x7e, 0x11, 0x13, 0x0d]).unwrap();
        let mut buf = [0u8; 4];
        port.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x7e, 0x11, 0x13, 0x0d]);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn pty_read_timeout_reports_timed_out() {
        let Some((_master, slave_path)) = open_pty() else {
            return;
        };

        let mut port = SerialPort::open(&slave_path).unwrap();
        port.set_read_timeout(Some(Duration::from_millis(30))).unwrap();

        let started = std::time::Instant::now();
        let mut buf = [0u8; 1];
        let err = port.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(25));

        let clone = port.try_clone().unwrap();
        assert_eq!(clone.path(), port.path());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn zero_read_timeout_rejected() {
        let Some((_master, slave_path)) = open_pty() else {
            return;
        };

        let port = SerialPort::open(&slave_path).unwrap();
        let result = port.set_read_timeout(Some(Duration::ZERO));
        assert!(matches!(
            result,
            Err(TransportError::Io(e)) if e.kind() == ErrorKind::InvalidInput
        ));
    }
}
