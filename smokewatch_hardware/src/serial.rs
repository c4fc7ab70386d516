use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;

use nix::sys::termios::{self, BaudRate, FlushArg, SetArg, SpecialCharacterIndices};
use tracing::{debug, info};

use crate::error::{HwError, Result};
use crate::util::LineReader;

fn baud_rate(baud: u32) -> Result<BaudRate> {
    Ok(match baud {
        9_600 => BaudRate::B9600,
        19_200 => BaudRate::B19200,
        38_400 => BaudRate::B38400,
        57_600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        other => return Err(HwError::UnsupportedBaud(other)),
    })
}

/// Raw-mode 8N1 serial port delivering one frame per line.
pub struct SerialLink {
    path: String,
    reader: Option<LineReader<File>>,
}

impl SerialLink {
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NOCTTY)
            .open(path)?;

        let mut t = termios::tcgetattr(&file).map_err(|e| HwError::Serial(e.to_string()))?;
        termios::cfmakeraw(&mut t);
        termios::cfsetspeed(&mut t, baud_rate(baud)?).map_err(|e| HwError::Serial(e.to_string()))?;
        // read() returns after 100 ms of silence; LineReader enforces the overall deadline
        t.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        t.control_chars[SpecialCharacterIndices::VTIME as usize] = 1;
        termios::tcsetattr(&file, SetArg::TCSANOW, &t)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        // Drop whatever the board buffered before we attached
        termios::tcflush(&file, FlushArg::TCIFLUSH).map_err(|e| HwError::Serial(e.to_string()))?;

        info!(port = path, baud, "serial link open");
        Ok(Self {
            path: path.to_string(),
            reader: Some(LineReader::new(file).with_poll_interval(Duration::from_millis(5))),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl smokewatch_traits::FrameSource for SerialLink {
    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<Option<String>, smokewatch_traits::BoxError> {
        let reader = self.reader.as_mut().ok_or(HwError::Closed)?;
        Ok(reader.read_line_with_timeout(timeout)?)
    }

    fn close(&mut self) -> std::result::Result<(), smokewatch_traits::BoxError> {
        if self.reader.take().is_some() {
            debug!(port = %self.path, "serial link closed");
        }
        Ok(())
    }
}
