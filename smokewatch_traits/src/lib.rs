pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error used at every trait seam; the core maps these to typed errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Line-oriented link to the sensor board.
pub trait FrameSource {
    /// Block for at most `timeout` waiting for one complete line.
    /// `Ok(None)` means nothing arrived in time.
    fn read_line(&mut self, timeout: std::time::Duration) -> Result<Option<String>, BoxError>;

    /// Release the underlying handle. Further reads may fail.
    fn close(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Urgency passed through to the mail transport (`X-Priority`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
}

impl Priority {
    pub fn x_priority(self) -> &'static str {
        match self {
            Priority::High => "1",
            Priority::Normal => "2",
        }
    }
}

pub trait Notifier {
    /// Deliver `body` to `recipients`, returning the recipients the transport accepted.
    fn send(
        &mut self,
        subject: &str,
        body: &str,
        priority: Priority,
        recipients: &[String],
    ) -> Result<Vec<String>, BoxError>;
}

/// External hardware control invoked when a unit must be powered down.
pub trait ShutdownHook {
    fn shutdown(&mut self, unit: &str) -> Result<(), BoxError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn read_line(&mut self, timeout: std::time::Duration) -> Result<Option<String>, BoxError> {
        (**self).read_line(timeout)
    }
    fn close(&mut self) -> Result<(), BoxError> {
        (**self).close()
    }
}

impl<T: Notifier + ?Sized> Notifier for Box<T> {
    fn send(
        &mut self,
        subject: &str,
        body: &str,
        priority: Priority,
        recipients: &[String],
    ) -> Result<Vec<String>, BoxError> {
        (**self).send(subject, body, priority, recipients)
    }
}

impl<T: ShutdownHook + ?Sized> ShutdownHook for Box<T> {
    fn shutdown(&mut self, unit: &str) -> Result<(), BoxError> {
        (**self).shutdown(unit)
    }
}
