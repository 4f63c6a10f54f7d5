use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;

pub mod scripted;
pub mod ssh;

/// Expect-style remote shell, used only to push bitstreams and start the bus
/// server. No register traffic goes through here.
#[async_trait]
pub trait Session: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn send_line(&mut self, text: &str) -> Result<()>;

    /// Wait until `pattern` shows up in the output. Everything before it is
    /// returned, the pattern itself is consumed.
    async fn expect(&mut self, pattern: &str, timeout: Duration) -> Result<String>;

    fn prompt(&self) -> &str;

    async fn read_until_prompt(&mut self, timeout: Duration) -> Result<String> {
        let prompt = self.prompt().to_owned();
        self.expect(&prompt, timeout).await
    }

    async fn disconnect(&mut self) -> Result<()>;
}

#[async_trait]
impl<S: Session + ?Sized> Session for Box<S> {
    async fn connect(&mut self) -> Result<()> {
        S::connect(&mut *self).await
    }

    async fn send_line(&mut self, text: &str) -> Result<()> {
        S::send_line(&mut *self, text).await
    }

    async fn expect(&mut self, pattern: &str, timeout: Duration) -> Result<String> {
        S::expect(&mut *self, pattern, timeout).await
    }

    fn prompt(&self) -> &str {
        S::prompt(&**self)
    }

    async fn read_until_prompt(&mut self, timeout: Duration) -> Result<String> {
        S::read_until_prompt(&mut *self, timeout).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        S::disconnect(&mut *self).await
    }
}

/// Output received but not yet matched by an `expect`.
#[derive(Default)]
struct Pending(Vec<u8>);

impl Pending {
    fn push(&mut self, data: &[u8]) {
        self.0.extend_from_slice(data);
    }

    /// Remove and return everything before `pattern`, dropping the pattern.
    fn take_until(&mut self, pattern: &str) -> Option<String> {
        let idx = memchr::memmem::find(&self.0, pattern.as_bytes())?;
        let before = String::from_utf8_lossy(&self.0[..idx]).replace('\r', "");
        self.0.drain(..idx + pattern.len());
        Some(before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_consumes_pattern() {
        let mut p = Pending::default();
        p.push(b"/mnt/uzed\r\nzynq45>");
        assert_eq!(p.take_until("zynq45>").unwrap(), "/mnt/uzed\n");
        assert!(p.take_until("zynq45>").is_none());
        p.push(b"a>b>");
        assert_eq!(p.take_until(">").unwrap(), "a");
        assert_eq!(p.take_until(">").unwrap(), "b");
    }
}
