//! Hardware UART interface: blocking
//! writes, polled reads, buffer sizes rounded up to a multiple of four
//! bytes per `UARTInterface.cpp`'s ESP32-S3 ring-buffer requirement —
//! kept here, even though a desktop tty has no such constraint, to track
//! the original's sizing contract exactly.

use std::os::unix::io::AsFd;
use std::sync::Arc;

use async_trait::async_trait;
use nix::sys::termios::{self, BaudRate, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::datamodel::node::Node;
use crate::error::{LunaMonError, Result};
use crate::stats::StatsHolder;

use super::{InterfaceBase, RxSink};

fn round_up_to_4(size: usize) -> usize {
    (size + 3) & !3
}

fn baud_rate(baud: u32) -> BaudRate {
    match baud {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        _ => BaudRate::B4800,
    }
}

/// Puts the tty into raw 8N1 mode at `baud`: no canonical input, no echo,
/// no signals, no output processing, receiver enabled, modem control
/// lines ignored.
fn configure_serial(file: &impl AsFd, baud: u32) -> std::io::Result<()> {
    let mut t = termios::tcgetattr(file).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    t.local_flags &= !(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ECHOE | LocalFlags::ISIG);
    t.output_flags &= !OutputFlags::OPOST;
    t.input_flags &= !(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY | InputFlags::ISTRIP | InputFlags::INPCK);
    t.control_flags |= ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::CLOCAL;
    t.control_flags &= !(ControlFlags::CSIZE | ControlFlags::CSTOPB | ControlFlags::PARENB);
    t.control_chars[termios::SpecialCharacterIndices::VMIN as usize] = 1;
    t.control_chars[termios::SpecialCharacterIndices::VTIME as usize] = 0;

    let rate = baud_rate(baud);
    termios::cfsetospeed(&mut t, rate).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    termios::cfsetispeed(&mut t, rate).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    termios::tcsetattr(file, SetArg::TCSANOW, &t).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    Ok(())
}

pub struct UartInterface {
    base: InterfaceBase,
    tty_path: String,
    baud: u32,
    rx_buffer_size: usize,
}

impl UartInterface {
    pub async fn new(
        name: &str,
        tty_path: &str,
        baud: u32,
        rx_buffer_size: usize,
        sys_node: &Arc<Node>,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (base, rx) = InterfaceBase::new(name, sys_node).await;
        let interface = UartInterface {
            base,
            tty_path: tty_path.to_string(),
            baud,
            rx_buffer_size: round_up_to_4(rx_buffer_size),
        };
        (Arc::new(interface), rx)
    }

    pub fn base(&self) -> &InterfaceBase {
        &self.base
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// Opens the tty for read and write, configures it for raw 8N1 at the
    /// configured baud rate, spawns the write-drain task, and runs the
    /// read loop until the device is closed or errors, feeding every byte
    /// received to `sink`.
    pub async fn run(self: Arc<Self>, mut tx_queue: mpsc::Receiver<Vec<u8>>, sink: Arc<dyn RxSink>) -> Result<()> {
        let std_read_file = std::fs::File::open(&self.tty_path)
            .map_err(|e| LunaMonError::Hardware(format!("opening UART {}: {e}", self.tty_path)))?;
        configure_serial(&std_read_file, self.baud)
            .map_err(|e| LunaMonError::Hardware(format!("configuring UART {}: {e}", self.tty_path)))?;
        let mut read_file = File::from_std(std_read_file);

        let mut write_file = File::options()
            .write(true)
            .open(&self.tty_path)
            .await
            .map_err(|e| LunaMonError::Hardware(format!("opening UART {} for write: {e}", self.tty_path)))?;

        let name = self.base.name().to_string();
        tokio::spawn(async move {
            while let Some(bytes) = tx_queue.recv().await {
                if let Err(e) = write_file.write_all(&bytes).await {
                    log::warn!("write of {} bytes to UART {name} failed: {e}", bytes.len());
                }
            }
        });

        log::debug!("reading from UART {}", self.tty_path);
        let mut buffer = vec![0u8; self.rx_buffer_size];
        loop {
            let n = read_file
                .read(&mut buffer)
                .await
                .map_err(|e| LunaMonError::Hardware(format!("UART {} read failed: {e}", self.tty_path)))?;
            if n == 0 {
                return Err(LunaMonError::Hardware(format!("UART {} closed", self.tty_path)));
            }

            self.base.note_received(n as u32).await;
            for &byte in &buffer[..n] {
                sink.feed_byte(byte).await;
            }
        }
    }
}

#[async_trait]
impl StatsHolder for UartInterface {
    async fn export_stats(&self, ms_elapsed: u32) {
        self.base.export_base_stats(ms_elapsed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_size_rounds_up_to_a_multiple_of_four() {
        assert_eq!(round_up_to_4(0), 0);
        assert_eq!(round_up_to_4(1), 4);
        assert_eq!(round_up_to_4(256), 256);
        assert_eq!(round_up_to_4(257), 260);
    }
}
