use super::io::Transport;
use super::response::{self, filter_printable, parse_quantity};
use super::QueryConfig;

use std::fmt::Display;
use std::thread;

use chrono::{DateTime, Local};
use log::{debug, info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    Write(rusb::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Error::*;

        match self {
            Write(inner) => write!(f, "Failed to send the media command: {}", inner),
        }
    }
}

impl std::error::Error for Error {}

/// One successful read from the IN endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadChunk {
    pub raw: Vec<u8>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct MediaReport {
    pub queried_at: DateTime<Local>,
    pub chunks: Vec<ReadChunk>,
    pub combined: String,
    pub quantity: Result<u32, response::Error>,
}

/// Send the media command and collect the answer.
///
/// Only a failing write is an error. A read that times out or fails ends the
/// response, and whatever was collected until then is parsed.
pub fn query_media<T: Transport>(transport: &T, config: &QueryConfig) -> Result<MediaReport, Error> {
    let written_bytes = transport
        .write_out(&config.command, config.write_timeout)
        .map_err(Error::Write)?;

    if written_bytes != config.command.len() {
        warn!(
            "Number of written bytes does not equal the command length (expected {}, got {}).",
            config.command.len(),
            written_bytes
        );
    }

    // The printer needs a moment before the answer is available.
    thread::sleep(config.settle_delay);

    let queried_at = Local::now();
    let mut chunks = Vec::with_capacity(config.read_attempts);
    let mut data = vec![0u8; config.read_size];

    for attempt in 1..=config.read_attempts {
        if attempt > 1 {
            thread::sleep(config.read_pause);
        }

        let read_bytes = match transport.read_in(&mut data, config.read_timeout) {
            Ok(read_bytes) => read_bytes,
            Err(rusb::Error::Timeout) => {
                debug!("Read {} timed out, response complete.", attempt);
                break;
            }
            Err(err) => {
                info!("Read {} failed ({}), parsing what we have.", attempt, err);
                break;
            }
        };

        let raw = data[..read_bytes].to_vec();
        let text = filter_printable(&raw);
        debug!("Read {}: {} bytes, {:?}", attempt, read_bytes, text);

        chunks.push(ReadChunk { raw, text });
    }

    let combined: String = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
    let quantity = parse_quantity(&combined);

    Ok(MediaReport {
        queried_at,
        chunks,
        combined,
        quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};

    type Reply = Result<Vec<u8>, rusb::Error>;

    /// Answers every media command with the same list of reads.
    struct SimulatedPrinter {
        replies: Vec<Reply>,
        write_result: Result<(), rusb::Error>,
        pending: RefCell<VecDeque<Reply>>,
        written: RefCell<Vec<Vec<u8>>>,
    }

    impl SimulatedPrinter {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies,
                write_result: Ok(()),
                pending: RefCell::new(VecDeque::new()),
                written: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for SimulatedPrinter {
        fn write_out(&self, data: &[u8], _timeout: Duration) -> Result<usize, rusb::Error> {
            self.write_result?;
            self.written.borrow_mut().push(data.to_vec());
            *self.pending.borrow_mut() = self.replies.iter().cloned().collect();
            Ok(data.len())
        }

        fn read_in(&self, data: &mut [u8], _timeout: Duration) -> Result<usize, rusb::Error> {
            let reply = self
                .pending
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(rusb::Error::Timeout))?;

            let len = reply.len().min(data.len());
            data[..len].copy_from_slice(&reply[..len]);
            Ok(len)
        }
    }

    fn instant_config() -> QueryConfig {
        QueryConfig {
            settle_delay: Duration::ZERO,
            read_pause: Duration::ZERO,
            ..QueryConfig::default()
        }
    }

    #[test]
    fn sends_the_media_command() {
        let printer = SimulatedPrinter::new(vec![Ok(b"MQTY00042".to_vec())]);
        let config = instant_config();

        query_media(&printer, &config).unwrap();

        assert_eq!(*printer.written.borrow(), vec![config.command.clone()]);
    }

    #[test]
    fn combines_reads_in_order() {
        let printer = SimulatedPrinter::new(vec![
            Ok(b"\x00\x00MQ".to_vec()),
            Ok(b"TY00".to_vec()),
            Ok(b"042\r\n".to_vec()),
        ]);

        let report = query_media(&printer, &instant_config()).unwrap();

        assert_eq!(report.chunks.len(), 3);
        assert_eq!(report.chunks[0].raw, b"\x00\x00MQ");
        assert_eq!(report.chunks[0].text, "MQ");
        assert_eq!(report.combined, "MQTY00042");
        assert_eq!(report.quantity, Ok(42));
    }

    #[test]
    fn stops_after_the_configured_attempts() {
        let printer = SimulatedPrinter::new(vec![
            Ok(b"MQTY".to_vec()),
            Ok(b"00".to_vec()),
            Ok(b"12".to_vec()),
            Ok(b"34".to_vec()),
        ]);

        let report = query_media(&printer, &instant_config()).unwrap();

        assert_eq!(report.chunks.len(), 3);
        assert_eq!(report.quantity, Ok(12));
    }

    #[test]
    fn timeout_ends_the_response_early() {
        let printer = SimulatedPrinter::new(vec![
            Ok(b"MQTY00150".to_vec()),
            Err(rusb::Error::Timeout),
            Ok(b"99".to_vec()),
        ]);

        let report = query_media(&printer, &instant_config()).unwrap();

        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.combined, "MQTY00150");
        assert_eq!(report.quantity, Ok(150));
    }

    #[test]
    fn transfer_error_ends_the_response_early() {
        let printer = SimulatedPrinter::new(vec![Err(rusb::Error::Pipe)]);

        let report = query_media(&printer, &instant_config()).unwrap();

        assert!(report.chunks.is_empty());
        assert_eq!(report.combined, "");
        assert_eq!(report.quantity, Err(response::Error::MissingMarker));
    }

    #[test]
    fn reads_are_bounded_by_read_size() {
        let printer = SimulatedPrinter::new(vec![Ok(vec![b'A'; 100])]);

        let report = query_media(&printer, &instant_config()).unwrap();

        assert_eq!(report.chunks[0].raw.len(), 64);
    }

    #[test]
    fn unparsable_response_is_not_an_error() {
        let printer = SimulatedPrinter::new(vec![Ok(b"STATUSOK".to_vec())]);

        let report = query_media(&printer, &instant_config()).unwrap();

        assert_eq!(report.quantity, Err(response::Error::MissingMarker));
    }

    #[test]
    fn write_error_is_fatal() {
        let mut printer = SimulatedPrinter::new(vec![Ok(b"MQTY00042".to_vec())]);
        printer.write_result = Err(rusb::Error::NoDevice);

        let result = query_media(&printer, &instant_config());

        assert_eq!(result.unwrap_err(), Error::Write(rusb::Error::NoDevice));
    }

    #[test]
    fn repeated_queries_agree() {
        let printer = SimulatedPrinter::new(vec![
            Ok(b"MQTY00".to_vec()),
            Ok(b"275".to_vec()),
            Err(rusb::Error::Timeout),
        ]);
        let config = instant_config();

        let first = query_media(&printer, &config).unwrap();
        let second = query_media(&printer, &config).unwrap();

        assert_eq!(first.quantity, Ok(275));
        assert_eq!(first.quantity, second.quantity);
        assert_eq!(first.chunks, second.chunks);
    }

    fn paused_config(read_pause: Duration) -> QueryConfig {
        QueryConfig {
            read_pause,
            ..instant_config()
        }
    }

    #[test]
    fn no_pause_when_the_first_read_fails() {
        let printer = SimulatedPrinter::new(vec![Err(rusb::Error::Pipe)]);
        let pause = Duration::from_millis(500);

        let start = Instant::now();
        query_media(&printer, &paused_config(pause)).unwrap();

        assert!(start.elapsed() < pause);
    }

    #[test]
    fn no_pause_after_a_timed_out_read() {
        let printer = SimulatedPrinter::new(vec![
            Ok(b"MQTY00042".to_vec()),
            Err(rusb::Error::Timeout),
            Ok(b"99".to_vec()),
        ]);
        let pause = Duration::from_millis(300);

        let start = Instant::now();
        let report = query_media(&printer, &paused_config(pause)).unwrap();
        let elapsed = start.elapsed();

        // One pause before the read that timed out, none after it.
        assert_eq!(report.chunks.len(), 1);
        assert!(elapsed >= pause);
        assert!(elapsed < pause * 2);
    }

    #[test]
    fn pauses_between_successful_reads() {
        let printer = SimulatedPrinter::new(vec![
            Ok(b"MQTY".to_vec()),
            Ok(b"00".to_vec()),
            Ok(b"42".to_vec()),
        ]);
        let pause = Duration::from_millis(150);

        let start = Instant::now();
        let report = query_media(&printer, &paused_config(pause)).unwrap();
        let elapsed = start.elapsed();

        // Three reads, two gaps, nothing after the last one.
        assert_eq!(report.quantity, Ok(42));
        assert!(elapsed >= pause * 2);
        assert!(elapsed < pause * 3);
    }
}
