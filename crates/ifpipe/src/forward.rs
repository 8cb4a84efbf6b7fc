//! The forwarding loop.
//!
//! Shuttles data between the device and the process's standard streams:
//! whatever arrives on input is written to the device, whatever the device
//! produces is written to output. Every read is bounded by the configured
//! buffer size and every read is followed by exactly one write of the same
//! length. There are no retries; the first read error, short write or
//! exceptional condition ends the loop.
//!
//! Per wake-up the work is done in a fixed order:
//!
//! 1. input → device
//! 2. device → output
//! 3. exceptional conditions on input, output, device

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::ops::ControlFlow;
use std::os::fd::AsFd;

use crate::config::Config;
use crate::device::Device;
use crate::poll::{Endpoint, Poller, Readiness};

/// Why the forwarding loop stopped.
#[derive(Debug)]
pub enum TerminationReason {
    /// A read returned zero bytes. Normal shutdown when it is the input.
    CleanEof(Endpoint),
    /// Reading from an endpoint failed.
    ReadError(Endpoint, io::Error),
    /// Writing to an endpoint failed or did not take the whole buffer.
    WriteError(Endpoint, io::Error),
    /// An endpoint reported an error or hang-up condition.
    StreamError(Endpoint),
    /// Waiting for readiness failed.
    PollError(io::Error),
}

impl TerminationReason {
    /// Whether this is a successful shutdown.
    pub fn is_clean(&self) -> bool {
        matches!(self, TerminationReason::CleanEof(_))
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        if self.is_clean() { 0 } else { 1 }
    }

    /// The endpoint that caused the termination, if any.
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            TerminationReason::CleanEof(ep)
            | TerminationReason::ReadError(ep, _)
            | TerminationReason::WriteError(ep, _)
            | TerminationReason::StreamError(ep) => Some(*ep),
            TerminationReason::PollError(_) => None,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::CleanEof(ep) => write!(f, "end of file on {ep}"),
            TerminationReason::ReadError(ep, err) => write!(f, "read from {ep} failed: {err}"),
            TerminationReason::WriteError(ep, err) => write!(f, "write to {ep} failed: {err}"),
            TerminationReason::StreamError(ep) => write!(f, "{ep} error"),
            TerminationReason::PollError(err) => write!(f, "poll failed: {err}"),
        }
    }
}

/// Traffic counters for one run.
#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    frames_in: u64,
    bytes_in: u64,
    frames_out: u64,
    bytes_out: u64,
}

/// Forward between `device` and the process's stdin/stdout until one side
/// stops.
///
/// The standard streams are duplicated so they are read and written
/// unbuffered; failing to duplicate them is the only error returned.
pub fn run_stdio(device: Device, config: &Config) -> io::Result<TerminationReason> {
    let input = File::from(io::stdin().as_fd().try_clone_to_owned()?);
    let output = File::from(io::stdout().as_fd().try_clone_to_owned()?);
    Ok(run(device, input, output, config))
}

/// Forward between `device`, `input` and `output` until a termination
/// condition occurs.
///
/// Takes ownership of all three endpoints; they are closed when this
/// returns, whatever the reason.
pub fn run<D, I, O>(device: D, input: I, output: O, config: &Config) -> TerminationReason
where
    D: Read + Write + AsFd,
    I: Read + AsFd,
    O: Write + AsFd,
{
    let (reason, stats) = Forwarder::new(device, input, output, config.buffer_size()).run();
    log_termination(&reason, &stats);
    reason
}

fn log_termination(reason: &TerminationReason, stats: &Stats) {
    let endpoint = reason.endpoint().map(|ep| ep.name());
    match reason {
        TerminationReason::CleanEof(_) => tracing::debug!(
            endpoint,
            frames_in = stats.frames_in,
            bytes_in = stats.bytes_in,
            frames_out = stats.frames_out,
            bytes_out = stats.bytes_out,
            "forwarding stopped: {reason}"
        ),
        TerminationReason::PollError(_) => tracing::error!(
            frames_in = stats.frames_in,
            frames_out = stats.frames_out,
            "forwarding stopped: {reason}"
        ),
        _ => tracing::warn!(
            endpoint,
            frames_in = stats.frames_in,
            frames_out = stats.frames_out,
            "forwarding stopped: {reason}"
        ),
    }
}

struct Forwarder<D, I, O> {
    device: D,
    input: I,
    output: O,
    buffer: Vec<u8>,
    stats: Stats,
}

impl<D, I, O> Forwarder<D, I, O>
where
    D: Read + Write + AsFd,
    I: Read + AsFd,
    O: Write + AsFd,
{
    fn new(device: D, input: I, output: O, buffer_size: usize) -> Self {
        Self {
            device,
            input,
            output,
            buffer: vec![0; buffer_size],
            stats: Stats::default(),
        }
    }

    fn run(mut self) -> (TerminationReason, Stats) {
        let reason = loop {
            if let ControlFlow::Break(reason) = self.step() {
                break reason;
            }
        };
        (reason, self.stats)
    }

    fn step(&mut self) -> ControlFlow<TerminationReason> {
        let ready = match Poller::new(self.input.as_fd(), self.output.as_fd(), self.device.as_fd())
            .wait()
        {
            Ok(ready) => ready,
            Err(err) => return ControlFlow::Break(TerminationReason::PollError(err)),
        };
        self.dispatch(ready)
    }

    /// Act on one wake-up: transfers first, then exceptional conditions in
    /// [`Endpoint::ALL`] order.
    fn dispatch(&mut self, ready: Readiness) -> ControlFlow<TerminationReason> {
        if ready.readable(Endpoint::Input) {
            let n = transfer(
                (&mut self.input, Endpoint::Input),
                (&mut self.device, Endpoint::Device),
                &mut self.buffer,
            )?;
            self.stats.frames_in += 1;
            self.stats.bytes_in += n as u64;
        }

        if ready.readable(Endpoint::Device) {
            let n = transfer(
                (&mut self.device, Endpoint::Device),
                (&mut self.output, Endpoint::Output),
                &mut self.buffer,
            )?;
            self.stats.frames_out += 1;
            self.stats.bytes_out += n as u64;
        }

        for endpoint in Endpoint::ALL {
            if ready.exceptional(endpoint) {
                return ControlFlow::Break(TerminationReason::StreamError(endpoint));
            }
        }

        ControlFlow::Continue(())
    }
}

/// One bounded read from `from` followed by one write of the same bytes to
/// `to`. Returns the number of bytes moved.
fn transfer<R: Read, W: Write>(
    (from, source): (&mut R, Endpoint),
    (to, destination): (&mut W, Endpoint),
    buffer: &mut [u8],
) -> ControlFlow<TerminationReason, usize> {
    let n = match from.read(buffer) {
        Ok(0) => return ControlFlow::Break(TerminationReason::CleanEof(source)),
        Ok(n) => n,
        Err(err) => return ControlFlow::Break(TerminationReason::ReadError(source, err)),
    };

    match to.write(&buffer[..n]) {
        Ok(written) if written == n => ControlFlow::Continue(n),
        Ok(written) => ControlFlow::Break(TerminationReason::WriteError(
            destination,
            io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {written} of {n} bytes"),
            ),
        )),
        Err(err) => ControlFlow::Break(TerminationReason::WriteError(destination, err)),
    }
}
