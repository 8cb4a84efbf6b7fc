//! Readiness polling over the three forwarding endpoints.
//!
//! Wraps `poll(2)` for exactly three descriptors with fixed roles: input,
//! output and device. Input and device are watched for readability, output
//! only for exceptional conditions since writes are issued synchronously.

use std::io;
use std::marker::PhantomData;
use std::os::fd::{AsRawFd, BorrowedFd};

/// One side of the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Standard input.
    Input,
    /// Standard output.
    Output,
    /// The TAP or macvtap device.
    Device,
}

impl Endpoint {
    /// All endpoints, in the order exceptional conditions are checked.
    pub const ALL: [Endpoint; 3] = [Endpoint::Input, Endpoint::Output, Endpoint::Device];

    /// Get the endpoint name as used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Input => "input",
            Endpoint::Output => "output",
            Endpoint::Device => "interface",
        }
    }

    fn slot(self) -> usize {
        match self {
            Endpoint::Input => 0,
            Endpoint::Output => 1,
            Endpoint::Device => 2,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// POLLERR, POLLHUP and POLLNVAL are always reported and need not be requested.
const EXCEPTIONAL: libc::c_short = libc::POLLPRI | libc::POLLERR | libc::POLLNVAL;

/// A readiness set over input, output and device.
///
/// Borrows the descriptors for as long as it lives, so build a fresh one for
/// every wait and drop it before reading or writing.
pub struct Poller<'a> {
    fds: [libc::pollfd; 3],
    _fds: PhantomData<BorrowedFd<'a>>,
}

impl<'a> Poller<'a> {
    /// Watch `input` and `device` for data and all three for errors.
    pub fn new(input: BorrowedFd<'a>, output: BorrowedFd<'a>, device: BorrowedFd<'a>) -> Self {
        let pollfd = |fd: BorrowedFd<'a>, events: libc::c_short| libc::pollfd {
            fd: fd.as_raw_fd(),
            events,
            revents: 0,
        };

        Self {
            fds: [
                pollfd(input, libc::POLLIN | libc::POLLPRI),
                pollfd(output, libc::POLLPRI),
                pollfd(device, libc::POLLIN | libc::POLLPRI),
            ],
            _fds: PhantomData,
        }
    }

    /// Block until at least one endpoint is ready. There is no timeout.
    pub fn wait(mut self) -> io::Result<Readiness> {
        loop {
            let ret = unsafe {
                libc::poll(
                    self.fds.as_mut_ptr(),
                    self.fds.len() as libc::nfds_t,
                    -1,
                )
            };

            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            if ret == 0 {
                continue;
            }

            return Ok(Readiness {
                revents: self.fds.map(|fd| fd.revents),
            });
        }
    }
}

/// The outcome of one [`Poller::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    revents: [libc::c_short; 3],
}

impl Readiness {
    /// Whether a read on `endpoint` will not block.
    ///
    /// A hang-up on the input counts as readable: the read then returns end
    /// of file, which is how a closed pipe on stdin shuts us down.
    pub fn readable(&self, endpoint: Endpoint) -> bool {
        let revents = self.revents[endpoint.slot()];
        match endpoint {
            Endpoint::Input => revents & (libc::POLLIN | libc::POLLHUP) != 0,
            Endpoint::Device => revents & libc::POLLIN != 0,
            Endpoint::Output => false,
        }
    }

    /// Whether `endpoint` reported an error or out-of-band condition.
    pub fn exceptional(&self, endpoint: Endpoint) -> bool {
        let revents = self.revents[endpoint.slot()];
        match endpoint {
            Endpoint::Input => revents & EXCEPTIONAL != 0,
            Endpoint::Output | Endpoint::Device => revents & (EXCEPTIONAL | libc::POLLHUP) != 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_revents(
        input: libc::c_short,
        output: libc::c_short,
        device: libc::c_short,
    ) -> Self {
        Self {
            revents: [input, output, device],
        }
    }
}
