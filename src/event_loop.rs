//! The non-blocking event loop: one `mio::Poll` instance multiplexing
//! stdin, the directory UDP socket, the TCP listener and every peer
//! connection, plus the single pending timer.
//!
//! Ported from `original_source/main.c`'s `select()` loop. Readiness
//! ordering there was stdin, then the directory socket, then the
//! listener, then existing connections; `Events::iter()` reflects epoll's
//! own ordering, which doesn't honor that, so each wakeup is sorted into
//! those four buckets before anything is handled -- each source is still
//! drained exhaustively once its turn comes up.

use std::io;
use std::os::unix::io::AsRawFd;

use log::{debug, warn};
use mio::net::TcpListener;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::cli::{dispatch, parse_command};
use crate::directory::{parse_directory_message, DirectoryClient, DirectoryMessage};
use crate::error::Result;
use crate::line_reader::LineReadOutcome;
use crate::ring::Ring;
use crate::timer::TimerPurpose;

const STDIN_TOKEN: Token = Token(usize::MAX);
const DIRECTORY_TOKEN: Token = Token(usize::MAX - 1);
const LISTENER_TOKEN: Token = Token(usize::MAX - 2);

pub fn run(mut ring: Ring, mut directory: DirectoryClient, mut listener: TcpListener, initial_command: Option<String>) -> Result<()> {
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(128);

    poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
    poll.registry().register(&mut directory.socket, DIRECTORY_TOKEN, Interest::READABLE)?;

    let stdin_fd = io::stdin().as_raw_fd();
    let mut stdin_source = SourceFd(&stdin_fd);
    poll.registry().register(&mut stdin_source, STDIN_TOKEN, Interest::READABLE)?;

    if let Some(line) = initial_command {
        let cmd = parse_command(ring.input_state, &line);
        if dispatch(&mut ring, &directory, &poll, cmd) {
            return Ok(());
        }
    }

    loop {
        let timeout = ring.timer.poll_timeout();
        poll.poll(&mut events, timeout)?;

        if events.is_empty() {
            fire_timer(&mut ring, &directory);
            continue;
        }

        // Sort this wakeup's readiness into stdin/directory/listener/peers
        // so they're handled in that fixed order regardless of the order
        // epoll happened to report them in.
        let mut stdin_ready = false;
        let mut directory_ready = false;
        let mut listener_ready = false;
        let mut peer_tokens = Vec::new();
        for event in events.iter() {
            match event.token() {
                STDIN_TOKEN => stdin_ready = true,
                DIRECTORY_TOKEN => directory_ready = true,
                LISTENER_TOKEN => listener_ready = true,
                token => peer_tokens.push(token),
            }
        }

        if stdin_ready {
            handle_stdin(&mut ring, &directory, &poll);
        }
        if directory_ready {
            handle_directory(&mut ring, &directory);
        }
        if listener_ready {
            handle_accept(&mut ring, &poll, &listener);
        }
        for token in peer_tokens {
            handle_connection(&mut ring, &directory, &poll, token);
        }

        // A poll round can return I/O readiness without the timer having
        // expired; check it unconditionally too so it never misses its
        // deadline while connections stay busy.
        fire_timer(&mut ring, &directory);
    }
}

fn fire_timer(ring: &mut Ring, directory: &DirectoryClient) {
    if let Some(purpose) = ring.timer.take_expired() {
        match purpose {
            TimerPurpose::PredecessorConnect => {
                warn!("timed out waiting for the predecessor to connect, leaving the ring");
                ring.leave_ring(directory);
            }
            TimerPurpose::DirectoryNodeList => ring.on_node_list(directory, None),
        }
    }
}

fn handle_stdin(ring: &mut Ring, directory: &DirectoryClient, poll: &Poll) {
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) => debug!("stdin closed"),
        Ok(_) => {
            let cmd = parse_command(ring.input_state, line.trim_end());
            dispatch(ring, directory, poll, cmd);
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => warn!("error reading stdin: {}", e),
    }
}

fn handle_directory(ring: &mut Ring, directory: &DirectoryClient) {
    loop {
        match directory.recv() {
            Ok(Some(data)) => match parse_directory_message(&data) {
                Ok(DirectoryMessage::NodesList(nodes)) => ring.on_node_list(directory, Some(nodes)),
                Ok(DirectoryMessage::OkReg) => debug!("directory server confirmed registration"),
                Ok(DirectoryMessage::OkUnreg) => debug!("directory server confirmed unregistration"),
                Ok(DirectoryMessage::Unrecognized(s)) => warn!("unrecognized message from directory server: {}", s),
                Err(e) => warn!("malformed response from directory server: {}", e),
            },
            Ok(None) => break,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                warn!("error reading from the directory socket: {}", e);
                break;
            }
        }
    }
}

fn handle_accept(ring: &mut Ring, poll: &Poll, listener: &TcpListener) {
    loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = ring.accept_new_node(poll, stream, addr.ip().to_string()) {
                    warn!("couldn't accept connection from {}: {}", addr, e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                warn!("accept error: {}", e);
                break;
            }
        }
    }
}

fn handle_connection(ring: &mut Ring, directory: &DirectoryClient, poll: &Poll, token: Token) {
    let (lines, closed) = drain_connection(ring, token);
    for line in lines {
        ring.handle_message(directory, poll, token, &line);
    }
    if closed {
        ring.handle_broken_socket(directory, poll, token);
    }
}

/// Reads everything currently available on `token`'s socket, looping
/// until it would block (mio's epoll backend is edge-triggered, so a
/// single read per readiness notification can leave data stranded).
fn drain_connection(ring: &mut Ring, token: Token) -> (Vec<String>, bool) {
    let mut lines = Vec::new();
    loop {
        let conn = match ring.registry.get_mut(token) {
            Some(c) => c,
            None => return (lines, false),
        };
        match conn.line_buf.read_lines(&mut conn.stream) {
            LineReadOutcome::Ok(mut new_lines) => {
                lines.append(&mut new_lines);
            }
            LineReadOutcome::Overflow => {
                warn!("line buffer overflow on a connection, dropping the in-progress line");
            }
            LineReadOutcome::End => return (lines, true),
            LineReadOutcome::Error(e) if e.kind() == io::ErrorKind::WouldBlock => return (lines, false),
            LineReadOutcome::Error(e) => {
                warn!("read error on a connection: {}", e);
                return (lines, true);
            }
        }
    }
}
