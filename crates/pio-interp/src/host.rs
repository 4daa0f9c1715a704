//! Runs an [`Interpreter`] on its own thread.
//!
//! Commands and responses travel over bounded channels. The device thread never blocks on either
//! one: a response the host has no room for is held back and the rest stay in the RX FIFO, so a
//! host that stops reading eventually stalls the state machine on its `push`. A device that stops
//! fetching eventually fills the command channel. Both directions are strictly FIFO.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pio_sm::{PinChannel, RunExit};
use tracing::{debug, trace};

use crate::error::{InterpError, Result};
use crate::interpreter::Interpreter;

/// Cycles run between polls of the command channel.
const SLICE_CYCLES: u64 = 4096;

const IDLE_POLL: Duration = Duration::from_millis(1);

pub struct DeviceHandle<P: PinChannel + Send + 'static> {
    commands: Option<SyncSender<u32>>,
    responses: Option<Receiver<u32>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Interpreter<P>>>,
}

/// Moves `interp` onto a device thread. `depth` bounds each channel.
pub fn spawn<P: PinChannel + Send + 'static>(
    interp: Interpreter<P>,
    depth: usize,
) -> DeviceHandle<P> {
    let (command_tx, command_rx) = mpsc::sync_channel(depth);
    let (response_tx, response_rx) = mpsc::sync_channel(depth);
    let stop = Arc::new(AtomicBool::new(false));
    let thread = {
        let stop = stop.clone();
        thread::spawn(move || device_loop(interp, command_rx, response_tx, stop))
    };
    DeviceHandle {
        commands: Some(command_tx),
        responses: Some(response_rx),
        stop,
        thread: Some(thread),
    }
}

fn device_loop<P: PinChannel>(
    mut interp: Interpreter<P>,
    commands: Receiver<u32>,
    responses: SyncSender<u32>,
    stop: Arc<AtomicBool>,
) -> Interpreter<P> {
    let mut disconnected = false;
    // A word taken off the channel that did not fit in the TX FIFO yet.
    let mut held: Option<u32> = None;
    // A response taken out of the RX FIFO that did not fit in the response channel yet.
    let mut unsent: Option<u32> = None;
    while !stop.load(Ordering::Relaxed) {
        loop {
            let word = match held.take() {
                Some(word) => word,
                None => match commands.try_recv() {
                    Ok(word) => word,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                },
            };
            if interp.submit(word).is_err() {
                held = Some(word);
                break;
            }
        }

        let exit = interp.run_slice(SLICE_CYCLES);

        while let Some(response) = unsent.take().or_else(|| interp.try_recv()) {
            match responses.try_send(response) {
                Ok(()) => trace!("response {response:#010x}"),
                Err(TrySendError::Full(response)) => {
                    unsent = Some(response);
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("response channel closed, device stopping");
                    return interp;
                }
            }
        }

        if let RunExit::Stalled { .. } = exit {
            if disconnected && held.is_none() && unsent.is_none() && interp.is_idle() {
                debug!("command channel closed and interpreter idle, device stopping");
                break;
            }
            if held.is_none() && unsent.is_none() && !disconnected {
                match commands.recv_timeout(IDLE_POLL) {
                    Ok(word) => held = Some(word),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => disconnected = true,
                }
            } else {
                // Blocked until the pins or the host make room.
                thread::sleep(IDLE_POLL);
            }
        }
    }
    interp
}

impl<P: PinChannel + Send + 'static> DeviceHandle<P> {
    /// Blocks while the command channel is full.
    pub fn send(&self, word: u32) -> Result<()> {
        let commands = self.commands.as_ref().ok_or(InterpError::DeviceStopped)?;
        commands.send(word).map_err(|_| InterpError::DeviceStopped)
    }

    pub fn try_send(&self, word: u32) -> Result<()> {
        let commands = self.commands.as_ref().ok_or(InterpError::DeviceStopped)?;
        commands.try_send(word).map_err(|err| match err {
            TrySendError::Full(_) => InterpError::CommandQueueFull,
            TrySendError::Disconnected(_) => InterpError::DeviceStopped,
        })
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<u32> {
        self.responses.as_ref()?.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<u32> {
        self.responses.as_ref()?.try_recv().ok()
    }

    /// Stops the device immediately and returns the interpreter. Queued commands and responses
    /// are dropped.
    pub fn stop(mut self) -> Result<Interpreter<P>> {
        self.stop.store(true, Ordering::Relaxed);
        self.commands = None;
        // Unblocks a device waiting to hand over a response.
        self.responses = None;
        self.join()
    }

    /// Lets the device finish every queued command, collecting the remaining responses, then
    /// returns the interpreter.
    pub fn close(mut self) -> Result<(Interpreter<P>, Vec<u32>)> {
        self.commands = None;
        let mut collected = Vec::new();
        if let Some(responses) = self.responses.take() {
            // Ends when the device thread exits and drops its sender.
            collected.extend(responses.iter());
        }
        Ok((self.join()?, collected))
    }

    fn join(&mut self) -> Result<Interpreter<P>> {
        let thread = self.thread.take().ok_or(InterpError::DeviceStopped)?;
        thread.join().map_err(|_| InterpError::DevicePanicked)
    }
}

impl<P: PinChannel + Send + 'static> Drop for DeviceHandle<P> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop.store(true, Ordering::Relaxed);
            self.commands = None;
            self.responses = None;
            let _ = thread.join();
        }
    }
}
