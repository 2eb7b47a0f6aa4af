// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, info};

use super::{OlaClient, Patch};
use crate::lighting::sink::Frame;
use crate::sync::CancelHandle;

/// How long the output thread waits for a frame before checking for
/// cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Spawns the thread that renders published frames and sends them to OLA.
/// Only the newest queued frame is sent. The thread exits when cancelled or
/// when the sink side of the channel goes away.
pub fn spawn_output(
    patch: Patch,
    frames: Receiver<Frame>,
    mut client: Box<dyn OlaClient>,
    cancel: CancelHandle,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("dmx-output".to_string())
        .spawn(move || {
            info!(universes = patch.universes().len(), "DMX output started");
            while !cancel.is_cancelled() {
                let frame = match frames.recv_timeout(POLL_INTERVAL) {
                    Ok(frame) => frame,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                let frame = frames.try_iter().last().unwrap_or(frame);
                send_frame(&patch, &frame, client.as_mut());
            }
            info!("DMX output stopped");
        })
}

fn send_frame(patch: &Patch, frame: &Frame, client: &mut dyn OlaClient) {
    debug!(sequence = frame.sequence, "Sending frame");
    for (universe, buffer) in patch.render(&frame.colors) {
        if let Err(err) = client.send_dmx(universe, &buffer) {
            error!(universe, err = err.to_string(), "Error sending DMX to OLA");
        }
    }
}
