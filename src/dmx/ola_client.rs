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
use std::error::Error;
use std::thread;
use std::time::Duration;

use ola::client::StreamingClientConfig;
use tracing::{debug, info};

use super::DmxError;

/// How many times to try reaching OLA before giving up.
const CONNECT_ATTEMPTS: usize = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Sends DMX buffers to universes.
pub trait OlaClient: Send {
    fn send_dmx(&mut self, universe: u32, buffer: &ola::DmxBuffer) -> Result<(), Box<dyn Error>>;
}

pub struct RealOlaClient {
    client: ola::StreamingClient<std::net::TcpStream>,
}

impl OlaClient for RealOlaClient {
    fn send_dmx(&mut self, universe: u32, buffer: &ola::DmxBuffer) -> Result<(), Box<dyn Error>> {
        self.client.send_dmx(universe, buffer)?;
        Ok(())
    }
}

/// Connects to the OLA daemon, retrying while it starts up.
pub fn connect(port: u16) -> Result<RealOlaClient, DmxError> {
    let config = StreamingClientConfig {
        server_port: port,
        ..Default::default()
    };

    for attempt in 0..CONNECT_ATTEMPTS {
        // Don't sleep on the first attempt.
        if attempt > 0 {
            thread::sleep(CONNECT_RETRY_DELAY);
        }

        match ola::connect_with_config(config.clone()) {
            Ok(client) => {
                info!(port, "Connected to OLA");
                return Ok(RealOlaClient { client });
            }
            Err(e) => debug!(
                port,
                attempt,
                err = e.to_string(),
                "Error connecting to OLA, retrying"
            ),
        }
    }

    Err(DmxError::Connect { port })
}
