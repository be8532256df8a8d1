//! Playback orchestrator.
//!
//! Glues the decode driver to the output engine. The application calls
//! [`Player::refill_tick`] on a timer (every 10 ms in the firmware) and sleeps
//! in between; each tick tops the ring up with exactly as many sample pairs
//! as the ULP has played since the last one.
//!
//! # Glitch circuit breaker
//!
//! A tick that finds the ring completely full means the ULP did not play a
//! single sample since the previous tick. Each such tick counts as a glitch;
//! glitches accumulate over the whole session and at `glitch_limit` the
//! player gives up, goes idle and returns [`PlayerError::Backpressure`].

use core::fmt;

use crate::config::PlayerConfig;
use crate::decoder::{DecodeDriver, FrameDecoder};
use crate::engine::OutputEngine;
use crate::fault::{FaultCode, PlayerError};
use crate::layout;
use crate::logging::LogStream;
use crate::platform::{Clock, Platform};
use crate::{rt_error, rt_info, rt_trace, rt_warn};

const TAG: &str = "flacPlayer";

/// Single-stream player over a borrowed FLAC image.
pub struct Player<'a, P: Platform, D: FrameDecoder, C: Clock> {
    driver: DecodeDriver<'a, D, C>,
    engine: Option<OutputEngine<'a, P>>,
    log: &'a LogStream,
    config: PlayerConfig,
    glitch_count: u32,
}

impl<'a, P: Platform, D: FrameDecoder, C: Clock> Player<'a, P, D, C> {
    /// Idle player with no output engine linked.
    pub fn new(decoder: D, clock: C, log: &'a LogStream, config: PlayerConfig) -> Self {
        Self {
            driver: DecodeDriver::new(decoder, clock, log, config.stall_limit),
            engine: None,
            log,
            config,
            glitch_count: 0,
        }
    }

    /// Attach the output engine. `None` leaves the player unlinked.
    pub fn link(&mut self, engine: Option<OutputEngine<'a, P>>) -> Result<(), PlayerError> {
        self.engine = engine;
        if self.engine.is_none() {
            rt_error!(self.log, self.driver.clock().now_us(), TAG, "No ULP sound engine to link");
            return Err(PlayerError::NotLinked);
        }
        Ok(())
    }

    /// Start a session over `source`; returns the achieved output rate.
    ///
    /// On error the player is idle and `fault()` says why.
    pub fn play(&mut self, source: &'a [u8]) -> Result<u32, PlayerError> {
        let Some(engine) = self.engine.as_mut() else {
            rt_error!(self.log, self.driver.clock().now_us(), TAG, "Cannot play: no ULP sound engine linked");
            let err = PlayerError::NotLinked;
            self.driver.stop(err.code());
            return Err(err);
        };

        self.glitch_count = 0;
        self.driver.bind(source);
        self.driver.init_decoder()?;

        let source_rate = self.driver.sample_rate();
        rt_info!(self.log, self.driver.clock().now_us(), TAG, "Got source SR: {}", source_rate);

        match engine.init(source_rate) {
            Ok(rate) => Ok(rate),
            Err(err) => {
                rt_error!(self.log, self.driver.clock().now_us(), TAG, "ULP start failed: {}", err);
                let err = PlayerError::from(err);
                self.driver.stop(err.code());
                Err(err)
            }
        }
    }

    /// Top the ring up. Returns the number of slots written.
    pub fn refill_tick(&mut self) -> Result<usize, PlayerError> {
        let Some(engine) = self.engine.as_mut() else {
            let err = PlayerError::NotLinked;
            self.driver.stop(err.code());
            return Err(err);
        };

        let free = engine.free_slot_count();
        if free == 0 {
            rt_warn!(self.log, self.driver.clock().now_us(), TAG, "FIFO buffer is full, did ULP stopped?");
            self.glitch_count = self.glitch_count.saturating_add(1);
        }

        for _ in 0..free {
            // The ULP plays the low byte first
            let first = self.driver.next_sample();
            let second = self.driver.next_sample();
            engine.refill(layout::pack_pair(first, second));
        }
        rt_trace!(self.log, self.driver.clock().now_us(), TAG, "Filled {} words", free);

        if self.glitch_count >= self.config.glitch_limit {
            let now = self.driver.clock().now_us();
            let (secs, millis) = self.driver.playtime();
            rt_error!(self.log, now, TAG, "Forcing player to stop, playtime {}.{:03} sec", secs, millis);
            rt_error!(
                self.log,
                now,
                TAG,
                "read cursor {} write cursor {} glitches {}",
                engine.read_cursor(),
                engine.write_cursor(),
                self.glitch_count
            );
            let err = PlayerError::Backpressure {
                glitches: self.glitch_count,
            };
            self.driver.stop(err.code());
            return Err(err);
        }

        Ok(free as usize)
    }

    pub fn is_playing(&self) -> bool {
        !self.driver.is_idle()
    }

    /// Ticks that found the ring full during this session.
    pub fn glitch_count(&self) -> u32 {
        self.glitch_count
    }

    /// Why playback stopped (`None` while playing).
    pub fn fault(&self) -> FaultCode {
        self.driver.fault()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn driver(&self) -> &DecodeDriver<'a, D, C> {
        &self.driver
    }

    pub fn engine(&self) -> Option<&OutputEngine<'a, P>> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut OutputEngine<'a, P>> {
        self.engine.as_mut()
    }

    /// Dump the shared region through the linked engine.
    pub fn dump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        match &self.engine {
            Some(engine) => engine.dump(out),
            None => out.write_str("--- no ULP sound engine linked\r\n"),
        }
    }
}
