//! Fixed-tick game clock.
//!
//! Accumulator-based: the main loop calls [`GameClock::tick`] every
//! iteration and runs one world update whenever it returns true. Frame time
//! is capped so a stall cannot snowball into a burst of catch-up ticks.

use std::time::Instant;

pub const DEFAULT_TICK_RATE: u32 = 20;

/// Longest frame the accumulator will absorb, in seconds.
const MAX_FRAME_TIME: f32 = 0.25;

pub struct GameClock {
    tick_rate: u32,
    tick_interval: f32,
    start_time: Instant,
    last_tick_time: Instant,
    accumulator: f32,
    tick_count: u64,
    delta_time: f32,
    started: bool,
}

impl GameClock {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = if tick_rate == 0 {
            DEFAULT_TICK_RATE
        } else {
            tick_rate
        };
        let now = Instant::now();
        GameClock {
            tick_rate,
            tick_interval: 1.0 / tick_rate as f32,
            start_time: now,
            last_tick_time: now,
            accumulator: 0.0,
            tick_count: 0,
            delta_time: 0.0,
            started: false,
        }
    }

    pub fn start(&mut self) {
        let now = Instant::now();
        self.start_time = now;
        self.last_tick_time = now;
        self.accumulator = 0.0;
        self.tick_count = 0;
        self.started = true;

        log::info!(
            "Game clock started (tick rate: {}/sec, interval: {:.0}ms)",
            self.tick_rate,
            self.tick_interval * 1000.0
        );
    }

    /// Advance the accumulator; returns true when a world update is due.
    pub fn tick(&mut self) -> bool {
        if !self.started {
            self.start();
        }

        let now = Instant::now();
        let mut frame_time = now.duration_since(self.last_tick_time).as_secs_f32();
        self.last_tick_time = now;

        if frame_time > MAX_FRAME_TIME {
            log::warn!(
                "Game clock lagging by {:.1}ms",
                (frame_time - MAX_FRAME_TIME) * 1000.0
            );
            frame_time = MAX_FRAME_TIME;
        }

        self.accumulator += frame_time;

        if self.accumulator >= self.tick_interval {
            self.delta_time = self.tick_interval;
            self.accumulator -= self.tick_interval;
            self.tick_count += 1;
            return true;
        }

        false
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Seconds of world time covered by the current tick.
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Milliseconds since the clock started. Cooldown expiries are stored
    /// against this timeline.
    pub fn now_ms(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn uptime_string(&self) -> String {
        let mut seconds = self.uptime_secs();

        let days = seconds / 86_400;
        seconds %= 86_400;
        let hours = seconds / 3_600;
        seconds %= 3_600;
        let minutes = seconds / 60;
        seconds %= 60;

        if days > 0 {
            format!("{days}d {hours:02}:{minutes:02}:{seconds:02}")
        } else {
            format!("{hours:02}:{minutes:02}:{seconds:02}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_falls_back_to_default() {
        let clock = GameClock::new(0);
        assert_eq!(clock.tick_rate(), DEFAULT_TICK_RATE);
    }

    #[test]
    fn interval_matches_rate() {
        let clock = GameClock::new(20);
        assert!((clock.tick_interval - 0.05).abs() < f32::EPSILON);
    }

    #[test]
    fn no_tick_immediately_after_start() {
        let mut clock = GameClock::new(20);
        clock.start();
        assert!(!clock.tick());
        assert_eq!(clock.tick_count(), 0);
    }

    #[test]
    fn tick_fires_after_interval_elapses() {
        let mut clock = GameClock::new(1000);
        clock.start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.tick());
        assert_eq!(clock.tick_count(), 1);
        assert!(clock.delta_time() > 0.0);
    }

    #[test]
    fn uptime_string_formats() {
        let clock = GameClock::new(20);
        let s = clock.uptime_string();
        assert_eq!(s, "00:00:00");
    }
}
