use std::time::{Duration, Instant};

use hwaudio_cpal::CpalBackend;
use hwaudio_driver::{AudioBuffer, Direction, HardwareDeviceDriver, SampleFormat};
use tracing_subscriber::EnvFilter;

const CHANNELS: u32 = 2;
const FRAMES_PER_BUFFER: usize = 480;
const QUEUE_DEPTH: usize = 4;

struct Saw {
    freq: f32,
    time: f32,
}

impl Saw {
    fn fill(&mut self, sample_rate: u32, frames: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(frames * CHANNELS as usize * 2);

        for _ in 0..frames {
            let x = self.time / (sample_rate as f32) * self.freq;
            let y = 2.0 * (x - (0.5 + x).floor());
            let sample = (y * 0.25 * f32::from(i16::MAX)) as i16;

            for _ in 0..CHANNELS {
                data.extend_from_slice(&sample.to_ne_bytes());
            }

            self.time += 1.0;
        }

        data
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let probe = CpalBackend::new().unwrap();
    if !HardwareDeviceDriver::is_supported(&probe) {
        tracing::warn!("default output device can't run 6 channels, trying anyway");
    }
    drop(probe);

    let driver = HardwareDeviceDriver::new(CpalBackend::new().unwrap());

    let session = driver
        .open_device_session(Direction::Output, (), SampleFormat::PcmInt16, 0, CHANNELS)
        .unwrap();

    let sample_rate = session.sample_rate();
    let mut saw = Saw {
        freq: 110.0,
        time: 0.0,
    };

    session.start().unwrap();

    let start = Instant::now();
    let mut tag = 0;
    let mut paused = false;

    while start.elapsed() < Duration::from_secs(4) {
        for _ in session.queued_buffer_count()..QUEUE_DEPTH {
            let data = saw.fill(sample_rate, FRAMES_PER_BUFFER);
            session.queue_buffer(AudioBuffer { tag, data }).unwrap();
            tag += 1;
        }

        if !paused && start.elapsed() > Duration::from_secs(2) {
            tracing::info!(played = session.played_sample_count(), "pausing");
            driver.pause();
            std::thread::sleep(Duration::from_millis(500));
            driver.resume();
            paused = true;
        }

        driver
            .update_required_event()
            .wait_timeout(Duration::from_millis(20));
        driver.update_required_event().reset();
    }

    tracing::info!(played = session.played_sample_count(), "done");

    session.stop().unwrap();
    driver.dispose();
}
