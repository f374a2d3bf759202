//! End-to-end streaming on the headless clock
//!
//! Sounds are short 8 kHz WAVs written with hound; the ring is 3 x 50 ms and
//! the fill loop wakes every 10 ms, so timings settle quickly. Tolerances are
//! generous to survive loaded CI machines.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use cadence_core::config::{BufferSize, EngineConfig};
use cadence_core::events::ChannelEvent;
use cadence_core::system::AudioSystem;
use cadence_core::{AudioError, ChannelState, PlaybackState};

const RATE: u32 = 8000;

fn system() -> AudioSystem {
    let mut config = EngineConfig::headless()
        .with_sample_rate(RATE)
        .with_poll_interval_ms(10)
        // 400 mono frames = 50 ms per buffer
        .with_buffer_capacity(1600);
    config.device.buffer_size = BufferSize::Fixed(80);
    AudioSystem::new(config).unwrap()
}

fn write_tone(dir: &Path, name: &str, ms: u64) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let frames = RATE as u64 * ms / 1000;
    for n in 0..frames {
        let phase = n as f32 * 330.0 * std::f32::consts::TAU / RATE as f32;
        writer.write_sample((phase.sin() * 8000.0) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

fn finished(system: &AudioSystem, index: i32) -> bool {
    let pool = system.pool();
    pool.channel_state(index).unwrap() == ChannelState::Idle
        && pool.playback_state(index).unwrap_or_default() == PlaybackState::Stopped
}

#[test]
fn play_reports_playing() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "tone.wav", 1000);
    let system = system();

    system.pool().play(0, &tone, 1.0, 1.0, 0).unwrap();
    assert!(wait_until(Duration::from_millis(200), || {
        system.pool().playback_state(0) == Ok(PlaybackState::Playing)
    }));
    assert_eq!(system.pool().duration(0).unwrap(), 1000);
    assert_eq!(system.pool().sample_rate(0).unwrap(), RATE);
}

#[test]
fn two_second_sound_plays_for_two_seconds() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "two.wav", 2000);
    let system = system();
    let events = system.events();

    let started = Instant::now();
    system.pool().play(0, &tone, 1.0, 1.0, 0).unwrap();
    assert!(wait_until(Duration::from_secs(4), || finished(&system, 0)));
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(1900), "finished early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(2600), "finished late: {:?}", elapsed);

    let received: Vec<ChannelEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            ChannelEvent::Started { channel: 0 },
            ChannelEvent::Completed { channel: 0 }
        ]
    );
    // The sound stays bound after finishing naturally
    assert_eq!(system.pool().duration(0).unwrap(), 2000);
}

#[test]
fn loop_count_repeats_the_sound() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "short.wav", 500);
    let system = system();
    let pool = system.pool();

    let started = Instant::now();
    pool.play(0, &tone, 1.0, 1.0, 2).unwrap();

    // Shortly after the first pass the position has wrapped
    thread::sleep(Duration::from_millis(650));
    let position = pool.position(0).unwrap();
    assert!(position < 400, "position did not wrap: {} ms", position);
    assert!(pool.loop_count(0).unwrap() < 2);

    assert!(wait_until(Duration::from_secs(3), || finished(&system, 0)));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1400), "finished early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(2100), "finished late: {:?}", elapsed);
    assert_eq!(pool.loop_count(0).unwrap(), 0);
}

#[test]
fn infinite_loop_keeps_playing() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "blip.wav", 120);
    let system = system();

    system.pool().play(0, &tone, 1.0, 1.0, -1).unwrap();
    thread::sleep(Duration::from_millis(600));
    assert_eq!(system.pool().playback_state(0).unwrap(), PlaybackState::Playing);
    assert_eq!(system.pool().loop_count(0).unwrap(), -1);

    system.pool().stop(0).unwrap();
    assert_eq!(system.pool().channel_state(0).unwrap(), ChannelState::Idle);
}

#[test]
fn replaying_same_sound_keeps_position() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "song.wav", 2000);
    let system = system();
    let pool = system.pool();
    let events = system.events();

    pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
    thread::sleep(Duration::from_millis(500));
    let before = pool.position(0).unwrap();
    assert!(before >= 300, "not advancing: {} ms", before);

    pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
    let after = pool.position(0).unwrap();
    assert!(after >= before, "position reset: {} -> {} ms", before, after);

    // No second worker was started
    thread::sleep(Duration::from_millis(50));
    let starts = events
        .try_iter()
        .filter(|e| matches!(e, ChannelEvent::Started { .. }))
        .count();
    assert_eq!(starts, 1);
}

#[test]
fn replaying_finished_sound_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "cue.wav", 200);
    let system = system();
    let pool = system.pool();

    pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
    assert!(wait_until(Duration::from_secs(2), || finished(&system, 0)));

    pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
    assert!(wait_until(Duration::from_millis(200), || {
        pool.playback_state(0) == Ok(PlaybackState::Playing)
    }));
    assert!(pool.position(0).unwrap() < 150);
}

#[test]
fn playing_another_sound_replaces_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_tone(dir.path(), "first.wav", 2000);
    let second = write_tone(dir.path(), "second.wav", 1000);
    let system = system();
    let pool = system.pool();
    let events = system.events();

    pool.play(0, &first, 1.0, 1.0, 0).unwrap();
    thread::sleep(Duration::from_millis(200));
    pool.play(0, &second, 1.0, 1.0, 0).unwrap();

    let channel = pool.channel(0).unwrap().unwrap();
    assert_eq!(channel.sound_path().unwrap(), second.canonicalize().unwrap());
    assert_eq!(pool.duration(0).unwrap(), 1000);
    assert!(wait_until(Duration::from_millis(200), || {
        pool.playback_state(0) == Ok(PlaybackState::Playing)
    }));

    // The first stream was halted, not completed
    let completed = events
        .try_iter()
        .filter(|e| matches!(e, ChannelEvent::Completed { .. }))
        .count();
    assert_eq!(completed, 0);
}

#[test]
fn failed_swap_keeps_current_sound() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "keep.wav", 1000);
    let system = system();
    let pool = system.pool();

    pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
    let err = pool.play(0, dir.path().join("gone.wav"), 1.0, 1.0, 0).unwrap_err();
    assert!(matches!(err, AudioError::FileNotFound(_)));
    assert_eq!(pool.duration(0).unwrap(), 1000);
    assert_eq!(pool.playback_state(0).unwrap(), PlaybackState::Playing);
}

#[test]
fn pause_holds_position() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "hold.wav", 2000);
    let system = system();
    let pool = system.pool();

    pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
    thread::sleep(Duration::from_millis(300));
    pool.pause(0).unwrap();
    assert_eq!(pool.playback_state(0).unwrap(), PlaybackState::Paused);

    let held = pool.position(0).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(pool.position(0).unwrap(), held);

    // Play on a paused channel resumes it
    pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
    assert_eq!(pool.playback_state(0).unwrap(), PlaybackState::Playing);
    thread::sleep(Duration::from_millis(200));
    assert!(pool.position(0).unwrap() > held);
}

#[test]
fn seek_while_streaming() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "long.wav", 2000);
    let system = system();
    let pool = system.pool();

    pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
    thread::sleep(Duration::from_millis(100));

    assert!(matches!(pool.seek(0, 2500), Err(AudioError::OutOfRange(_))));
    pool.seek(0, 1500).unwrap();
    let position = pool.position(0).unwrap();
    assert!((1500..1700).contains(&position), "position after seek: {} ms", position);

    // Only the last half second is left
    let started = Instant::now();
    assert!(wait_until(Duration::from_secs(2), || finished(&system, 0)));
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[test]
fn seek_while_paused_stays_paused() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "still.wav", 2000);
    let system = system();
    let pool = system.pool();

    pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
    thread::sleep(Duration::from_millis(100));
    pool.pause(0).unwrap();
    pool.seek(0, 1000).unwrap();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(pool.playback_state(0).unwrap(), PlaybackState::Paused);
    let position = pool.position(0).unwrap();
    assert!((1000..1050).contains(&position), "position after seek: {} ms", position);
}

#[test]
fn stop_releases_the_sound() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "stop.wav", 2000);
    let system = system();
    let pool = system.pool();

    pool.play(0, &tone, 0.5, 1.0, -1).unwrap();
    thread::sleep(Duration::from_millis(100));
    pool.stop(0).unwrap();

    assert_eq!(pool.channel_state(0).unwrap(), ChannelState::Idle);
    assert_eq!(pool.duration(0), Err(AudioError::NoSound));
    assert_eq!(pool.volume(0).unwrap_or_default(), 0.0);
    pool.stop(0).unwrap();
}

#[test]
fn channels_stream_independently() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_tone(dir.path(), "a.wav", 300);
    let b = write_tone(dir.path(), "b.wav", 1500);
    let system = system();
    let pool = system.pool();

    pool.play(0, &a, 1.0, 1.0, 0).unwrap();
    pool.play(7, &b, 1.0, 1.0, 0).unwrap();

    assert!(wait_until(Duration::from_secs(2), || finished(&system, 0)));
    assert_eq!(pool.playback_state(7).unwrap(), PlaybackState::Playing);

    pool.free(7).unwrap();
    assert!(pool.channel(7).unwrap().is_none());
}

#[test]
fn pause_right_after_play_holds() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "minute.wav", 60_000);
    // Default buffer capacity: the worker pre-fills for a while
    let system = AudioSystem::new(
        EngineConfig::headless()
            .with_sample_rate(RATE)
            .with_poll_interval_ms(10),
    )
    .unwrap();
    let pool = system.pool();

    for _ in 0..10 {
        pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
        pool.pause(0).unwrap();
        thread::sleep(Duration::from_millis(100));

        assert_eq!(pool.playback_state(0).unwrap(), PlaybackState::Paused);
        let held = pool.position(0).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(pool.position(0).unwrap(), held);
        pool.stop(0).unwrap();
    }
}

#[test]
fn empty_sound_with_endless_loop_completes() {
    let dir = tempfile::tempdir().unwrap();
    let silent = write_tone(dir.path(), "empty.wav", 0);
    let system = system();
    let events = system.events();

    system.pool().play(0, &silent, 1.0, 1.0, -1).unwrap();
    assert!(wait_until(Duration::from_secs(1), || finished(&system, 0)));
    let received: Vec<ChannelEvent> = events.try_iter().collect();
    assert_eq!(received, vec![ChannelEvent::Completed { channel: 0 }]);
}

#[test]
fn seek_beyond_representable_time_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "far.wav", 1000);
    let system = system();
    let pool = system.pool();

    pool.play(0, &tone, 1.0, 1.0, 0).unwrap();
    assert!(matches!(pool.seek(0, u64::MAX), Err(AudioError::OutOfRange(_))));
    assert!(matches!(pool.seek(0, 2_305_843_009_213_694), Err(AudioError::OutOfRange(_))));
    assert_eq!(pool.playback_state(0).unwrap(), PlaybackState::Playing);
    pool.seek(0, 500).unwrap();
}
