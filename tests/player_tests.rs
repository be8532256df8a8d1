//! End-to-end player tests: toy codec → player → engine → simulated ULP.

mod common;

use common::{drain_messages, reference_levels, test_signal, toy_encode, SimBoard, SimClock, ToyCodec};
use rstest::rstest;
use ulp_flac_player::layout::{self, SharedMemory};
use ulp_flac_player::logging::{LogLevel, LogStream};
use ulp_flac_player::{EngineConfig, FaultCode, OutputEngine, Player, PlayerConfig, PlayerError};

const TICK_US: u32 = 10_000;

type TestPlayer<'a> = Player<'a, SimBoard, ToyCodec, SimClock>;

fn linked_player(log: &LogStream) -> TestPlayer<'_> {
    let board = SimBoard::new();
    let clock = board.clock();
    let mut player = Player::new(ToyCodec::new(), clock, log, PlayerConfig::default());
    player
        .link(Some(OutputEngine::new(board, log, EngineConfig::default())))
        .unwrap();
    player
}

fn board<'p>(player: &'p mut TestPlayer<'_>) -> &'p mut SimBoard {
    player.engine_mut().unwrap().platform_mut()
}

/// Tick like the firmware main loop; returns the log collected meanwhile.
fn run_to_end(player: &mut TestPlayer<'_>, log: &LogStream, max_ticks: usize) -> Vec<(LogLevel, String)> {
    let mut messages = Vec::new();
    let mut ticks = 0;
    while player.is_playing() && ticks < max_ticks {
        player.refill_tick().unwrap();
        board(player).advance_us(TICK_US);
        messages.extend(drain_messages(log));
        ticks += 1;
    }
    assert!(!player.is_playing(), "still playing after {} ticks", max_ticks);
    messages
}

#[rstest]
#[case(2_000, 64)]
#[case(1_001, 255)]
#[case(4_500, 1)]
fn test_plays_clip_in_order(#[case] len: usize, #[case] frame_len: usize) {
    let samples = test_signal(len);
    let clip = toy_encode(16_000, &samples, frame_len);
    let expected = reference_levels(&samples);

    let log = LogStream::new();
    let mut player = linked_player(&log);
    // 8.5 MHz / (86 + 445) cycles per sample
    let rate = player.play(&clip).unwrap();
    assert_eq!(rate, 16_007);
    let calibration = player.engine().unwrap().calibration().copied().unwrap();
    assert_eq!(calibration.target_rate, 16_000);
    assert_eq!(calibration.sampling_rate, rate);
    assert!(player.is_playing());

    let messages = run_to_end(&mut player, &log, 2_000);
    assert_eq!(player.fault(), FaultCode::EndOfStream);
    assert_eq!(player.glitch_count(), 0);
    assert_eq!(player.driver().bytes_consumed(), clip.len());
    assert!(messages.iter().any(|(_, m)| m == "Reached end of file"));

    // Drain the ring: silence, the clip, then the last sample held
    for _ in 0..40 {
        player.refill_tick().unwrap();
        board(&mut player).advance_us(TICK_US);
    }
    let output = &board(&mut player).output;
    let start = output
        .windows(expected.len())
        .position(|w| w == expected.as_slice())
        .expect("clip not found in DAC output");
    assert!(output[..start].iter().all(|&level| level == 0x80));
    let last = *expected.last().unwrap();
    assert!(output[start + expected.len()..].iter().all(|&level| level == last));
}

#[test]
fn test_first_refill_packs_low_byte_first() {
    let samples = test_signal(64);
    let clip = toy_encode(8_000, &samples, 16);
    let expected = reference_levels(&samples);

    let log = LogStream::new();
    let mut player = linked_player(&log);
    player.play(&clip).unwrap();
    board(&mut player).stalled = true;

    let filled = player.refill_tick().unwrap();
    assert!(filled >= 1);
    let first = board(&mut player).mem.read_word(layout::slot_addr(0));
    assert_eq!(first, layout::pack_pair(expected[0], expected[1]) as u32);
    assert_eq!(player.engine().unwrap().write_cursor() as usize, filled);
}

#[test]
fn test_glitch_breaker_trips_at_limit() {
    let samples = test_signal(50_000);
    let clip = toy_encode(8_000, &samples, 128);

    let log = LogStream::new();
    let mut player = linked_player(&log);
    player.play(&clip).unwrap();

    // First tick fills whatever the ULP played during start-up
    player.refill_tick().unwrap();
    board(&mut player).stalled = true;

    let mut messages = Vec::new();
    let mut result = Ok(0);
    for _ in 0..99 {
        result = player.refill_tick();
        assert_eq!(result, Ok(0));
        messages.extend(drain_messages(&log));
    }
    assert!(player.is_playing());
    assert_eq!(player.glitch_count(), 99);
    assert!(result.is_ok());

    assert_eq!(player.refill_tick(), Err(PlayerError::Backpressure { glitches: 100 }));
    messages.extend(drain_messages(&log));

    assert!(!player.is_playing());
    assert_eq!(player.fault(), FaultCode::Backpressure);
    assert_eq!(
        messages
            .iter()
            .filter(|(level, m)| *level == LogLevel::Warn && m == "FIFO buffer is full, did ULP stopped?")
            .count(),
        100
    );
    assert!(messages
        .iter()
        .any(|(level, m)| *level == LogLevel::Error && m.starts_with("Forcing player to stop, playtime")));

    let mut dump = String::new();
    player.dump(&mut dump).unwrap();
    assert!(dump.contains("--- ULP FIFO HEAD POS"));
}

#[test]
fn test_glitches_accumulate_across_recoveries() {
    let samples = test_signal(50_000);
    let clip = toy_encode(8_000, &samples, 128);

    let log = LogStream::new();
    let config = PlayerConfig {
        glitch_limit: 3,
        ..PlayerConfig::default()
    };
    let board = SimBoard::new();
    let mut player = Player::new(ToyCodec::new(), board.clock(), &log, config);
    player
        .link(Some(OutputEngine::new(board, &log, EngineConfig::default())))
        .unwrap();
    player.play(&clip).unwrap();
    player.refill_tick().unwrap();

    // Two glitches, recovery, then one more trips the breaker
    assert_eq!(player.refill_tick(), Ok(0));
    assert_eq!(player.refill_tick(), Ok(0));
    player.engine_mut().unwrap().platform_mut().advance_us(TICK_US);
    assert!(player.refill_tick().unwrap() > 0);
    assert_eq!(player.glitch_count(), 2);
    assert_eq!(player.refill_tick(), Err(PlayerError::Backpressure { glitches: 3 }));
}

#[test]
fn test_missing_link_is_reported() {
    let log = LogStream::new();
    let board = SimBoard::new();
    let mut player: TestPlayer<'_> = Player::new(ToyCodec::new(), board.clock(), &log, PlayerConfig::default());

    assert_eq!(player.link(None), Err(PlayerError::NotLinked));
    assert!(!player.is_playing());

    let clip = toy_encode(8_000, &test_signal(16), 16);
    assert_eq!(player.play(&clip), Err(PlayerError::NotLinked));
    assert_eq!(player.refill_tick(), Err(PlayerError::NotLinked));
    assert_eq!(player.fault(), FaultCode::NotLinked);

    let messages = drain_messages(&log);
    assert!(messages.iter().all(|(level, _)| *level == LogLevel::Error));
    assert!(!messages.is_empty());
}

#[test]
fn test_bad_stream_leaves_player_idle() {
    let log = LogStream::new();
    let mut player = linked_player(&log);

    let truncated = b"TOYC\x40";
    assert_eq!(
        player.play(truncated),
        Err(PlayerError::Decode(ulp_flac_player::DecodeError::Malformed))
    );
    assert!(!player.is_playing());
    assert_eq!(player.fault(), FaultCode::Malformed);
    assert!(player.fault().is_failure());
    // The ULP was never started
    assert!(!player.engine().unwrap().platform().sim.is_running());

    let messages = drain_messages(&log);
    assert!(messages.iter().any(|(_, m)| m == "Bad FLAC file"));
    assert!(messages.iter().any(|(_, m)| m.starts_with("playtime ")));
}

#[test]
fn test_replay_resets_session() {
    let samples = test_signal(300);
    let clip = toy_encode(8_000, &samples, 100);

    let log = LogStream::new();
    let mut player = linked_player(&log);
    player.play(&clip).unwrap();
    run_to_end(&mut player, &log, 500);

    player.play(&clip).unwrap();
    assert!(player.is_playing());
    assert_eq!(player.glitch_count(), 0);
    assert_eq!(player.fault(), FaultCode::None);
    assert_eq!(player.driver().decoder().resets, 2);
    run_to_end(&mut player, &log, 500);
    assert_eq!(player.fault(), FaultCode::EndOfStream);
    assert!(!player.fault().is_failure());
}
