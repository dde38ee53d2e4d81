//! Property tests for the codec, the stream assembler and the scheduler

use presence_gateway::checksum;
use presence_gateway::config::parse_addresses;
use presence_gateway::poll::PollScheduler;
use presence_gateway::FrameAssembler;
use proptest::prelude::*;
use std::time::Duration;

/// Build a CRC-valid register read response
fn read_response(address: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![address, 0x03, data.len() as u8];
    frame.extend_from_slice(data);
    checksum::append(&mut frame);
    frame
}

fn response_strategy() -> impl Strategy<Value = Vec<u8>> {
    (1u8..=247, prop::collection::vec(any::<u8>(), 0..16))
        .prop_map(|(address, data)| read_response(address, &data))
}

/// Bytes the assembler can only treat as noise
fn noise_byte() -> impl Strategy<Value = u8> {
    (0u8..0x80).prop_filter("looks like a function code", |b| *b != 0x03)
}

proptest! {
    #[test]
    fn crc_appended_frame_verifies(payload in prop::collection::vec(any::<u8>(), 2..64)) {
        let mut frame = payload.clone();
        checksum::append(&mut frame);

        prop_assert!(checksum::verify(&frame));
        let crc = checksum::compute(&payload);
        prop_assert_eq!(frame[frame.len() - 2], (crc & 0xFF) as u8);
        prop_assert_eq!(frame[frame.len() - 1], (crc >> 8) as u8);
    }

    #[test]
    fn crc_detects_single_bit_flips(
        payload in prop::collection::vec(any::<u8>(), 2..64),
        bit in any::<prop::sample::Index>(),
    ) {
        let mut frame = payload;
        checksum::append(&mut frame);
        let bit = bit.index(frame.len() * 8);
        frame[bit / 8] ^= 1 << (bit % 8);

        prop_assert!(!checksum::verify(&frame));
    }

    #[test]
    fn chunking_does_not_change_frames(
        frames in prop::collection::vec(response_strategy(), 1..8),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
    ) {
        let stream: Vec<u8> = frames.concat();

        let mut whole = FrameAssembler::new();
        let expected: Vec<Vec<u8>> = whole
            .push(&stream)
            .iter()
            .map(|f| f.as_bytes().to_vec())
            .collect();
        prop_assert_eq!(&expected, &frames);

        let mut points: Vec<usize> = cuts.iter().map(|c| c.index(stream.len())).collect();
        points.sort_unstable();
        points.dedup();

        let mut chunked = FrameAssembler::new();
        let mut got = Vec::new();
        let mut start = 0;
        for point in points.into_iter().chain(std::iter::once(stream.len())) {
            got.extend(chunked.push(&stream[start..point]).iter().map(|f| f.as_bytes().to_vec()));
            start = point;
        }

        prop_assert_eq!(got, expected);
        prop_assert_eq!(chunked.buffered(), 0);
    }

    #[test]
    fn resynchronizes_after_noise(
        noise in prop::collection::vec(noise_byte(), 1..32),
        address in noise_byte().prop_filter("valid address", |a| *a >= 1),
        data in prop::collection::vec(any::<u8>(), 2..6),
    ) {
        let frame = read_response(address, &data);
        let mut stream = noise.clone();
        stream.extend_from_slice(&frame);

        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(&stream);

        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(frames[0].as_bytes(), frame.as_slice());
        prop_assert_eq!(assembler.stats().noise_bytes, noise.len() as u64);
    }

    #[test]
    fn arbitrary_input_never_exceeds_cap(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..32),
    ) {
        let mut assembler = FrameAssembler::with_max_buffered(64);
        for chunk in &chunks {
            for frame in assembler.push(chunk) {
                prop_assert!(checksum::verify(frame.as_bytes()));
            }
            prop_assert!(assembler.buffered() <= 64);
        }
    }

    #[test]
    fn round_robin_is_fair(
        addresses in prop::collection::btree_set(1u8..=247, 1..16),
        rounds in 1usize..8,
    ) {
        let addresses: Vec<u8> = addresses.into_iter().collect();
        let mut scheduler = PollScheduler::new(
            addresses.clone(),
            Duration::from_secs(1),
            Duration::from_millis(100),
        );

        let polled: Vec<u8> = (0..addresses.len() * rounds)
            .filter_map(|_| scheduler.advance())
            .collect();

        for address in &addresses {
            let count = polled.iter().filter(|a| *a == address).count();
            prop_assert_eq!(count, rounds);
        }
        prop_assert_eq!(&polled[..addresses.len()], addresses.as_slice());
    }

    #[test]
    fn parsed_addresses_are_sorted_unique_and_in_range(
        parts in prop::collection::vec((0u32..300, prop::option::of(0u32..300)), 0..10),
    ) {
        let input = parts
            .iter()
            .map(|(a, b)| match b {
                Some(b) => format!("{}-{}", a, b),
                None => a.to_string(),
            })
            .collect::<Vec<_>>()
            .join(",");

        let parsed = parse_addresses(&input);
        prop_assert!(parsed.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(parsed.iter().all(|a| (1..=247).contains(a)));
    }
}
