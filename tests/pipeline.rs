mod tests {
    use std::time::{Duration as StdDuration, Instant as StdInstant};

    use myrtio_ddp_receiver::cobs::{encode, max_encoded_len};
    use myrtio_ddp_receiver::ddp::{ID_BROADCAST, ID_DEFAULT, ParseError};
    use myrtio_ddp_receiver::{
        ByteSource, ChannelTable, DropReason, Duration, Header, Instant, LedOutput,
        NoopObserver, Observer, Packet, Pipeline, PipelineConfig, PipelineController,
        PipelineState, Rgb, StatsSnapshot, TickResult,
    };

    const QUEUE: usize = 4096;

    const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
    const BLUE: Rgb = Rgb { r: 0, g: 0, b: 255 };

    /// LED output that records writes and panics on out of range indices
    #[derive(Debug, Default)]
    struct MockStrip {
        pixels: Vec<Rgb>,
        writes: Vec<usize>,
        flushes: usize,
    }

    impl MockStrip {
        fn new(len: usize) -> Self {
            Self {
                pixels: vec![Rgb::default(); len],
                ..Self::default()
            }
        }
    }

    impl LedOutput for MockStrip {
        fn pixel_count(&self) -> usize {
            self.pixels.len()
        }

        fn set_pixel(&mut self, index: usize, color: Rgb) {
            assert!(index < self.pixels.len(), "write past end: {}", index);
            self.pixels[index] = color;
            self.writes.push(index);
        }

        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Accepted(usize, u32),
        FrameDropped(usize, u32),
        Rate(u32, Duration),
        Processed(usize, u32),
        Dropped(DropReason, usize, u32),
        Stats(StatsSnapshot),
    }

    #[derive(Debug, Default)]
    struct Recorder {
        events: Vec<Event>,
    }

    impl Recorder {
        fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
            self.events.iter().filter(|event| matches(event)).count()
        }
    }

    impl Observer for Recorder {
        fn frame_accepted(&mut self, len: usize, received: u32) {
            self.events.push(Event::Accepted(len, received));
        }

        fn frame_dropped(&mut self, len: usize, dropped: u32) {
            self.events.push(Event::FrameDropped(len, dropped));
        }

        fn receive_rate(&mut self, frames: u32, elapsed: Duration) {
            self.events.push(Event::Rate(frames, elapsed));
        }

        fn packet_processed(&mut self, _packet: &Packet<'_>, pixels: usize, processed: u32) {
            self.events.push(Event::Processed(pixels, processed));
        }

        fn packet_dropped(&mut self, reason: DropReason, frame: &[u8], dropped: u32) {
            self.events.push(Event::Dropped(reason, frame.len(), dropped));
        }

        fn stats(&mut self, snapshot: &StatsSnapshot) {
            self.events.push(Event::Stats(*snapshot));
        }
    }

    /// Source that hands out a single byte per read
    struct OneByte<'a>(&'a [u8]);

    impl ByteSource for OneByte<'_> {
        fn read(&mut self, buf: &mut [u8]) -> usize {
            let Some((&first, rest)) = self.0.split_first() else {
                return 0;
            };
            buf[0] = first;
            self.0 = rest;
            1
        }
    }

    type Controller<'a, const Q: usize> = PipelineController<'a, MockStrip, Recorder, Q, 4>;

    fn packet(header: Header, colors: &[Rgb]) -> Vec<u8> {
        let mut bytes = header.to_bytes().to_vec();
        for color in colors {
            bytes.extend_from_slice(&[color.r, color.g, color.b]);
        }
        bytes
    }

    fn stuffed(frame: &[u8]) -> Vec<u8> {
        let mut out = vec![0; max_encoded_len(frame.len())];
        let len = encode(frame, &mut out).unwrap();
        out.truncate(len);
        out
    }

    fn ms(millis: u64) -> Instant {
        Instant::from_millis(millis)
    }

    fn started<const Q: usize>(
        shared: &Pipeline<Q>,
        channels: ChannelTable<MockStrip, 4>,
    ) -> Controller<'_, Q> {
        let mut controller =
            PipelineController::new(shared, channels, Recorder::default(), &PipelineConfig::default());
        assert!(controller.begin(ms(0), |_| {}));
        controller
    }

    fn strip<'c, const Q: usize>(controller: &'c Controller<'_, Q>, id: u8) -> &'c MockStrip {
        controller.channels().get(id).unwrap().output()
    }

    #[test]
    fn test_end_to_end_with_push() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = PipelineController::<_, _, QUEUE, 4>::new(
            &shared,
            ChannelTable::single(MockStrip::new(50)),
            Recorder::default(),
            &PipelineConfig::default(),
        );

        let mut receiver = None;
        assert!(controller.begin(ms(0), |rx| receiver = Some(rx)));
        let mut receiver = receiver.unwrap();
        assert!(receiver.is_active());

        let frame = packet(Header::rgb(ID_DEFAULT, 0, 9).with_push(), &[RED, GREEN, BLUE]);
        let stream = stuffed(&frame);
        let mut source = OneByte(&stream);
        assert_eq!(receiver.poll(&mut source, &mut NoopObserver, ms(1)), 1);
        assert_eq!(shared.stats().received(), 1);

        assert_eq!(
            controller.tick(ms(2)),
            TickResult::Processed {
                pixels: 3,
                pushed: true
            }
        );
        assert_eq!(controller.tick(ms(3)), TickResult::Idle);

        let strip = strip(&controller, ID_DEFAULT);
        assert_eq!(strip.flushes, 1);
        assert_eq!(strip.pixels[..3], [RED, GREEN, BLUE]);
        assert_eq!(controller.stats().processed, 1);
    }

    #[test]
    fn test_end_to_end_without_push() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = PipelineController::<_, _, QUEUE, 4>::new(
            &shared,
            ChannelTable::single(MockStrip::new(50)),
            NoopObserver,
            &PipelineConfig::default(),
        );

        let mut receiver = None;
        controller.begin(ms(0), |rx| receiver = Some(rx));
        let mut receiver = receiver.unwrap();

        let frame = packet(Header::rgb(ID_DEFAULT, 0, 6), &[RED, GREEN]);
        let stream = stuffed(&frame);
        receiver.poll(&mut stream.as_slice(), &mut NoopObserver, ms(1));

        assert_eq!(
            controller.tick(ms(2)),
            TickResult::Processed {
                pixels: 2,
                pushed: false
            }
        );
        let strip = controller.channels().get(ID_DEFAULT).unwrap().output();
        assert_eq!(strip.flushes, 0);
        assert_eq!(strip.pixels[..2], [RED, GREEN]);
    }

    #[test]
    fn test_start_pixel_is_clamped() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = started(&shared, ChannelTable::single(MockStrip::new(50)));

        let frame = packet(Header::rgb(ID_DEFAULT, 147, 9).with_push(), &[RED, GREEN, BLUE]);
        shared.queue().write(&frame).unwrap();

        assert_eq!(
            controller.tick(ms(1)),
            TickResult::Processed {
                pixels: 1,
                pushed: true
            }
        );
        let strip = strip(&controller, ID_DEFAULT);
        assert_eq!(strip.writes, [49]);
        assert_eq!(strip.pixels[49], RED);
    }

    #[test]
    fn test_start_pixel_out_of_range() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = started(&shared, ChannelTable::single(MockStrip::new(50)));

        shared
            .queue()
            .write(&packet(Header::rgb(ID_DEFAULT, 150, 3).with_push(), &[RED]))
            .unwrap();

        assert_eq!(
            controller.tick(ms(1)),
            TickResult::Dropped(DropReason::StartOutOfRange {
                start: 50,
                pixel_count: 50
            })
        );
        let strip = strip(&controller, ID_DEFAULT);
        assert!(strip.writes.is_empty());
        assert_eq!(strip.flushes, 0);
        assert_eq!(controller.stats().dropped, 1);
    }

    #[test]
    fn test_unknown_destination_is_dropped() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = started(&shared, ChannelTable::single(MockStrip::new(10)));

        shared
            .queue()
            .write(&packet(Header::rgb(9, 0, 3).with_push(), &[RED]))
            .unwrap();

        assert_eq!(
            controller.tick(ms(1)),
            TickResult::Dropped(DropReason::UnknownDestination(9))
        );
        assert!(strip(&controller, ID_DEFAULT).writes.is_empty());
        assert_eq!(controller.stats().processed, 0);
        assert_eq!(controller.stats().dropped, 1);
    }

    #[test]
    fn test_routes_by_destination() {
        let shared = Pipeline::<QUEUE>::new();
        let mut channels = ChannelTable::new();
        channels.add(1, MockStrip::new(10)).unwrap();
        channels.add(2, MockStrip::new(10)).unwrap();
        let mut controller = started(&shared, channels);

        shared
            .queue()
            .write(&packet(Header::rgb(2, 3, 3).with_push(), &[BLUE]))
            .unwrap();
        controller.tick(ms(1));

        assert!(strip(&controller, 1).writes.is_empty());
        assert_eq!(strip(&controller, 2).writes, [1]);
        assert_eq!(strip(&controller, 2).pixels[1], BLUE);
        assert_eq!(strip(&controller, 2).flushes, 1);
    }

    #[test]
    fn test_broadcast_dims_each_channel_from_original_data() {
        let shared = Pipeline::<QUEUE>::new();
        let mut channels = ChannelTable::new();
        channels.add(1, MockStrip::new(10)).unwrap();
        channels.add(2, MockStrip::new(20)).unwrap();
        let mut controller = started(&shared, channels);

        let gray = Rgb::new(200, 200, 200);
        shared
            .queue()
            .write(&packet(Header::rgb(ID_BROADCAST, 0, 45).with_push(), &[gray; 15]))
            .unwrap();

        assert_eq!(
            controller.tick(ms(1)),
            TickResult::Processed {
                pixels: 25,
                pushed: true
            }
        );

        // 10 of 10 lit: scale 102
        let first = strip(&controller, 1);
        assert_eq!(first.pixels, [Rgb::new(79, 79, 79); 10]);
        assert_eq!(first.flushes, 1);

        // 15 of 20 lit: scale 255 - 11 * 153 / 16 = 150
        let second = strip(&controller, 2);
        assert_eq!(second.pixels[..15], [Rgb::new(117, 117, 117); 15]);
        assert_eq!(second.pixels[15], Rgb::default());
        assert_eq!(second.flushes, 1);
        assert_eq!(controller.stats().processed, 1);
    }

    #[test]
    fn test_parse_failure_is_counted_and_reported() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = started(&shared, ChannelTable::single(MockStrip::new(10)));

        let mut frame = packet(Header::rgb(ID_DEFAULT, 0, 3), &[RED]);
        frame[0] = 0x80;
        shared.queue().write(&frame).unwrap();

        let reason = DropReason::Malformed(ParseError::BadVersion(0x80));
        assert_eq!(controller.tick(ms(1)), TickResult::Dropped(reason));
        assert_eq!(
            controller.observer().events,
            [Event::Dropped(reason, frame.len(), 1)]
        );
        assert_eq!(controller.stats().dropped, 1);
    }

    #[test]
    fn test_drop_reports_are_limited() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = started(&shared, ChannelTable::single(MockStrip::new(10)));

        for i in 0..8 {
            shared.queue().write(&[0xFF; 4]).unwrap();
            assert!(matches!(controller.tick(ms(i)), TickResult::Dropped(_)));
        }

        assert_eq!(
            controller
                .observer()
                .count(|event| matches!(event, Event::Dropped(..))),
            5
        );
        assert_eq!(controller.stats().dropped, 8);
    }

    #[test]
    fn test_corrupted_queue_entry_resets_queue() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = started(&shared, ChannelTable::single(MockStrip::new(10)));

        // Larger than the render buffer
        shared.queue().write(&[0x41; 3000]).unwrap();
        shared
            .queue()
            .write(&packet(Header::rgb(ID_DEFAULT, 0, 3), &[RED]))
            .unwrap();

        assert_eq!(
            controller.tick(ms(1)),
            TickResult::Dropped(DropReason::QueueCorrupted)
        );
        assert!(shared.queue().is_empty());
        assert_eq!(controller.tick(ms(2)), TickResult::Idle);
    }

    #[test]
    fn test_periodic_stats() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = started(&shared, ChannelTable::single(MockStrip::new(10)));
        let frame = packet(Header::rgb(ID_DEFAULT, 0, 3), &[RED]);

        for now in [1000, 4999, 5000, 6000, 10_000] {
            shared.queue().write(&frame).unwrap();
            controller.tick(ms(now));
        }

        let stats: Vec<u32> = controller
            .observer()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Stats(snapshot) => Some(snapshot.processed),
                _ => None,
            })
            .collect();
        assert_eq!(stats, [3, 5]);
    }

    #[test]
    fn test_idle_until_started() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = PipelineController::<_, _, QUEUE, 4>::new(
            &shared,
            ChannelTable::single(MockStrip::new(10)),
            NoopObserver,
            &PipelineConfig::default(),
        );
        assert_eq!(controller.state(), PipelineState::Stopped);

        shared
            .queue()
            .write(&packet(Header::rgb(ID_DEFAULT, 0, 3), &[RED]))
            .unwrap();
        assert_eq!(controller.tick(ms(0)), TickResult::Idle);

        // Starting clears anything queued before the run
        controller.begin(ms(0), |_| {});
        assert_eq!(controller.state(), PipelineState::Running);
        assert_eq!(controller.tick(ms(1)), TickResult::Idle);
    }

    #[test]
    fn test_begin_end_lifecycle() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = PipelineController::<_, _, QUEUE, 4>::new(
            &shared,
            ChannelTable::single(MockStrip::new(10)),
            NoopObserver,
            &PipelineConfig::default(),
        );

        let mut first = None;
        assert!(controller.begin(ms(0), |rx| first = Some(rx)));
        assert!(!controller.begin(ms(1), |_| panic!("launched twice")));
        let first = first.unwrap();
        assert!(first.is_active());
        assert!(shared.is_running());

        controller.end();
        assert_eq!(controller.state(), PipelineState::Stopped);
        assert!(!first.is_active());

        let mut second = None;
        assert!(controller.begin(ms(2), |rx| second = Some(rx)));
        assert!(second.unwrap().is_active());
        // A receiver from an earlier run stays stopped
        assert!(!first.is_active());
    }

    #[test]
    fn test_begin_resets_statistics() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = started(&shared, ChannelTable::single(MockStrip::new(10)));
        shared.queue().write(&[0xFF; 4]).unwrap();
        controller.tick(ms(1));
        assert_eq!(controller.stats().dropped, 1);

        controller.end();
        controller.begin(ms(2), |_| {});
        assert_eq!(controller.stats().dropped, 0);
    }

    #[test]
    fn test_receiver_counts_queue_overflow() {
        let shared = Pipeline::<64>::new();
        let mut controller = started(&shared, ChannelTable::single(MockStrip::new(10)));

        let mut receiver = None;
        controller.end();
        controller.begin(ms(0), |rx| receiver = Some(rx));
        let mut receiver = receiver.unwrap();

        // 19 byte frames take 21 bytes each, three fit
        let frame = packet(Header::rgb(ID_DEFAULT, 0, 9), &[RED, GREEN, BLUE]);
        let mut stream = Vec::new();
        for _ in 0..4 {
            stream.extend(stuffed(&frame));
        }

        let mut recorder = Recorder::default();
        assert_eq!(receiver.poll(&mut stream.as_slice(), &mut recorder, ms(1)), 3);
        assert_eq!(
            recorder.events,
            [
                Event::Accepted(19, 1),
                Event::Accepted(19, 2),
                Event::Accepted(19, 3),
                Event::FrameDropped(19, 1),
            ]
        );

        let stats = controller.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.dropped, 1);
        assert!(stats.queue_usage > 98.0);
    }

    #[test]
    fn test_receiver_drop_reports_are_limited() {
        let shared = Pipeline::<64>::new();
        let mut controller = PipelineController::<_, _, 64, 4>::new(
            &shared,
            ChannelTable::single(MockStrip::new(10)),
            NoopObserver,
            &PipelineConfig::default(),
        );
        let mut receiver = None;
        controller.begin(ms(0), |rx| receiver = Some(rx));
        let mut receiver = receiver.unwrap();

        // Three 19 byte frames fill the queue, the other nine are dropped
        let frame = packet(Header::rgb(ID_DEFAULT, 0, 9), &[RED, GREEN, BLUE]);
        let mut stream = Vec::new();
        for _ in 0..12 {
            stream.extend(stuffed(&frame));
        }

        let mut recorder = Recorder::default();
        assert_eq!(receiver.poll(&mut stream.as_slice(), &mut recorder, ms(1)), 3);
        let reported: Vec<u32> = recorder
            .events
            .iter()
            .filter_map(|event| match event {
                Event::FrameDropped(_, dropped) => Some(*dropped),
                _ => None,
            })
            .collect();
        assert_eq!(reported, [1, 2, 3, 4, 5]);
        assert_eq!(shared.stats().receive_dropped(), 9);
    }

    #[test]
    fn test_receiver_acks_first_frames_and_reports_rate() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = PipelineController::<_, _, QUEUE, 4>::new(
            &shared,
            ChannelTable::single(MockStrip::new(10)),
            NoopObserver,
            &PipelineConfig::default(),
        );
        let mut receiver = None;
        controller.begin(ms(0), |rx| receiver = Some(rx));
        let mut receiver = receiver.unwrap();

        let frame = packet(Header::rgb(ID_DEFAULT, 0, 3), &[RED]);
        let mut stream = Vec::new();
        for _ in 0..7 {
            stream.extend(stuffed(&frame));
        }

        let mut recorder = Recorder::default();
        receiver.poll(&mut stream.as_slice(), &mut recorder, ms(500));
        assert_eq!(
            recorder.count(|event| matches!(event, Event::Accepted(..))),
            5
        );
        assert_eq!(recorder.count(|event| matches!(event, Event::Rate(..))), 0);

        let mut nothing: &[u8] = &[];
        receiver.poll(&mut nothing, &mut recorder, ms(1000));
        assert_eq!(
            recorder.events.last(),
            Some(&Event::Rate(7, Duration::from_millis(1000)))
        );

        // Nothing new, nothing to report
        receiver.poll(&mut nothing, &mut recorder, ms(2500));
        assert_eq!(recorder.count(|event| matches!(event, Event::Rate(..))), 1);
    }

    #[test]
    fn test_frames_split_across_reads() {
        let shared = Pipeline::<QUEUE>::new();
        let mut controller = started(&shared, ChannelTable::single(MockStrip::new(10)));

        let mut receiver = None;
        controller.end();
        controller.begin(ms(0), |rx| receiver = Some(rx));
        let mut receiver = receiver.unwrap();

        let stream = stuffed(&packet(Header::rgb(ID_DEFAULT, 0, 6).with_push(), &[RED, BLUE]));
        let (head, tail) = stream.split_at(5);
        assert_eq!(receiver.poll(&mut &head[..], &mut NoopObserver, ms(1)), 0);
        assert_eq!(controller.tick(ms(1)), TickResult::Idle);
        assert_eq!(receiver.poll(&mut &tail[..], &mut NoopObserver, ms(2)), 1);
        assert!(matches!(
            controller.tick(ms(2)),
            TickResult::Processed { pixels: 2, .. }
        ));
    }

    #[test]
    fn test_receive_context_on_second_thread() {
        const FRAMES: u32 = 50;

        let shared = Pipeline::<QUEUE>::new();
        let mut controller = PipelineController::<_, _, QUEUE, 4>::new(
            &shared,
            ChannelTable::single(MockStrip::new(30)),
            NoopObserver,
            &PipelineConfig::default(),
        );

        let mut stream = Vec::new();
        for i in 0..FRAMES {
            let color = Rgb::new(i as u8, 0, 0);
            stream.extend(stuffed(&packet(
                Header::rgb(ID_DEFAULT, (i % 30) * 3, 3).with_push(),
                &[color],
            )));
        }

        let mut receiver = None;
        controller.begin(Instant::now(), |rx| receiver = Some(rx));
        let mut receiver = receiver.unwrap();

        std::thread::scope(|scope| {
            let stream = stream.as_slice();
            scope.spawn(move || {
                let mut source = stream;
                receiver.run(&mut source, &mut NoopObserver);
            });

            let deadline = StdInstant::now() + StdDuration::from_secs(10);
            let mut processed = 0;
            while processed + controller.stats().dropped < FRAMES {
                assert!(StdInstant::now() < deadline, "render loop timed out");
                if let TickResult::Processed { .. } = controller.tick(Instant::now()) {
                    processed += 1;
                }
            }
            controller.end();
        });

        let stats = controller.stats();
        assert_eq!(stats.received + stats.dropped, FRAMES);
        assert_eq!(stats.processed, stats.received);
        let strip = controller.channels().get(ID_DEFAULT).unwrap().output();
        assert_eq!(strip.flushes, stats.processed as usize);
    }
}
