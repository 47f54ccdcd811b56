//! Input sampling, fixed-rate tick generation and event fan-out.
//!
//! The loop owns every [`EventHandler`]. Each iteration it diffs the sampled
//! keyboard and mouse against the previous sample, emits a `Tick` once the
//! tick interval has elapsed, then drains the event queue into the handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::events::{dispatch_event, Event, EventHandler, EventPublisher, EventType};
use crate::input::{InputBackend, Key, KeyboardState, MouseButton, MouseState};
use crate::settings::LoopTiming;
use crate::sync::StopToken;

const IDLE_SLEEP: Duration = Duration::from_millis(1);

pub struct EventLoop<I> {
    input: I,
    publisher: EventPublisher,
    receiver: Receiver<Event>,
    handlers: Vec<Box<dyn EventHandler>>,
    timing: LoopTiming,
    game_speed: f32,
    keyboard: KeyboardState,
    mouse: MouseState,
    last_tick: Instant,
    paused: Arc<AtomicBool>,
    dispatched: [u64; EventType::COUNT],
}

impl<I: InputBackend> EventLoop<I> {
    pub fn new(
        input: I,
        publisher: EventPublisher,
        receiver: Receiver<Event>,
        timing: LoopTiming,
        game_speed: f32,
    ) -> Self {
        let keyboard = input.keyboard_state();
        let mouse = input.mouse_state();
        Self {
            input,
            publisher,
            receiver,
            handlers: Vec::new(),
            timing,
            game_speed: if game_speed.is_finite() && game_speed > 0.0 {
                game_speed
            } else {
                1.0
            },
            keyboard,
            mouse,
            last_tick: Instant::now(),
            paused: Arc::new(AtomicBool::new(false)),
            dispatched: [0; EventType::COUNT],
        }
    }

    pub fn add_handler(&mut self, handler: Box<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Shared flag; while set, the loop neither samples input nor ticks.
    pub fn pause_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.paused)
    }

    pub fn dispatched(&self, event_type: EventType) -> u64 {
        self.dispatched[event_type.index()]
    }

    /// Runs until `stop` is requested.
    pub fn run(&mut self, stop: StopToken) {
        info!(handlers = self.handlers.len(), "event_loop_started");
        self.last_tick = Instant::now();
        while !stop.stop_requested() {
            if self.paused.load(Ordering::Acquire) {
                self.last_tick = Instant::now();
                thread::sleep(IDLE_SLEEP);
                continue;
            }
            self.run_once(Instant::now());
            thread::sleep(IDLE_SLEEP);
        }
        info!(
            ticks = self.dispatched(EventType::Tick),
            commands = self.dispatched(EventType::CommandRequest),
            "event_loop_stopped"
        );
    }

    pub fn run_once(&mut self, now: Instant) {
        self.poll_keyboard();
        self.poll_mouse();
        self.poll_tick(now);
        self.drain();
    }

    fn poll_keyboard(&mut self) {
        let current = self.input.keyboard_state();
        if current == self.keyboard {
            return;
        }
        for key in Key::ALL {
            match (self.keyboard.is_down(key), current.is_down(key)) {
                (false, true) => self.publisher.publish(Event::KeyDown { key }),
                (true, false) => self.publisher.publish(Event::KeyUp { key }),
                _ => {}
            }
        }
        self.keyboard = current;
    }

    fn poll_mouse(&mut self) {
        let current = self.input.mouse_state();
        if current == self.mouse {
            return;
        }
        let (x, y) = (current.x, current.y);
        if (x, y) != (self.mouse.x, self.mouse.y) {
            self.publisher.publish(Event::MouseMove { x, y });
        }
        for button in MouseButton::ALL {
            match (self.mouse.is_down(button), current.is_down(button)) {
                (false, true) => self
                    .publisher
                    .publish(Event::MouseButtonDown { button, x, y }),
                (true, false) => self.publisher.publish(Event::MouseButtonUp { button, x, y }),
                _ => {}
            }
        }
        self.mouse = current;
    }

    fn poll_tick(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        if elapsed < self.timing.tick_interval {
            return;
        }
        self.last_tick = now;
        let delta = if elapsed > self.timing.max_frame_delay {
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                max_ms = self.timing.max_frame_delay.as_millis() as u64,
                "tick_clamped"
            );
            self.timing.max_frame_delay
        } else {
            elapsed
        };
        let delta_ms = (delta.as_secs_f32() * 1000.0 * self.game_speed).round() as u32;
        self.publisher.publish(Event::Tick { delta_ms });
    }

    /// Fans every queued event out to all handlers, including events the
    /// handlers publish while this runs.
    fn drain(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.dispatched[event.event_type().index()] += 1;
            for handler in &mut self.handlers {
                dispatch_event(handler.as_mut(), &event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::events::event_channel;
    use crate::sync::StopSource;

    #[derive(Clone, Default)]
    struct ScriptedInput {
        state: Arc<Mutex<(KeyboardState, MouseState)>>,
    }

    impl ScriptedInput {
        fn press(&self, key: Key, is_down: bool) {
            self.state.lock().expect("input").0.set(key, is_down);
        }

        fn click(&self, button: MouseButton, is_down: bool) {
            self.state.lock().expect("input").1.set_button(button, is_down);
        }

        fn move_to(&self, x: i32, y: i32) {
            let mut state = self.state.lock().expect("input");
            state.1.x = x;
            state.1.y = y;
        }
    }

    impl InputBackend for ScriptedInput {
        fn keyboard_state(&self) -> KeyboardState {
            self.state.lock().expect("input").0
        }

        fn mouse_state(&self) -> MouseState {
            self.state.lock().expect("input").1
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
        ticks: Arc<Mutex<Vec<u32>>>,
    }

    impl EventHandler for Recorder {
        fn on_tick(&mut self, delta_ms: u32) {
            self.ticks.lock().expect("ticks").push(delta_ms);
        }

        fn on_event(&mut self, event: &Event) {
            self.events.lock().expect("events").push(event.clone());
        }
    }

    fn timing() -> LoopTiming {
        LoopTiming {
            tick_interval: Duration::from_millis(16),
            max_frame_delay: Duration::from_millis(100),
            render_frame_target: Duration::from_millis(16),
        }
    }

    fn event_loop(input: ScriptedInput, game_speed: f32) -> (EventLoop<ScriptedInput>, Recorder) {
        let (publisher, receiver) = event_channel();
        let mut event_loop = EventLoop::new(input, publisher, receiver, timing(), game_speed);
        let recorder = Recorder::default();
        event_loop.add_handler(Box::new(recorder.clone()));
        (event_loop, recorder)
    }

    #[test]
    fn key_edges_become_down_and_up_events() {
        let input = ScriptedInput::default();
        let (mut event_loop, recorder) = event_loop(input.clone(), 1.0);
        let start = event_loop.last_tick;

        input.press(Key::KeyH, true);
        event_loop.run_once(start);
        event_loop.run_once(start);
        input.press(Key::KeyH, false);
        event_loop.run_once(start);

        let events = recorder.events.lock().expect("events").clone();
        assert_eq!(
            events,
            vec![Event::KeyDown { key: Key::KeyH }, Event::KeyUp { key: Key::KeyH }]
        );
    }

    #[test]
    fn mouse_moves_precede_button_edges() {
        let input = ScriptedInput::default();
        let (mut event_loop, recorder) = event_loop(input.clone(), 1.0);
        let start = event_loop.last_tick;

        input.move_to(30, 40);
        input.click(MouseButton::Right, true);
        event_loop.run_once(start);

        let events = recorder.events.lock().expect("events").clone();
        assert_eq!(
            events,
            vec![
                Event::MouseMove { x: 30, y: 40 },
                Event::MouseButtonDown {
                    button: MouseButton::Right,
                    x: 30,
                    y: 40
                },
            ]
        );
    }

    #[test]
    fn ticks_wait_for_the_interval_and_clamp_long_stalls() {
        let (mut event_loop, recorder) = event_loop(ScriptedInput::default(), 1.0);
        let start = event_loop.last_tick;

        event_loop.run_once(start + Duration::from_millis(10));
        event_loop.run_once(start + Duration::from_millis(20));
        event_loop.run_once(start + Duration::from_millis(1020));

        assert_eq!(*recorder.ticks.lock().expect("ticks"), vec![20, 100]);
        assert_eq!(event_loop.dispatched(EventType::Tick), 2);
    }

    #[test]
    fn game_speed_scales_tick_delta() {
        let (mut event_loop, recorder) = event_loop(ScriptedInput::default(), 2.0);
        let start = event_loop.last_tick;
        event_loop.run_once(start + Duration::from_millis(20));
        assert_eq!(*recorder.ticks.lock().expect("ticks"), vec![40]);
    }

    #[test]
    fn events_published_by_handlers_are_dispatched_in_the_same_drain() {
        struct Echo {
            publisher: EventPublisher,
        }

        impl EventHandler for Echo {
            fn on_key_down(&mut self, key: Key) {
                self.publisher.publish(Event::KeyUp { key });
            }
        }

        let input = ScriptedInput::default();
        let (mut event_loop, recorder) = event_loop(input.clone(), 1.0);
        let echo = Echo {
            publisher: event_loop.publisher().clone(),
        };
        event_loop.add_handler(Box::new(echo));
        let start = event_loop.last_tick;

        input.press(Key::Escape, true);
        event_loop.run_once(start);

        assert_eq!(recorder.events.lock().expect("events").len(), 2);
        assert_eq!(event_loop.dispatched(EventType::KeyUp), 1);
    }

    #[test]
    fn run_returns_once_stop_is_requested() {
        let (mut event_loop, _recorder) = event_loop(ScriptedInput::default(), 1.0);
        let stop = StopSource::new();
        let token = stop.token();
        thread::scope(|scope| {
            let handle = scope.spawn(move || event_loop.run(token));
            thread::sleep(Duration::from_millis(40));
            stop.request_stop();
            handle.join().expect("event loop thread");
        });
    }
}
