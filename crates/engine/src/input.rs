use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    KeyW,
    KeyA,
    KeyS,
    KeyD,
    KeyH,
    KeyT,
    F3,
}

const KEY_COUNT: usize = 12;

impl Key {
    pub const ALL: [Key; KEY_COUNT] = [
        Key::Escape,
        Key::ArrowUp,
        Key::ArrowDown,
        Key::ArrowLeft,
        Key::ArrowRight,
        Key::KeyW,
        Key::KeyA,
        Key::KeyS,
        Key::KeyD,
        Key::KeyH,
        Key::KeyT,
        Key::F3,
    ];

    const fn index(self) -> usize {
        match self {
            Key::Escape => 0,
            Key::ArrowUp => 1,
            Key::ArrowDown => 2,
            Key::ArrowLeft => 3,
            Key::ArrowRight => 4,
            Key::KeyW => 5,
            Key::KeyA => 6,
            Key::KeyS => 7,
            Key::KeyD => 8,
            Key::KeyH => 9,
            Key::KeyT => 10,
            Key::F3 => 11,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardState {
    down: [bool; KEY_COUNT],
}

impl KeyboardState {
    pub fn set(&mut self, key: Key, is_down: bool) {
        self.down[key.index()] = is_down;
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.down[key.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub const ALL: [MouseButton; 3] = [MouseButton::Left, MouseButton::Middle, MouseButton::Right];

    const fn index(self) -> usize {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }
}

/// Cursor position in window pixels plus button states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseState {
    pub x: i32,
    pub y: i32,
    buttons: [bool; 3],
}

impl MouseState {
    pub fn set_button(&mut self, button: MouseButton, is_down: bool) {
        self.buttons[button.index()] = is_down;
    }

    pub fn is_down(&self, button: MouseButton) -> bool {
        self.buttons[button.index()]
    }
}

/// Source of sampled device state. The event loop diffs successive samples into events.
pub trait InputBackend: Send {
    fn keyboard_state(&self) -> KeyboardState;
    fn mouse_state(&self) -> MouseState;
}

#[derive(Debug, Clone, Copy, Default)]
struct InputSnapshot {
    keyboard: KeyboardState,
    mouse: MouseState,
}

/// Input state written by the window host and sampled by the event loop and renderer.
#[derive(Debug, Clone, Default)]
pub struct SharedInput {
    inner: Arc<RwLock<InputSnapshot>>,
}

static INPUT_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

impl SharedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key(&self, key: Key, is_down: bool) {
        self.write(|snapshot| snapshot.keyboard.set(key, is_down));
    }

    pub fn set_mouse_position(&self, x: i32, y: i32) {
        self.write(|snapshot| {
            snapshot.mouse.x = x;
            snapshot.mouse.y = y;
        });
    }

    pub fn set_mouse_button(&self, button: MouseButton, is_down: bool) {
        self.write(|snapshot| snapshot.mouse.set_button(button, is_down));
    }

    fn snapshot(&self) -> InputSnapshot {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_input_lock_poison_once();
                *poisoned.into_inner()
            }
        }
    }

    fn write(&self, apply: impl FnOnce(&mut InputSnapshot)) {
        match self.inner.write() {
            Ok(mut guard) => apply(&mut guard),
            Err(poisoned) => {
                warn_input_lock_poison_once();
                apply(&mut poisoned.into_inner());
            }
        }
    }
}

impl InputBackend for SharedInput {
    fn keyboard_state(&self) -> KeyboardState {
        self.snapshot().keyboard
    }

    fn mouse_state(&self) -> MouseState {
        self.snapshot().mouse
    }
}

fn warn_input_lock_poison_once() {
    if !INPUT_LOCK_POISON_WARNED.swap(true, Ordering::Relaxed) {
        warn!("input_lock_poisoned_recovering");
    }
}
