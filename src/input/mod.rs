//! Input actuation
//!
//! Synthetic keyboard and mouse primitives behind a trait so the
//! orchestrator and its tests never depend on a real input backend.

pub mod playback;

use anyhow::Result;
use enigo::{Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};

/// A key identified by the character the game binds it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(pub char);

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}'", self.0)
    }
}

/// Executes input primitives. Implementations are best-effort: a failed
/// injection is an error for the caller to log, never a panic.
pub trait InputActuator: Send {
    fn press_key(&mut self, key: Key) -> Result<()>;
    fn release_key(&mut self, key: Key) -> Result<()>;

    fn tap_key(&mut self, key: Key) -> Result<()> {
        self.press_key(key)?;
        self.release_key(key)
    }

    fn move_cursor(&mut self, x: i32, y: i32) -> Result<()>;
    fn click(&mut self) -> Result<()>;
}

/// enigo-backed actuator.
pub struct EnigoActuator {
    enigo: Enigo,
}

impl EnigoActuator {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow::anyhow!("failed to initialize input backend: {e}"))?;
        Ok(Self { enigo })
    }
}

impl InputActuator for EnigoActuator {
    fn press_key(&mut self, key: Key) -> Result<()> {
        self.enigo
            .key(enigo::Key::Unicode(key.0), Direction::Press)
            .map_err(|e| anyhow::anyhow!("key press {key} failed: {e}"))
    }

    fn release_key(&mut self, key: Key) -> Result<()> {
        self.enigo
            .key(enigo::Key::Unicode(key.0), Direction::Release)
            .map_err(|e| anyhow::anyhow!("key release {key} failed: {e}"))
    }

    fn move_cursor(&mut self, x: i32, y: i32) -> Result<()> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| anyhow::anyhow!("cursor move failed: {e}"))
    }

    fn click(&mut self) -> Result<()> {
        self.enigo
            .button(Button::Left, Direction::Click)
            .map_err(|e| anyhow::anyhow!("click failed: {e}"))
    }
}

#[cfg(test)]
pub mod recording {
    //! Recording actuator shared by orchestrator and playback tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    /// Every primitive an actuator executed, in order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Action {
        Press(char),
        Release(char),
        Move(i32, i32),
        Click,
    }

    #[derive(Clone, Default)]
    pub struct RecordingActuator {
        pub actions: Arc<Mutex<Vec<Action>>>,
    }

    impl RecordingActuator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn taken(&self) -> Vec<Action> {
            self.actions.lock().unwrap().clone()
        }

        /// Keys currently held down, derived from the action log.
        pub fn held_keys(&self) -> Vec<char> {
            let mut held = Vec::new();
            for action in self.taken() {
                match action {
                    Action::Press(c) => {
                        if !held.contains(&c) {
                            held.push(c);
                        }
                    }
                    Action::Release(c) => held.retain(|&h| h != c),
                    _ => {}
                }
            }
            held
        }
    }

    impl InputActuator for RecordingActuator {
        fn press_key(&mut self, key: Key) -> Result<()> {
            self.actions.lock().unwrap().push(Action::Press(key.0));
            Ok(())
        }

        fn release_key(&mut self, key: Key) -> Result<()> {
            self.actions.lock().unwrap().push(Action::Release(key.0));
            Ok(())
        }

        fn move_cursor(&mut self, x: i32, y: i32) -> Result<()> {
            self.actions.lock().unwrap().push(Action::Move(x, y));
            Ok(())
        }

        fn click(&mut self) -> Result<()> {
            self.actions.lock().unwrap().push(Action::Click);
            Ok(())
        }
    }
}
