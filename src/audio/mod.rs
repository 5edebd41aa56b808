//! Audio stack items and their owning stack.
//!
//! - [`AudioClip`]: what gets played (name and length)
//! - [`AudioSource`]: engine-side playback state (volume and play cursor)
//! - [`AudioStackItem`]: per-clip settings plus the fade envelope
//! - [`AudioStack`]: owns items, ticks them and drops finished ones
//!
//! Decoding and mixing happen elsewhere; these types only track state.

mod item;
mod stack;

pub use item::{AudioStackItem, CLIP_END_EPSILON, VOLUME_EPSILON};
pub use stack::AudioStack;

use std::time::Duration;

/// A playable clip as far as the stack is concerned.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub name: String,
    /// Length in seconds
    pub length: f32,
}

impl AudioClip {
    pub fn new(name: impl Into<String>, length: f32) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }

    pub fn from_duration(name: impl Into<String>, duration: Duration) -> Self {
        Self::new(name, duration.as_secs_f32())
    }
}

/// Playback state of one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    pub volume: f32,
    /// Play cursor in seconds
    pub time: f32,
    pub playing: bool,
    pub looping: bool,
}

impl AudioSource {
    pub fn new(volume: f32, looping: bool) -> Self {
        Self {
            volume,
            time: 0.0,
            playing: false,
            looping,
        }
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Stops and rewinds.
    pub fn stop(&mut self) {
        self.playing = false;
        self.time = 0.0;
    }

    /// Moves the cursor forward. Non-looping sources stop at the clip end.
    pub fn advance(&mut self, delta_secs: f32, clip_length: f32) {
        if !self.playing {
            return;
        }

        self.time += delta_secs;
        if self.time >= clip_length {
            if self.looping && clip_length > 0.0 {
                self.time %= clip_length;
            } else {
                self.time = clip_length;
                self.playing = false;
            }
        }
    }
}
