//! Keyed collection of audio stack items

use crate::audio::{AudioSource, AudioStackItem};
use crate::config::AudioStackDesc;
use crate::error::{HydrogenError, Result};
use crate::events::HydrogenEvent;

/// Owns a set of [`AudioStackItem`]s keyed by their unique key.
///
/// The host calls [`update`](Self::update) once per tick; items that finish
/// or fade to silence are dropped and reported as [`HydrogenEvent::ItemRemoved`].
#[derive(Debug, Default)]
pub struct AudioStack {
    desc: AudioStackDesc,
    items: Vec<AudioStackItem>,
    pending_events: Vec<HydrogenEvent>,
}

impl AudioStack {
    pub fn new(desc: AudioStackDesc) -> Self {
        Self {
            desc,
            items: Vec::new(),
            pending_events: Vec::new(),
        }
    }

    /// Adds an item and gives it a fresh source at its start volume.
    pub fn add(&mut self, mut item: AudioStackItem) -> Result<()> {
        if self.contains(&item.key) {
            return Err(HydrogenError::DuplicateKey(item.key));
        }
        if let Some(max) = self.desc.max_items {
            if self.items.len() >= max {
                return Err(HydrogenError::StackFull(max));
            }
        }

        let mut source = AudioSource::new(item.start_volume, item.looping);
        if item.play_on_load {
            source.play();
            self.pending_events.push(HydrogenEvent::ItemStarted {
                key: item.key.clone(),
            });
        }
        item.attach_source(source);

        log::debug!(
            "Audio stack added '{}' (clip: {}, play_on_load: {})",
            item.key,
            item.clip.name,
            item.play_on_load
        );
        self.items.push(item);
        Ok(())
    }

    pub fn play(&mut self, key: &str) -> Result<()> {
        let item = self.item_mut(key)?;
        let (start_volume, looping) = (item.start_volume, item.looping);
        let source = item
            .source
            .get_or_insert_with(|| AudioSource::new(start_volume, looping));
        if source.playing {
            return Ok(());
        }

        source.play();
        self.pending_events.push(HydrogenEvent::ItemStarted {
            key: key.to_string(),
        });
        Ok(())
    }

    pub fn stop(&mut self, key: &str) -> Result<()> {
        if let Some(source) = self.item_mut(key)?.source_mut() {
            source.stop();
        }
        Ok(())
    }

    /// Removes an item immediately and releases its source.
    pub fn remove(&mut self, key: &str) -> Option<AudioStackItem> {
        let index = self.items.iter().position(|item| item.key == key)?;
        let mut item = self.items.remove(index);
        item.detach_source();
        log::debug!("Audio stack removed '{}'", key);
        Some(item)
    }

    pub fn set_target_volume(&mut self, key: &str, volume: f32) -> Result<()> {
        self.item_mut(key)?.target_volume = volume;
        Ok(())
    }

    pub fn fade_out(&mut self, key: &str) -> Result<()> {
        self.item_mut(key)?.fade_out();
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&AudioStackItem> {
        self.items.iter().find(|item| item.key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut AudioStackItem> {
        self.items.iter_mut().find(|item| item.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.key.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Advances every source by `delta_secs`, runs each item's envelope and
    /// drops the items that asked to be removed.
    pub fn update(&mut self, delta_secs: f32) -> Vec<HydrogenEvent> {
        let mut events = std::mem::take(&mut self.pending_events);

        self.items.retain_mut(|item| {
            let clip_length = item.clip.length;
            if let Some(source) = item.source_mut() {
                source.advance(delta_secs, clip_length);
            }

            if !item.process(delta_secs) {
                return true;
            }

            log::debug!("Audio stack auto-removed '{}'", item.key);
            item.detach_source();
            events.push(HydrogenEvent::ItemRemoved {
                key: item.key.clone(),
            });
            false
        });

        events
    }

    fn item_mut(&mut self, key: &str) -> Result<&mut AudioStackItem> {
        self.get_mut(key)
            .ok_or_else(|| HydrogenError::UnknownKey(key.to_string()))
    }
}
