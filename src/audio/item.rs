//! Fading playback item settings and volume envelope

use crate::audio::{AudioClip, AudioSource};

/// Volume under which a fading item counts as silent.
pub const VOLUME_EPSILON: f32 = 1e-4;

/// Slack allowed when deciding that the play cursor reached the clip end.
pub const CLIP_END_EPSILON: f32 = 1e-3;

/// Everything needed to play one clip through an [`AudioStack`](crate::audio::AudioStack).
#[derive(Debug, Clone)]
pub struct AudioStackItem {
    pub clip: AudioClip,
    /// Unique within a stack; defaults to the clip name
    pub key: String,
    /// Fade-in rate (per second) used while the volume rises
    pub fade_in_time: f32,
    /// Fade-out rate (per second) used while the volume falls
    pub fade_out_time: f32,
    /// Ease toward the target volume instead of jumping
    pub fade: bool,
    pub looping: bool,
    pub max_volume: f32,
    /// Start playing as soon as the item is added to a stack
    pub play_on_load: bool,
    /// Never removed automatically (menu clicks and the like)
    pub persistent: bool,
    /// Remove once faded to silence
    pub remove_after_fade_out: bool,
    /// Volume used when the source is first created
    pub start_volume: f32,
    /// Volume the source gravitates towards
    pub target_volume: f32,
    pub(crate) source: Option<AudioSource>,
}

impl AudioStackItem {
    pub fn new(clip: AudioClip) -> Self {
        let key = clip.name.clone();
        Self::with_key(clip, key)
    }

    pub fn with_key(clip: AudioClip, key: impl Into<String>) -> Self {
        Self {
            clip,
            key: key.into(),
            fade_in_time: 4.5,
            fade_out_time: 5.0,
            fade: false,
            looping: false,
            max_volume: 1.0,
            play_on_load: true,
            persistent: false,
            remove_after_fade_out: true,
            start_volume: 1.0,
            target_volume: 1.0,
            source: None,
        }
    }

    pub fn fade(mut self, fade: bool) -> Self {
        self.fade = fade;
        self
    }

    pub fn fade_times(mut self, fade_in: f32, fade_out: f32) -> Self {
        self.fade_in_time = fade_in;
        self.fade_out_time = fade_out;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn max_volume(mut self, volume: f32) -> Self {
        self.max_volume = volume;
        self
    }

    pub fn play_on_load(mut self, play: bool) -> Self {
        self.play_on_load = play;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn remove_after_fade_out(mut self, remove: bool) -> Self {
        self.remove_after_fade_out = remove;
        self
    }

    pub fn start_volume(mut self, volume: f32) -> Self {
        self.start_volume = volume;
        self
    }

    pub fn target_volume(mut self, volume: f32) -> Self {
        self.target_volume = volume;
        self
    }

    pub fn source(&self) -> Option<&AudioSource> {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> Option<&mut AudioSource> {
        self.source.as_mut()
    }

    pub fn attach_source(&mut self, source: AudioSource) {
        self.source = Some(source);
    }

    pub fn detach_source(&mut self) -> Option<AudioSource> {
        self.source.take()
    }

    pub fn volume(&self) -> Option<f32> {
        self.source.as_ref().map(|source| source.volume)
    }

    pub fn is_playing(&self) -> bool {
        self.source.as_ref().is_some_and(|source| source.playing)
    }

    /// Fade towards silence; the item goes away once silent unless persistent.
    pub fn fade_out(&mut self) {
        self.fade = true;
        self.target_volume = 0.0;
    }

    pub fn fade_in(&mut self, target: f32) {
        self.fade = true;
        self.target_volume = target;
    }

    /// Steps the volume envelope by `delta_secs`.
    ///
    /// Returns true when the item should be removed from its stack. Items
    /// without a source are left alone.
    pub fn process(&mut self, delta_secs: f32) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };

        if self.target_volume > self.max_volume {
            self.target_volume = self.max_volume;
        }

        if source.volume != self.target_volume {
            if self.fade {
                let rate = if source.volume > self.target_volume {
                    self.fade_out_time
                } else {
                    self.fade_in_time
                };
                source.volume = lerp(source.volume, self.target_volume, rate * delta_secs);
            } else {
                source.volume = self.target_volume;
            }
        }

        // Looping is ignored here: a target of zero means the item should go.
        let faded_out =
            self.fade && self.remove_after_fade_out && source.volume < VOLUME_EPSILON;
        let finished = source.time >= self.clip.length - CLIP_END_EPSILON;

        !self.persistent && (faded_out || finished)
    }
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(item: AudioStackItem) -> AudioStackItem {
        let mut item = item;
        let mut source = AudioSource::new(item.start_volume, item.looping);
        source.play();
        item.attach_source(source);
        item
    }

    fn clip() -> AudioClip {
        AudioClip::new("theme", 120.0)
    }

    #[test]
    fn key_defaults_to_clip_name() {
        assert_eq!(AudioStackItem::new(clip()).key, "theme");
        assert_eq!(AudioStackItem::with_key(clip(), "alt").key, "alt");
    }

    #[test]
    fn target_is_clamped_to_max() {
        let mut item = playing(AudioStackItem::new(clip()).max_volume(1.0).target_volume(1.5));
        item.process(0.016);
        assert_eq!(item.target_volume, 1.0);
        assert_eq!(item.volume(), Some(1.0));
    }

    #[test]
    fn without_fade_volume_snaps() {
        let mut item = playing(AudioStackItem::new(clip()).fade(false).target_volume(0.3));
        assert!(!item.process(0.016));
        assert_eq!(item.volume(), Some(0.3));
    }

    #[test]
    fn fade_uses_direction_specific_rate() {
        let mut down = playing(
            AudioStackItem::new(clip())
                .fade(true)
                .fade_times(2.0, 4.0)
                .start_volume(1.0)
                .target_volume(0.0)
                .persistent(true),
        );
        down.process(0.1);
        assert!((down.volume().unwrap() - 0.6).abs() < 1e-5);

        let mut up = playing(
            AudioStackItem::new(clip())
                .fade(true)
                .fade_times(2.0, 4.0)
                .start_volume(0.0)
                .target_volume(1.0),
        );
        up.process(0.1);
        assert!((up.volume().unwrap() - 0.2).abs() < 1e-5);
    }

    #[test]
    fn large_step_does_not_overshoot() {
        let mut item = playing(
            AudioStackItem::new(clip())
                .fade(true)
                .start_volume(0.2)
                .target_volume(0.8),
        );
        item.process(10.0);
        assert!((item.volume().unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn fade_out_eventually_requests_removal() {
        let mut item = playing(AudioStackItem::new(clip()).fade(true).target_volume(0.0));
        item.remove_after_fade_out = true;
        item.persistent = false;

        let mut ticks = 0;
        while !item.process(1.0 / 60.0) {
            ticks += 1;
            assert!(ticks < 10_000, "fade never finished");
        }
        assert!(item.volume().unwrap() < VOLUME_EPSILON);
    }

    #[test]
    fn persistent_items_are_never_removed() {
        let mut item = playing(
            AudioStackItem::new(AudioClip::new("click", 0.1))
                .fade(true)
                .target_volume(0.0)
                .persistent(true),
        );
        item.source_mut().unwrap().time = 0.1;
        for _ in 0..1_000 {
            assert!(!item.process(0.05));
        }
    }

    #[test]
    fn finished_clip_is_removed_with_tolerance() {
        let mut item = playing(AudioStackItem::new(AudioClip::new("hit", 0.3)));
        item.source_mut().unwrap().time = 0.2;
        assert!(!item.process(0.016));

        item.source_mut().unwrap().time = 0.3 - CLIP_END_EPSILON / 2.0;
        assert!(item.process(0.016));
    }

    #[test]
    fn no_source_means_no_work() {
        let mut item = AudioStackItem::new(clip()).target_volume(2.0);
        assert!(!item.process(0.016));
        assert_eq!(item.target_volume, 2.0);
        assert_eq!(item.volume(), None);
    }
}
