//! # Progressive Accumulation
//!
//! Maintains the running average of successive samples of a static view.
//! Each viewpoint owns one [`AccumulationEngine`]; engines never share state.
//!
//! ## Blend Strategies
//!
//! - **External history**: the previous accumulated image is handed back to
//!   the shading program, which blends internally using the frame index as
//!   its weight. The engine stores whatever the program returns.
//! - **Frame stacking**: the program renders a fresh sample with no history
//!   and the engine blends it in a second pass.
//!
//! Both use the incremental mean
//!
//! ```text
//! average' = average + (sample - average) / (frame_index + 1)
//! ```
//!
//! which is unbiased, needs no per-pixel sample history and converges to the
//! Monte-Carlo expectation as `frame_index` grows.
//!
//! ## State Machine
//!
//! `Reset -> Accumulating` on every frame that renders a sample. The index
//! returns to 0 when progressive mode is switched on (edge-triggered), when
//! the output resolution changes, and on every frame while progressive mode
//! is off, where the blend degenerates to "replace with newest sample".

use serde::{Serialize, Deserialize};

use super::image::Image;
use super::RenderResult;

/// How new samples are combined with history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BlendStrategy {
    /// The shading program blends against the supplied previous frame
    ExternalHistory,
    /// The engine blends a history-free sample in a separate pass
    #[default]
    FrameStacking,
}

/// Phase of the accumulation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulationPhase {
    /// No valid history; the next sample replaces the average
    Reset,
    /// History holds the average of `frame_index` samples
    Accumulating,
}

/// Per-viewpoint accumulation state
#[derive(Debug, Clone)]
pub struct AccumulationState {
    frame_index: u32,
    total_frames: u64,
    previous_frame: Option<Image>,
    progressive: bool,
    phase: AccumulationPhase,
}

impl AccumulationState {
    fn new() -> Self {
        Self {
            frame_index: 0,
            total_frames: 0,
            previous_frame: None,
            progressive: false,
            phase: AccumulationPhase::Reset,
        }
    }

    /// Number of samples already folded into the average
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Frames rendered over the state's lifetime, never reset
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Accumulated image, if any frame has been rendered
    pub fn previous_frame(&self) -> Option<&Image> {
        self.previous_frame.as_ref()
    }

    /// Progressive mode as seen on the latest frame
    pub fn progressive(&self) -> bool {
        self.progressive
    }

    /// Current state machine phase
    pub fn phase(&self) -> AccumulationPhase {
        self.phase
    }

    fn restart(&mut self) {
        self.frame_index = 0;
        self.phase = AccumulationPhase::Reset;
    }
}

/// Running-average engine for one viewpoint
#[derive(Debug, Clone)]
pub struct AccumulationEngine {
    strategy: BlendStrategy,
    state: AccumulationState,
}

impl AccumulationEngine {
    /// Create an engine with empty history
    pub fn new(strategy: BlendStrategy) -> Self {
        Self {
            strategy,
            state: AccumulationState::new(),
        }
    }

    /// Blend strategy
    pub fn strategy(&self) -> BlendStrategy {
        self.strategy
    }

    /// Read-only view of the state
    pub fn state(&self) -> &AccumulationState {
        &self.state
    }

    /// Prepare for a frame of `width` x `height` pixels
    ///
    /// Applies resolution-change and progressive-toggle resets and returns the
    /// frame index the shading program and blend should use.
    pub fn begin_frame(&mut self, progressive: bool, width: u32, height: u32) -> u32 {
        let resized = self
            .state
            .previous_frame
            .as_ref()
            .map_or(true, |image| image.dimensions() != (width, height));
        if resized {
            if let Some(previous) = &self.state.previous_frame {
                log::info!(
                    "Output resolution changed {:?} -> {:?}; restarting accumulation",
                    previous.dimensions(),
                    (width, height)
                );
            }
            match &mut self.state.previous_frame {
                Some(image) => image.reallocate(width, height),
                None => self.state.previous_frame = Some(Image::new(width, height)),
            }
            self.state.restart();
        }

        if progressive && !self.state.progressive {
            log::debug!("Progressive mode enabled; restarting accumulation");
            self.state.restart();
        } else if !progressive {
            self.state.restart();
        }
        self.state.progressive = progressive;

        self.state.frame_index
    }

    /// History image to hand to the shading program, if it should blend
    ///
    /// Only the external-history strategy feeds history back, and only once
    /// at least one sample has been accumulated since the last reset.
    pub fn history_for_dispatch(&self) -> Option<&Image> {
        match self.strategy {
            BlendStrategy::ExternalHistory if self.state.frame_index > 0 => self.state.previous_frame.as_ref(),
            _ => None,
        }
    }

    /// Fold the shading program's output into the history
    ///
    /// Advances the frame index when progressive mode is on. Returns the new
    /// accumulated image.
    pub fn accumulate(&mut self, shaded: &Image) -> RenderResult<&Image> {
        let (width, height) = shaded.dimensions();
        let frame_index = self.state.frame_index;
        let history = self
            .state
            .previous_frame
            .get_or_insert_with(|| Image::new(width, height));
        history.ensure_same_size(shaded)?;

        match self.strategy {
            BlendStrategy::ExternalHistory => history.pixels_mut().copy_from_slice(shaded.pixels()),
            BlendStrategy::FrameStacking => blend_into(history, shaded, frame_index)?,
        }

        self.state.phase = AccumulationPhase::Accumulating;
        self.state.total_frames += 1;
        if self.state.progressive {
            self.state.frame_index = self.state.frame_index.saturating_add(1);
        }
        log::trace!("Accumulated frame {} ({:?})", frame_index, self.strategy);

        Ok(history)
    }

    /// Latest accumulated image
    pub fn output(&self) -> Option<&Image> {
        self.state.previous_frame.as_ref()
    }

    /// Discard history and restart from frame 0
    pub fn reset(&mut self) {
        self.state.previous_frame = None;
        self.state.restart();
    }
}

/// Incremental mean of one channel
pub fn incremental_mean(average: f32, sample: f32, frame_index: u32) -> f32 {
    average + (sample - average) / (frame_index as f32 + 1.0)
}

/// Blend `sample` into `average` in place using the incremental mean
pub fn blend_into(average: &mut Image, sample: &Image, frame_index: u32) -> RenderResult<()> {
    average.ensure_same_size(sample)?;
    for (avg, new) in average.pixels_mut().iter_mut().zip(sample.pixels()) {
        for (a, n) in avg.iter_mut().zip(new) {
            *a = incremental_mean(*a, *n, frame_index);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn run_frame(engine: &mut AccumulationEngine, progressive: bool, value: f32) -> u32 {
        let index = engine.begin_frame(progressive, 4, 3);
        engine.accumulate(&Image::filled(4, 3, [value; 4])).unwrap();
        index
    }

    #[test]
    fn test_constant_sample_is_exact_for_all_n() {
        for strategy in [BlendStrategy::FrameStacking, BlendStrategy::ExternalHistory] {
            let mut engine = AccumulationEngine::new(strategy);
            for _ in 0..50 {
                run_frame(&mut engine, true, 0.37);
                let out = engine.output().unwrap();
                for p in out.pixels() {
                    assert_relative_eq!(p[0], 0.37, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_frame_stacking_computes_mean() {
        let mut engine = AccumulationEngine::new(BlendStrategy::FrameStacking);
        let samples = [1.0, 2.0, 3.0, 4.0, 10.0];
        for &s in &samples {
            run_frame(&mut engine, true, s);
        }
        let expected = samples.iter().sum::<f32>() / samples.len() as f32;
        assert_relative_eq!(engine.output().unwrap().pixels()[0][1], expected, epsilon = 1e-5);
    }

    #[test]
    fn test_hundred_frames_without_toggle() {
        let mut engine = AccumulationEngine::new(BlendStrategy::FrameStacking);
        for expected in 0..100 {
            assert_eq!(run_frame(&mut engine, true, 0.5), expected);
        }
        assert_eq!(engine.state().frame_index(), 100);
        assert_eq!(engine.state().total_frames(), 100);
    }

    #[test]
    fn test_toggle_off_then_on_resets() {
        let mut engine = AccumulationEngine::new(BlendStrategy::FrameStacking);
        for _ in 0..10 {
            run_frame(&mut engine, true, 0.5);
        }
        assert_eq!(engine.state().frame_index(), 10);

        assert_eq!(run_frame(&mut engine, false, 0.5), 0);
        assert_eq!(engine.state().frame_index(), 0);

        assert_eq!(run_frame(&mut engine, true, 0.5), 0);
        assert_eq!(run_frame(&mut engine, true, 0.5), 1);
        assert_eq!(engine.state().total_frames(), 13);
    }

    #[test]
    fn test_disabled_mode_replaces_with_newest_sample() {
        let mut engine = AccumulationEngine::new(BlendStrategy::FrameStacking);
        for value in [0.1, 0.9, 0.4] {
            assert_eq!(run_frame(&mut engine, false, value), 0);
            assert_relative_eq!(engine.output().unwrap().pixels()[0][0], value);
        }
    }

    #[test]
    fn test_resize_resets_and_reallocates() {
        let mut engine = AccumulationEngine::new(BlendStrategy::FrameStacking);
        for _ in 0..5 {
            engine.begin_frame(true, 800, 600);
            engine.accumulate(&Image::filled(800, 600, [0.2; 4])).unwrap();
        }
        assert_eq!(engine.state().frame_index(), 5);

        let index = engine.begin_frame(true, 1920, 1080);
        assert_eq!(index, 0);
        assert_eq!(engine.state().phase(), AccumulationPhase::Reset);
        assert_eq!(engine.state().previous_frame().unwrap().dimensions(), (1920, 1080));

        engine.accumulate(&Image::filled(1920, 1080, [0.7; 4])).unwrap();
        assert_relative_eq!(engine.output().unwrap().pixels()[0][0], 0.7);
        assert_eq!(engine.state().frame_index(), 1);
    }

    #[test]
    fn test_history_only_offered_for_external_strategy() {
        let mut stacking = AccumulationEngine::new(BlendStrategy::FrameStacking);
        let mut external = AccumulationEngine::new(BlendStrategy::ExternalHistory);

        for engine in [&mut stacking, &mut external] {
            engine.begin_frame(true, 4, 3);
            assert!(engine.history_for_dispatch().is_none());
            engine.accumulate(&Image::filled(4, 3, [0.5; 4])).unwrap();
            engine.begin_frame(true, 4, 3);
        }

        assert!(stacking.history_for_dispatch().is_none());
        assert!(external.history_for_dispatch().is_some());
    }

    #[test]
    fn test_mismatched_sample_is_rejected() {
        let mut engine = AccumulationEngine::new(BlendStrategy::FrameStacking);
        engine.begin_frame(true, 4, 3);
        assert!(engine.accumulate(&Image::new(2, 2)).is_err());
        assert_eq!(engine.state().total_frames(), 0);
    }

    #[test]
    fn test_incremental_mean_weights() {
        assert_relative_eq!(incremental_mean(5.0, 1.0, 0), 1.0);
        assert_relative_eq!(incremental_mean(1.0, 3.0, 1), 2.0);
        assert_relative_eq!(incremental_mean(2.0, 5.0, 2), 3.0);
    }

    #[test]
    fn test_reset_discards_history_but_keeps_total() {
        let mut engine = AccumulationEngine::new(BlendStrategy::ExternalHistory);
        for _ in 0..4 {
            run_frame(&mut engine, true, 0.5);
        }
        engine.reset();

        assert!(engine.output().is_none());
        assert_eq!(engine.state().phase(), AccumulationPhase::Reset);
        assert_eq!(engine.state().frame_index(), 0);
        assert_eq!(engine.state().total_frames(), 4);
        assert_eq!(run_frame(&mut engine, true, 0.25), 0);
        assert_relative_eq!(engine.output().unwrap().pixels()[0][0], 0.25);
    }
}
