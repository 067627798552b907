//! Temperature/time recipes
//!
//! A recipe is an ordered list of set points. Each step is stored in the
//! firmware's fixed-point units: time in 4 s ticks, temperature in 0.25 °C.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Minimum number of steps the controller accepts
pub const MIN_STEPS: usize = 2;

/// Maximum number of steps, limited by the controller's 64 byte receive buffer
pub const MAX_STEPS: usize = (64 - 2) / 4;

/// Largest raw time value; longer durations saturate here
pub const MAX_RAW_TIME: u16 = 0xFF00;

/// Seconds per raw time unit
const SECONDS_PER_TICK: u64 = 4;

/// Raw temperature units per degree Celsius
const TICKS_PER_DEGREE: f32 = 4.0;

/// Errors produced when editing or validating a recipe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecipeError {
    /// Fewer than [`MIN_STEPS`] steps
    #[error("recipe needs at least 2 steps, has {0}")]
    TooFewSteps(usize),

    /// More than [`MAX_STEPS`] steps
    #[error("recipe can hold at most 15 steps, has {0}")]
    TooManySteps(usize),

    /// Step index past the end
    #[error("no step at index {0}")]
    IndexOutOfRange(usize),
}

/// One point of a temperature profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RecipeStep {
    /// Time since recipe start (LSB = 4 s)
    pub raw_time: u16,
    /// Target temperature (LSB = 0.25 °C)
    pub raw_temp: i16,
}

impl RecipeStep {
    /// Create a step from engineering units.
    ///
    /// Time is truncated to 4 s and saturates at [`MAX_RAW_TIME`]; temperature
    /// is truncated toward zero to 0.25 °C.
    pub fn new(time: Duration, temperature: f32) -> Self {
        let mut step = Self::default();
        step.set_time(time);
        step.set_temperature(temperature);
        step
    }

    /// Create a step from raw wire values
    pub fn from_raw(raw_time: u16, raw_temp: i16) -> Self {
        Self { raw_time, raw_temp }
    }

    /// Time since the beginning of the recipe
    pub fn time(&self) -> Duration {
        Duration::from_secs(self.raw_time as u64 * SECONDS_PER_TICK)
    }

    /// Target temperature in °C
    pub fn temperature(&self) -> f32 {
        self.raw_temp as f32 / TICKS_PER_DEGREE
    }

    /// Set the time, truncated to 4 s and saturating at [`MAX_RAW_TIME`]
    pub fn set_time(&mut self, time: Duration) {
        let ticks = time.as_secs() / SECONDS_PER_TICK;
        self.raw_time = ticks.min(MAX_RAW_TIME as u64) as u16;
    }

    /// Set the temperature, truncated toward zero to 0.25 °C
    pub fn set_temperature(&mut self, temperature: f32) {
        // `as` saturates at the i16 bounds and maps NaN to 0
        self.raw_temp = (temperature * TICKS_PER_DEGREE) as i16;
    }
}

impl fmt::Display for RecipeStep {
    /// Renders as `hh:mm - 0000°C`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = self.time().as_secs() / 60;
        let degrees = self.temperature().round() as i32;
        let sign = if degrees < 0 { "-" } else { "" };
        write!(
            f,
            "{:02}:{:02} - {}{:04}°C",
            minutes / 60,
            minutes % 60,
            sign,
            degrees.unsigned_abs()
        )
    }
}

/// A change made to a recipe's step list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeChange {
/// A step was inserted at this index
    Added(usize),
/// The step at this index was removed
    Removed(usize),
/// The step at this index was replaced
    Updated(usize),
}

type ChangeListener = Arc<dyn Fn(RecipeChange) + Send + Sync>;

/// An ordered temperature profile
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Recipe {
    steps: Vec<RecipeStep>,
    #[serde(skip)]
    listener: Option<ChangeListener>,
}

impl Recipe {
/// An empty recipe
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a recipe from existing steps. No validation is done until upload.
    pub fn from_steps(steps: Vec<RecipeStep>) -> Self {
        Self {
            steps,
            listener: None,
        }
    }

    /// Register a callback invoked after every edit made through this recipe
    pub fn on_change<F>(&mut self, listener: F)
    where
        F: Fn(RecipeChange) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
    }

    /// Steps in upload order
    pub fn steps(&self) -> &[RecipeStep] {
        &self.steps
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if there are no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Append a step; fails once the recipe is full
    pub fn push(&mut self, step: RecipeStep) -> Result<(), RecipeError> {
        self.insert(self.steps.len(), step)
    }

    /// Insert a step before `index`; fails once the recipe is full
    pub fn insert(&mut self, index: usize, step: RecipeStep) -> Result<(), RecipeError> {
        if self.steps.len() >= MAX_STEPS {
            return Err(RecipeError::TooManySteps(self.steps.len() + 1));
        }
        if index > self.steps.len() {
            return Err(RecipeError::IndexOutOfRange(index));
        }
        self.steps.insert(index, step);
        self.notify(RecipeChange::Added(index));
        Ok(())
    }

    /// Remove and return the step at `index`
    pub fn remove(&mut self, index: usize) -> Result<RecipeStep, RecipeError> {
        if index >= self.steps.len() {
            return Err(RecipeError::IndexOutOfRange(index));
        }
        let step = self.steps.remove(index);
        self.notify(RecipeChange::Removed(index));
        Ok(step)
    }

    /// Replace the step at `index`
    pub fn set_step(&mut self, index: usize, step: RecipeStep) -> Result<(), RecipeError> {
        let slot = self
            .steps
            .get_mut(index)
            .ok_or(RecipeError::IndexOutOfRange(index))?;
        *slot = step;
        self.notify(RecipeChange::Updated(index));
        Ok(())
    }

    /// Check the step count against what the controller accepts
    pub fn validate(&self) -> Result<(), RecipeError> {
        match self.steps.len() {
            n if n < MIN_STEPS => Err(RecipeError::TooFewSteps(n)),
            n if n > MAX_STEPS => Err(RecipeError::TooManySteps(n)),
            _ => Ok(()),
        }
    }

    fn notify(&self, change: RecipeChange) {
        if let Some(listener) = &self.listener {
            listener(change);
        }
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("steps", &self.steps)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl PartialEq for Recipe {
    fn eq(&self, other: &Self) -> bool {
        self.steps == other.steps
    }
}

impl From<Vec<RecipeStep>> for Recipe {
    fn from(steps: Vec<RecipeStep>) -> Self {
        Self::from_steps(steps)
    }
}
