//! Scalar keyframe curve with a per-frame cache.
//!
//! - Keys are kept sorted by frame, one key per frame.
//! - `cached_indices[slot]` is the governing key of each frame in the range
//!   (the last key at or before it), `cached_values[slot]` its evaluated value.
//! - Single-key edits patch the index cache in place and recompute values only
//!   in the `[key(i-2), key(i+2)]` frame window that the edit can reach.

use tracing::debug;

use crate::bezier::BezierSegment;
use crate::euler::delta_angle;
use crate::error::{CurveError, Result};
use crate::keyframe::{Interpolation, Keyframe, Vec2};
use crate::property::AnimatableProperty;
use crate::range::FrameRange;

/// Key edits proposed by a zone drag, as `(before, after)` lists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZoneChanges {
    /// Existing keys that the edit overwrites.
    pub before: Vec<Keyframe>,
    /// Keys written by the edit (boundary keys, shifted keys, then the dragged key).
    pub after: Vec<Keyframe>,
}

#[derive(Clone, Debug)]
pub struct Curve {
    property: AnimatableProperty,
    keys: Vec<Keyframe>,
    range: FrameRange,
    cached_indices: Vec<Option<usize>>,
    cached_values: Vec<f32>,
}

impl Curve {
    pub fn new(property: AnimatableProperty, range: FrameRange) -> Self {
        let count = range.frame_count();
        Self {
            property,
            keys: Vec::new(),
            range,
            cached_indices: vec![None; count],
            cached_values: vec![f32::NAN; count],
        }
    }

    pub fn from_keys(property: AnimatableProperty, range: FrameRange, keys: Vec<Keyframe>) -> Self {
        let mut curve = Self::new(property, range);
        curve.set_keys(keys);
        curve
    }

    #[inline]
    pub fn property(&self) -> AnimatableProperty {
        self.property
    }

    #[inline]
    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    #[inline]
    pub fn key(&self, index: usize) -> Option<&Keyframe> {
        self.keys.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn range(&self) -> FrameRange {
        self.range
    }

    /// Change the active range; the cache is resized and rebuilt.
    pub fn set_range(&mut self, range: FrameRange) {
        self.range = range;
        self.compute_cache();
    }

    // ---------- cache ----------

    /// Drop the cache. `evaluate` returns `None` until `compute_cache` runs again.
    pub fn clear_cache(&mut self) {
        self.cached_indices = Vec::new();
        self.cached_values = Vec::new();
    }

    /// Rebuild governing indices and values for every frame of the range.
    pub fn compute_cache(&mut self) {
        self.compute_cache_indices();
        self.compute_cache_values(self.range.start, self.range.end);
    }

    /// Recompute cached values around key `index` (`key(index-2)..=key(index+2)`,
    /// falling back to the range bounds where those keys do not exist).
    pub fn compute_cache_values_at(&mut self, index: usize) {
        if self.cache_is_stale() {
            self.compute_cache();
            return;
        }
        let from = index
            .checked_sub(2)
            .and_then(|i| self.keys.get(i))
            .map_or(self.range.start, |k| k.frame);
        let to = index
            .checked_add(2)
            .and_then(|i| self.keys.get(i))
            .map_or(self.range.end, |k| k.frame);
        self.compute_cache_values(from, to);
    }

    #[inline]
    fn cache_is_stale(&self) -> bool {
        let count = self.range.frame_count();
        self.cached_indices.len() != count || self.cached_values.len() != count
    }

    fn compute_cache_indices(&mut self) {
        let mut indices = Vec::with_capacity(self.range.frame_count());
        let mut governing = None;
        let mut next = 0;
        for frame in self.range.frames() {
            while next < self.keys.len() && self.keys[next].frame <= frame {
                governing = Some(next);
                next += 1;
            }
            indices.push(governing);
        }
        self.cached_indices = indices;
    }

    fn compute_cache_values(&mut self, from: i32, to: i32) {
        if self.cached_values.len() != self.range.frame_count() {
            self.cached_values = vec![f32::NAN; self.range.frame_count()];
        }
        let from = from.max(self.range.start);
        let to = to.min(self.range.end);
        for frame in from..=to {
            let slot = (frame - self.range.start) as usize;
            let governing = self.cached_indices.get(slot).copied().flatten();
            let value = self.value_with_governing(frame, governing);
            self.cached_values[slot] = value;
        }
    }

    fn shift_indices_after_insert(&mut self, index: usize, frame: i32) {
        let first = (frame - self.range.start).max(0) as usize;
        for cached in self.cached_indices.iter_mut().skip(first) {
            *cached = match *cached {
                Some(j) if j >= index => Some(j + 1),
                _ => Some(index),
            };
        }
    }

    fn shift_indices_after_remove(&mut self, index: usize, frame: i32) {
        let first = (frame - self.range.start).max(0) as usize;
        for cached in self.cached_indices.iter_mut().skip(first) {
            *cached = match *cached {
                Some(j) if j > index => Some(j - 1),
                Some(j) if j == index => index.checked_sub(1),
                other => other,
            };
        }
    }

    // ---------- evaluation ----------

    /// Cached value at `frame`.
    ///
    /// `None` when the curve has no keys, the frame lies outside the range, or
    /// the cache has been cleared.
    pub fn evaluate(&self, frame: i32) -> Option<f32> {
        if self.keys.is_empty() {
            return None;
        }
        let slot = self.range.slot(frame)?;
        self.cached_values
            .get(slot)
            .copied()
            .filter(|value| !value.is_nan())
    }

    /// Value at any frame computed straight from the keys.
    pub fn evaluate_uncached(&self, frame: i32) -> Option<f32> {
        if self.keys.is_empty() {
            return None;
        }
        Some(self.value_with_governing(frame, self.governing_index(frame)))
    }

    /// Index of the last key at or before `frame`.
    #[inline]
    pub fn governing_index(&self, frame: i32) -> Option<usize> {
        self.keys
            .partition_point(|k| k.frame <= frame)
            .checked_sub(1)
    }

    fn value_with_governing(&self, frame: i32, governing: Option<usize>) -> f32 {
        let Some(first) = self.keys.first() else {
            return f32::NAN;
        };
        let Some(index) = governing else {
            return first.value;
        };
        let key = &self.keys[index];
        let Some(next) = self.keys.get(index + 1) else {
            return key.value;
        };
        if key.frame == frame {
            return key.value;
        }
        match key.interpolation {
            Interpolation::Constant => key.value,
            Interpolation::Linear => {
                let span = (next.frame - key.frame) as f32;
                let t = (frame - key.frame) as f32 / span;
                key.value + (next.value - key.value) * t
            }
            Interpolation::Bezier => BezierSegment::between(key, next).value_at(frame as f32),
        }
    }

    // ---------- edits ----------

    #[inline]
    fn search(&self, frame: i32) -> core::result::Result<usize, usize> {
        self.keys.binary_search_by_key(&frame, |k| k.frame)
    }

    /// Insert `key`, replacing any key at the same frame, and return its index.
    ///
    /// Unless `lock_tangents` is set, the neighbours' facing handles are
    /// re-derived, and so are the key's own handles when both are zero.
    pub fn add_key(&mut self, key: Keyframe, lock_tangents: bool) -> usize {
        let stale = self.cache_is_stale();
        let index = match self.search(key.frame) {
            Ok(index) => {
                self.keys[index] = key;
                index
            }
            Err(index) => {
                self.keys.insert(index, key);
                if !stale {
                    self.shift_indices_after_insert(index, key.frame);
                }
                index
            }
        };
        if !lock_tangents {
            self.refresh_previous_tangent(index);
            self.refresh_next_tangent(index);
            if key.in_tangent.is_zero() && key.out_tangent.is_zero() {
                self.refresh_tangents_at(index);
            }
        }
        self.compute_cache_values_at(index);
        index
    }

    /// Remove the key at `frame`, returning it.
    pub fn remove_key(&mut self, frame: i32, lock_tangents: bool) -> Option<Keyframe> {
        let index = self.search(frame).ok()?;
        if !self.cache_is_stale() {
            self.shift_indices_after_remove(index, frame);
        }
        let removed = self.keys.remove(index);
        if !lock_tangents {
            self.refresh_previous_tangent(index);
            self.refresh_tangents_at(index);
            self.refresh_next_tangent(index);
        }
        self.compute_cache_values_at(index);
        Some(removed)
    }

    /// Move the key at `old_frame` to `new_frame`, keeping its value and handles.
    pub fn move_key(&mut self, old_frame: i32, new_frame: i32) -> Result<usize> {
        let key = self
            .remove_key(old_frame, false)
            .ok_or(CurveError::KeyNotFound {
                property: self.property,
                frame: old_frame,
            })?;
        Ok(self.add_key(
            Keyframe {
                frame: new_frame,
                ..key
            },
            false,
        ))
    }

    /// Insert without touching the cache. Call `compute_cache` after a batch.
    pub fn append_key(&mut self, key: Keyframe) {
        match self.keys.last() {
            Some(last) if last.frame >= key.frame => match self.search(key.frame) {
                Ok(index) => self.keys[index] = key,
                Err(index) => self.keys.insert(index, key),
            },
            _ => self.keys.push(key),
        }
    }

    /// Replace every key and rebuild the cache.
    pub fn set_keys(&mut self, keys: Vec<Keyframe>) {
        self.keys.clear();
        for key in keys {
            self.append_key(key);
        }
        self.compute_cache();
    }

    /// Overwrite the handles of key `index` and recompute its neighbourhood.
    pub fn set_tangents(&mut self, index: usize, in_tangent: Vec2, out_tangent: Vec2) -> Result<()> {
        let len = self.keys.len();
        let key = self
            .keys
            .get_mut(index)
            .ok_or(CurveError::KeyIndexOutOfBounds {
                property: self.property,
                index,
                len,
            })?;
        key.in_tangent = in_tangent;
        key.out_tangent = out_tangent;
        self.compute_cache_values_at(index);
        Ok(())
    }

    // ---------- auto tangents ----------

    /// Handles derived from the neighbours: a third of the chord at the ends,
    /// the unit `next - prev` direction scaled by a third of each gap inside.
    fn auto_tangents(&self, index: usize) -> (Vec2, Vec2) {
        let key = self.keys[index].point();
        let prev = index
            .checked_sub(1)
            .and_then(|i| self.keys.get(i))
            .map(Keyframe::point);
        let next = self.keys.get(index + 1).map(Keyframe::point);
        match (prev, next) {
            (None, None) => (Vec2::ZERO, Vec2::ZERO),
            (None, Some(next)) => {
                let t = (next - key) / 3.0;
                (t, t)
            }
            (Some(prev), None) => {
                let t = (key - prev) / 3.0;
                (t, t)
            }
            (Some(prev), Some(next)) => {
                let dir = (next - prev).normalized();
                (dir * ((key.x - prev.x) / 3.0), dir * ((next.x - key.x) / 3.0))
            }
        }
    }

    fn refresh_previous_tangent(&mut self, index: usize) {
        if let Some(prev) = index.checked_sub(1).filter(|&i| i < self.keys.len()) {
            self.keys[prev].out_tangent = self.auto_tangents(prev).1;
        }
    }

    fn refresh_next_tangent(&mut self, index: usize) {
        let next = index + 1;
        if next < self.keys.len() {
            self.keys[next].in_tangent = self.auto_tangents(next).0;
        }
    }

    fn refresh_tangents_at(&mut self, index: usize) {
        if index < self.keys.len() {
            let (in_tangent, out_tangent) = self.auto_tangents(index);
            self.keys[index].in_tangent = in_tangent;
            self.keys[index].out_tangent = out_tangent;
        }
    }

    // ---------- lookups ----------

    #[inline]
    pub fn key_index(&self, frame: i32) -> Option<usize> {
        self.search(frame).ok()
    }

    #[inline]
    pub fn find_key(&self, frame: i32) -> Option<&Keyframe> {
        self.key_index(frame).map(|i| &self.keys[i])
    }

    #[inline]
    pub fn has_key_at(&self, frame: i32) -> bool {
        self.key_index(frame).is_some()
    }

    /// Last key strictly before `frame`.
    pub fn previous_key(&self, frame: i32) -> Option<&Keyframe> {
        self.governing_index(frame - 1).map(|i| &self.keys[i])
    }

    /// First key strictly after `frame`.
    pub fn next_key(&self, frame: i32) -> Option<&Keyframe> {
        self.keys.get(self.keys.partition_point(|k| k.frame <= frame))
    }

    pub fn previous_key_frame(&self, frame: i32) -> Option<i32> {
        self.previous_key(frame).map(|k| k.frame)
    }

    pub fn next_key_frame(&self, frame: i32) -> Option<i32> {
        self.next_key(frame).map(|k| k.frame)
    }

    /// Keys with frames in `[start, end]`.
    pub fn tangent_keys(&self, start: i32, end: i32) -> Vec<Keyframe> {
        self.keys
            .iter()
            .filter(|k| k.frame >= start && k.frame <= end)
            .copied()
            .collect()
    }

    // ---------- drag helpers ----------

    /// Edits a zone drag of `key` over `[start, end]` would make.
    ///
    /// Keys strictly inside the zone are offset by the dragged delta with a
    /// linear falloff reaching zero at the zone bounds; missing boundary keys
    /// are added with the current curve value. Rotation channels offset by
    /// the shortest angular delta.
    pub fn zone_key_changes(&self, key: Keyframe, start: i32, end: i32) -> Result<ZoneChanges> {
        let current = self
            .evaluate_uncached(key.frame)
            .ok_or(CurveError::EmptyCurve {
                property: self.property,
            })?;
        let start = self.range.clamp(start);
        let end = self.range.clamp(end);
        if key.frame < start || key.frame > end {
            return Err(CurveError::FrameOutOfRange {
                frame: key.frame,
                start,
                end,
            });
        }

        let delta = key.value - current;
        let mut changes = ZoneChanges::default();
        for boundary in [start, end] {
            if boundary != key.frame && !self.has_key_at(boundary) {
                if let Some(value) = self.evaluate_uncached(boundary) {
                    changes.after.push(
                        Keyframe::new(boundary, value).with_interpolation(key.interpolation),
                    );
                }
            }
        }

        for existing in self
            .keys
            .iter()
            .filter(|k| k.frame > start && k.frame < end && k.frame != key.frame)
        {
            let weight = if existing.frame < key.frame {
                1.0 - (key.frame - existing.frame) as f32 / (key.frame - start) as f32
            } else {
                1.0 - (existing.frame - key.frame) as f32 / (end - key.frame) as f32
            };
            let value = if self.property.is_rotation() {
                existing.value + delta_angle(existing.value, existing.value + delta) * weight
            } else {
                existing.value + delta * weight
            };
            changes.before.push(*existing);
            changes.after.push(Keyframe { value, ..*existing });
        }

        if let Some(old) = self.find_key(key.frame) {
            changes.before.push(*old);
        }
        changes.after.push(key);
        Ok(changes)
    }

    /// Apply a zone drag of `key` over `[start, end]`.
    pub fn add_zone_key(&mut self, key: Keyframe, start: i32, end: i32) -> Result<ZoneChanges> {
        let changes = self.zone_key_changes(key, start, end)?;
        for edited in &changes.after {
            self.add_key(*edited, false);
        }
        Ok(changes)
    }

    /// Prepare `[start, end]` for tangent editing: Bezier keys carrying the
    /// current values at both bounds and no key in between.
    ///
    /// Returns the window after clamping to the range.
    pub fn insert_tangent_segment(&mut self, start: i32, end: i32) -> Result<(i32, i32)> {
        if self.keys.is_empty() {
            return Err(CurveError::EmptyCurve {
                property: self.property,
            });
        }
        let start = self.range.clamp(start);
        let end = self.range.clamp(end);
        let start_value = self.evaluate_uncached(start);
        let end_value = self.evaluate_uncached(end);

        for (frame, value) in [(start, start_value), (end, end_value)] {
            if let (false, Some(value)) = (self.has_key_at(frame), value) {
                self.add_key(
                    Keyframe::new(frame, value).with_interpolation(Interpolation::Bezier),
                    false,
                );
            }
        }
        let inner: Vec<i32> = self
            .keys
            .iter()
            .map(|k| k.frame)
            .filter(|&f| f > start && f < end)
            .collect();
        for frame in &inner {
            self.remove_key(*frame, false);
        }
        debug!(
            property = ?self.property,
            start,
            end,
            removed = inner.len(),
            "prepared tangent segment"
        );
        Ok((start, end))
    }
}
