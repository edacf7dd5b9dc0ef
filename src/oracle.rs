//! Dense reference bitmap the tower is checked against in tests.
//!
//! Covers a fixed window; every position past it reads as clear, matching a
//! tower whose set bits all sit inside the window.

use bitmaps::Bitmap;

use crate::{Run, UNBOUNDED};

pub(crate) const WINDOW: usize = 1024;

#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct Oracle {
    bits: Bitmap<WINDOW>,
    /// No bit at or above this is set.
    high: usize,
}

impl Oracle {
    pub(crate) fn get(&self, position: u64) -> bool {
        (position as usize) < self.high && self.bits.get(position as usize)
    }

    pub(crate) fn set(&mut self, start: u64, width: u64, value: bool) {
        let (start, end) = (start as usize, (start + width) as usize);
        for p in start..end {
            self.bits.set(p, value);
        }
        if value {
            self.high = self.high.max(end);
        }
    }

    pub(crate) fn insert(&mut self, start: u64, width: u64, value: bool) {
        let (start, width) = (start as usize, width as usize);
        let high = (self.high.max(start) + width).min(WINDOW);
        for p in (start + width..high).rev() {
            let shifted = self.bits.get(p - width);
            self.bits.set(p, shifted);
        }
        self.high = high;
        self.set(start as u64, width as u64, value);
    }

    pub(crate) fn delete(&mut self, start: u64, width: u64) {
        let (start, width) = (start as usize, width as usize);
        for p in start..self.high {
            let shifted = p + width < self.high && self.bits.get(p + width);
            self.bits.set(p, shifted);
        }
    }

    pub(crate) fn move_range(&mut self, old_start: u64, new_start: u64, width: u64) {
        let moved: Vec<bool> = (old_start..old_start + width).map(|p| self.get(p)).collect();
        self.delete(old_start, width);
        self.insert(new_start, width, false);
        for (i, value) in moved.into_iter().enumerate() {
            self.set(new_start + i as u64, 1, value);
        }
    }

    pub(crate) fn splice(&mut self, start: u64, old_width: u64, new_width: u64) {
        if new_width > old_width {
            let value = old_width > 0 && self.get(start + old_width - 1);
            self.insert(start + old_width, new_width - old_width, value);
        } else {
            self.delete(start + new_width, old_width - new_width);
        }
    }

    pub(crate) fn scan(&self, start: u64) -> u64 {
        (start..self.high as u64)
            .find(|&p| self.get(p))
            .unwrap_or(UNBOUNDED)
    }

    pub(crate) fn runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = Vec::new();
        for p in 0..self.high as u64 {
            if !self.get(p) {
                continue;
            }
            match runs.last_mut() {
                Some(run) if run.end() == p => run.width += 1,
                _ => runs.push(Run::new(p, 1)),
            }
        }
        runs
    }
}
