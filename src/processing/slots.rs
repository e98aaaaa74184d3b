use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::Error;

/// Width of the print canvas in pixels.
pub const CANVAS_WIDTH: u32 = 1200;
/// Height of the print canvas in pixels.
pub const CANVAS_HEIGHT: u32 = 1800;
/// Horizontal translation applied to the duplicated column of a strip layout.
pub const STRIP_MIRROR_OFFSET: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotDefinition {
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SlotDefinition {
    const fn new(index: usize, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            index,
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// The same rectangle shifted right by `dx` pixels.
    pub fn translated(&self, dx: u32) -> Self {
        Self {
            x: self.x + dx,
            ..*self
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

// 2x2 grid with a branding band at the bottom.
const GRID_SLOTS: [SlotDefinition; 4] = [
    SlotDefinition::new(0, 40, 40, 540, 740),
    SlotDefinition::new(1, 620, 40, 540, 740),
    SlotDefinition::new(2, 40, 820, 540, 740),
    SlotDefinition::new(3, 620, 820, 540, 740),
];

// Left strip only; the right strip is the same column at STRIP_MIRROR_OFFSET.
const STRIP_SLOTS: [SlotDefinition; 4] = [
    SlotDefinition::new(0, 40, 40, 520, 360),
    SlotDefinition::new(1, 40, 440, 520, 360),
    SlotDefinition::new(2, 40, 840, 520, 360),
    SlotDefinition::new(3, 40, 1240, 520, 360),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    Grid,
    Strip,
}

impl LayoutKind {
    pub const ALL: &'static [Self] = &[Self::Grid, Self::Strip];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Strip => "strip",
        }
    }

    /// Canvas size shared by every layout kind.
    pub fn canvas_size(&self) -> (u32, u32) {
        (CANVAS_WIDTH, CANVAS_HEIGHT)
    }

    /// Offset of the duplicated column, if this kind draws each photo twice.
    pub fn mirror_offset(&self) -> Option<u32> {
        match self {
            Self::Grid => None,
            Self::Strip => Some(STRIP_MIRROR_OFFSET),
        }
    }

    /// Every rectangle a photo is drawn into, paired with the index of the
    /// photo that fills it.
    pub fn placements(&self) -> Vec<(usize, SlotDefinition)> {
        let slots = slots_for(*self);
        let mut out = Vec::with_capacity(slots.len() * 2);
        for slot in slots {
            out.push((slot.index, *slot));
            if let Some(dx) = self.mirror_offset() {
                out.push((slot.index, slot.translated(dx)));
            }
        }
        out
    }
}

/// Ordered slot list for a layout kind.
pub fn slots_for(kind: LayoutKind) -> &'static [SlotDefinition] {
    match kind {
        LayoutKind::Grid => &GRID_SLOTS,
        LayoutKind::Strip => &STRIP_SLOTS,
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutKind {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownLayoutKind(raw.to_string()))
    }
}

impl<'de> Deserialize<'de> for LayoutKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
