use serde::{Deserialize, Serialize};

/// Width thresholds (logical pixels) and the number of tiles shown at each tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Breakpoints {
    #[serde(default = "default_medium")]
    pub medium: u32,
    #[serde(default = "default_large")]
    pub large: u32,
    #[serde(default = "default_small_limit")]
    pub small_limit: usize,
    #[serde(default = "default_medium_limit")]
    pub medium_limit: usize,
    #[serde(default = "default_large_limit")]
    pub large_limit: usize,
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            medium: default_medium(),
            large: default_large(),
            small_limit: default_small_limit(),
            medium_limit: default_medium_limit(),
            large_limit: default_large_limit(),
        }
    }
}

fn default_medium() -> u32 {
    768
}

fn default_large() -> u32 {
    1024
}

fn default_small_limit() -> usize {
    2
}

fn default_medium_limit() -> usize {
    3
}

fn default_large_limit() -> usize {
    4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewportTier {
    Small,
    Medium,
    Large,
}

impl ViewportTier {
    pub fn from_width(width: u32, breakpoints: &Breakpoints) -> Self {
        if width >= breakpoints.large {
            ViewportTier::Large
        } else if width >= breakpoints.medium {
            ViewportTier::Medium
        } else {
            ViewportTier::Small
        }
    }

    pub fn limit(self, breakpoints: &Breakpoints) -> usize {
        match self {
            ViewportTier::Small => breakpoints.small_limit,
            ViewportTier::Medium => breakpoints.medium_limit,
            ViewportTier::Large => breakpoints.large_limit,
        }
    }
}

/// "+N" badge drawn over the last visible tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Overlay {
    pub tile_index: usize,
    pub remainder: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayWindow {
    pub total: usize,
    pub tier_limit: usize,
    pub expanded: bool,
}

impl DisplayWindow {
    pub fn new(total: usize, tier_limit: usize, expanded: bool) -> Self {
        Self {
            total,
            tier_limit,
            expanded,
        }
    }

    pub fn visible_count(&self) -> usize {
        if self.expanded {
            self.total
        } else {
            self.total.min(self.tier_limit)
        }
    }

    pub fn remainder(&self) -> usize {
        if self.expanded {
            0
        } else {
            self.total.saturating_sub(self.tier_limit)
        }
    }

    pub fn visible<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[..self.visible_count().min(items.len())]
    }

    pub fn overlay(&self) -> Option<Overlay> {
        let remainder = self.remainder();
        let visible = self.visible_count();
        if remainder == 0 || visible == 0 {
            return None;
        }
        Some(Overlay {
            tile_index: visible - 1,
            remainder,
        })
    }

    pub fn expand(&mut self) {
        self.expanded = true;
    }
}

/// Per-response gallery state. Expansion is sticky and one-way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gallery {
    expanded: bool,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Window for the current viewport. The tier is derived from `width` on every call.
    pub fn window(&self, total: usize, width: u32, breakpoints: &Breakpoints) -> DisplayWindow {
        let tier = ViewportTier::from_width(width, breakpoints);
        DisplayWindow::new(total, tier.limit(breakpoints), self.expanded)
    }

    pub fn expand(&mut self) {
        if !self.expanded {
            tracing::debug!("gallery expanded");
        }
        self.expanded = true;
    }
}
