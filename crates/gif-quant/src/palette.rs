use std::collections::{HashMap, HashSet};

use gif_types::oklab::{distance_sq, rgb_to_oklab};
use gif_types::Rgb;

/// Nearest-color lookup in Oklab space, memoized per input color.
pub struct PaletteMapper<'a> {
    palette: &'a [Rgb],
    palette_oklab: Vec<[f32; 3]>,
    cache: HashMap<Rgb, (u8, f32)>,
}

impl<'a> PaletteMapper<'a> {
    pub fn new(palette: &'a [Rgb]) -> Self {
        Self {
            palette,
            palette_oklab: palette.iter().map(|&rgb| rgb_to_oklab(rgb)).collect(),
            cache: HashMap::new(),
        }
    }

    pub fn palette(&self) -> &[Rgb] {
        self.palette
    }

    /// Index of the closest palette entry and its ΔE. Ties go to the lower index.
    pub fn nearest(&mut self, rgb: Rgb) -> (u8, f32) {
        if let Some(&hit) = self.cache.get(&rgb) {
            return hit;
        }
        let lab = rgb_to_oklab(rgb);
        let mut best = (0usize, f32::INFINITY);
        for (idx, &entry) in self.palette_oklab.iter().enumerate() {
            let d = distance_sq(lab, entry);
            if d < best.1 {
                best = (idx, d);
            }
        }
        let result = (best.0 as u8, best.1.sqrt());
        self.cache.insert(rgb, result);
        result
    }

    pub fn cached_colors(&self) -> usize {
        self.cache.len()
    }
}

/// Distinct colors in first-seen order, giving up once `limit` is exceeded.
pub fn distinct_colors<'p>(pixels: impl IntoIterator<Item = &'p Rgb>, limit: usize) -> Option<Vec<Rgb>> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for &rgb in pixels {
        if seen.insert(rgb) {
            ordered.push(rgb);
            if ordered.len() > limit {
                return None;
            }
        }
    }
    Some(ordered)
}

/// 95th percentile by nearest rank; 0 for an empty slice.
pub fn percentile_95(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let idx = ((values.len() as f32 * 0.95) as usize).min(values.len() - 1);
    let (_, value, _) = values.select_nth_unstable_by(idx, |a, b| a.total_cmp(b));
    *value
}
