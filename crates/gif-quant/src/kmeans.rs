//! Seeded k-means clustering in Oklab space.

use gif_types::oklab::{delta_e, distance_sq, oklab_to_rgb, rgb_to_oklab};
use gif_types::Rgb;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

pub struct KMeansParams {
    pub k: usize,
    pub max_iterations: usize,
    pub convergence_threshold: f32,
    pub samples: usize,
}

/// Build a palette of at most `params.k` colors from `pixels`.
///
/// Centroids start on distinct sampled colors, so a palette never holds
/// two entries seeded from the same color.
pub fn kmeans_palette(pixels: &[Rgb], params: &KMeansParams, rng: &mut StdRng) -> Vec<Rgb> {
    if pixels.is_empty() || params.k == 0 {
        return Vec::new();
    }

    let samples: Vec<[f32; 3]> = if pixels.len() > params.samples {
        pixels
            .choose_multiple(rng, params.samples)
            .map(|&rgb| rgb_to_oklab(rgb))
            .collect()
    } else {
        pixels.iter().map(|&rgb| rgb_to_oklab(rgb)).collect()
    };

    let mut candidates: Vec<Rgb> = pixels.to_vec();
    candidates.sort_unstable();
    candidates.dedup();
    let k = params.k.min(candidates.len());

    let mut centroids: Vec<[f32; 3]> = candidates
        .choose_multiple(rng, k)
        .map(|&rgb| rgb_to_oklab(rgb))
        .collect();

    debug!(stage = "quantize", centroids = k, samples = samples.len(), "K-means initialization");

    let mut assignment = vec![0usize; samples.len()];
    for iteration in 0..params.max_iterations {
        for (slot, sample) in assignment.iter_mut().zip(samples.iter()) {
            *slot = closest(&centroids, *sample);
        }

        let mut sums = vec![[0.0f32; 3]; k];
        let mut counts = vec![0usize; k];
        for (&cluster, sample) in assignment.iter().zip(samples.iter()) {
            for c in 0..3 {
                sums[cluster][c] += sample[c];
            }
            counts[cluster] += 1;
        }

        let mut max_movement = 0.0f32;
        for (i, centroid) in centroids.iter_mut().enumerate() {
            if counts[i] == 0 {
                continue;
            }
            let n = counts[i] as f32;
            let updated = [sums[i][0] / n, sums[i][1] / n, sums[i][2] / n];
            max_movement = max_movement.max(delta_e(*centroid, updated));
            *centroid = updated;
        }

        if max_movement < params.convergence_threshold {
            debug!(stage = "quantize", converged_at = iteration, "K-means converged");
            break;
        }
    }

    centroids.into_iter().map(oklab_to_rgb).collect()
}

fn closest(centroids: &[[f32; 3]], sample: [f32; 3]) -> usize {
    let mut best = (0usize, f32::INFINITY);
    for (idx, &centroid) in centroids.iter().enumerate() {
        let d = distance_sq(sample, centroid);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params(k: usize) -> KMeansParams {
        KMeansParams {
            k,
            max_iterations: 20,
            convergence_threshold: 1e-4,
            samples: 10_000,
        }
    }

    #[test]
    fn test_two_clusters() {
        let mut pixels = vec![[250, 10, 10]; 50];
        pixels.extend(vec![[240, 0, 20]; 50]);
        pixels.extend(vec![[10, 10, 250]; 50]);
        pixels.extend(vec![[0, 20, 240]; 50]);

        let mut rng = StdRng::seed_from_u64(7);
        let palette = kmeans_palette(&pixels, &params(2), &mut rng);
        assert_eq!(palette.len(), 2);
        let reds = palette.iter().filter(|c| c[0] > 200 && c[2] < 60).count();
        let blues = palette.iter().filter(|c| c[2] > 200 && c[0] < 60).count();
        assert_eq!((reds, blues), (1, 1), "{palette:?}");
    }

    #[test]
    fn test_k_capped_by_distinct_colors() {
        let pixels = vec![[5, 5, 5]; 100];
        let mut rng = StdRng::seed_from_u64(1);
        let palette = kmeans_palette(&pixels, &params(16), &mut rng);
        assert_eq!(palette.len(), 1);
        assert!(palette[0].iter().all(|&c| (4..=6).contains(&c)), "{palette:?}");
    }

    #[test]
    fn test_seeded_runs_agree() {
        let pixels: Vec<Rgb> = (0..2000u32).map(|i| [(i % 251) as u8, (i % 97) as u8, (i % 13) as u8 * 19]).collect();
        let a = kmeans_palette(&pixels, &params(8), &mut StdRng::seed_from_u64(42));
        let b = kmeans_palette(&pixels, &params(8), &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_input() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(kmeans_palette(&[], &params(4), &mut rng).is_empty());
    }
}
