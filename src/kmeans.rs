//! K-means labeling used once per run to seed the color mixtures.

use itertools::Itertools;
use nalgebra::Vector3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Fixed seed; the caller never supplies one, so runs stay reproducible.
const SEED: u64 = 42;

/// Partition `samples` into at most `k` clusters with k-means++ seeding
/// followed by a fixed number of Lloyd iterations, returning one label per
/// sample.
///
/// When there are fewer samples than clusters the effective cluster count is
/// clamped to the sample count; labels then only cover the populated
/// clusters.
pub fn kmeans(samples: &[Vector3<f64>], k: usize, iterations: usize) -> Vec<usize> {
    debug_assert!(!samples.is_empty());
    let k = k.min(samples.len());
    let mut rng = SmallRng::seed_from_u64(SEED);

    let mut centers = seed_centers(samples, k, &mut rng);
    let mut labels = vec![0; samples.len()];
    for _ in 0..iterations {
        assign(samples, &centers, &mut labels);

        let mut sums = vec![Vector3::zeros(); k];
        let mut counts = vec![0usize; k];
        for (&label, sample) in labels.iter().zip(samples) {
            sums[label] += sample;
            counts[label] += 1;
        }
        for (center, (sum, count)) in centers.iter_mut().zip(sums.into_iter().zip(counts)) {
            // An emptied cluster keeps its previous center.
            if count > 0 {
                *center = sum / count as f64;
            }
        }
    }
    assign(samples, &centers, &mut labels);
    labels
}

/// k-means++: after a uniform first pick, each next center is drawn with
/// probability proportional to the squared distance to the nearest center
/// chosen so far.
fn seed_centers(samples: &[Vector3<f64>], k: usize, rng: &mut SmallRng) -> Vec<Vector3<f64>> {
    let mut centers = Vec::with_capacity(k);
    centers.push(samples[rng.gen_range(0..samples.len())]);

    let mut dist2: Vec<f64> = samples
        .iter()
        .map(|s| (s - centers[0]).norm_squared())
        .collect();
    while centers.len() < k {
        let total: f64 = dist2.iter().sum();
        let next = if total <= f64::EPSILON {
            // All samples coincide with a center already; any pick works.
            rng.gen_range(0..samples.len())
        } else {
            let mut r = rng.gen::<f64>() * total;
            let mut pick = samples.len() - 1;
            for (i, &d) in dist2.iter().enumerate() {
                r -= d;
                if r <= 0.0 {
                    pick = i;
                    break;
                }
            }
            pick
        };
        let center = samples[next];
        for (d, s) in dist2.iter_mut().zip(samples) {
            *d = d.min((s - center).norm_squared());
        }
        centers.push(center);
    }
    centers
}

fn assign(samples: &[Vector3<f64>], centers: &[Vector3<f64>], labels: &mut [usize]) {
    for (label, sample) in labels.iter_mut().zip(samples) {
        *label = centers
            .iter()
            .map(|c| (sample - c).norm_squared())
            .position_min_by(|a, b| a.partial_cmp(b).unwrap())
            .unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64, z: f64) -> Vector3<f64> {
        Vector3::new(x, y, z)
    }

    #[test]
    fn separated_clusters_get_coherent_labels() {
        let samples = vec![
            v(0.0, 0.0, 0.0),
            v(1.0, 0.0, 1.0),
            v(0.0, 1.0, 0.0),
            v(100.0, 100.0, 100.0),
            v(101.0, 99.0, 100.0),
            v(99.0, 100.0, 101.0),
        ];
        let labels = kmeans(&samples, 2, 10);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn labels_stay_in_range_with_more_clusters_than_samples() {
        let samples = vec![v(5.0, 5.0, 5.0)];
        let labels = kmeans(&samples, 5, 10);
        assert_eq!(labels, vec![0]);

        let samples = vec![v(0.0, 0.0, 0.0), v(9.0, 9.0, 9.0)];
        let labels = kmeans(&samples, 5, 10);
        assert!(labels.iter().all(|&l| l < 2));
        assert_ne!(labels[0], labels[1]);
    }

    #[test]
    fn identical_samples_land_in_one_cluster() {
        let samples = vec![v(3.0, 3.0, 3.0); 8];
        let labels = kmeans(&samples, 5, 10);
        assert!(labels.iter().all(|&l| l == labels[0]));
    }

    #[test]
    fn labeling_is_deterministic() {
        let samples: Vec<_> = (0..50)
            .map(|i| v((i * 7 % 13) as f64, (i * 5 % 11) as f64, (i * 3 % 17) as f64))
            .collect();
        assert_eq!(kmeans(&samples, 5, 10), kmeans(&samples, 5, 10));
    }
}
