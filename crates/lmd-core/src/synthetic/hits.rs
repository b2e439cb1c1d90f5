//! Synthetic hit pairs for overlap regions.

use std::f64::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    math::{invert_rigid, transform_point, Mat4, Pt3, Real, Vec3},
    pairs::HitPairs,
};

use super::geometry::symmetric;

/// Controls for hit-pair generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitOptions {
    /// Number of pairs per overlap.
    pub count: usize,
    /// Half-width of the square hit region around the overlap center (cm).
    pub spread: Real,
    /// Maximum absolute per-axis noise added to each in-plane coordinate (cm).
    pub noise: Real,
    /// Fraction of pairs whose second hit is displaced.
    pub outlier_fraction: Real,
    /// Largest displacement of an outlier (cm). Outliers move by between
    /// half and all of this distance, in a random direction.
    pub outlier_shift: Real,
    /// Base seed; each overlap derives its own stream from it.
    pub seed: u64,
}

impl Default for HitOptions {
    fn default() -> Self {
        Self {
            count: 2000,
            spread: 1.0,
            noise: 0.0,
            outlier_fraction: 0.0,
            outlier_shift: 0.5,
            seed: 0,
        }
    }
}

/// Generate hit pairs for two sensors with global misalignments
/// `first_global` and `second_global`.
///
/// A true hit `x` is reconstructed through sensor `S` at
/// `(M_S^g)⁻¹ · x`, which is where the ideal geometry places it.
pub fn hit_pairs(
    first_global: &Mat4,
    second_global: &Mat4,
    center: &Pt3,
    options: &HitOptions,
    seed: u64,
) -> HitPairs {
    let mut rng = StdRng::seed_from_u64(seed);
    let to_first = invert_rigid(first_global);
    let to_second = invert_rigid(second_global);
    let outlier_p = options.outlier_fraction.clamp(0.0, 1.0);

    let mut first = Vec::with_capacity(options.count);
    let mut second = Vec::with_capacity(options.count);

    for _ in 0..options.count {
        let x = center
            + Vec3::new(
                symmetric(&mut rng, options.spread),
                symmetric(&mut rng, options.spread),
                0.0,
            );
        let mut a = transform_point(&to_first, &x);
        let mut b = transform_point(&to_second, &x);

        a.x += symmetric(&mut rng, options.noise);
        a.y += symmetric(&mut rng, options.noise);
        b.x += symmetric(&mut rng, options.noise);
        b.y += symmetric(&mut rng, options.noise);

        if outlier_p > 0.0 && rng.random_bool(outlier_p) {
            let direction = rng.random_range(0.0..TAU);
            let magnitude = options.outlier_shift.abs() * rng.random_range(0.5..=1.0);
            b.x += magnitude * direction.cos();
            b.y += magnitude * direction.sin();
        }

        first.push(a);
        second.push(b);
    }

    HitPairs::new(first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{rotation_z, translation_matrix};

    #[test]
    fn noise_free_pairs_follow_misalignments() {
        let m_first = translation_matrix(&Vec3::new(0.01, 0.0, 0.0));
        let m_second = rotation_z(1e-3);
        let center = Pt3::new(5.0, 5.0, 1100.0);
        let pairs = hit_pairs(&m_first, &m_second, &center, &HitOptions::default(), 1);

        assert_eq!(pairs.len_checked(), Some(2000));
        let relative = invert_rigid(&m_first) * m_second;
        for (a, b) in pairs.first.iter().zip(&pairs.second) {
            let mapped = transform_point(&relative, b);
            assert!((mapped - a).norm() < 1e-9);
            assert!((a.z - 1100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn outliers_displace_some_pairs() {
        let opts = HitOptions {
            count: 500,
            outlier_fraction: 0.2,
            ..HitOptions::default()
        };
        let id = Mat4::identity();
        let pairs = hit_pairs(&id, &id, &Pt3::origin(), &opts, 3);
        let displaced = pairs
            .first
            .iter()
            .zip(&pairs.second)
            .filter(|(a, b)| (*a - *b).norm() > 1e-12)
            .count();
        assert!(displaced > 50 && displaced < 150, "displaced = {displaced}");
    }
}
