//! Seeded white noise.

use rand::Rng;

/// Uniform white noise in [-1, 1).
pub fn white_noise<R: Rng + ?Sized>(frames: usize, rng: &mut R) -> Vec<f32> {
    (0..frames).map(|_| rng.gen_range(-1.0_f32..1.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn noise_is_bounded_and_not_silent() {
        let mut rng = Pcg64::seed_from_u64(1);
        let noise = white_noise(4410, &mut rng);
        assert_eq!(noise.len(), 4410);
        assert!(noise.iter().all(|s| (-1.0..1.0).contains(s)));
        let energy: f32 = noise.iter().map(|s| s * s).sum();
        assert!(energy > 100.0);
    }

    #[test]
    fn same_seed_same_noise() {
        let a = white_noise(64, &mut Pcg64::seed_from_u64(9));
        let b = white_noise(64, &mut Pcg64::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
