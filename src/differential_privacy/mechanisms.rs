use rand::{distributions::Distribution, Rng};
use statrs::distribution::Laplace;

use super::{Error, Result};

/// The scale of the Laplace noise giving epsilon-DP for a given sensitivity
pub fn laplace_scale(sensitivity: f64, epsilon: f64) -> f64 {
    sensitivity / epsilon
}

/// The variance of the Laplace mechanism: 2·(sensitivity/epsilon)²
pub fn laplace_variance(sensitivity: f64, epsilon: f64) -> f64 {
    2. * laplace_scale(sensitivity, epsilon).powi(2)
}

/// Draw noise from Laplace(0, sensitivity/epsilon).
/// A zero sensitivity needs no noise.
pub fn sample_noise<R: Rng + ?Sized>(sensitivity: f64, epsilon: f64, rng: &mut R) -> Result<f64> {
    let scale = laplace_scale(sensitivity, epsilon);
    if scale == 0. {
        return Ok(0.);
    }
    let laplace = Laplace::new(0., scale).map_err(|err| {
        Error::other(format!(
            "cannot build a Laplace distribution of scale {scale}: {err}"
        ))
    })?;
    Ok(laplace.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use statrs::statistics::Statistics;

    #[test]
    fn test_laplace_variance() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(1234);
        for epsilon in [0.1, 1., 4.] {
            let samples = (0..20000)
                .map(|_| sample_noise(1., epsilon, &mut rng))
                .collect::<Result<Vec<f64>>>()?;
            let mean = samples.iter().mean();
            let variance = samples.iter().variance();
            let expected = laplace_variance(1., epsilon);
            println!("ε={epsilon} mean={mean} variance={variance} expected={expected}");
            assert!(mean.abs() < 0.1 / epsilon);
            assert!((variance - expected).abs() < 0.1 * expected);
        }
        Ok(())
    }

    #[test]
    fn test_no_noise() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(1234);
        assert_eq!(sample_noise(0., 1., &mut rng)?, 0.);
        assert!(sample_noise(f64::NAN, 1., &mut rng).is_err());
        assert_eq!(laplace_scale(10., 2.), 5.);
        Ok(())
    }
}
