use rand::Rng;

use crate::clip_allowed::clip_allowed;
use crate::errors::DescriptionError;
use crate::parameter_description::{ParameterDescriptionList, ParameterDescription, ParameterType};
use crate::parameter_set::ParameterSet;

/// Uniform draw in the open interval (0, 1)
pub(crate) fn open_uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u: f64 = rng.random();
        if u > 0.0 {
            return u;
        }
    }
}

/// Random value inside the current range of `desc`
pub(crate) fn random_value<R: Rng + ?Sized>(
    desc: &ParameterDescription,
    rng: &mut R,
) -> Result<f64, DescriptionError> {
    let (lo, hi) = (desc.min_range(), desc.max_range());
    let value = match desc.kind() {
        ParameterType::Constant => return desc.default_value(),
        ParameterType::LogDistributed => lo * (hi / lo).powf(open_uniform(rng)),
        ParameterType::UniformDistributed => lo + (hi - lo) * open_uniform(rng),
        ParameterType::Invalid => return Err(DescriptionError::InvalidRange(desc.name().to_string())),
    };
    Ok(clip_allowed(value, desc))
}

/// Fill `set` with random values and mark it pending
pub(crate) fn init_random<R: Rng + ?Sized>(
    set: &mut ParameterSet,
    descriptions: &ParameterDescriptionList,
    diff_scale: f64,
    rng: &mut R,
) -> Result<(), DescriptionError> {
    if set.len() != descriptions.len() {
        *set = ParameterSet::new(descriptions.len());
    }
    for (slot, desc) in set.parameters.iter_mut().zip(descriptions.iter()) {
        *slot = random_value(desc, rng)?;
    }
    set.value = f64::NAN;
    set.diff_scale = diff_scale;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_random_values_stay_in_range() {
        let descs = ParameterDescriptionList::from_descriptions([
            ParameterDescription::new("g", 1e-6, 1.0, 1e-3, 1e-1).unwrap(),
            ParameterDescription::ranged("v", -5.0, 5.0).unwrap(),
            ParameterDescription::ranged("n", -10.0, -0.1).unwrap(),
            ParameterDescription::constant("c", 42.0).unwrap(),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut set = ParameterSet::new(0);
        for _ in 0..1000 {
            init_random(&mut set, &descs, 0.5, &mut rng).unwrap();
            assert!(set.is_pending());
            assert_eq!(set.len(), 4);
            assert!((1e-3..=1e-1).contains(&set.parameters[0]));
            assert!((-5.0..=5.0).contains(&set.parameters[1]));
            assert!((-10.0..=-0.1).contains(&set.parameters[2]));
            assert_eq!(set.parameters[3], 42.0);
        }
    }

    #[test]
    fn test_log_draws_cover_decades() {
        let d = ParameterDescription::ranged("g", 1e-4, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let below = (0..2000)
            .map(|_| random_value(&d, &mut rng).unwrap())
            .filter(|v| *v < 1e-2)
            .count();
        // half of the decades lie below 1e-2
        assert!(below > 800 && below < 1200, "{below}");
    }
}
