use rand::Rng;

use crate::clip_allowed::clip_allowed;
use crate::distinct_parents::{comparison_index, distinct_parents};
use crate::errors::{DescriptionError, PopulationError};
use crate::init_random::open_uniform;
use crate::parameter_description::{ParameterDescriptionList, ParameterType};
use crate::parameter_set::ParameterSet;

pub const MIN_DIFF_SCALE: f64 = 0.01;
pub const MAX_DIFF_SCALE: f64 = 0.5;

/// Adaptive step: `2^(2u-1) * |(v3 - vcomp) / (v2 - v1)|` clamped to
/// `[MIN_DIFF_SCALE, MAX_DIFF_SCALE]`
///
/// An undefined ratio (0/0) takes the largest step.
pub(crate) fn diff_scale(v1: f64, v2: f64, v3: f64, v_comp: f64, u: f64) -> f64 {
    let factor = ((v3 - v_comp) / (v2 - v1)).abs();
    if factor.is_nan() {
        return MAX_DIFF_SCALE;
    }
    (2f64.powf(-1.0 + 2.0 * u) * factor).clamp(MIN_DIFF_SCALE, MAX_DIFF_SCALE)
}

/// Child of three sorted-population parents
///
/// Log parameters move multiplicatively (`p3 * (p1/p2)^s`), uniform ones
/// additively (`p3 + s*(p1-p2)`), both clipped to the allowed bounds.
pub(crate) fn cross_differential<R: Rng + ?Sized>(
    set: &mut ParameterSet,
    members: &[ParameterSet],
    descriptions: &ParameterDescriptionList,
    rng: &mut R,
) -> Result<(), PopulationError> {
    if members.len() < 3 {
        return Err(PopulationError::Config(format!(
            "differential crossover needs 3 evaluated members, population has {}",
            members.len()
        )));
    }
    let [ind1, ind2, ind3] = distinct_parents(members.len(), rng);
    let (p1, p2, p3) = (&members[ind1], &members[ind2], &members[ind3]);
    let scale = diff_scale(
        p1.value,
        p2.value,
        p3.value,
        members[comparison_index(ind3)].value,
        open_uniform(rng),
    );

    if set.len() != descriptions.len() {
        *set = ParameterSet::new(descriptions.len());
    }
    for (i, desc) in descriptions.iter().enumerate() {
        let (a, b, c) = (p1.parameters[i], p2.parameters[i], p3.parameters[i]);
        set.parameters[i] = match desc.kind() {
            ParameterType::Constant => desc.max_allowed(),
            ParameterType::LogDistributed => clip_allowed(c * (a / b).powf(scale), desc),
            ParameterType::UniformDistributed => clip_allowed(c + scale * (a - b), desc),
            ParameterType::Invalid => {
                return Err(DescriptionError::InvalidRange(desc.name().to_string()).into());
            }
        };
    }
    set.value = f64::NAN;
    set.diff_scale = scale;
    Ok(())
}
